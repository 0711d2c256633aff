//! Room registry
//!
//! All rooms behind one async `RwLock`. Every mutation and its fan-out
//! happen under the write lock, so every participant's queue receives events
//! in the same order the authority applied them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use syncsong_common::protocol::YouArePayload;
use syncsong_common::time::now_millis;
use syncsong_common::SyncEvent;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::room::{Outbox, ParticipantId, Room};

/// How long a created room may sit without ever being joined
pub const VACANT_ROOM_GRACE: Duration = Duration::from_secs(10 * 60);

/// How often vacant rooms are swept
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty room; returns false when it already existed
    pub async fn create(&self, code: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(code) {
            return false;
        }
        rooms.insert(code.to_string(), Room::new(code));
        info!("Room {} created", code);
        true
    }

    pub async fn exists(&self, code: &str) -> bool {
        self.rooms.read().await.contains_key(code)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn member_count(&self, code: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(code)
            .map(Room::member_count)
            .unwrap_or(0)
    }

    /// Register a participant, creating the room on first join
    ///
    /// Queues `YOU_ARE` for the joiner, `ROOM_USERS` for everyone, then
    /// `SYNC_STATE` for the joiner.
    pub async fn join(&self, code: &str, outbox: Outbox) -> ParticipantId {
        let id = Uuid::new_v4();
        let now = now_millis();

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(code.to_string())
            .or_insert_with(|| Room::new(code));

        let role = room.add_member(id, outbox);
        info!(
            "Participant {} joined room {} as {} ({} present)",
            id,
            code,
            role,
            room.member_count()
        );

        room.send_to(id, SyncEvent::YouAre(YouArePayload { role }));
        room.broadcast(&SyncEvent::RoomUsers(room.roster()));
        room.send_to(id, SyncEvent::SyncState(room.snapshot(now)));
        id
    }

    /// Remove a participant; promotes a new admin and deletes empty rooms
    pub async fn leave(&self, code: &str, id: ParticipantId) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(code) else {
            return;
        };

        let departure = room.remove_member(id);
        if !departure.removed {
            return;
        }
        info!("Participant {} left room {}", id, code);

        if room.is_empty() {
            rooms.remove(code);
            info!("Room {} is empty, deleted", code);
            return;
        }

        if let Some(promoted) = departure.promoted {
            info!("Participant {} promoted to admin of room {}", promoted, code);
            room.send_role(promoted);
        }
        room.broadcast(&SyncEvent::RoomUsers(room.roster()));
    }

    /// Apply a participant command and broadcast the result to the room
    ///
    /// Rejected commands return `Err(BadRequest)` and change nothing.
    pub async fn handle_command(
        &self,
        code: &str,
        from: ParticipantId,
        command: SyncEvent,
        now_ms: i64,
    ) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(code) else {
            warn!("Command for unknown room {}", code);
            return Ok(());
        };

        debug!("Room {}: {} from {}", code, command.tag(), from);
        if let Some(event) = room.apply(command, now_ms)? {
            room.broadcast(&event);
        }
        Ok(())
    }

    /// Send a fresh SYNC_STATE to every member of every room
    pub async fn resync_all(&self, now_ms: i64) {
        let rooms = self.rooms.read().await;
        for room in rooms.values().filter(|room| !room.is_empty()) {
            room.broadcast(&SyncEvent::SyncState(room.snapshot(now_ms)));
        }
    }

    /// Delete empty rooms older than `grace`; returns how many were removed
    ///
    /// Rooms emptied by a departure are already gone, so this only catches
    /// rooms created over HTTP that nobody joined.
    pub async fn sweep_vacant(&self, now_ms: i64, grace: Duration) -> usize {
        let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|code, room| {
            let expired =
                room.is_empty() && now_ms.saturating_sub(room.created_at_ms()) >= grace_ms;
            if expired {
                info!("Room {} was never joined, deleted", code);
            }
            !expired
        });
        before - rooms.len()
    }

    /// Periodic sweep of rooms nobody joined
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, grace: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.sweep_vacant(now_millis(), grace).await;
                if removed > 0 {
                    debug!("Swept {} vacant rooms", removed);
                }
            }
        })
    }

    /// Periodic resync task
    pub fn spawn_resync(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.resync_all(now_millis()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncsong_common::Role;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn tags(events: &[SyncEvent]) -> Vec<&'static str> {
        events.iter().map(SyncEvent::tag).collect()
    }

    #[tokio::test]
    async fn test_join_order() {
        let registry = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        registry.join("R1", tx_a).await;
        assert_eq!(tags(&drain(&mut rx_a)), vec!["YOU_ARE", "ROOM_USERS", "SYNC_STATE"]);

        registry.join("R1", tx_b).await;
        let b_events = drain(&mut rx_b);
        assert_eq!(tags(&b_events), vec!["YOU_ARE", "ROOM_USERS", "SYNC_STATE"]);
        assert_eq!(
            b_events[0],
            SyncEvent::YouAre(YouArePayload { role: Role::Member })
        );
        // Existing member only sees the roster change
        assert_eq!(tags(&drain(&mut rx_a)), vec!["ROOM_USERS"]);
    }

    #[tokio::test]
    async fn test_commands_broadcast_to_sender_too() {
        let registry = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.join("R1", tx_a).await;
        registry.join("R1", tx_b).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        registry
            .handle_command("R1", a, SyncEvent::change_url("https://youtu.be/abcdefghijk"), 0)
            .await
            .unwrap();
        assert_eq!(tags(&drain(&mut rx_a)), vec!["CHANGE_URL"]);
        assert_eq!(tags(&drain(&mut rx_b)), vec!["CHANGE_URL"]);
    }

    #[tokio::test]
    async fn test_rejected_command_not_broadcast() {
        let registry = RoomRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let a = registry.join("R1", tx).await;
        drain(&mut rx);

        let result = registry.handle_command("R1", a, SyncEvent::change_url(""), 0).await;
        assert!(result.is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_admin_leave_promotes_and_empty_room_is_deleted() {
        let registry = RoomRegistry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.join("R1", tx_a).await;
        let b = registry.join("R1", tx_b).await;
        drain(&mut rx_b);

        registry.leave("R1", a).await;
        assert_eq!(
            drain(&mut rx_b),
            vec![
                SyncEvent::YouAre(YouArePayload { role: Role::Admin }),
                SyncEvent::RoomUsers(syncsong_common::protocol::RoomUsersPayload {
                    users: vec![Role::Admin],
                    count: 1,
                }),
            ]
        );

        registry.leave("R1", b).await;
        assert!(!registry.exists("R1").await);
    }

    #[tokio::test]
    async fn test_create_and_exists() {
        let registry = RoomRegistry::new();
        assert!(!registry.exists("R1").await);
        assert!(registry.create("R1").await);
        assert!(!registry.create("R1").await);
        assert!(registry.exists("R1").await);
        assert_eq!(registry.member_count("R1").await, 0);
    }

    #[tokio::test]
    async fn test_rooms_never_joined_expire() {
        let registry = RoomRegistry::new();
        registry.create("IDLE").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("BUSY", tx).await;

        let grace = Duration::from_secs(60);
        let now = now_millis();
        assert_eq!(registry.sweep_vacant(now, grace).await, 0);
        assert!(registry.exists("IDLE").await);

        assert_eq!(registry.sweep_vacant(now + 61_000, grace).await, 1);
        assert!(!registry.exists("IDLE").await);
        assert!(registry.exists("BUSY").await);
    }

    #[tokio::test]
    async fn test_sweeper_task_removes_vacant_rooms() {
        let registry = Arc::new(RoomRegistry::new());
        registry.create("IDLE").await;
        let sweeper = registry.spawn_sweeper(Duration::from_millis(20), Duration::ZERO);

        let mut deleted = false;
        for _ in 0..50 {
            if !registry.exists("IDLE").await {
                deleted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        sweeper.abort();
        assert!(deleted, "vacant room should be swept");
    }

    #[tokio::test]
    async fn test_resync_skips_empty_rooms() {
        let registry = RoomRegistry::new();
        registry.create("EMPTY").await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join("R1", tx).await;
        drain(&mut rx);

        registry.resync_all(1_000).await;
        assert_eq!(tags(&drain(&mut rx)), vec!["SYNC_STATE"]);
    }
}
