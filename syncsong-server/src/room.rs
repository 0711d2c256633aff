//! Room state
//!
//! One room holds the shared media, its timeline, and the ordered member
//! list. The first member is the admin; when the admin leaves, the next
//! member in join order is promoted.
//!
//! **Timeline:** stored as an anchor rather than a running position:
//! - `Playing { started_at_ms }`: position = `(now - started_at) / 1000`
//! - `Paused { offset_secs }`: position = `offset`
//!
//! All operations take `now_ms` so the arithmetic is testable.

use syncsong_common::protocol::{PlayPayload, RoomUsersPayload, SyncStatePayload, YouArePayload};
use syncsong_common::time::{millis_to_secs, now_millis, secs_to_millis};
use syncsong_common::{Role, SyncEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest accepted room code
pub const MAX_CODE_LEN: usize = 64;

/// Furthest accepted SEEK target (one week of media)
pub const MAX_SEEK_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Room codes are opaque but restricted to URL-safe characters
pub fn validate_code(code: &str) -> Result<()> {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(Error::BadRequest(format!(
            "Room code must be 1-{} characters",
            MAX_CODE_LEN
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::BadRequest(format!("Invalid room code: {}", code)));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timeline {
    Playing { started_at_ms: i64 },
    Paused { offset_secs: f64 },
}

impl Timeline {
    pub fn is_playing(&self) -> bool {
        matches!(self, Timeline::Playing { .. })
    }

    pub fn position_at(&self, now_ms: i64) -> f64 {
        match *self {
            Timeline::Playing { started_at_ms } => {
                millis_to_secs(now_ms.saturating_sub(started_at_ms))
            }
            Timeline::Paused { offset_secs } => offset_secs,
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Timeline::Paused { offset_secs: 0.0 }
    }
}

pub type ParticipantId = Uuid;

/// Outbound queue of one connected participant
pub type Outbox = mpsc::UnboundedSender<SyncEvent>;

#[derive(Debug)]
struct Member {
    id: ParticipantId,
    outbox: Outbox,
}

/// Result of removing a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub removed: bool,
    /// Member promoted to admin by this departure
    pub promoted: Option<ParticipantId>,
}

#[derive(Debug)]
pub struct Room {
    code: String,
    media: Option<String>,
    timeline: Timeline,
    members: Vec<Member>,
    created_at_ms: i64,
}

impl Room {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            media: None,
            timeline: Timeline::default(),
            members: Vec::new(),
            created_at_ms: now_millis(),
        }
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn media(&self) -> Option<&str> {
        self.media.as_deref()
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn role_of(&self, id: ParticipantId) -> Option<Role> {
        let index = self.members.iter().position(|m| m.id == id)?;
        Some(if index == 0 { Role::Admin } else { Role::Member })
    }

    /// Append a member; returns the role it received
    pub fn add_member(&mut self, id: ParticipantId, outbox: Outbox) -> Role {
        self.members.push(Member { id, outbox });
        if self.members.len() == 1 {
            Role::Admin
        } else {
            Role::Member
        }
    }

    pub fn remove_member(&mut self, id: ParticipantId) -> Departure {
        let Some(index) = self.members.iter().position(|m| m.id == id) else {
            return Departure {
                removed: false,
                promoted: None,
            };
        };
        self.members.remove(index);
        let promoted = if index == 0 {
            self.members.first().map(|m| m.id)
        } else {
            None
        };
        Departure {
            removed: true,
            promoted,
        }
    }

    /// Roster in join order, admin first
    pub fn roster(&self) -> RoomUsersPayload {
        let users = (0..self.members.len())
            .map(|i| if i == 0 { Role::Admin } else { Role::Member })
            .collect();
        RoomUsersPayload {
            users,
            count: self.members.len(),
        }
    }

    /// Full authoritative state as of `now_ms`
    pub fn snapshot(&self, now_ms: i64) -> SyncStatePayload {
        SyncStatePayload {
            url: self.media.clone(),
            is_playing: self.timeline.is_playing(),
            started_at: match self.timeline {
                Timeline::Playing { started_at_ms } => Some(started_at_ms),
                Timeline::Paused { .. } => None,
            },
            seek_to: Some(self.timeline.position_at(now_ms)),
            server_time: Some(now_ms),
        }
    }

    /// Apply a participant command to the timeline
    ///
    /// Returns the event to broadcast, `None` when the command is ignored,
    /// and `Err(BadRequest)` when it is rejected.
    pub fn apply(&mut self, command: SyncEvent, now_ms: i64) -> Result<Option<SyncEvent>> {
        match command {
            SyncEvent::Play(_) => {
                if self.media.is_none() {
                    debug!("Room {}: PLAY ignored, no media", self.code);
                    return Ok(None);
                }
                let started_at_ms = match self.timeline {
                    Timeline::Paused { offset_secs } => {
                        now_ms.saturating_sub(secs_to_millis(offset_secs))
                    }
                    Timeline::Playing { started_at_ms } => started_at_ms,
                };
                self.timeline = Timeline::Playing { started_at_ms };
                Ok(Some(SyncEvent::Play(PlayPayload {
                    seek_to: Some(self.timeline.position_at(now_ms)),
                    server_time: Some(now_ms),
                    started_at: Some(started_at_ms),
                })))
            }
            SyncEvent::Pause => {
                if self.timeline.is_playing() {
                    self.timeline = Timeline::Paused {
                        offset_secs: self.timeline.position_at(now_ms),
                    };
                }
                Ok(Some(SyncEvent::Pause))
            }
            SyncEvent::Seek(payload) => {
                if !payload.time.is_finite() || payload.time < 0.0 {
                    return Err(Error::BadRequest(format!(
                        "SEEK time must be a non-negative number, got {}",
                        payload.time
                    )));
                }
                if payload.time > MAX_SEEK_SECS {
                    return Err(Error::BadRequest(format!(
                        "SEEK time {} exceeds {} seconds",
                        payload.time, MAX_SEEK_SECS
                    )));
                }
                self.timeline = match self.timeline {
                    Timeline::Playing { .. } => Timeline::Playing {
                        started_at_ms: now_ms.saturating_sub(secs_to_millis(payload.time)),
                    },
                    Timeline::Paused { .. } => Timeline::Paused {
                        offset_secs: payload.time,
                    },
                };
                Ok(Some(SyncEvent::Seek(payload)))
            }
            SyncEvent::ChangeUrl(payload) => {
                let url = payload.url.trim();
                if url.is_empty() {
                    return Err(Error::BadRequest("CHANGE_URL requires a url".to_string()));
                }
                self.media = Some(url.to_string());
                self.timeline = Timeline::default();
                Ok(Some(SyncEvent::change_url(url)))
            }
            other => Err(Error::BadRequest(format!(
                "{} is not accepted from participants",
                other.tag()
            ))),
        }
    }

    /// Queue an event for every member, in join order
    pub fn broadcast(&self, event: &SyncEvent) {
        trace!("Room {}: broadcast {}", self.code, event.tag());
        for member in &self.members {
            // A closed outbox means that socket is already going away
            let _ = member.outbox.send(event.clone());
        }
    }

    /// Queue an event for one member
    pub fn send_to(&self, id: ParticipantId, event: SyncEvent) {
        if let Some(member) = self.members.iter().find(|m| m.id == id) {
            let _ = member.outbox.send(event);
        }
    }

    pub fn send_role(&self, id: ParticipantId) {
        if let Some(role) = self.role_of(id) {
            self.send_to(id, SyncEvent::YouAre(YouArePayload { role }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncsong_common::protocol::{ChangeUrlPayload, SeekPayload};

    const T: i64 = 1_700_000_000_000;

    fn room_with_media() -> Room {
        let mut room = Room::new("ROOM");
        room.apply(SyncEvent::change_url("https://youtu.be/abcdefghijk"), T)
            .unwrap();
        room
    }

    #[test]
    fn test_play_without_media_is_ignored() {
        let mut room = Room::new("ROOM");
        assert_eq!(room.apply(SyncEvent::play_request(), T).unwrap(), None);
        assert!(!room.timeline().is_playing());
    }

    #[test]
    fn test_pause_resume_keeps_position() {
        let mut room = room_with_media();
        room.apply(SyncEvent::play_request(), T).unwrap();
        room.apply(SyncEvent::Pause, T + 12_500).unwrap();
        assert_eq!(room.timeline(), Timeline::Paused { offset_secs: 12.5 });

        // Resuming later continues from the paused offset
        let play = room.apply(SyncEvent::play_request(), T + 60_000).unwrap();
        assert_eq!(
            play,
            Some(SyncEvent::Play(PlayPayload {
                seek_to: Some(12.5),
                server_time: Some(T + 60_000),
                started_at: Some(T + 47_500),
            }))
        );
    }

    #[test]
    fn test_play_while_playing_keeps_anchor() {
        let mut room = room_with_media();
        room.apply(SyncEvent::play_request(), T).unwrap();
        let play = room.apply(SyncEvent::play_request(), T + 5_000).unwrap();
        assert_eq!(room.timeline(), Timeline::Playing { started_at_ms: T });
        match play {
            Some(SyncEvent::Play(payload)) => assert_eq!(payload.seek_to, Some(5.0)),
            other => panic!("expected PLAY, got {other:?}"),
        }
    }

    #[test]
    fn test_seek_while_playing_and_paused() {
        let mut room = room_with_media();
        room.apply(SyncEvent::seek(30.0), T).unwrap();
        assert_eq!(room.timeline(), Timeline::Paused { offset_secs: 30.0 });

        room.apply(SyncEvent::play_request(), T).unwrap();
        room.apply(SyncEvent::seek(90.0), T + 1_000).unwrap();
        assert_eq!(room.timeline().position_at(T + 3_000), 92.0);
    }

    #[test]
    fn test_invalid_seek_rejected() {
        let mut room = room_with_media();
        for time in [-1.0, f64::NAN, f64::INFINITY] {
            let result = room.apply(SyncEvent::Seek(SeekPayload { time }), T);
            assert!(matches!(result, Err(Error::BadRequest(_))));
        }
    }

    #[test]
    fn test_seek_beyond_ceiling_rejected_and_timeline_intact() {
        let mut room = room_with_media();
        room.apply(SyncEvent::play_request(), T).unwrap();

        let result = room.apply(SyncEvent::seek(1e300), T + 1_000);
        assert!(matches!(result, Err(Error::BadRequest(_))));
        assert_eq!(room.timeline(), Timeline::Playing { started_at_ms: T });

        // Right at the ceiling is still accepted and snapshots stay sane
        room.apply(SyncEvent::seek(MAX_SEEK_SECS), T + 1_000).unwrap();
        let snapshot = room.snapshot(T + 2_000);
        assert_eq!(snapshot.seek_to, Some(MAX_SEEK_SECS + 1.0));
        room.apply(SyncEvent::Pause, T + 3_000).unwrap();
        assert_eq!(
            room.timeline(),
            Timeline::Paused {
                offset_secs: MAX_SEEK_SECS + 2.0
            }
        );
    }

    #[test]
    fn test_extreme_anchor_does_not_overflow() {
        let timeline = Timeline::Playing {
            started_at_ms: i64::MIN + 5,
        };
        assert!(timeline.position_at(T).is_finite());
    }

    #[test]
    fn test_change_url_resets_timeline() {
        let mut room = room_with_media();
        room.apply(SyncEvent::play_request(), T).unwrap();
        let event = room
            .apply(
                SyncEvent::ChangeUrl(ChangeUrlPayload {
                    url: "  https://www.youtube.com/watch?v=zzzzzzzzzzz ".into(),
                }),
                T + 9_000,
            )
            .unwrap();
        assert_eq!(
            event,
            Some(SyncEvent::change_url("https://www.youtube.com/watch?v=zzzzzzzzzzz"))
        );
        assert_eq!(room.timeline(), Timeline::Paused { offset_secs: 0.0 });

        let blank = room.apply(SyncEvent::change_url("   "), T);
        assert!(matches!(blank, Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_authority_only_commands_rejected() {
        let mut room = room_with_media();
        let result = room.apply(
            SyncEvent::YouAre(YouArePayload { role: Role::Admin }),
            T,
        );
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_snapshot() {
        let mut room = room_with_media();
        room.apply(SyncEvent::play_request(), T).unwrap();
        let snapshot = room.snapshot(T + 4_000);
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.started_at, Some(T));
        assert_eq!(snapshot.seek_to, Some(4.0));
        assert_eq!(snapshot.server_time, Some(T + 4_000));
    }

    #[test]
    fn test_admin_promotion() {
        let mut room = Room::new("ROOM");
        let (tx, _rx) = mpsc::unbounded_channel();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(room.add_member(a, tx.clone()), Role::Admin);
        assert_eq!(room.add_member(b, tx.clone()), Role::Member);
        room.add_member(c, tx);

        assert_eq!(
            room.remove_member(b),
            Departure {
                removed: true,
                promoted: None
            }
        );
        assert_eq!(room.remove_member(a).promoted, Some(c));
        assert_eq!(room.role_of(c), Some(Role::Admin));
        assert_eq!(room.roster().users, vec![Role::Admin]);
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("AB12CD").is_ok());
        assert!(validate_code("").is_err());
        assert!(validate_code("a b").is_err());
        assert!(validate_code(&"x".repeat(65)).is_err());
    }
}
