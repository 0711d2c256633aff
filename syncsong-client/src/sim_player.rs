//! Simulated player
//!
//! Headless stand-in for an embedded player. Position advances with a clock
//! while playing, and every mutation reports its effect through the same
//! callback channel a real player would use:
//! - `load` raises `Ready`
//! - `play`/`pause` raise `Playing`/`Paused` only when the state changes
//! - `seek_to` raises `Buffering` followed by the settled state it returns to

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use syncsong_common::time::{millis_to_secs, now_millis};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::player::{Player, PlayerEvent, PlayerEvents, PlayerProvider, PlayerState};

/// Time source for the simulated position
#[derive(Debug, Clone)]
pub enum SimClock {
    System,
    /// Advanced by hand
    Manual(Arc<AtomicI64>),
}

impl SimClock {
    pub fn manual(start_ms: i64) -> Self {
        SimClock::Manual(Arc::new(AtomicI64::new(start_ms)))
    }

    pub fn now_ms(&self) -> i64 {
        match self {
            SimClock::System => now_millis(),
            SimClock::Manual(ms) => ms.load(Ordering::SeqCst),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let SimClock::Manual(ms) = self {
            ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
        }
    }
}

#[derive(Debug)]
pub struct SimulatedPlayer {
    clock: SimClock,
    events: mpsc::UnboundedSender<PlayerEvent>,
    state: PlayerState,
    video_id: Option<String>,
    /// Position at `since_ms`
    position: f64,
    since_ms: i64,
}

impl SimulatedPlayer {
    pub fn new(clock: SimClock) -> (Self, PlayerEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let since_ms = clock.now_ms();
        let player = Self {
            clock,
            events: tx,
            state: PlayerState::Unstarted,
            video_id: None,
            position: 0.0,
            since_ms,
        };
        (player, rx)
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    fn position_now(&self) -> f64 {
        if self.state == PlayerState::Playing {
            self.position + millis_to_secs(self.clock.now_ms() - self.since_ms)
        } else {
            self.position
        }
    }

    fn freeze(&mut self) {
        self.position = self.position_now();
        self.since_ms = self.clock.now_ms();
    }

    fn emit(&self, event: PlayerEvent) {
        // Receiver gone means the session is shutting down
        let _ = self.events.send(event);
    }

    fn transition(&mut self, state: PlayerState) {
        self.state = state;
        self.emit(PlayerEvent::StateChange(state));
    }

    fn require_media(&self) -> Result<()> {
        if self.video_id.is_none() {
            return Err(Error::Player("no media loaded".to_string()));
        }
        Ok(())
    }
}

impl Player for SimulatedPlayer {
    fn load(&mut self, video_id: &str) -> Result<()> {
        debug!("Simulated player loading {}", video_id);
        self.video_id = Some(video_id.to_string());
        self.position = 0.0;
        self.since_ms = self.clock.now_ms();
        self.state = PlayerState::Cued;
        self.emit(PlayerEvent::Ready);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.require_media()?;
        if self.state != PlayerState::Playing {
            self.freeze();
            self.transition(PlayerState::Playing);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.require_media()?;
        if matches!(self.state, PlayerState::Playing | PlayerState::Buffering) {
            self.freeze();
            self.transition(PlayerState::Paused);
        }
        Ok(())
    }

    fn seek_to(&mut self, seconds: f64, _allow_seek_ahead: bool) -> Result<()> {
        self.require_media()?;
        let resume = if self.state == PlayerState::Playing {
            PlayerState::Playing
        } else {
            PlayerState::Paused
        };
        self.position = seconds.max(0.0);
        self.since_ms = self.clock.now_ms();
        self.transition(PlayerState::Buffering);
        self.transition(resume);
        Ok(())
    }

    fn current_time(&self) -> Result<f64> {
        self.require_media()?;
        Ok(self.position_now())
    }
}

/// Acquires a [`SimulatedPlayer`], optionally after a construction delay
#[derive(Debug, Clone)]
pub struct SimulatedPlayerProvider {
    clock: SimClock,
    ready_after: Duration,
}

impl SimulatedPlayerProvider {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            ready_after: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, ready_after: Duration) -> Self {
        self.ready_after = ready_after;
        self
    }
}

#[async_trait]
impl PlayerProvider for SimulatedPlayerProvider {
    type Handle = SimulatedPlayer;

    async fn acquire(self) -> Result<(SimulatedPlayer, PlayerEvents)> {
        if !self.ready_after.is_zero() {
            tokio::time::sleep(self.ready_after).await;
        }
        Ok(SimulatedPlayer::new(self.clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut PlayerEvents) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_position_follows_clock_while_playing() {
        let clock = SimClock::manual(0);
        let (mut player, _rx) = SimulatedPlayer::new(clock.clone());
        player.load("dQw4w9WgXcQ").unwrap();
        player.play().unwrap();
        clock.advance(Duration::from_millis(2_500));
        assert_eq!(player.current_time().unwrap(), 2.5);

        player.pause().unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(player.current_time().unwrap(), 2.5);
    }

    #[test]
    fn test_callbacks() {
        let clock = SimClock::manual(0);
        let (mut player, mut rx) = SimulatedPlayer::new(clock);
        player.load("dQw4w9WgXcQ").unwrap();
        assert_eq!(drain(&mut rx), vec![PlayerEvent::Ready]);

        // Pausing a cued player changes nothing
        player.pause().unwrap();
        assert!(drain(&mut rx).is_empty());

        player.play().unwrap();
        player.play().unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![PlayerEvent::StateChange(PlayerState::Playing)]
        );

        player.seek_to(30.0, true).unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                PlayerEvent::StateChange(PlayerState::Buffering),
                PlayerEvent::StateChange(PlayerState::Playing),
            ]
        );
    }

    #[test]
    fn test_requires_media() {
        let (mut player, _rx) = SimulatedPlayer::new(SimClock::System);
        assert!(matches!(player.play(), Err(Error::Player(_))));
    }
}
