//! Embedded player capability
//!
//! The reconciliation engine owns exactly one [`Player`] handle and is the
//! only component that mutates it. Player state callbacks travel the other
//! way as [`PlayerEvent`]s on a channel so they are processed one at a time
//! by the session driver.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Discrete player states reported through callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
    /// Media loaded, not started
    Cued,
}

impl PlayerState {
    /// Playing and Paused are the "settled" states user transitions land in
    pub fn is_settled(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Paused)
    }
}

/// Callback raised by the player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The player finished constructing for the most recently loaded media
    Ready,
    StateChange(PlayerState),
    Error(String),
}

/// Operations the engine needs from an embedded player
///
/// Mutations are fire-and-forget: their effect is observed later through a
/// [`PlayerEvent::StateChange`] callback, never synchronously.
pub trait Player: Send {
    /// Replace the loaded media; the player raises `Ready` once it can play it
    fn load(&mut self, video_id: &str) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Jump to `seconds`; `allow_seek_ahead` permits seeking into unbuffered media
    fn seek_to(&mut self, seconds: f64, allow_seek_ahead: bool) -> Result<()>;

    fn current_time(&self) -> Result<f64>;
}

/// Callback stream paired with a player handle
pub type PlayerEvents = mpsc::UnboundedReceiver<PlayerEvent>;

/// Asynchronous acquisition of the player capability
///
/// Requested once per process; the session driver awaits it and hands the
/// ready handle to the engine.
#[async_trait]
pub trait PlayerProvider: Send {
    type Handle: Player + 'static;

    async fn acquire(self) -> Result<(Self::Handle, PlayerEvents)>;
}
