//! # Sync-Song Participant Library (syncsong-client)
//!
//! Client-side playback synchronization: the reconciliation engine that
//! keeps a local, independently clocked player on the room's authoritative
//! timeline without echoing its own mutations back to the room.
//!
//! **Architecture:** pure state machine ([`engine`]) fed by an async driver
//! ([`session`]) that serializes transport frames, player callbacks, the
//! deferred-play timer and local user commands.

pub mod backoff;
pub mod classifier;
pub mod compensation;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod lobby;
pub mod player;
pub mod session;
pub mod sim_player;
pub mod transport;

pub use engine::{EngineFeatures, EngineState, Playback, ReconciliationEngine};
pub use error::{Error, Result};
