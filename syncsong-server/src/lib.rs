//! # Sync-Song Authority Library (syncsong-server)
//!
//! Sync State Authority: holds each room's media and timeline in memory,
//! serializes participant commands, and fans the resulting events out over
//! one WebSocket per participant.
//!
//! **Architecture:** Axum router (HTTP lookups, catalog proxy, WebSocket
//! upgrade) over a [`registry::RoomRegistry`] guarded by a tokio `RwLock`.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod registry;
pub mod room;

pub use error::{Error, Result};
