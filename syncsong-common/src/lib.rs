//! # Sync-Song Common Library
//!
//! Shared code for the Sync-Song authority and participant crates:
//! - Wire protocol (SyncEvent enum and payloads)
//! - Media Reference Resolver (locator canonicalization)
//! - HTTP API request/response types
//! - Configuration loading
//! - Timestamp utilities

pub mod api;
pub mod config;
pub mod error;
pub mod media;
pub mod protocol;
pub mod time;

pub use error::{Error, Result};
pub use protocol::{Role, SyncEvent};
