//! Shared HTTP API request/response types
//!
//! Used by the authority's router and the participant's lobby client.

use serde::{Deserialize, Serialize};

// ========================================
// Room Lookup Types
// ========================================

/// Response for `POST /room/{code}/create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub success: bool,
}

/// Response for `GET /room/{code}/exists`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomExistsResponse {
    pub exists: bool,
}

// ========================================
// Catalog Types
// ========================================

/// Query string for `GET /search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// One catalog candidate for CHANGE_URL
///
/// Upstream catalogs are inconsistent about optional metadata, so every
/// field but the locator tolerates absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    /// Human readable duration ("3:32"); absent for live streams
    #[serde(default)]
    pub duration: Option<String>,
}

// ========================================
// Health
// ========================================

/// Response for `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    #[serde(default)]
    pub git_hash: Option<String>,
    #[serde(default)]
    pub build_timestamp: Option<String>,
}

/// Generic status body for errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}
