//! Lobby HTTP client
//!
//! Room creation/lookup and catalog search against the authority's HTTP
//! endpoints. Search never fails from the caller's point of view: any
//! upstream problem yields zero results.

use std::time::Duration;

use rand::Rng;
use syncsong_common::api::{CreateRoomResponse, RoomExistsResponse, SearchResult};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Length of generated room codes
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random six-character uppercase alphanumeric room code
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Room codes are case-insensitive for people; the wire form is uppercase
pub fn normalize_room_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(code.to_ascii_uppercase())
}

#[derive(Debug, Clone)]
pub struct LobbyClient {
    http: reqwest::Client,
    base_url: String,
}

impl LobbyClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_room(&self, code: &str) -> Result<bool> {
        let url = format!("{}/room/{}/create", self.base_url, code);
        let response: CreateRoomResponse = self
            .http
            .post(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Create room {} -> {}", code, response.success);
        Ok(response.success)
    }

    pub async fn room_exists(&self, code: &str) -> Result<bool> {
        let url = format!("{}/room/{}/exists", self.base_url, code);
        let response: RoomExistsResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.exists)
    }

    /// Create a room under a fresh code, retrying on collisions
    pub async fn create_new_room(&self) -> Result<String> {
        for _ in 0..5 {
            let code = generate_room_code();
            if !self.room_exists(&code).await? && self.create_room(&code).await? {
                return Ok(code);
            }
        }
        Err(Error::Config("Could not allocate a free room code".to_string()))
    }

    /// Catalog search; failures are logged and produce no results
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        match self.try_search(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Search for {:?} failed: {}", query, e);
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);
        let results = self
            .http
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes() {
        for _ in 0..50 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_normalize_room_code() {
        assert_eq!(normalize_room_code(" ab12cd "), Some("AB12CD".to_string()));
        assert_eq!(normalize_room_code(""), None);
        assert_eq!(normalize_room_code("ab/../x"), None);
    }

    #[tokio::test]
    async fn test_search_failure_yields_no_results() {
        // Nothing listens on port 9 locally
        let lobby = LobbyClient::new("http://127.0.0.1:9").unwrap();
        assert!(lobby.search("lofi").await.is_empty());
        assert!(lobby.search("   ").await.is_empty());
    }
}
