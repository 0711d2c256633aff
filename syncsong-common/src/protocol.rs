//! Wire protocol for room channels
//!
//! Every frame is a JSON text message shaped as
//! `{"type": "<TAG>", "payload": {...}}`. `PLAY` and `PAUSE` may omit the
//! payload entirely when sent by a participant.
//!
//! Instants (`server_time`, `started_at`) are epoch milliseconds; positions
//! (`seek_to`, `time`) are float seconds.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Participant role inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// First joiner of a room (or the promoted successor)
    Admin,
    /// Everyone else
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full authoritative room state, sent on join and on resync
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncStatePayload {
    /// Current media locator (absent or empty when nothing is loaded)
    #[serde(default)]
    pub url: Option<String>,
    pub is_playing: bool,
    /// Epoch ms of the "playing since" anchor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// Elapsed seconds into the media at `server_time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seek_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
}

/// PLAY payload; empty when sent by a participant
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seek_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeekPayload {
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeUrlPayload {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUsersPayload {
    pub users: Vec<Role>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YouArePayload {
    pub role: Role,
}

/// A single event on the room channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    SyncState(SyncStatePayload),
    Play(PlayPayload),
    Pause,
    Seek(SeekPayload),
    ChangeUrl(ChangeUrlPayload),
    RoomUsers(RoomUsersPayload),
    YouAre(YouArePayload),
}

impl SyncEvent {
    /// Wire tag of this event
    pub fn tag(&self) -> &'static str {
        match self {
            SyncEvent::SyncState(_) => "SYNC_STATE",
            SyncEvent::Play(_) => "PLAY",
            SyncEvent::Pause => "PAUSE",
            SyncEvent::Seek(_) => "SEEK",
            SyncEvent::ChangeUrl(_) => "CHANGE_URL",
            SyncEvent::RoomUsers(_) => "ROOM_USERS",
            SyncEvent::YouAre(_) => "YOU_ARE",
        }
    }

    /// Events only the authority may emit; participants sending them are rejected
    pub fn is_authority_only(&self) -> bool {
        matches!(
            self,
            SyncEvent::SyncState(_) | SyncEvent::RoomUsers(_) | SyncEvent::YouAre(_)
        )
    }

    /// Participant-side PLAY request (no payload needed)
    pub fn play_request() -> Self {
        SyncEvent::Play(PlayPayload::default())
    }

    pub fn seek(time: f64) -> Self {
        SyncEvent::Seek(SeekPayload { time })
    }

    pub fn change_url(url: impl Into<String>) -> Self {
        SyncEvent::ChangeUrl(ChangeUrlPayload { url: url.into() })
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame
    pub fn from_json(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        envelope.into_event()
    }
}

/// Raw frame before the payload is interpreted
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl Envelope {
    fn into_event(self) -> Result<SyncEvent> {
        let Envelope { kind, payload } = self;
        let payload = payload.filter(|p| !p.is_null());

        match kind.as_str() {
            "SYNC_STATE" => Ok(SyncEvent::SyncState(required(&kind, payload)?)),
            "PLAY" => Ok(SyncEvent::Play(optional(payload)?)),
            "PAUSE" => Ok(SyncEvent::Pause),
            "SEEK" => Ok(SyncEvent::Seek(required(&kind, payload)?)),
            "CHANGE_URL" => Ok(SyncEvent::ChangeUrl(required(&kind, payload)?)),
            "ROOM_USERS" => Ok(SyncEvent::RoomUsers(required(&kind, payload)?)),
            "YOU_ARE" => Ok(SyncEvent::YouAre(required(&kind, payload)?)),
            other => Err(Error::Protocol(format!("unknown event type: {}", other))),
        }
    }
}

fn required<T: serde::de::DeserializeOwned>(kind: &str, payload: Option<Value>) -> Result<T> {
    let value = payload.ok_or_else(|| Error::Protocol(format!("{} requires a payload", kind)))?;
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("bad {} payload: {}", kind, e)))
}

fn optional<T: serde::de::DeserializeOwned + Default>(payload: Option<Value>) -> Result<T> {
    match payload {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

impl<'de> Deserialize<'de> for SyncEvent {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let envelope = Envelope::deserialize(deserializer)?;
        envelope.into_event().map_err(serde::de::Error::custom)
    }
}
