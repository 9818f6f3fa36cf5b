//! Server-to-client response shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    RoomId, RoomListDiff,
    errors::{ProtocolError, Result},
};

/// Synchronization phase of a view.
///
/// Totally ordered: `Cold < Preload < CatchingUp < Live`. A view only moves
/// forward through these phases; a session restart resets it to `Cold`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No response received for this view yet.
    #[default]
    Cold,
    /// First data received, typically a coarse `Replace`.
    Preload,
    /// Incremental catch-up in progress.
    CatchingUp,
    /// Fully caught up; receiving live updates.
    Live,
}

/// Unread counters for a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadNotifications {
    /// Unread events that notify
    #[serde(default)]
    pub notification_count: u64,
    /// Unread events that highlight (mentions, keywords)
    #[serde(default)]
    pub highlight_count: u64,
}

/// Most recent displayable message in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestMessage {
    /// Event id of the message
    pub event_id: String,
    /// Sender user id
    pub sender: String,
    /// Plain-text body
    pub body: String,
    /// Server timestamp in milliseconds since the Unix epoch
    pub origin_server_ts: u64,
}

/// Per-view portion of a [`SyncResponse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListUpdate {
    /// Total rooms matching the view. `None` if unchanged/unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Updated synchronization phase. `None` if unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SyncState>,
    /// Diffs to apply, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<RoomListDiff>,
}

/// Updated summary fields for one room.
///
/// Every field is optional: `None` leaves the cached value unchanged, unless
/// `initial` is set, in which case the cached summary is rebuilt from this
/// update alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUpdate {
    /// Computed display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the room is a direct message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dm: Option<bool>,
    /// First time the server sends this room to this session
    #[serde(default)]
    pub initial: bool,
    /// Unread counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_notifications: Option<UnreadNotifications>,
    /// Latest displayable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<LatestMessage>,
    /// Pagination token for fetching earlier timeline events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
    /// Timeline limit the room was synced with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_limit: Option<u32>,
}

/// One round-trip response, already decoded by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Position token for the next request
    pub pos: String,
    /// Echo of the request's transaction id, if the server echoes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
    /// Per-view updates, keyed by view name
    #[serde(default)]
    pub lists: BTreeMap<String, ListUpdate>,
    /// Per-room summary updates
    #[serde(default)]
    pub rooms: BTreeMap<RoomId, RoomUpdate>,
}

impl SyncResponse {
    /// Encode as JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_is_ordered() {
        assert!(SyncState::Cold < SyncState::Preload);
        assert!(SyncState::Preload < SyncState::CatchingUp);
        assert!(SyncState::CatchingUp < SyncState::Live);
    }

    #[test]
    fn minimal_response_decodes() {
        let response = SyncResponse::from_json(br#"{"pos":"5"}"#).unwrap();
        assert_eq!(response.pos, "5");
        assert!(response.lists.is_empty());
        assert!(response.rooms.is_empty());
    }

    #[test]
    fn invalid_room_key_is_a_decode_error() {
        let err = SyncResponse::from_json(br#"{"pos":"1","rooms":{"bogus":{}}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
