//! Client-to-server request shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    RoomId,
    errors::{ProtocolError, Result},
};

/// Inclusive index range `[start, end]` of a view the client wants populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomRange {
    /// First index (inclusive)
    pub start: u32,
    /// Last index (inclusive)
    pub end: u32,
}

impl RoomRange {
    /// Create a range. Does not check ordering; see [`RoomRange::is_valid`].
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Whether `start <= end`.
    pub const fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Whether `index` falls inside the range.
    pub const fn contains(&self, index: u32) -> bool {
        self.start <= index && index <= self.end
    }

    /// Number of positions covered.
    pub const fn len(&self) -> u32 {
        if self.is_valid() { self.end - self.start + 1 } else { 0 }
    }

    /// Whether the range covers no position (only when invalid).
    pub const fn is_empty(&self) -> bool {
        !self.is_valid()
    }
}

/// Sort criterion applied by the server to a view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Most recent activity first.
    ByRecency,
    /// Alphabetical by computed room name.
    ByName,
    /// Highlights first, then notifications.
    ByNotificationLevel,
    /// Server-specific sort key.
    Custom(String),
}

/// A `(event_type, state_key)` pair the server must include for each room.
///
/// `state_key` may be `"*"` to request every state key of the type, or
/// `"$ME"` for the syncing user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequiredStateField {
    /// State event type, e.g. `m.room.name`
    pub event_type: String,
    /// State key, `""` for singleton state
    pub state_key: String,
}

impl RequiredStateField {
    /// Create a required-state pair.
    pub fn new(event_type: impl Into<String>, state_key: impl Into<String>) -> Self {
        Self { event_type: event_type.into(), state_key: state_key.into() }
    }
}

/// Server-side room filters for a view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilters {
    /// Only direct-message rooms (`Some(true)`) or only non-DMs (`Some(false)`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dm: Option<bool>,
    /// Only invites (`Some(true)`) or only joined rooms (`Some(false)`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_invite: Option<bool>,
    /// Case-insensitive substring match on the room name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name_like: Option<String>,
    /// Rooms carrying any of these tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Rooms carrying none of these tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_tags: Vec<String>,
}

impl ListFilters {
    /// Whether no filter is set.
    pub fn is_unfiltered(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-view portion of a [`SyncRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Index ranges of interest, forwarded verbatim (not merged)
    pub ranges: Vec<RoomRange>,
    /// Ordered sort keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortKey>,
    /// Per-room state the server must include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_state: Vec<RequiredStateField>,
    /// Maximum timeline events per room
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_limit: Option<u32>,
    /// Server-side filters
    #[serde(default, skip_serializing_if = "ListFilters::is_unfiltered")]
    pub filters: ListFilters,
}

/// Settings for an explicit, range-independent room subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSubscription {
    /// Per-room state the server must include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_state: Vec<RequiredStateField>,
    /// Maximum timeline events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_limit: Option<u32>,
}

/// One round-trip request.
///
/// # Invariants
///
/// - A room id never appears in both `room_subscriptions` and
///   `unsubscribe_rooms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Client-chosen transaction id, echoed by the server
    pub txn_id: String,
    /// Position token from the previous response. `None` on a fresh session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    /// Long-poll timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: u64,
    /// Requested views, keyed by view name
    #[serde(default)]
    pub lists: BTreeMap<String, ListRequest>,
    /// Explicit room subscriptions added or still active
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub room_subscriptions: BTreeMap<RoomId, RoomSubscription>,
    /// Rooms whose explicit subscription should end
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsubscribe_rooms: Vec<RoomId>,
}

impl SyncRequest {
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
    fn range_len_and_contains() {
        let r = RoomRange::new(0, 9);
        assert_eq!(r.len(), 10);
        assert!(r.contains(0));
        assert!(r.contains(9));
        assert!(!r.contains(10));

        let inverted = RoomRange::new(5, 1);
        assert!(!inverted.is_valid());
        assert_eq!(inverted.len(), 0);
    }

    #[test]
    fn empty_fields_are_omitted() {
        let mut request = SyncRequest { txn_id: "t1".into(), ..SyncRequest::default() };
        request
            .lists
            .insert("all".into(), ListRequest { ranges: vec![RoomRange::new(0, 9)], ..Default::default() });

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "txn_id": "t1",
                "timeout_ms": 0,
                "lists": { "all": { "ranges": [{ "start": 0, "end": 9 }] } }
            })
        );
    }
}
