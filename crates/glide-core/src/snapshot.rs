//! Persisted session state.
//!
//! A [`SessionSnapshot`] holds what is worth showing before the first response
//! of a new process arrives: each view's cached list and count, and the room
//! summaries. Position tokens are not persisted; a restored session always
//! starts a fresh server session.
//!
//! The format is CBOR (via ciborium).

use std::collections::BTreeMap;

use glide_proto::RoomListEntry;
use serde::{Deserialize, Serialize};

use crate::{error::EngineError, room::SlidingSyncRoom};

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Cached state of one view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    /// Last known total room count
    pub room_count: Option<u32>,
    /// Last known list contents
    pub entries: Vec<RoomListEntry>,
}

/// Cached state of a whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Per-view cached state, keyed by view name
    pub views: BTreeMap<String, ViewSnapshot>,
    /// Room summaries
    pub rooms: Vec<SlidingSyncRoom>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    snapshot: SessionSnapshot,
}

impl SessionSnapshot {
    /// Encode as versioned CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        let envelope = Envelope { version: SNAPSHOT_VERSION, snapshot: self.clone() };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&envelope, &mut bytes)
            .map_err(|e| EngineError::Snapshot(format!("CBOR encode failed: {e}")))?;
        Ok(bytes)
    }

    /// Decode versioned CBOR.
    ///
    /// # Errors
    ///
    /// - `EngineError::Snapshot` on malformed input or an unknown version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let envelope: Envelope = ciborium::de::from_reader(bytes)
            .map_err(|e| EngineError::Snapshot(format!("CBOR decode failed: {e}")))?;
        if envelope.version != SNAPSHOT_VERSION {
            return Err(EngineError::Snapshot(format!(
                "unsupported snapshot version {}",
                envelope.version
            )));
        }
        Ok(envelope.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use glide_proto::{RoomId, RoomUpdate};

    use super::*;
    use crate::room::RoomCache;

    #[test]
    fn snapshot_survives_cbor() {
        let room_id = RoomId::parse("!r:x").unwrap();
        let mut cache = RoomCache::new();
        cache.apply(room_id.clone(), RoomUpdate { name: Some("r".into()), ..RoomUpdate::default() });

        let mut snapshot = SessionSnapshot::default();
        snapshot.views.insert(
            "all".into(),
            ViewSnapshot { room_count: Some(1), entries: vec![RoomListEntry::Filled(room_id)] },
        );
        snapshot.rooms = cache.iter().cloned().collect();

        let decoded = SessionSnapshot::from_bytes(&snapshot.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            SessionSnapshot::from_bytes(&[0xff, 0x00, 0x13]),
            Err(EngineError::Snapshot(_))
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let envelope = Envelope { version: 99, snapshot: SessionSnapshot::default() };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&envelope, &mut bytes).unwrap();

        let err = SessionSnapshot::from_bytes(&bytes).unwrap_err();
        assert_eq!(err, EngineError::Snapshot("unsupported snapshot version 99".into()));
    }
}
