//! Room list slots and the positional edits applied to them.

use serde::{Deserialize, Serialize};

use crate::RoomId;

/// One positional slot in a view's room list.
///
/// - `Empty`: the server has not told us what occupies this position.
/// - `Invalidated`: a room used to be here but the position is stale until the
///   server refreshes it (typically the slot left the requested ranges).
/// - `Filled`: a confirmed room occupies this position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "room_id", rename_all = "snake_case")]
pub enum RoomListEntry {
    /// Position not loaded yet.
    #[default]
    Empty,
    /// Previously filled position awaiting refresh.
    Invalidated(RoomId),
    /// Position occupied by a known room.
    Filled(RoomId),
}

impl RoomListEntry {
    /// Room id for `Filled` and `Invalidated` entries. `None` for `Empty`.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::Empty => None,
            Self::Invalidated(id) | Self::Filled(id) => Some(id),
        }
    }

    /// Whether this slot has never been loaded.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether this slot holds a confirmed room.
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }

    /// Mark a filled slot as stale. `Empty` and `Invalidated` are unchanged.
    #[must_use]
    pub fn invalidate(self) -> Self {
        match self {
            Self::Filled(id) => Self::Invalidated(id),
            other => other,
        }
    }
}

/// Ordered edit operation against a [`RoomListEntry`] sequence.
///
/// Diffs are not self-describing: each one is only meaningful relative to the
/// list produced by every diff before it. They must be applied in emission
/// order, without skipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RoomListDiff {
    /// Discard the current contents and replace them wholesale.
    Replace {
        /// New list contents
        values: Vec<RoomListEntry>,
    },
    /// Insert at `index`, shifting later entries right. `index == len`
    /// appends.
    InsertAt {
        /// Target position
        index: usize,
        /// Entry to insert
        value: RoomListEntry,
    },
    /// Overwrite the entry at `index`.
    UpdateAt {
        /// Target position
        index: usize,
        /// Replacement entry
        value: RoomListEntry,
    },
    /// Remove the entry at `index`, shifting later entries left.
    RemoveAt {
        /// Target position
        index: usize,
    },
    /// Remove the entry at `old_index` and reinsert it at `new_index` of the
    /// shortened list.
    Move {
        /// Current position
        old_index: usize,
        /// Position after the move
        new_index: usize,
    },
    /// Append an entry.
    Push {
        /// Entry to append
        value: RoomListEntry,
    },
    /// Drop every entry at or beyond `length`.
    Truncate {
        /// Length after truncation
        length: usize,
    },
}

impl RoomListDiff {
    /// Operation name, used in error reporting and logs.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::InsertAt { .. } => "insert_at",
            Self::UpdateAt { .. } => "update_at",
            Self::RemoveAt { .. } => "remove_at",
            Self::Move { .. } => "move",
            Self::Push { .. } => "push",
            Self::Truncate { .. } => "truncate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(s: &str) -> RoomId {
        RoomId::parse(s).unwrap()
    }

    #[test]
    fn invalidate_only_affects_filled() {
        let a = room("!a:x");
        assert_eq!(
            RoomListEntry::Filled(a.clone()).invalidate(),
            RoomListEntry::Invalidated(a.clone())
        );
        assert_eq!(RoomListEntry::Empty.invalidate(), RoomListEntry::Empty);
        assert_eq!(
            RoomListEntry::Invalidated(a.clone()).invalidate(),
            RoomListEntry::Invalidated(a)
        );
    }

    #[test]
    fn entry_room_id() {
        assert_eq!(RoomListEntry::Empty.room_id(), None);
        assert_eq!(RoomListEntry::Filled(room("!a:x")).room_id(), Some(&room("!a:x")));
    }

    #[test]
    fn diff_wire_shape_is_tagged() {
        let diff = RoomListDiff::Move { old_index: 0, new_index: 2 };
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(json, serde_json::json!({ "op": "move", "old_index": 0, "new_index": 2 }));

        let diff = RoomListDiff::Push { value: RoomListEntry::Filled(room("!a:x")) };
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "op": "push", "value": { "kind": "filled", "room_id": "!a:x" } })
        );
    }
}
