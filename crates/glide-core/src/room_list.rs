//! Ordered room list maintained purely by server diffs.
//!
//! The model never sorts, filters or deduplicates: the server owns ordering
//! and the client only replays the edits it is told about. A diff that does
//! not fit the current list is a consistency failure, reported as
//! [`ModelError`] with the list untouched.

use std::{ops::Deref, sync::Arc};

use glide_proto::{RoomId, RoomListDiff, RoomListEntry};

use crate::error::ModelError;

/// Ordered sequence of [`RoomListEntry`] for one view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomListModel {
    entries: Vec<RoomListEntry>,
}

impl RoomListModel {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// List with the given contents.
    pub fn from_entries(entries: Vec<RoomListEntry>) -> Self {
        Self { entries }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&RoomListEntry> {
        self.entries.get(index)
    }

    /// Iterate entries in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, RoomListEntry> {
        self.entries.iter()
    }

    /// First position holding `room_id`, filled or invalidated.
    pub fn position_of(&self, room_id: &RoomId) -> Option<usize> {
        self.entries.iter().position(|e| e.room_id() == Some(room_id))
    }

    /// Immutable copy of the current contents.
    pub fn snapshot(&self) -> RoomListSnapshot {
        RoomListSnapshot(Arc::from(self.entries.as_slice()))
    }

    /// Apply one diff.
    ///
    /// # Errors
    ///
    /// - `ModelError::IndexOutOfBounds` if the diff addresses a position the
    ///   list does not have. The list is unchanged.
    pub fn apply(&mut self, diff: RoomListDiff) -> Result<(), ModelError> {
        apply_diff(&mut self.entries, diff)
    }

    /// Apply a batch of diffs in order, all or nothing.
    ///
    /// The batch is replayed on a scratch copy and only committed if every
    /// diff succeeds.
    pub fn apply_all(&mut self, diffs: &[RoomListDiff]) -> Result<(), ModelError> {
        self.entries = self.preview(diffs)?;
        Ok(())
    }

    /// Contents the list would have after `diffs`, without committing.
    pub fn preview(&self, diffs: &[RoomListDiff]) -> Result<Vec<RoomListEntry>, ModelError> {
        let mut scratch = self.entries.clone();
        for diff in diffs {
            apply_diff(&mut scratch, diff.clone())?;
        }
        Ok(scratch)
    }

    /// Replace the contents wholesale with already-validated entries.
    pub(crate) fn commit(&mut self, entries: Vec<RoomListEntry>) {
        self.entries = entries;
    }

    /// Mark every filled slot as stale.
    pub(crate) fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            *entry = std::mem::take(entry).invalidate();
        }
    }
}

fn apply_diff(entries: &mut Vec<RoomListEntry>, diff: RoomListDiff) -> Result<(), ModelError> {
    let len = entries.len();
    let out_of_bounds = |op, index| ModelError::IndexOutOfBounds { op, index, len };

    match diff {
        RoomListDiff::Replace { values } => *entries = values,
        RoomListDiff::InsertAt { index, value } => {
            if index > len {
                return Err(out_of_bounds("insert_at", index));
            }
            entries.insert(index, value);
        },
        RoomListDiff::UpdateAt { index, value } => {
            let slot = entries.get_mut(index).ok_or_else(|| out_of_bounds("update_at", index))?;
            *slot = value;
        },
        RoomListDiff::RemoveAt { index } => {
            if index >= len {
                return Err(out_of_bounds("remove_at", index));
            }
            entries.remove(index);
        },
        RoomListDiff::Move { old_index, new_index } => {
            if old_index >= len {
                return Err(out_of_bounds("move", old_index));
            }
            if new_index >= len {
                return Err(out_of_bounds("move", new_index));
            }
            let entry = entries.remove(old_index);
            entries.insert(new_index, entry);
        },
        RoomListDiff::Push { value } => entries.push(value),
        RoomListDiff::Truncate { length } => {
            if length > len {
                return Err(out_of_bounds("truncate", length));
            }
            entries.truncate(length);
        },
    }
    Ok(())
}

/// Immutable, cheaply clonable view of a room list at one point in time.
///
/// Taken under the engine lock, so a snapshot always reflects a list between
/// two whole responses, never part-way through one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomListSnapshot(Arc<[RoomListEntry]>);

impl RoomListSnapshot {
    /// Ids of filled slots, in list order.
    pub fn filled_room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.0.iter().filter(|e| e.is_filled()).filter_map(RoomListEntry::room_id)
    }
}

impl Default for RoomListSnapshot {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl Deref for RoomListSnapshot {
    type Target = [RoomListEntry];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<RoomListEntry>> for RoomListSnapshot {
    fn from(entries: Vec<RoomListEntry>) -> Self {
        Self(Arc::from(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(s: &str) -> RoomListEntry {
        RoomListEntry::Filled(RoomId::parse(format!("!{s}:x")).unwrap())
    }

    fn model(names: &[&str]) -> RoomListModel {
        RoomListModel::from_entries(names.iter().map(|n| filled(n)).collect())
    }

    #[test]
    fn replace_then_move_to_end() {
        let mut list = RoomListModel::new();
        list.apply_all(&[
            RoomListDiff::Replace { values: vec![filled("a"), filled("b"), filled("c")] },
            RoomListDiff::Move { old_index: 0, new_index: 2 },
        ])
        .unwrap();

        assert_eq!(list, model(&["b", "c", "a"]));
    }

    #[test]
    fn move_towards_front() {
        let mut list = model(&["a", "b", "c", "d"]);
        list.apply(RoomListDiff::Move { old_index: 3, new_index: 1 }).unwrap();
        assert_eq!(list, model(&["a", "d", "b", "c"]));
    }

    #[test]
    fn insert_at_len_appends() {
        let mut list = model(&["a"]);
        list.apply(RoomListDiff::InsertAt { index: 1, value: filled("b") }).unwrap();
        assert_eq!(list, model(&["a", "b"]));
    }

    #[test]
    fn out_of_bounds_is_reported_not_patched() {
        let mut list = model(&["a", "b"]);

        let err = list.apply(RoomListDiff::RemoveAt { index: 2 }).unwrap_err();
        assert_eq!(err, ModelError::IndexOutOfBounds { op: "remove_at", index: 2, len: 2 });

        assert!(list.apply(RoomListDiff::UpdateAt { index: 5, value: filled("z") }).is_err());
        assert!(list.apply(RoomListDiff::InsertAt { index: 3, value: filled("z") }).is_err());
        assert!(list.apply(RoomListDiff::Move { old_index: 0, new_index: 2 }).is_err());
        assert!(list.apply(RoomListDiff::Truncate { length: 3 }).is_err());

        assert_eq!(list, model(&["a", "b"]));
    }

    #[test]
    fn failed_batch_leaves_list_untouched() {
        let mut list = model(&["a", "b"]);
        let result = list.apply_all(&[
            RoomListDiff::Push { value: filled("c") },
            RoomListDiff::RemoveAt { index: 9 },
        ]);

        assert!(result.is_err());
        assert_eq!(list, model(&["a", "b"]));
    }

    #[test]
    fn duplicates_are_kept() {
        let mut list = model(&["a"]);
        list.apply(RoomListDiff::Push { value: filled("a") }).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.position_of(&RoomId::parse("!a:x").unwrap()), Some(0));
    }

    #[test]
    fn snapshot_is_detached_from_later_edits() {
        let mut list = model(&["a", "b"]);
        let before = list.snapshot();
        list.apply(RoomListDiff::Truncate { length: 0 }).unwrap();

        assert_eq!(before.len(), 2);
        assert!(list.snapshot().is_empty());
        assert_eq!(before.filled_room_ids().count(), 2);
    }

    #[test]
    fn invalidate_all_keeps_ids() {
        let mut list = model(&["a"]);
        list.apply(RoomListDiff::Push { value: RoomListEntry::Empty }).unwrap();
        list.invalidate_all();

        assert_eq!(
            list.iter().cloned().collect::<Vec<_>>(),
            vec![RoomListEntry::Invalidated(RoomId::parse("!a:x").unwrap()), RoomListEntry::Empty]
        );
    }
}
