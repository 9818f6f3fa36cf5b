//! Server-side list differ.
//!
//! Produces a diff sequence that turns one room list into another. The output
//! prefers the compact single-operation forms a real server emits (move,
//! insert, remove) and falls back to positional updates plus push/truncate.
//! Applying `diff_lists(old, new)` to `old` always yields `new`.

use glide_proto::{RoomListDiff, RoomListEntry};

/// Diffs needed to turn `old` into `new`.
pub fn diff_lists(old: &[RoomListEntry], new: &[RoomListEntry]) -> Vec<RoomListDiff> {
    if old == new {
        return Vec::new();
    }
    if old.is_empty() {
        return vec![RoomListDiff::Replace { values: new.to_vec() }];
    }
    if let Some(diff) = single_move(old, new) {
        return vec![diff];
    }
    if let Some(index) = single_extra(new, old) {
        return vec![RoomListDiff::InsertAt { index, value: new[index].clone() }];
    }
    if let Some(index) = single_extra(old, new) {
        return vec![RoomListDiff::RemoveAt { index }];
    }

    let shared = old.len().min(new.len());
    let mut diffs: Vec<RoomListDiff> = (0..shared)
        .filter(|&i| old[i] != new[i])
        .map(|i| RoomListDiff::UpdateAt { index: i, value: new[i].clone() })
        .collect();

    if diffs.len() * 2 > new.len() {
        return vec![RoomListDiff::Replace { values: new.to_vec() }];
    }

    if new.len() > old.len() {
        diffs.extend(new[shared..].iter().cloned().map(|value| RoomListDiff::Push { value }));
    } else if new.len() < old.len() {
        diffs.push(RoomListDiff::Truncate { length: new.len() });
    }
    diffs
}

/// Index in `longer` whose removal yields `shorter`, if exactly one element
/// separates them.
fn single_extra(longer: &[RoomListEntry], shorter: &[RoomListEntry]) -> Option<usize> {
    if longer.len() != shorter.len() + 1 {
        return None;
    }
    let split = longer.iter().zip(shorter).take_while(|(a, b)| a == b).count();
    (longer[split + 1..] == shorter[split..]).then_some(split)
}

/// A single `Move` turning `old` into `new`, if one exists.
fn single_move(old: &[RoomListEntry], new: &[RoomListEntry]) -> Option<RoomListDiff> {
    if old.len() != new.len() {
        return None;
    }
    let first = old.iter().zip(new).position(|(a, b)| a != b)?;
    let last = old.iter().zip(new).rposition(|(a, b)| a != b)?;

    // Entry pulled from the front of the changed window to its end.
    if old[first] == new[last] && old[first + 1..=last] == new[first..last] {
        return Some(RoomListDiff::Move { old_index: first, new_index: last });
    }
    // Entry pulled from the end of the changed window to its front.
    if old[last] == new[first] && old[first..last] == new[first + 1..=last] {
        return Some(RoomListDiff::Move { old_index: last, new_index: first });
    }
    None
}

#[cfg(test)]
mod tests {
    use glide_core::RoomListModel;
    use glide_proto::RoomId;

    use super::*;

    fn filled(names: &[&str]) -> Vec<RoomListEntry> {
        names
            .iter()
            .map(|n| RoomListEntry::Filled(RoomId::parse(format!("!{n}:sim")).unwrap()))
            .collect()
    }

    fn apply(old: &[RoomListEntry], diffs: &[RoomListDiff]) -> Vec<RoomListEntry> {
        let model = RoomListModel::from_entries(old.to_vec());
        model.preview(diffs).unwrap()
    }

    #[test]
    fn identical_lists_need_nothing() {
        let list = filled(&["a", "b"]);
        assert!(diff_lists(&list, &list).is_empty());
    }

    #[test]
    fn first_fill_is_a_replace() {
        let new = filled(&["a", "b"]);
        assert_eq!(diff_lists(&[], &new), vec![RoomListDiff::Replace { values: new }]);
    }

    #[test]
    fn bumped_room_is_a_single_move() {
        let old = filled(&["a", "b", "c", "d"]);
        let new = filled(&["c", "a", "b", "d"]);

        let diffs = diff_lists(&old, &new);
        assert_eq!(diffs, vec![RoomListDiff::Move { old_index: 2, new_index: 0 }]);
        assert_eq!(apply(&old, &diffs), new);
    }

    #[test]
    fn sunk_room_is_a_single_move() {
        let old = filled(&["a", "b", "c", "d"]);
        let new = filled(&["b", "c", "a", "d"]);

        let diffs = diff_lists(&old, &new);
        assert_eq!(diffs, vec![RoomListDiff::Move { old_index: 0, new_index: 2 }]);
        assert_eq!(apply(&old, &diffs), new);
    }

    #[test]
    fn insert_and_remove_are_detected() {
        let old = filled(&["a", "c"]);
        let new = filled(&["a", "b", "c"]);

        let diffs = diff_lists(&old, &new);
        assert!(matches!(diffs.as_slice(), [RoomListDiff::InsertAt { index: 1, .. }]));
        assert_eq!(apply(&old, &diffs), new);

        let diffs = diff_lists(&new, &old);
        assert_eq!(diffs, vec![RoomListDiff::RemoveAt { index: 1 }]);
    }

    #[test]
    fn shrink_truncates() {
        let old = filled(&["a", "b", "c", "d", "e"]);
        let new = filled(&["a", "b"]);

        let diffs = diff_lists(&old, &new);
        assert_eq!(diffs, vec![RoomListDiff::Truncate { length: 2 }]);
    }

    #[test]
    fn mostly_different_lists_are_replaced() {
        let old = filled(&["a", "b", "c"]);
        let new = filled(&["x", "y", "z"]);

        assert_eq!(diff_lists(&old, &new), vec![RoomListDiff::Replace { values: new }]);
    }
}
