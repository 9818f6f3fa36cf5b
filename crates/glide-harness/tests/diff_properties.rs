//! Property tests for the server-side list differ.
//!
//! Whatever two lists the server holds, the diffs it emits must turn the
//! client's copy of the old list into exactly the new one when applied in
//! order by the client's room list model.

use glide_core::RoomListModel;
use glide_harness::diff_lists;
use glide_proto::{RoomId, RoomListDiff, RoomListEntry};
use proptest::prelude::*;

fn room(n: u8) -> RoomId {
    RoomId::parse(format!("!r{n}:sim.local")).unwrap()
}

fn entry_strategy() -> impl Strategy<Value = RoomListEntry> {
    prop_oneof![
        1 => Just(RoomListEntry::Empty),
        1 => (0u8..6).prop_map(|n| RoomListEntry::Invalidated(room(n))),
        4 => (0u8..12).prop_map(|n| RoomListEntry::Filled(room(n))),
    ]
}

fn list_strategy() -> impl Strategy<Value = Vec<RoomListEntry>> {
    prop::collection::vec(entry_strategy(), 0..24)
}

proptest! {
    #[test]
    fn diffs_reproduce_target(old in list_strategy(), new in list_strategy()) {
        let diffs = diff_lists(&old, &new);
        let model = RoomListModel::from_entries(old);
        prop_assert_eq!(model.preview(&diffs).unwrap(), new);
    }

    #[test]
    fn single_bump_is_one_move(len in 2usize..30, from in any::<prop::sample::Index>()) {
        let old: Vec<_> = (0..len as u8).map(|n| RoomListEntry::Filled(room(n))).collect();
        let from = from.index(len);
        let mut new = old.clone();
        let bumped = new.remove(from);
        new.insert(0, bumped);

        let diffs = diff_lists(&old, &new);
        if from == 0 {
            prop_assert!(diffs.is_empty());
        } else {
            prop_assert_eq!(diffs, vec![RoomListDiff::Move { old_index: from, new_index: 0 }]);
        }
    }

    #[test]
    fn growth_only_appends(prefix in list_strategy(), tail in list_strategy()) {
        let mut new = prefix.clone();
        new.extend(tail.iter().cloned());

        let diffs = diff_lists(&prefix, &new);
        if !prefix.is_empty() {
            let only_appends = diffs.iter().all(|d| matches!(
                d,
                RoomListDiff::Push { .. } | RoomListDiff::InsertAt { .. }
            ));
            prop_assert!(only_appends);
        }
        let model = RoomListModel::from_entries(prefix);
        prop_assert_eq!(model.preview(&diffs).unwrap(), new);
    }
}
