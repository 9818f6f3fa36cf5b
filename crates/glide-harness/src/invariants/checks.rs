//! Standard invariant checks.

use std::collections::BTreeSet;

use super::{Invariant, InvariantResult, SystemSnapshot, ViewObservation};

/// A view's known room count equals its list length.
///
/// The server sizes every list to the number of matching rooms; a mismatch
/// means a diff was lost, skipped or applied out of order.
pub struct CountMatchesList;

impl Invariant for CountMatchesList {
    fn name(&self) -> &'static str {
        "count_matches_list"
    }

    fn check_view(&self, view: &ViewObservation, _: &SystemSnapshot) -> InvariantResult {
        match view.count {
            Some(count) if view.entries.len() != count as usize => {
                Err(format!("count {count} but list holds {} entries", view.entries.len()))
            },
            _ => Ok(()),
        }
    }
}

/// Every `Filled` room has a cached summary, so a room visible in a list is
/// always resolvable through the room accessors.
pub struct FilledRoomsCached;

impl Invariant for FilledRoomsCached {
    fn name(&self) -> &'static str {
        "filled_rooms_cached"
    }

    fn check_view(&self, view: &ViewObservation, session: &SystemSnapshot) -> InvariantResult {
        let missing = view
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_filled())
            .find_map(|(index, entry)| {
                entry.room_id().filter(|id| !session.cached_rooms.contains(*id)).map(|id| (index, id))
            });
        match missing {
            Some((index, room_id)) => Err(format!("slot {index}: {room_id} has no cached summary")),
            None => Ok(()),
        }
    }
}

/// A room fills at most one slot of a view.
///
/// The client keeps duplicates if a server sends them; against a correct
/// server they never appear.
pub struct NoDuplicateFilled;

impl Invariant for NoDuplicateFilled {
    fn name(&self) -> &'static str {
        "no_duplicate_filled"
    }

    fn check_view(&self, view: &ViewObservation, _: &SystemSnapshot) -> InvariantResult {
        let mut seen = BTreeSet::new();
        for room_id in view.entries.iter().filter(|e| e.is_filled()).filter_map(|e| e.room_id()) {
            if !seen.insert(room_id) {
                return Err(format!("{room_id} filled more than once"));
            }
        }
        Ok(())
    }
}

/// Observed view states never decrease.
///
/// History spans one session lifetime; a restart legitimately starts a view
/// over from `Cold`, so callers clear history when they restart.
pub struct StateMonotonicity;

impl Invariant for StateMonotonicity {
    fn name(&self) -> &'static str {
        "state_monotonicity"
    }

    fn check_view(&self, view: &ViewObservation, _: &SystemSnapshot) -> InvariantResult {
        match view.state_history.windows(2).find(|pair| pair[1] < pair[0]) {
            Some(pair) => Err(format!("state went from {:?} to {:?}", pair[0], pair[1])),
            None => Ok(()),
        }
    }
}
