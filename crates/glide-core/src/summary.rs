//! Per-cycle change summary.

use std::collections::BTreeSet;

use glide_proto::RoomId;

/// What changed in one round trip: view names and room ids, each sorted and
/// deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Views whose list, count or state changed
    pub views: Vec<String>,
    /// Rooms whose summary was updated
    pub rooms: Vec<RoomId>,
}

impl UpdateSummary {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty() && self.rooms.is_empty()
    }
}

/// Accumulates changes while a response is applied.
#[derive(Debug, Default)]
pub(crate) struct SummaryBuilder {
    views: BTreeSet<String>,
    rooms: BTreeSet<RoomId>,
}

impl SummaryBuilder {
    pub(crate) fn view(&mut self, name: &str) {
        if !self.views.contains(name) {
            self.views.insert(name.to_owned());
        }
    }

    pub(crate) fn room(&mut self, room_id: RoomId) {
        self.rooms.insert(room_id);
    }

    pub(crate) fn build(self) -> UpdateSummary {
        UpdateSummary {
            views: self.views.into_iter().collect(),
            rooms: self.rooms.into_iter().collect(),
        }
    }
}
