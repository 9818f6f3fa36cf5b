//! Views: named sliding windows over the server's ordered room list.
//!
//! A [`View`] pairs the application's configuration (sort, required state,
//! filters, ranges) with the state the server reports for it (room count,
//! sync phase, and the [`RoomListModel`]). Configuration is validated once by
//! [`ViewBuilder::build`]; the server-driven half is only mutated by the
//! engine while applying a response.

use std::collections::HashSet;

use glide_proto::{
    ListFilters, ListRequest, RequiredStateField, RoomListEntry, RoomRange, SortKey, SyncState,
};

use crate::{
    error::ConfigError,
    room_list::{RoomListModel, RoomListSnapshot},
};

/// How a view's request ranges are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Ranges are set by the application and forwarded verbatim.
    Selective,
    /// The view requests `[0, end]`, extending `end` by `batch_size` after
    /// every response until the room count (or `maximum`) is covered.
    Growing {
        /// Rooms added to the window per cycle
        batch_size: u32,
        /// Upper bound on the number of rooms loaded
        maximum: Option<u32>,
    },
}

/// A configured view and its server-driven state.
#[derive(Debug, Clone)]
pub struct View {
    name: String,
    sort: Vec<SortKey>,
    required_state: Vec<RequiredStateField>,
    timeline_limit: Option<u32>,
    filters: ListFilters,
    mode: SyncMode,
    ranges: Vec<RoomRange>,
    grown_end: u32,
    state: SyncState,
    room_count: Option<u32>,
    rooms: RoomListModel,
}

impl View {
    /// Start configuring a view named `name`.
    pub fn builder(name: impl Into<String>) -> ViewBuilder {
        ViewBuilder::new(name)
    }

    /// Unique view name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sort specification, highest priority first.
    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    /// Per-room state the server must include.
    pub fn required_state(&self) -> &[RequiredStateField] {
        &self.required_state
    }

    /// Server-side filters.
    pub fn filters(&self) -> &ListFilters {
        &self.filters
    }

    /// Timeline events requested per room.
    pub fn timeline_limit(&self) -> Option<u32> {
        self.timeline_limit
    }

    /// Range selection mode.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Batch size in growing mode.
    pub fn batch_size(&self) -> Option<u32> {
        match self.mode {
            SyncMode::Selective => None,
            SyncMode::Growing { batch_size, .. } => Some(batch_size),
        }
    }

    /// Current synchronization phase.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Total rooms the server reports for this view. `None` until the first
    /// response that carries a count.
    pub fn current_room_count(&self) -> Option<u32> {
        self.room_count
    }

    /// Snapshot of the room list.
    pub fn current_rooms_list(&self) -> RoomListSnapshot {
        self.rooms.snapshot()
    }

    /// Underlying room list model.
    pub fn rooms(&self) -> &RoomListModel {
        &self.rooms
    }

    /// Add a range to the next request. Overlapping ranges are kept as-is.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidRange` if `start > end`
    /// - `ConfigError::RangesManaged` for growing views
    pub fn add_range(&mut self, start: u32, end: u32) -> Result<(), ConfigError> {
        let range = self.check_range(start, end)?;
        self.ranges.push(range);
        Ok(())
    }

    /// Replace all ranges with a single one.
    pub fn set_range(&mut self, start: u32, end: u32) -> Result<(), ConfigError> {
        let range = self.check_range(start, end)?;
        self.ranges = vec![range];
        Ok(())
    }

    /// Drop every range. A growing view restarts from its first batch.
    pub fn reset_ranges(&mut self) {
        self.ranges.clear();
        if let SyncMode::Growing { batch_size, .. } = self.mode {
            self.grown_end = batch_size.saturating_sub(1);
        }
    }

    /// Ranges the next request will carry for this view.
    pub fn request_ranges(&self) -> Vec<RoomRange> {
        match self.mode {
            SyncMode::Selective => self.ranges.clone(),
            SyncMode::Growing { .. } => vec![RoomRange::new(0, self.grown_end)],
        }
    }

    /// Whether a growing view still has rooms left to load.
    pub fn is_growing(&self) -> bool {
        match self.mode {
            SyncMode::Selective => false,
            SyncMode::Growing { maximum, .. } => {
                let Some(count) = self.room_count else { return true };
                let target = maximum.map_or(count, |max| count.min(max));
                self.grown_end.saturating_add(1) < target
            },
        }
    }

    /// List request for this view.
    pub fn to_request(&self) -> ListRequest {
        ListRequest {
            ranges: self.request_ranges(),
            sort: self.sort.clone(),
            required_state: self.required_state.clone(),
            timeline_limit: self.timeline_limit,
            filters: self.filters.clone(),
        }
    }

    fn check_range(&self, start: u32, end: u32) -> Result<RoomRange, ConfigError> {
        if matches!(self.mode, SyncMode::Growing { .. }) {
            return Err(ConfigError::RangesManaged { view: self.name.clone() });
        }
        let range = RoomRange::new(start, end);
        if !range.is_valid() {
            return Err(ConfigError::InvalidRange { start, end });
        }
        Ok(range)
    }

    /// Move forward to `state`. Returns the new state if it changed.
    ///
    /// Regressions are ignored; only [`View::reset`] moves a view backwards.
    pub(crate) fn advance_state(&mut self, state: SyncState) -> Option<SyncState> {
        if state < self.state {
            tracing::warn!(
                view = %self.name,
                current = ?self.state,
                reported = ?state,
                "ignoring sync state regression"
            );
            return None;
        }
        if state == self.state {
            return None;
        }
        self.state = state;
        Some(state)
    }

    /// Record the server's room count. Returns it if it changed.
    pub(crate) fn set_room_count(&mut self, count: u32) -> Option<u32> {
        if self.room_count == Some(count) {
            return None;
        }
        self.room_count = Some(count);
        Some(count)
    }

    /// Extend a growing window by one batch, clamped to the known target.
    pub(crate) fn grow(&mut self) {
        let SyncMode::Growing { batch_size, maximum } = self.mode else { return };
        let Some(count) = self.room_count else { return };
        if !self.is_growing() {
            return;
        }
        let target = maximum.map_or(count, |max| count.min(max));
        self.grown_end = self.grown_end.saturating_add(batch_size).min(target.saturating_sub(1));
    }

    pub(crate) fn commit_entries(&mut self, entries: Vec<RoomListEntry>) {
        self.rooms.commit(entries);
    }

    /// Back to `Cold` for a fresh server session. Entries and counts stay.
    pub(crate) fn reset(&mut self) {
        self.state = SyncState::Cold;
    }

    /// Seed cached state from a snapshot. Filled entries come back
    /// invalidated until the server confirms them.
    pub(crate) fn restore(&mut self, room_count: Option<u32>, entries: Vec<RoomListEntry>) {
        self.room_count = room_count;
        self.rooms = RoomListModel::from_entries(entries);
        self.rooms.invalidate_all();
        self.state = SyncState::Cold;
    }
}

/// Builder for [`View`]. All validation happens in [`ViewBuilder::build`].
#[derive(Debug, Clone)]
pub struct ViewBuilder {
    name: String,
    sort: Vec<SortKey>,
    required_state: Vec<RequiredStateField>,
    timeline_limit: Option<u32>,
    filters: ListFilters,
    mode: SyncMode,
    ranges: Vec<RoomRange>,
}

impl ViewBuilder {
    /// New builder. Defaults: sort by recency then name, selective mode, no
    /// ranges, no required state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort: vec![SortKey::ByRecency, SortKey::ByName],
            required_state: Vec::new(),
            timeline_limit: None,
            filters: ListFilters::default(),
            mode: SyncMode::Selective,
            ranges: Vec::new(),
        }
    }

    /// Replace the sort specification.
    #[must_use]
    pub fn sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    /// Add a required-state pair.
    #[must_use]
    pub fn required_state(mut self, event_type: impl Into<String>, state_key: impl Into<String>) -> Self {
        self.required_state.push(RequiredStateField::new(event_type, state_key));
        self
    }

    /// Timeline events requested per room.
    #[must_use]
    pub fn timeline_limit(mut self, limit: u32) -> Self {
        self.timeline_limit = Some(limit);
        self
    }

    /// Server-side filters.
    #[must_use]
    pub fn filters(mut self, filters: ListFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Application-managed ranges.
    #[must_use]
    pub fn selective(mut self) -> Self {
        self.mode = SyncMode::Selective;
        self
    }

    /// Automatically growing window.
    #[must_use]
    pub fn growing(mut self, batch_size: u32, maximum: Option<u32>) -> Self {
        self.mode = SyncMode::Growing { batch_size, maximum };
        self
    }

    /// Initial range (selective mode).
    #[must_use]
    pub fn add_range(mut self, start: u32, end: u32) -> Self {
        self.ranges.push(RoomRange::new(start, end));
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// - `ConfigError::EmptyViewName` if the name is empty
    /// - `ConfigError::EmptySort` / `InvalidSortKey` for empty, blank custom
    ///   or duplicated sort keys
    /// - `ConfigError::InvalidRequiredState` for blank event types or
    ///   duplicated pairs
    /// - `ConfigError::ZeroBatchSize` / `ZeroMaximum` in growing mode
    /// - `ConfigError::InvalidRange` for any range with `start > end`
    /// - `ConfigError::RangesManaged` for ranges on a growing view
    pub fn build(self) -> Result<View, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyViewName);
        }

        if self.sort.is_empty() {
            return Err(ConfigError::EmptySort);
        }
        let mut seen_sort = HashSet::new();
        for key in &self.sort {
            if matches!(key, SortKey::Custom(custom) if custom.is_empty()) {
                return Err(ConfigError::InvalidSortKey {
                    key: format!("{key:?}"),
                    reason: "custom key must not be empty",
                });
            }
            if !seen_sort.insert(key) {
                return Err(ConfigError::InvalidSortKey {
                    key: format!("{key:?}"),
                    reason: "duplicate",
                });
            }
        }

        let mut seen_state = HashSet::new();
        for field in &self.required_state {
            let invalid = |reason| ConfigError::InvalidRequiredState {
                event_type: field.event_type.clone(),
                state_key: field.state_key.clone(),
                reason,
            };
            if field.event_type.is_empty() {
                return Err(invalid("event type must not be empty"));
            }
            if !seen_state.insert((&field.event_type, &field.state_key)) {
                return Err(invalid("duplicate"));
            }
        }

        let grown_end = match self.mode {
            SyncMode::Selective => 0,
            SyncMode::Growing { batch_size, maximum } => {
                if batch_size == 0 {
                    return Err(ConfigError::ZeroBatchSize);
                }
                if maximum == Some(0) {
                    return Err(ConfigError::ZeroMaximum);
                }
                if !self.ranges.is_empty() {
                    return Err(ConfigError::RangesManaged { view: self.name });
                }
                batch_size - 1
            },
        };

        if let Some(bad) = self.ranges.iter().find(|r| !r.is_valid()) {
            return Err(ConfigError::InvalidRange { start: bad.start, end: bad.end });
        }

        Ok(View {
            name: self.name,
            sort: self.sort,
            required_state: self.required_state,
            timeline_limit: self.timeline_limit,
            filters: self.filters,
            mode: self.mode,
            ranges: self.ranges,
            grown_end,
            state: SyncState::Cold,
            room_count: None,
            rooms: RoomListModel::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let view = ViewBuilder::new("all").build().unwrap();
        assert_eq!(view.name(), "all");
        assert_eq!(view.state(), SyncState::Cold);
        assert_eq!(view.current_room_count(), None);
        assert!(view.request_ranges().is_empty());
        assert_eq!(view.batch_size(), None);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert_eq!(ViewBuilder::new("").build().unwrap_err(), ConfigError::EmptyViewName);
        assert_eq!(ViewBuilder::new("v").sort(vec![]).build().unwrap_err(), ConfigError::EmptySort);
        assert!(matches!(
            ViewBuilder::new("v").sort(vec![SortKey::ByName, SortKey::ByName]).build(),
            Err(ConfigError::InvalidSortKey { reason: "duplicate", .. })
        ));
        assert!(matches!(
            ViewBuilder::new("v").sort(vec![SortKey::Custom(String::new())]).build(),
            Err(ConfigError::InvalidSortKey { .. })
        ));
        assert!(matches!(
            ViewBuilder::new("v").required_state("", "").build(),
            Err(ConfigError::InvalidRequiredState { .. })
        ));
        assert!(matches!(
            ViewBuilder::new("v")
                .required_state("m.room.name", "")
                .required_state("m.room.name", "")
                .build(),
            Err(ConfigError::InvalidRequiredState { reason: "duplicate", .. })
        ));
        assert_eq!(
            ViewBuilder::new("v").growing(0, None).build().unwrap_err(),
            ConfigError::ZeroBatchSize
        );
        assert_eq!(
            ViewBuilder::new("v").growing(10, Some(0)).build().unwrap_err(),
            ConfigError::ZeroMaximum
        );
        assert_eq!(
            ViewBuilder::new("v").add_range(5, 2).build().unwrap_err(),
            ConfigError::InvalidRange { start: 5, end: 2 }
        );
    }

    #[test]
    fn same_event_type_with_different_state_keys_is_fine() {
        let view = ViewBuilder::new("v")
            .required_state("m.room.member", "@a:x")
            .required_state("m.room.member", "@b:x")
            .build()
            .unwrap();
        assert_eq!(view.required_state().len(), 2);
    }

    #[test]
    fn overlapping_ranges_are_not_merged() {
        let mut view = ViewBuilder::new("v").add_range(0, 10).build().unwrap();
        view.add_range(5, 20).unwrap();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 10), RoomRange::new(5, 20)]);

        view.set_range(3, 4).unwrap();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(3, 4)]);

        assert_eq!(view.add_range(9, 1), Err(ConfigError::InvalidRange { start: 9, end: 1 }));
        assert_eq!(view.request_ranges(), vec![RoomRange::new(3, 4)]);
    }

    #[test]
    fn reset_then_add_requests_exactly_that_range() {
        let mut view = ViewBuilder::new("v").add_range(20, 30).add_range(0, 5).build().unwrap();
        view.reset_ranges();
        view.add_range(0, 9).unwrap();
        assert_eq!(view.to_request().ranges, vec![RoomRange::new(0, 9)]);
    }

    #[test]
    fn state_never_regresses() {
        let mut view = ViewBuilder::new("v").build().unwrap();
        assert_eq!(view.advance_state(SyncState::CatchingUp), Some(SyncState::CatchingUp));
        assert_eq!(view.advance_state(SyncState::Preload), None);
        assert_eq!(view.advance_state(SyncState::CatchingUp), None);
        assert_eq!(view.state(), SyncState::CatchingUp);

        view.reset();
        assert_eq!(view.state(), SyncState::Cold);
    }

    #[test]
    fn growing_window_extends_to_count() {
        let mut view = ViewBuilder::new("v").growing(10, None).build().unwrap();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 9)]);
        assert!(view.add_range(0, 1).is_err());

        // No count yet: stay put
        view.grow();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 9)]);

        view.set_room_count(25);
        view.grow();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 19)]);
        view.grow();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 24)]);
        assert!(!view.is_growing());
        view.grow();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 24)]);

        view.reset_ranges();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 9)]);
    }

    #[test]
    fn growing_window_respects_maximum() {
        let mut view = ViewBuilder::new("v").growing(10, Some(15)).build().unwrap();
        view.set_room_count(100);
        view.grow();
        assert_eq!(view.request_ranges(), vec![RoomRange::new(0, 14)]);
        assert!(!view.is_growing());
    }
}
