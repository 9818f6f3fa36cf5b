//! Observable state snapshots for invariant checking.
//!
//! Invariants operate on snapshots rather than live state so every check
//! sees the same consistent picture.

use std::collections::{BTreeMap, BTreeSet};

use glide_client::{SlidingSync, Transport};
use glide_core::{Environment, SyncEngine};
use glide_proto::{RoomId, RoomListEntry, SyncState};

/// Snapshot of one session's observable state.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-view observations, keyed by view name.
    pub views: BTreeMap<String, ViewObservation>,
    /// Rooms with a cached summary.
    pub cached_rooms: BTreeSet<RoomId>,
}

/// Observable state of one view.
#[derive(Debug, Clone, Default)]
pub struct ViewObservation {
    /// Current state.
    pub state: SyncState,
    /// Last room count reported by the server.
    pub count: Option<u32>,
    /// Current list contents.
    pub entries: Vec<RoomListEntry>,
    /// States observed over time, oldest first (for monotonicity checks).
    pub state_history: Vec<SyncState>,
}

impl SystemSnapshot {
    /// Snapshot with no views and no rooms.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture a Sans-IO engine.
    pub fn from_engine(engine: &SyncEngine) -> Self {
        let views = engine
            .views()
            .map(|view| {
                let observation = ViewObservation {
                    state: view.state(),
                    count: view.current_room_count(),
                    entries: view.rooms().iter().cloned().collect(),
                    state_history: Vec::new(),
                };
                (view.name().to_owned(), observation)
            })
            .collect();
        let cached_rooms = engine.room_cache().iter().map(|r| r.room_id().clone()).collect();
        Self { views, cached_rooms }
    }

    /// Capture a running session.
    ///
    /// Lists, counts and cached rooms come from one consistent engine
    /// snapshot; view states are read afterwards.
    pub fn from_session<T: Transport, E: Environment>(session: &SlidingSync<T, E>) -> Self {
        let snapshot = session.snapshot();
        let views = snapshot
            .views
            .into_iter()
            .map(|(name, view)| {
                let state = session.view(&name).map(|handle| handle.state()).unwrap_or_default();
                let observation = ViewObservation {
                    state,
                    count: view.room_count,
                    entries: view.entries,
                    state_history: Vec::new(),
                };
                (name, observation)
            })
            .collect();
        let cached_rooms = snapshot.rooms.iter().map(|r| r.room_id().clone()).collect();
        Self { views, cached_rooms }
    }

    /// Add or replace a view observation.
    pub fn add_view(&mut self, name: impl Into<String>, observation: ViewObservation) {
        self.views.insert(name.into(), observation);
    }

    /// Record a state observation for `view`'s history.
    pub fn record_state(&mut self, view: &str, state: SyncState) {
        if let Some(observation) = self.views.get_mut(view) {
            observation.state_history.push(state);
        }
    }

    /// Attach a full state history to `view`.
    #[must_use]
    pub fn with_history(mut self, view: &str, history: Vec<SyncState>) -> Self {
        if let Some(observation) = self.views.get_mut(view) {
            observation.state_history = history;
        }
        self
    }
}
