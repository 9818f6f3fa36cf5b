//! Sync engine: request building and response application.
//!
//! The [`SyncEngine`] is a Sans-IO state machine. Callers ask it for the next
//! [`SyncRequest`], hand the request to a transport, and feed the decoded
//! [`SyncResponse`] back through [`SyncEngine::apply_response`]. The engine
//! returns [`EngineAction`]s describing what changed; it never performs I/O
//! and never blocks.
//!
//! # Atomicity
//!
//! A response is validated in full before anything is committed: every view's
//! diffs are replayed on scratch copies first, and only if all of them fit
//! does the engine swap in the new lists, counts, states and room summaries.
//! A failed response leaves the engine exactly as it was.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use glide_proto::{
    RoomId, RoomListDiff, RoomSubscription, SyncRequest, SyncResponse, SyncState,
};

use crate::{
    error::{ConfigError, EngineError},
    room::{RoomCache, SlidingSyncRoom},
    snapshot::{SessionSnapshot, ViewSnapshot},
    summary::{SummaryBuilder, UpdateSummary},
    view::View,
};

/// Default long-poll timeout once the session is caught up.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// What changed while applying a response.
///
/// Per-view actions appear in view name order. `Summary`, when present, is
/// always the last action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Diffs applied to a view's list, in server order.
    ViewDiffs {
        /// View name
        view: String,
        /// Diffs, exactly as received
        diffs: Vec<RoomListDiff>,
    },
    /// A view's total room count changed.
    RoomCountChanged {
        /// View name
        view: String,
        /// New count
        count: u32,
    },
    /// A view moved to a later synchronization phase.
    StateChanged {
        /// View name
        view: String,
        /// New state
        state: SyncState,
    },
    /// Room summaries were updated.
    RoomsUpdated {
        /// Updated rooms, in id order
        rooms: Vec<RoomId>,
    },
    /// Everything that changed in this round trip.
    Summary(UpdateSummary),
}

/// Request currently awaiting its response.
#[derive(Debug, Clone)]
struct InFlight {
    txn_id: String,
    subscribed: Vec<RoomId>,
    unsubscribed: Vec<RoomId>,
}

/// Sans-IO sliding sync state: views, subscriptions, room cache and position.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    views: BTreeMap<String, View>,
    subscriptions: BTreeMap<RoomId, RoomSubscription>,
    /// Subscriptions the server has acknowledged.
    sent: BTreeSet<RoomId>,
    /// Acknowledged subscriptions to end on the next request.
    pending_unsubscribe: BTreeSet<RoomId>,
    rooms: RoomCache,
    pos: Option<String>,
    in_flight: Option<InFlight>,
    poll_timeout: Duration,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    /// Engine with no views and no subscriptions.
    pub fn new() -> Self {
        Self {
            views: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            sent: BTreeSet::new(),
            pending_unsubscribe: BTreeSet::new(),
            rooms: RoomCache::new(),
            pos: None,
            in_flight: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Set the long-poll timeout used once caught up.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Current position token.
    pub fn pos(&self) -> Option<&str> {
        self.pos.as_deref()
    }

    /// Add a view.
    ///
    /// # Errors
    ///
    /// - `ConfigError::DuplicateView` if a view with the same name exists
    pub fn add_view(&mut self, view: View) -> Result<(), ConfigError> {
        if self.views.contains_key(view.name()) {
            return Err(ConfigError::DuplicateView { name: view.name().to_owned() });
        }
        tracing::debug!(view = %view.name(), "view added");
        self.views.insert(view.name().to_owned(), view);
        Ok(())
    }

    /// Remove a view, returning it.
    pub fn remove_view(&mut self, name: &str) -> Option<View> {
        let removed = self.views.remove(name);
        if removed.is_some() {
            tracing::debug!(view = %name, "view removed");
        }
        removed
    }

    /// View by name.
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    /// Mutable view by name, for range changes.
    pub fn view_mut(&mut self, name: &str) -> Option<&mut View> {
        self.views.get_mut(name)
    }

    /// All views, in name order.
    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    /// Summary for one room.
    pub fn room(&self, room_id: &RoomId) -> Option<&SlidingSyncRoom> {
        self.rooms.get(room_id)
    }

    /// Summaries for the given rooms, in the given order. Unknown ids yield
    /// `None`.
    pub fn rooms<'a>(
        &'a self,
        room_ids: impl IntoIterator<Item = &'a RoomId>,
    ) -> Vec<Option<&'a SlidingSyncRoom>> {
        room_ids.into_iter().map(|id| self.rooms.get(id)).collect()
    }

    /// The room cache.
    pub fn room_cache(&self) -> &RoomCache {
        &self.rooms
    }

    /// Subscribe to a room independently of any view. Takes effect on the next
    /// request; re-subscribing replaces the settings.
    pub fn subscribe(&mut self, room_id: RoomId, settings: RoomSubscription) {
        self.pending_unsubscribe.remove(&room_id);
        self.sent.remove(&room_id);
        self.subscriptions.insert(room_id, settings);
    }

    /// End a room subscription.
    ///
    /// If the server knows about the subscription (or the request carrying it
    /// is in flight), the next request carries an unsubscribe for it.
    /// Otherwise the room is simply dropped.
    pub fn unsubscribe(&mut self, room_id: &RoomId) {
        if self.subscriptions.remove(room_id).is_none() {
            return;
        }
        let in_flight = self.in_flight.as_ref().is_some_and(|f| f.subscribed.contains(room_id));
        if self.sent.remove(room_id) || in_flight {
            self.pending_unsubscribe.insert(room_id.clone());
        }
    }

    /// Whether `room_id` has an active subscription.
    pub fn is_subscribed(&self, room_id: &RoomId) -> bool {
        self.subscriptions.contains_key(room_id)
    }

    /// Build the next request.
    ///
    /// Supersedes any request still awaiting its response: only the most
    /// recent `txn_id` is accepted back.
    pub fn build_request(&mut self, txn_id: impl Into<String>) -> SyncRequest {
        let txn_id = txn_id.into();

        let lists =
            self.views.iter().map(|(name, view)| (name.clone(), view.to_request())).collect();

        let subscribed: Vec<RoomId> =
            self.subscriptions.keys().filter(|id| !self.sent.contains(*id)).cloned().collect();
        for room_id in &subscribed {
            if let Some(room) = self.rooms.get_mut(room_id) {
                room.set_loading_more(true);
            }
        }
        let unsubscribed: Vec<RoomId> = self.pending_unsubscribe.iter().cloned().collect();

        let timeout_ms = if self.needs_catch_up() { 0 } else { duration_ms(self.poll_timeout) };

        self.in_flight = Some(InFlight {
            txn_id: txn_id.clone(),
            subscribed,
            unsubscribed: unsubscribed.clone(),
        });

        SyncRequest {
            txn_id,
            pos: self.pos.clone(),
            timeout_ms,
            lists,
            room_subscriptions: self.subscriptions.clone(),
            unsubscribe_rooms: unsubscribed,
        }
    }

    /// Whether the next request should return immediately rather than
    /// long-poll.
    fn needs_catch_up(&self) -> bool {
        self.pos.is_none() || self.views.values().any(View::is_growing)
    }

    /// Apply a decoded response.
    ///
    /// # Errors
    ///
    /// - `EngineError::TxnMismatch` if the response echoes a transaction id
    ///   other than the one in flight
    /// - `EngineError::Model` if any view's diffs do not fit its list
    ///
    /// On error nothing is committed.
    pub fn apply_response(
        &mut self,
        response: SyncResponse,
    ) -> Result<Vec<EngineAction>, EngineError> {
        if let Some(got) = &response.txn_id {
            let expected = self.in_flight.as_ref().map(|f| f.txn_id.clone());
            if expected.as_deref() != Some(got.as_str()) {
                return Err(EngineError::TxnMismatch { expected, got: got.clone() });
            }
        }

        // Validate every view before committing any of them.
        let mut staged = Vec::with_capacity(response.lists.len());
        for (name, update) in response.lists {
            let Some(view) = self.views.get(&name) else {
                tracing::warn!(view = %name, "ignoring list update for unknown view");
                continue;
            };
            let entries = if update.diffs.is_empty() {
                None
            } else {
                let entries = view
                    .rooms()
                    .preview(&update.diffs)
                    .map_err(|source| EngineError::Model { view: name.clone(), source })?;
                Some(entries)
            };
            staged.push((name, update.count, update.state, update.diffs, entries));
        }

        let mut actions = Vec::new();
        let mut summary = SummaryBuilder::default();

        for (name, count, state, diffs, entries) in staged {
            let Some(view) = self.views.get_mut(&name) else { continue };

            if let Some(entries) = entries {
                view.commit_entries(entries);
                summary.view(&name);
                actions.push(EngineAction::ViewDiffs { view: name.clone(), diffs });
            }
            if let Some(count) = count.and_then(|c| view.set_room_count(c)) {
                summary.view(&name);
                actions.push(EngineAction::RoomCountChanged { view: name.clone(), count });
            }
            if let Some(state) = state.and_then(|s| view.advance_state(s)) {
                summary.view(&name);
                actions.push(EngineAction::StateChanged { view: name.clone(), state });
            }
            view.grow();
        }

        if !response.rooms.is_empty() {
            let mut updated = Vec::with_capacity(response.rooms.len());
            for (room_id, update) in response.rooms {
                self.rooms.apply(room_id.clone(), update);
                summary.room(room_id.clone());
                updated.push(room_id);
            }
            actions.push(EngineAction::RoomsUpdated { rooms: updated });
        }

        if let Some(in_flight) = self.in_flight.take() {
            for room_id in in_flight.unsubscribed {
                self.pending_unsubscribe.remove(&room_id);
            }
            for room_id in in_flight.subscribed {
                if self.subscriptions.contains_key(&room_id) {
                    self.sent.insert(room_id);
                }
            }
        }
        self.pos = Some(response.pos);

        let summary = summary.build();
        tracing::debug!(
            views = summary.views.len(),
            rooms = summary.rooms.len(),
            pos = ?self.pos,
            "response applied"
        );
        if !summary.is_empty() {
            actions.push(EngineAction::Summary(summary));
        }
        Ok(actions)
    }

    /// Forget the server session.
    ///
    /// Drops the position token, resets every view to `Cold` (keeping cached
    /// entries and counts) and marks all subscriptions as not yet sent.
    pub fn restart(&mut self) {
        tracing::info!(pos = ?self.pos, "restarting sliding sync session");
        self.pos = None;
        self.in_flight = None;
        self.sent.clear();
        self.pending_unsubscribe.clear();
        for view in self.views.values_mut() {
            view.reset();
        }
    }

    /// Capture cached view lists, counts and room summaries.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            views: self
                .views
                .iter()
                .map(|(name, view)| {
                    let snapshot = ViewSnapshot {
                        room_count: view.current_room_count(),
                        entries: view.rooms().iter().cloned().collect(),
                    };
                    (name.clone(), snapshot)
                })
                .collect(),
            rooms: self.rooms.iter().cloned().collect(),
        }
    }

    /// Seed cached state from a snapshot.
    ///
    /// Only views already added to the engine are restored; they start `Cold`
    /// with filled entries invalidated until the server confirms them.
    /// Returns the number of views restored.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> usize {
        let mut restored = 0;
        for (name, cached) in snapshot.views {
            match self.views.get_mut(&name) {
                Some(view) => {
                    view.restore(cached.room_count, cached.entries);
                    restored += 1;
                },
                None => tracing::debug!(view = %name, "skipping snapshot of unknown view"),
            }
        }
        for room in snapshot.rooms {
            self.rooms.insert(room);
        }
        restored
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
