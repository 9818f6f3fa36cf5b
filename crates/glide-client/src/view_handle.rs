//! Application-facing handle to one view of a session.

use std::sync::Arc;

use glide_core::{ConfigError, RoomListSnapshot, View};
use glide_proto::{RoomListDiff, RoomRange, SyncState};

use crate::{
    dispatch::{Observer, Subscription},
    error::SessionError,
    session::SessionState,
    task::TaskHandle,
};

/// Handle to a named view.
///
/// Cheap to clone. Reads take the session's read lock and therefore see the
/// view between two whole responses. If the view is removed from the session,
/// reads return empty defaults and range changes fail with
/// `ConfigError::UnknownView`.
#[derive(Clone)]
pub struct ViewHandle {
    name: String,
    state: Arc<SessionState>,
}

impl ViewHandle {
    pub(crate) fn new(name: String, state: Arc<SessionState>) -> Self {
        Self { name, state }
    }

    /// View name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read<R>(&self, f: impl FnOnce(&View) -> R) -> Option<R> {
        self.state.engine.read().view(&self.name).map(f)
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut View) -> Result<R, ConfigError>,
    ) -> Result<R, ConfigError> {
        let mut engine = self.state.engine.write();
        let view = engine
            .view_mut(&self.name)
            .ok_or_else(|| ConfigError::UnknownView { name: self.name.clone() })?;
        f(view)
    }

    /// Add a range for the next request. Overlapping ranges are forwarded
    /// verbatim.
    pub fn add_range(&self, start: u32, end: u32) -> Result<(), ConfigError> {
        self.write(|view| view.add_range(start, end))
    }

    /// Replace all ranges with one.
    pub fn set_range(&self, start: u32, end: u32) -> Result<(), ConfigError> {
        self.write(|view| view.set_range(start, end))
    }

    /// Drop all ranges.
    pub fn reset_ranges(&self) -> Result<(), ConfigError> {
        self.write(|view| {
            view.reset_ranges();
            Ok(())
        })
    }

    /// Ranges the next request will carry.
    pub fn request_ranges(&self) -> Vec<RoomRange> {
        self.read(View::request_ranges).unwrap_or_default()
    }

    /// Total rooms reported by the server.
    pub fn current_room_count(&self) -> Option<u32> {
        self.read(View::current_room_count).flatten()
    }

    /// Snapshot of the room list.
    pub fn current_rooms_list(&self) -> RoomListSnapshot {
        self.read(View::current_rooms_list).unwrap_or_default()
    }

    /// Synchronization phase.
    pub fn state(&self) -> SyncState {
        self.read(View::state).unwrap_or_default()
    }

    /// Register a callback for this view's diffs. Each call receives one
    /// cycle's diffs, in server order.
    pub fn observe_room_list<O: Observer<Vec<RoomListDiff>>>(
        &self,
        observer: O,
    ) -> Result<TaskHandle, SessionError> {
        self.state.dispatcher.view(&self.name).diffs.observe("room_list", observer)
    }

    /// Register a callback for room count changes.
    pub fn observe_room_count<O: Observer<u32>>(
        &self,
        observer: O,
    ) -> Result<TaskHandle, SessionError> {
        self.state.dispatcher.view(&self.name).count.observe("room_count", observer)
    }

    /// Register a callback for state changes.
    pub fn observe_state<O: Observer<SyncState>>(
        &self,
        observer: O,
    ) -> Result<TaskHandle, SessionError> {
        self.state.dispatcher.view(&self.name).state.observe("view_state", observer)
    }

    /// Channel of this view's diffs.
    pub fn subscribe_room_list(&self) -> Subscription<Vec<RoomListDiff>> {
        self.state.dispatcher.view(&self.name).diffs.subscribe()
    }

    /// Current room list plus a channel of every later cycle's diffs.
    ///
    /// Both are taken under one read lock, so replaying the channel on the
    /// snapshot reproduces the view: no cycle is missed or seen twice.
    pub fn room_list_stream(&self) -> (RoomListSnapshot, Subscription<Vec<RoomListDiff>>) {
        let engine = self.state.engine.read();
        let snapshot = engine.view(&self.name).map(View::current_rooms_list).unwrap_or_default();
        let subscription = self.state.dispatcher.view(&self.name).diffs.subscribe();
        drop(engine);
        (snapshot, subscription)
    }

    /// Callback form of [`room_list_stream`](Self::room_list_stream).
    pub fn observe_room_list_stream<O: Observer<Vec<RoomListDiff>>>(
        &self,
        observer: O,
    ) -> Result<(RoomListSnapshot, TaskHandle), SessionError> {
        let engine = self.state.engine.read();
        let snapshot = engine.view(&self.name).map(View::current_rooms_list).unwrap_or_default();
        let handle = self.state.dispatcher.view(&self.name).diffs.observe("room_list", observer)?;
        drop(engine);
        Ok((snapshot, handle))
    }

    /// Channel of room count changes.
    pub fn subscribe_room_count(&self) -> Subscription<u32> {
        self.state.dispatcher.view(&self.name).count.subscribe()
    }

    /// Channel of state changes.
    pub fn subscribe_state(&self) -> Subscription<SyncState> {
        self.state.dispatcher.view(&self.name).state.subscribe()
    }
}

impl std::fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewHandle").field("name", &self.name).finish_non_exhaustive()
    }
}
