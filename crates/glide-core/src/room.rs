//! Lightweight per-room summaries and the cache that owns them.

use std::collections::BTreeMap;

use glide_proto::{LatestMessage, RoomId, RoomUpdate, UnreadNotifications};
use serde::{Deserialize, Serialize};

/// Summary of one room as seen through sliding sync.
///
/// Distinct from the fully hydrated room entity, which is owned elsewhere and
/// reachable through [`SlidingSyncRoom::full_room`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingSyncRoom {
    room_id: RoomId,
    name: Option<String>,
    is_dm: bool,
    is_initial: bool,
    unread_notifications: UnreadNotifications,
    is_loading_more: bool,
    latest_message: Option<LatestMessage>,
    prev_batch: Option<String>,
    timeline_limit: Option<u32>,
}

impl SlidingSyncRoom {
    /// Summary with nothing but an id.
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            name: None,
            is_dm: false,
            is_initial: false,
            unread_notifications: UnreadNotifications::default(),
            is_loading_more: false,
            latest_message: None,
            prev_batch: None,
            timeline_limit: None,
        }
    }

    /// Room id.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Display name, if the server computed one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the room is a direct message.
    pub fn is_dm(&self) -> bool {
        self.is_dm
    }

    /// Whether the last update was the server's initial payload for the room.
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Unread counters.
    pub fn unread_notifications(&self) -> UnreadNotifications {
        self.unread_notifications
    }

    /// Whether a subscription for this room is in flight and more timeline is
    /// expected.
    pub fn is_loading_more(&self) -> bool {
        self.is_loading_more
    }

    /// Most recent displayable message.
    pub fn latest_message(&self) -> Option<&LatestMessage> {
        self.latest_message.as_ref()
    }

    /// Token for paginating backwards from the synced timeline.
    pub fn prev_batch(&self) -> Option<&str> {
        self.prev_batch.as_deref()
    }

    /// Timeline limit the room was last synced with.
    pub fn timeline_limit(&self) -> Option<u32> {
        self.timeline_limit
    }

    /// Materialize the full room entity through `provider`.
    pub fn full_room<P: RoomProvider>(&self, provider: &P) -> Option<P::Room> {
        provider.full_room(&self.room_id)
    }

    /// Fold a server update into this summary.
    ///
    /// An `initial` update rebuilds the summary from scratch; otherwise only
    /// the fields present in the update overwrite cached values.
    pub(crate) fn apply(&mut self, update: RoomUpdate) {
        if update.initial {
            *self = Self::new(self.room_id.clone());
        }
        self.is_initial = update.initial;
        self.is_loading_more = false;

        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(is_dm) = update.is_dm {
            self.is_dm = is_dm;
        }
        if let Some(unread) = update.unread_notifications {
            self.unread_notifications = unread;
        }
        if let Some(message) = update.latest_message {
            self.latest_message = Some(message);
        }
        if let Some(prev_batch) = update.prev_batch {
            self.prev_batch = Some(prev_batch);
        }
        if let Some(limit) = update.timeline_limit {
            self.timeline_limit = Some(limit);
        }
    }

    pub(crate) fn set_loading_more(&mut self, loading: bool) {
        self.is_loading_more = loading;
    }
}

/// Source of fully hydrated room entities.
///
/// Implemented by whatever owns the complete room state (a client store, a
/// database); the sync engine only holds summaries.
pub trait RoomProvider {
    /// Full room type.
    type Room;

    /// Full room for `room_id`, if known.
    fn full_room(&self, room_id: &RoomId) -> Option<Self::Room>;
}

/// Session-owned cache of room summaries, keyed by room id.
#[derive(Debug, Clone, Default)]
pub struct RoomCache {
    rooms: BTreeMap<RoomId, SlidingSyncRoom>,
}

impl RoomCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary for `room_id`.
    pub fn get(&self, room_id: &RoomId) -> Option<&SlidingSyncRoom> {
        self.rooms.get(room_id)
    }

    /// Number of cached rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Iterate summaries in room id order.
    pub fn iter(&self) -> impl Iterator<Item = &SlidingSyncRoom> {
        self.rooms.values()
    }

    /// Merge an update, creating the summary if needed.
    pub(crate) fn apply(&mut self, room_id: RoomId, update: RoomUpdate) {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| SlidingSyncRoom::new(room_id))
            .apply(update);
    }

    pub(crate) fn get_mut(&mut self, room_id: &RoomId) -> Option<&mut SlidingSyncRoom> {
        self.rooms.get_mut(room_id)
    }

    pub(crate) fn insert(&mut self, room: SlidingSyncRoom) {
        self.rooms.insert(room.room_id.clone(), room);
    }
}
