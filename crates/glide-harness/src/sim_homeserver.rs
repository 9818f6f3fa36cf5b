//! In-memory sliding sync homeserver.
//!
//! Serves a seeded universe of rooms through the [`Transport`] seam. Each
//! session tracks what it has already told the client (per-list entries,
//! counts, states and room revisions), so responses carry real incremental
//! diffs produced by [`diff_lists`].
//!
//! # List model
//!
//! A list is as long as the number of rooms matching its filters. Positions
//! inside a requested range are `Filled` with the room the sort order puts
//! there. Positions outside every range are `Empty`, or `Invalidated` if the
//! client was previously told which room sat there.
//!
//! # States
//!
//! A list reports `Preload` on its first response, `CatchingUp` while its
//! requested ranges keep changing (a growing window), and `Live` once the
//! same ranges are requested twice in a row. States reported by the server
//! never go backwards within a session.
//!
//! # Faults
//!
//! - [`SimHomeserver::set_error_rate`]: random network failures
//! - [`SimHomeserver::expire_pos`]: next request with a `pos` gets
//!   `UnknownPos`
//! - [`SimHomeserver::revoke`]: every request fails with `SessionRevoked`

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use glide_client::{Transport, TransportError};
use glide_proto::{
    LatestMessage, ListFilters, ListRequest, ListUpdate, ProtocolError, RoomId, RoomListEntry,
    RoomRange, RoomUpdate, SortKey, SyncRequest, SyncResponse, SyncState, UnreadNotifications,
};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::watch;

use crate::diff::diff_lists;

/// Server name used for generated room ids.
pub const SIM_SERVER_NAME: &str = "sim.local";

/// A room in the simulated universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRoom {
    /// Room id
    pub room_id: RoomId,
    /// Display name
    pub name: String,
    /// Whether the room is a direct message
    pub is_dm: bool,
    /// Whether the user is only invited
    pub is_invite: bool,
    /// Room tags
    pub tags: Vec<String>,
    /// Logical timestamp of the last message
    pub last_activity: u64,
    /// Unread notifications
    pub notification_count: u64,
    /// Unread highlights
    pub highlight_count: u64,
    /// Bumped on every change; drives incremental room updates
    revision: u64,
}

impl SimRoom {
    fn new(room_id: RoomId, name: String, is_dm: bool) -> Self {
        Self {
            room_id,
            name,
            is_dm,
            is_invite: false,
            tags: Vec::new(),
            last_activity: 0,
            notification_count: 0,
            highlight_count: 0,
            revision: 0,
        }
    }

    fn matches(&self, filters: &ListFilters) -> bool {
        if filters.is_dm.is_some_and(|dm| dm != self.is_dm) {
            return false;
        }
        if filters.is_invite.is_some_and(|invite| invite != self.is_invite) {
            return false;
        }
        if let Some(pattern) = &filters.room_name_like {
            if !self.name.to_lowercase().contains(&pattern.to_lowercase()) {
                return false;
            }
        }
        if !filters.tags.is_empty() && !filters.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        !filters.not_tags.iter().any(|t| self.tags.contains(t))
    }

    fn update(&self, initial: bool) -> RoomUpdate {
        RoomUpdate {
            name: Some(self.name.clone()),
            is_dm: Some(self.is_dm),
            initial,
            unread_notifications: Some(UnreadNotifications {
                notification_count: self.notification_count,
                highlight_count: self.highlight_count,
            }),
            latest_message: (self.last_activity > 0).then(|| LatestMessage {
                event_id: format!("$ev{}_{}", self.revision, self.room_id.as_str()),
                sender: "@sim:sim.local".to_owned(),
                body: format!("message {}", self.last_activity),
                origin_server_ts: self.last_activity,
            }),
            prev_batch: Some(format!("t{}", self.revision)),
            timeline_limit: None,
        }
    }
}

fn compare(a: &SimRoom, b: &SimRoom, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ord = match key {
            SortKey::ByRecency => b.last_activity.cmp(&a.last_activity),
            SortKey::ByName => a.name.cmp(&b.name),
            SortKey::ByNotificationLevel => (b.highlight_count, b.notification_count)
                .cmp(&(a.highlight_count, a.notification_count)),
            SortKey::Custom(_) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.room_id.cmp(&b.room_id)
}

/// What one session has told its client about one list.
#[derive(Debug, Default)]
struct ListSession {
    entries: Vec<RoomListEntry>,
    count: Option<u32>,
    state: Option<SyncState>,
    ranges: Vec<RoomRange>,
}

#[derive(Debug, Default)]
struct Session {
    pos: String,
    lists: BTreeMap<String, ListSession>,
    subscriptions: BTreeSet<RoomId>,
    sent_rooms: HashMap<RoomId, u64>,
}

/// Pending changes for one list, committed only if the response is sent.
struct ListCommit {
    name: String,
    entries: Vec<RoomListEntry>,
    count: u32,
    state: SyncState,
    ranges: Vec<RoomRange>,
}

struct World {
    rng: ChaCha8Rng,
    clock: u64,
    rooms: BTreeMap<RoomId, SimRoom>,
    session: Option<Session>,
    next_pos: u64,
    error_rate: f64,
    activity_per_request: u32,
    expire_pos: bool,
    revoked: bool,
    requests: Vec<SyncRequest>,
}

impl World {
    fn ordered(&self, sort: &[SortKey], filters: &ListFilters) -> Vec<RoomId> {
        let mut rooms: Vec<&SimRoom> = self.rooms.values().filter(|r| r.matches(filters)).collect();
        rooms.sort_by(|a, b| compare(a, b, sort));
        rooms.into_iter().map(|r| r.room_id.clone()).collect()
    }

    fn touch(&mut self, room_id: &RoomId) -> bool {
        self.clock += 1;
        let clock = self.clock;
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        room.last_activity = clock;
        room.notification_count += 1;
        room.revision += 1;
        true
    }

    fn random_activity(&mut self) {
        if self.rooms.is_empty() {
            return;
        }
        for _ in 0..self.activity_per_request {
            let index = self.rng.gen_range(0..self.rooms.len());
            if let Some(room_id) = self.rooms.keys().nth(index).cloned() {
                self.touch(&room_id);
            }
        }
    }

    /// Fault injection, position validation and subscription bookkeeping.
    fn begin(&mut self, request: &SyncRequest) -> Result<(), TransportError> {
        self.requests.push(request.clone());

        if self.revoked {
            return Err(TransportError::SessionRevoked);
        }
        if self.error_rate > 0.0 && self.rng.gen_bool(self.error_rate) {
            return Err(TransportError::Network("injected fault".to_owned()));
        }

        match &request.pos {
            None => {
                self.expire_pos = false;
                self.session = Some(Session::default());
            },
            Some(pos) => {
                if std::mem::take(&mut self.expire_pos) {
                    self.session = None;
                }
                let known = self.session.as_ref().is_some_and(|s| &s.pos == pos);
                if !known {
                    self.session = None;
                    return Err(TransportError::UnknownPos);
                }
            },
        }

        if let Some(session) = self.session.as_mut() {
            session.lists.retain(|name, _| request.lists.contains_key(name));
            for room_id in &request.unsubscribe_rooms {
                session.subscriptions.remove(room_id);
            }
            for room_id in request.room_subscriptions.keys() {
                if self.rooms.contains_key(room_id) {
                    session.subscriptions.insert(room_id.clone());
                }
            }
        }

        self.random_activity();
        Ok(())
    }

    /// Build the response for `request`. With `allow_empty` false, returns
    /// `None` (committing nothing) when there is nothing new to say.
    fn collect(
        &mut self,
        request: &SyncRequest,
        allow_empty: bool,
    ) -> Result<Option<SyncResponse>, TransportError> {
        let Some(session) = self.session.as_ref() else {
            return Err(TransportError::UnknownPos);
        };
        if request.pos.as_ref().is_some_and(|pos| *pos != session.pos) {
            return Err(TransportError::UnknownPos);
        }

        let mut lists = BTreeMap::new();
        let mut commits = Vec::new();
        let mut visible = BTreeSet::new();

        for (name, list) in &request.lists {
            let previous = session.lists.get(name);
            let (commit, update) = self.list_update(name, list, previous);
            visible.extend(
                commit.entries.iter().filter(|e| e.is_filled()).filter_map(|e| e.room_id().cloned()),
            );
            if update.count.is_some() || update.state.is_some() || !update.diffs.is_empty() {
                lists.insert(name.clone(), update);
            }
            commits.push(commit);
        }
        visible.extend(session.subscriptions.iter().cloned());

        let mut rooms = BTreeMap::new();
        for room_id in &visible {
            let Some(room) = self.rooms.get(room_id) else {
                continue;
            };
            match session.sent_rooms.get(room_id) {
                None => {
                    rooms.insert(room_id.clone(), room.update(true));
                },
                Some(&sent) if sent < room.revision => {
                    rooms.insert(room_id.clone(), room.update(false));
                },
                Some(_) => {},
            }
        }

        if lists.is_empty() && rooms.is_empty() && !allow_empty {
            return Ok(None);
        }

        self.next_pos += 1;
        let pos = self.next_pos.to_string();
        let revisions: Vec<(RoomId, u64)> = rooms
            .keys()
            .filter_map(|id| self.rooms.get(id).map(|r| (id.clone(), r.revision)))
            .collect();

        let Some(session) = self.session.as_mut() else {
            return Err(TransportError::UnknownPos);
        };
        session.pos.clone_from(&pos);
        session.sent_rooms.extend(revisions);
        for commit in commits {
            let entry = session.lists.entry(commit.name).or_default();
            entry.entries = commit.entries;
            entry.count = Some(commit.count);
            entry.state = Some(commit.state);
            entry.ranges = commit.ranges;
        }

        Ok(Some(SyncResponse { pos, txn_id: Some(request.txn_id.clone()), lists, rooms }))
    }

    fn list_update(
        &self,
        name: &str,
        list: &ListRequest,
        previous: Option<&ListSession>,
    ) -> (ListCommit, ListUpdate) {
        let order = self.ordered(&list.sort, &list.filters);
        let count = order.len() as u32;
        let old: &[RoomListEntry] = previous.map_or(&[], |p| p.entries.as_slice());

        let entries: Vec<RoomListEntry> = order
            .into_iter()
            .enumerate()
            .map(|(i, room_id)| {
                if list.ranges.iter().any(|r| r.contains(i as u32)) {
                    RoomListEntry::Filled(room_id)
                } else {
                    old.get(i).cloned().map(RoomListEntry::invalidate).unwrap_or_default()
                }
            })
            .collect();

        let state = match previous.and_then(|p| p.state) {
            None => SyncState::Preload,
            Some(prev) => {
                let stable = previous.is_some_and(|p| p.ranges == list.ranges);
                prev.max(if stable { SyncState::Live } else { SyncState::CatchingUp })
            },
        };

        let update = ListUpdate {
            count: (previous.and_then(|p| p.count) != Some(count)).then_some(count),
            state: (previous.and_then(|p| p.state) != Some(state)).then_some(state),
            diffs: diff_lists(old, &entries),
        };
        let commit = ListCommit {
            name: name.to_owned(),
            entries,
            count,
            state,
            ranges: list.ranges.clone(),
        };
        (commit, update)
    }
}

struct Inner {
    world: Mutex<World>,
    activity: watch::Sender<u64>,
}

/// Simulated sliding sync homeserver.
///
/// Clones share the same universe and session.
#[derive(Clone)]
pub struct SimHomeserver {
    inner: Arc<Inner>,
}

impl SimHomeserver {
    /// Empty universe.
    pub fn new(seed: u64) -> Self {
        let (activity, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                world: Mutex::new(World {
                    rng: ChaCha8Rng::seed_from_u64(seed),
                    clock: 0,
                    rooms: BTreeMap::new(),
                    session: None,
                    next_pos: 0,
                    error_rate: 0.0,
                    activity_per_request: 0,
                    expire_pos: false,
                    revoked: false,
                    requests: Vec::new(),
                }),
                activity,
            }),
        }
    }

    /// Universe of `count` rooms with seeded names, DM flags and activity.
    ///
    /// Every fourth room is a DM.
    pub fn with_rooms(seed: u64, count: usize) -> Result<Self, ProtocolError> {
        let server = Self::new(seed);
        {
            let mut world = server.inner.world.lock();
            for i in 0..count {
                let room_id = RoomId::parse(format!("!room{i:04}:{SIM_SERVER_NAME}"))?;
                let name = format!("Room {:04}", world.rng.gen_range(0..10_000));
                world.rooms.insert(room_id.clone(), SimRoom::new(room_id.clone(), name, i % 4 == 0));
                world.touch(&room_id);
            }
        }
        Ok(server)
    }

    /// Add a room and give it fresh activity.
    pub fn add_room(&self, room_id: RoomId, name: impl Into<String>, is_dm: bool) {
        {
            let mut world = self.inner.world.lock();
            world.rooms.insert(room_id.clone(), SimRoom::new(room_id.clone(), name.into(), is_dm));
            world.touch(&room_id);
        }
        self.notify();
    }

    /// Remove a room from the universe.
    pub fn remove_room(&self, room_id: &RoomId) -> bool {
        let removed = self.inner.world.lock().rooms.remove(room_id).is_some();
        if removed {
            self.notify();
        }
        removed
    }

    /// Post a message in `room_id`, moving it to the top of recency order.
    pub fn bump(&self, room_id: &RoomId) -> bool {
        let touched = self.inner.world.lock().touch(room_id);
        if touched {
            self.notify();
        }
        touched
    }

    /// Set a room's highlight count.
    pub fn set_highlights(&self, room_id: &RoomId, highlights: u64) -> bool {
        let changed = {
            let mut world = self.inner.world.lock();
            world.rooms.get_mut(room_id).map(|room| {
                room.highlight_count = highlights;
                room.revision += 1;
            })
        };
        if changed.is_some() {
            self.notify();
        }
        changed.is_some()
    }

    /// Fraction of requests (0.0 to 1.0) failing with a network error.
    pub fn set_error_rate(&self, rate: f64) {
        self.inner.world.lock().error_rate = rate.clamp(0.0, 1.0);
    }

    /// Random room bumps performed per request.
    pub fn set_activity_per_request(&self, bumps: u32) {
        self.inner.world.lock().activity_per_request = bumps;
    }

    /// Forget the current session. The next request carrying a `pos` fails
    /// with `UnknownPos`.
    pub fn expire_pos(&self) {
        self.inner.world.lock().expire_pos = true;
        self.notify();
    }

    /// Revoke the access token. Every later request fails fatally.
    pub fn revoke(&self) {
        self.inner.world.lock().revoked = true;
        self.notify();
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.inner.world.lock().requests.clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.inner.world.lock().requests.len()
    }

    /// Room ids in the universe, sorted.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.inner.world.lock().rooms.keys().cloned().collect()
    }

    /// Current state of one room.
    pub fn room(&self, room_id: &RoomId) -> Option<SimRoom> {
        self.inner.world.lock().rooms.get(room_id).cloned()
    }

    /// Full server-side order for a sort and filter combination.
    pub fn expected_order(&self, sort: &[SortKey], filters: &ListFilters) -> Vec<RoomId> {
        self.inner.world.lock().ordered(sort, filters)
    }

    fn notify(&self) {
        self.inner.activity.send_modify(|revision| *revision += 1);
    }

    async fn serve(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        let mut activity = {
            let mut world = self.inner.world.lock();
            world.begin(&request)?;
            let long_poll = request.timeout_ms > 0;
            if let Some(response) = world.collect(&request, !long_poll)? {
                return Ok(response);
            }
            self.inner.activity.subscribe()
        };

        let wait = Duration::from_millis(request.timeout_ms);
        if tokio::time::timeout(wait, activity.changed()).await.is_err() {
            tracing::trace!(timeout_ms = request.timeout_ms, "long poll expired without activity");
        }

        let mut world = self.inner.world.lock();
        world.collect(&request, true)?.ok_or(TransportError::UnknownPos)
    }
}

impl Transport for SimHomeserver {
    fn sync(
        &self,
        request: SyncRequest,
    ) -> impl std::future::Future<Output = Result<SyncResponse, TransportError>> + Send {
        let server = self.clone();
        async move { server.serve(request).await }
    }
}
