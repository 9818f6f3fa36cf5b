//! Sliding sync session and its background loop.
//!
//! A [`SlidingSync`] owns the shared engine state and spawns at most one live
//! sync loop at a time. Each loop iteration:
//!
//! 1. checks for cancellation
//! 2. builds a request under the engine write lock
//! 3. awaits the transport with no lock held
//! 4. applies the whole response and enqueues its updates under one
//!    write-lock acquisition
//! 5. persists a snapshot (if a store is configured) with no engine lock held
//!
//! Starting a new loop supersedes the previous one. Every loop carries a
//! generation number checked under the engine lock, so a superseded loop
//! whose response arrives late discards it instead of applying it.
//!
//! Updates are enqueued before the engine lock is released. A reader that
//! snapshots a view and registers for its diffs under one read lock (see
//! [`ViewHandle::room_list_stream`]) therefore sees every later cycle exactly
//! once, however long a store takes to save.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use glide_core::{
    ConfigError, EngineError, Environment, RoomProvider, SessionSnapshot, SlidingSyncRoom,
    SyncEngine, View,
};
use glide_proto::{RoomId, RoomSubscription, SyncResponse};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    dispatch::{Dispatcher, Observer, Subscription},
    error::{SessionError, StoreError, SyncError},
    event::SessionEvent,
    store::SessionStore,
    system_env::SystemEnv,
    task::{TaskCanceller, TaskHandle},
    transport::{Transport, TransportError},
    view_handle::ViewHandle,
};

/// Default back-off after a recoverable error.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Long-poll timeout sent once the session is caught up
    pub poll_timeout: Duration,
    /// Sleep between a recoverable error and the next attempt
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_timeout: glide_core::engine::DEFAULT_POLL_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// State shared between the session, its view handles and its loops.
pub(crate) struct SessionState {
    pub(crate) engine: RwLock<SyncEngine>,
    pub(crate) dispatcher: Dispatcher,
    /// Taken under the engine lock and held until the snapshot is saved, so
    /// saves land in cycle order.
    persist_order: Mutex<()>,
    /// Request-to-response time of the last applied cycle.
    round_trip: Mutex<Option<Duration>>,
    generation: AtomicU64,
    stopped: AtomicBool,
}

/// Snapshot store plus the key this session persists under.
struct StoreBinding {
    store: Arc<dyn SessionStore>,
    key: String,
}

impl StoreBinding {
    fn restore_into(&self, engine: &mut SyncEngine) {
        match self.store.load(&self.key) {
            Ok(Some(bytes)) => match SessionSnapshot::from_bytes(&bytes) {
                Ok(snapshot) => {
                    let restored = engine.restore(snapshot);
                    tracing::info!(key = %self.key, restored, "restored session snapshot");
                },
                Err(err) => {
                    tracing::warn!(key = %self.key, %err, "discarding unreadable session snapshot");
                },
            },
            Ok(None) => tracing::debug!(key = %self.key, "no session snapshot stored"),
            Err(err) => tracing::warn!(key = %self.key, %err, "failed to load session snapshot"),
        }
    }

    fn persist(&self, snapshot: &SessionSnapshot) {
        let result = snapshot
            .to_bytes()
            .map_err(|e| StoreError::Serialization(e.to_string()))
            .and_then(|bytes| self.store.save(&self.key, &bytes));
        if let Err(err) = result {
            tracing::warn!(key = %self.key, %err, "failed to persist session snapshot");
        }
    }
}

/// Builder for [`SlidingSync`].
pub struct SlidingSyncBuilder {
    homeserver: String,
    config: SessionConfig,
    views: Vec<View>,
    subscriptions: Vec<(RoomId, RoomSubscription)>,
    store: Option<StoreBinding>,
}

impl SlidingSyncBuilder {
    /// Start a session against `homeserver`.
    pub fn new(homeserver: impl Into<String>) -> Self {
        Self {
            homeserver: homeserver.into(),
            config: SessionConfig::default(),
            views: Vec::new(),
            subscriptions: Vec::new(),
            store: None,
        }
    }

    /// Replace the loop timing.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Long-poll timeout once caught up.
    #[must_use]
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    /// Back-off after recoverable errors.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Add a view.
    #[must_use]
    pub fn add_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Subscribe to a room from the first request.
    #[must_use]
    pub fn subscribe(mut self, room_id: RoomId, settings: RoomSubscription) -> Self {
        self.subscriptions.push((room_id, settings));
        self
    }

    /// Restore from and persist to `store` under `key`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>, key: impl Into<String>) -> Self {
        self.store = Some(StoreBinding { store, key: key.into() });
        self
    }

    /// Validate the configuration and create the session.
    ///
    /// If a store is configured, a previously saved snapshot is restored:
    /// views keep their cached lists and counts but start `Cold`. Store
    /// failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidHomeserver` if the URL does not parse or is not
    ///   http(s)
    /// - `ConfigError::DuplicateView` if two views share a name
    pub fn build<T: Transport, E: Environment>(
        self,
        transport: T,
        env: E,
    ) -> Result<SlidingSync<T, E>, ConfigError> {
        let homeserver = parse_homeserver(&self.homeserver)?;

        let mut engine = SyncEngine::new().with_poll_timeout(self.config.poll_timeout);
        for view in self.views {
            engine.add_view(view)?;
        }
        for (room_id, settings) in self.subscriptions {
            engine.subscribe(room_id, settings);
        }
        if let Some(binding) = &self.store {
            binding.restore_into(&mut engine);
        }

        Ok(SlidingSync {
            homeserver,
            config: self.config,
            state: Arc::new(SessionState {
                engine: RwLock::new(engine),
                dispatcher: Dispatcher::default(),
                persist_order: Mutex::new(()),
                round_trip: Mutex::new(None),
                generation: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
            transport: Arc::new(transport),
            env,
            store: self.store.map(Arc::new),
            running: Mutex::new(None),
        })
    }
}

fn parse_homeserver(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidHomeserver {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidHomeserver {
            url: raw.to_owned(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    Ok(url)
}

/// A sliding sync session.
///
/// Cheap accessors read the shared engine under a read lock; they never
/// observe a response half-applied.
pub struct SlidingSync<T: Transport, E: Environment = SystemEnv> {
    homeserver: Url,
    config: SessionConfig,
    state: Arc<SessionState>,
    transport: Arc<T>,
    env: E,
    store: Option<Arc<StoreBinding>>,
    running: Mutex<Option<TaskCanceller>>,
}

impl<T: Transport, E: Environment> SlidingSync<T, E> {
    /// Start configuring a session.
    pub fn builder(homeserver: impl Into<String>) -> SlidingSyncBuilder {
        SlidingSyncBuilder::new(homeserver)
    }

    /// Validated homeserver URL.
    pub fn homeserver(&self) -> &Url {
        &self.homeserver
    }

    /// Loop timing.
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Start the background sync loop.
    ///
    /// Any loop started earlier is cancelled and superseded: if its
    /// in-flight response arrives after this call, it is discarded.
    ///
    /// # Errors
    ///
    /// - `SessionError::Stopped` after a fatal error
    /// - `SessionError::NoRuntime` outside a tokio runtime
    pub fn sync(&self) -> Result<TaskHandle, SessionError> {
        if self.is_stopped() {
            return Err(SessionError::Stopped);
        }
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let mut running = self.running.lock();
        let generation = {
            let _engine = self.state.engine.write();
            self.state.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        if let Some(previous) = running.take() {
            tracing::info!(generation, "superseding previous sync loop");
            previous.cancel();
        }

        let sync_loop = SyncLoop {
            state: Arc::clone(&self.state),
            transport: Arc::clone(&self.transport),
            env: self.env.clone(),
            store: self.store.clone(),
            retry_delay: self.config.retry_delay,
            generation,
        };
        let handle = TaskHandle::spawn(&runtime, move |cancel| sync_loop.run(cancel));
        *running = Some(handle.canceller());
        Ok(handle)
    }

    /// Cancel the current sync loop, if any. Returns whether one was running.
    pub fn stop_sync(&self) -> bool {
        match self.running.lock().take() {
            Some(canceller) => {
                canceller.cancel();
                true
            },
            None => false,
        }
    }

    /// Whether a fatal error stopped the session.
    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Subscribe to a room. Takes effect on the next request.
    pub fn subscribe(&self, room_id: RoomId, settings: RoomSubscription) {
        self.state.engine.write().subscribe(room_id, settings);
    }

    /// End a room subscription. Takes effect on the next request.
    pub fn unsubscribe(&self, room_id: &RoomId) {
        self.state.engine.write().unsubscribe(room_id);
    }

    /// Whether `room_id` has an active subscription.
    pub fn is_subscribed(&self, room_id: &RoomId) -> bool {
        self.state.engine.read().is_subscribed(room_id)
    }

    /// Add a view between round trips.
    ///
    /// # Errors
    ///
    /// - `ConfigError::DuplicateView` if the name is taken
    pub fn add_view(&self, view: View) -> Result<ViewHandle, ConfigError> {
        let name = view.name().to_owned();
        self.state.engine.write().add_view(view)?;
        Ok(ViewHandle::new(name, Arc::clone(&self.state)))
    }

    /// Remove a view. Its observers stop receiving updates.
    pub fn remove_view(&self, name: &str) -> bool {
        let removed = self.state.engine.write().remove_view(name).is_some();
        if removed {
            self.state.dispatcher.remove_view(name);
        }
        removed
    }

    /// Handle to a view.
    pub fn view(&self, name: &str) -> Option<ViewHandle> {
        let exists = self.state.engine.read().view(name).is_some();
        exists.then(|| ViewHandle::new(name.to_owned(), Arc::clone(&self.state)))
    }

    /// Names of all views, sorted.
    pub fn view_names(&self) -> Vec<String> {
        self.state.engine.read().views().map(|v| v.name().to_owned()).collect()
    }

    /// Room summary.
    pub fn room(&self, room_id: &RoomId) -> Option<SlidingSyncRoom> {
        self.state.engine.read().room(room_id).cloned()
    }

    /// Room summaries, in the order asked for.
    pub fn rooms(&self, room_ids: &[RoomId]) -> Vec<Option<SlidingSyncRoom>> {
        let engine = self.state.engine.read();
        engine.rooms(room_ids).into_iter().map(|room| room.cloned()).collect()
    }

    /// Materialize the full room entity for `room_id` through `provider`.
    pub fn full_room<P: RoomProvider>(&self, room_id: &RoomId, provider: &P) -> Option<P::Room> {
        let room = self.room(room_id)?;
        room.full_room(provider)
    }

    /// Request-to-response time of the last applied cycle, measured on the
    /// session's environment clock. `None` before the first cycle.
    pub fn last_round_trip(&self) -> Option<Duration> {
        *self.state.round_trip.lock()
    }

    /// Current cached state, as it would be persisted.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.engine.read().snapshot()
    }

    /// Register a callback for session events.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoRuntime` outside a tokio runtime
    pub fn observe_events<O: Observer<SessionEvent>>(
        &self,
        observer: O,
    ) -> Result<TaskHandle, SessionError> {
        self.state.dispatcher.events.observe("session_events", observer)
    }

    /// Channel of session events.
    pub fn subscribe_events(&self) -> Subscription<SessionEvent> {
        self.state.dispatcher.events.subscribe()
    }
}

/// Everything one loop needs, moved into its task.
struct SyncLoop<T, E> {
    state: Arc<SessionState>,
    transport: Arc<T>,
    env: E,
    store: Option<Arc<StoreBinding>>,
    retry_delay: Duration,
    generation: u64,
}

impl<T: Transport, E: Environment> SyncLoop<T, E> {
    async fn run(self, cancel: CancellationToken) {
        tracing::info!(generation = self.generation, "sync loop started");
        let mut lost_pos = false;

        while !cancel.is_cancelled() {
            let request = {
                let mut engine = self.state.engine.write();
                if !self.is_current() {
                    break;
                }
                engine.build_request(self.env.transaction_id())
            };
            tracing::debug!(
                txn_id = %request.txn_id,
                pos = ?request.pos,
                lists = request.lists.len(),
                timeout_ms = request.timeout_ms,
                "sending sync request"
            );

            let started = self.env.now();
            let response = match self.transport.sync(request).await {
                Ok(response) => response,
                Err(err) if err.is_unknown_pos() => {
                    if !self.on_unknown_pos(err, lost_pos, &cancel).await {
                        break;
                    }
                    lost_pos = true;
                    continue;
                },
                Err(err) => {
                    if !self.on_transport_error(err, &cancel).await {
                        break;
                    }
                    continue;
                },
            };
            let round_trip = self.env.now() - started;
            tracing::debug!(?round_trip, "sync response received");

            match self.apply(response, round_trip) {
                Ok(true) => lost_pos = false,
                Ok(false) => {
                    tracing::debug!(
                        generation = self.generation,
                        "discarding response of superseded loop"
                    );
                    break;
                },
                Err(err) if err.is_transient() => {
                    if !self.back_off(SyncError::Engine(err), &cancel).await {
                        break;
                    }
                },
                Err(err) => {
                    self.terminate(SyncError::Engine(err));
                    break;
                },
            }
        }

        tracing::info!(generation = self.generation, "sync loop stopped");
    }

    fn is_current(&self) -> bool {
        self.state.generation.load(Ordering::SeqCst) == self.generation
    }

    /// Apply a response. `Ok(false)` if this loop was superseded meanwhile.
    fn apply(&self, response: SyncResponse, round_trip: Duration) -> Result<bool, EngineError> {
        let mut engine = self.state.engine.write();
        if !self.is_current() {
            return Ok(false);
        }
        let actions = engine.apply_response(response)?;
        *self.state.round_trip.lock() = Some(round_trip);
        self.state.dispatcher.dispatch(&actions);

        let Some(binding) = &self.store else {
            return Ok(true);
        };
        let snapshot = engine.snapshot();
        let order = self.state.persist_order.lock();
        drop(engine);

        binding.persist(&snapshot);
        drop(order);
        Ok(true)
    }

    /// Restart the session after the server dropped our position. A second
    /// loss in a row without an applied cycle in between also backs off.
    /// Returns whether the loop should continue.
    async fn on_unknown_pos(
        &self,
        err: TransportError,
        again: bool,
        cancel: &CancellationToken,
    ) -> bool {
        {
            let mut engine = self.state.engine.write();
            if !self.is_current() {
                return false;
            }
            engine.restart();
        }
        if again {
            return self.back_off(SyncError::Transport(err), cancel).await;
        }
        tracing::warn!(%err, "server lost our position, restarting session");
        true
    }

    /// Returns whether the loop should continue.
    async fn on_transport_error(&self, err: TransportError, cancel: &CancellationToken) -> bool {
        if !self.is_current() {
            return false;
        }
        if err.is_fatal() {
            self.terminate(SyncError::Transport(err));
            return false;
        }
        self.back_off(SyncError::Transport(err), cancel).await
    }

    /// Report a recoverable error and sleep. Returns false if cancelled while
    /// sleeping.
    async fn back_off(&self, err: SyncError, cancel: &CancellationToken) -> bool {
        tracing::warn!(%err, retry_in = ?self.retry_delay, "sync cycle failed");
        self.state.dispatcher.events.send(&SessionEvent::RecoverableError(err));

        tokio::select! {
            () = cancel.cancelled() => false,
            () = self.env.sleep(self.retry_delay) => true,
        }
    }

    fn terminate(&self, err: SyncError) {
        if self.state.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::error!(%err, "sync loop terminated by fatal error");
        self.state.dispatcher.events.send(&SessionEvent::Terminated(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homeserver_must_be_http() {
        assert!(parse_homeserver("https://matrix.example.org").is_ok());
        assert!(parse_homeserver("http://localhost:8008").is_ok());
        assert!(matches!(
            parse_homeserver("ftp://example.org"),
            Err(ConfigError::InvalidHomeserver { .. })
        ));
        assert!(matches!(
            parse_homeserver("not a url"),
            Err(ConfigError::InvalidHomeserver { .. })
        ));
    }
}
