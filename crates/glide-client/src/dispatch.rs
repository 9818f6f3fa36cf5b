//! Update fan-out from the sync loop to observers.
//!
//! Dispatch only ever enqueues: each registration owns an unbounded channel,
//! and the sync loop pushes a clone of every update into it. Callback
//! observers get a dedicated feed on the runtime's blocking pool that drains
//! the channel and runs the callback. A callback may block for as long as it
//! likes: no session lock is held while it runs, and neither the sync loop
//! nor the runtime's worker threads wait on it. Registrations whose receiving
//! side is gone are pruned on the next send.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use glide_core::EngineAction;
use glide_proto::{RoomListDiff, SyncState};
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::mpsc};

use crate::{error::SessionError, event::SessionEvent, task::TaskHandle};

/// Receives updates of type `T` on a dedicated blocking-pool thread.
///
/// Implemented for every `FnMut(T) + Send + 'static` closure.
pub trait Observer<T>: Send + 'static {
    /// Handle one update.
    fn on_update(&mut self, update: T);
}

impl<T, F> Observer<T> for F
where
    F: FnMut(T) + Send + 'static,
{
    fn on_update(&mut self, update: T) {
        self(update);
    }
}

/// Channel-based registration: updates are pulled by the application.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Next update. `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next update if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Fan-out point for one kind of update.
pub(crate) struct Topic<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self { senders: Mutex::new(Vec::new()) }
    }
}

impl<T: Clone + Send + 'static> Topic<T> {
    /// Enqueue `value` for every live registration.
    pub(crate) fn send(&self, value: &T) {
        self.senders.lock().retain(|tx| tx.send(value.clone()).is_ok());
    }

    pub(crate) fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        Subscription { rx }
    }

    /// Register a callback observer on its own blocking-pool feed.
    pub(crate) fn observe<O>(
        &self,
        kind: &'static str,
        mut observer: O,
    ) -> Result<TaskHandle, SessionError>
    where
        O: Observer<T>,
    {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let mut subscription = self.subscribe();
        let feed_runtime = runtime.clone();

        Ok(TaskHandle::spawn_blocking(&runtime, move |cancel| {
            loop {
                let update = feed_runtime.block_on(async {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        update = subscription.recv() => update,
                    }
                });
                let Some(update) = update else { break };

                let result = catch_unwind(AssertUnwindSafe(|| observer.on_update(update)));
                if result.is_err() {
                    tracing::error!(observer = kind, "observer panicked; update dropped");
                }
                if cancel.is_cancelled() {
                    break;
                }
            }
            tracing::trace!(observer = kind, "observer feed stopped");
        }))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.lock().len()
    }
}

/// Per-view observer topics.
#[derive(Default)]
pub(crate) struct ViewTopics {
    pub(crate) diffs: Topic<Vec<RoomListDiff>>,
    pub(crate) count: Topic<u32>,
    pub(crate) state: Topic<SyncState>,
}

/// All observer topics of one session.
#[derive(Default)]
pub(crate) struct Dispatcher {
    views: Mutex<HashMap<String, Arc<ViewTopics>>>,
    pub(crate) events: Topic<SessionEvent>,
}

impl Dispatcher {
    /// Topics for `view`, created on first use.
    pub(crate) fn view(&self, view: &str) -> Arc<ViewTopics> {
        Arc::clone(self.views.lock().entry(view.to_owned()).or_default())
    }

    /// Drop a removed view's topics, closing its registrations.
    pub(crate) fn remove_view(&self, view: &str) {
        self.views.lock().remove(view);
    }

    /// Enqueue engine actions for their observers, in order.
    pub(crate) fn dispatch(&self, actions: &[EngineAction]) {
        for action in actions {
            match action {
                EngineAction::ViewDiffs { view, diffs } => self.view(view).diffs.send(diffs),
                EngineAction::RoomCountChanged { view, count } => self.view(view).count.send(count),
                EngineAction::StateChanged { view, state } => self.view(view).state.send(state),
                EngineAction::RoomsUpdated { .. } => {},
                EngineAction::Summary(summary) => {
                    self.events.send(&SessionEvent::Update(summary.clone()));
                },
            }
        }
    }
}
