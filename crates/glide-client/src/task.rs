//! Cancellable handles for background tasks.
//!
//! Every background task (a sync loop or an observer feed) is spawned with a
//! [`CancellationToken`] and wrapped in a [`TaskHandle`]. Sync loops run as
//! async tasks; observer feeds run on the blocking pool. Cancellation is
//! cooperative: the task checks the token at its own iteration boundaries and
//! is never aborted mid-step. Dropping a handle that was not cancelled cancels
//! the task, so no loop outlives every reference to it.

use std::future::Future;

use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Owning handle to one background task.
#[derive(Debug)]
pub struct TaskHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `f` on `runtime`, handing it the task's cancellation token.
    pub(crate) fn spawn<F, Fut>(runtime: &Handle, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = runtime.spawn(f(cancel.clone()));
        Self { cancel, task: Some(task) }
    }

    /// Run `f` on `runtime`'s blocking pool, handing it the task's
    /// cancellation token.
    pub(crate) fn spawn_blocking<F>(runtime: &Handle, f: F) -> Self
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = runtime.spawn_blocking(move || f(token));
        Self { cancel, task: Some(task) }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Request a cooperative stop. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clonable handle that can only cancel, e.g. to move into an observer
    /// callback.
    pub fn canceller(&self) -> TaskCanceller {
        TaskCanceller(self.cancel.clone())
    }

    /// Whether the task has run to completion.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the task to finish. Does not cancel it.
    ///
    /// # Errors
    ///
    /// Returns the join error if the task panicked.
    pub async fn join(mut self) -> Result<(), tokio::task::JoinError> {
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        // A joined task is already finished; cancelling it is a no-op.
        if !self.cancel.is_cancelled() {
            tracing::trace!("task handle dropped, cancelling task");
            self.cancel.cancel();
        }
    }
}

/// Cancel-only handle to a background task.
#[derive(Debug, Clone)]
pub struct TaskCanceller(CancellationToken);

impl TaskCanceller {
    /// Request a cooperative stop.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}
