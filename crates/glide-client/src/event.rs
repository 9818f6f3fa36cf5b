//! Session-level events delivered to observers.

use glide_core::UpdateSummary;

use crate::error::SyncError;

/// What the sync loop reports after each cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A response was applied and something changed.
    Update(UpdateSummary),
    /// A cycle failed; the loop backs off and retries.
    RecoverableError(SyncError),
    /// The loop hit a fatal error and exited. Delivered at most once per
    /// session.
    Terminated(SyncError),
}
