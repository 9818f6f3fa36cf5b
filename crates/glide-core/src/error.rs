//! Error types for the Glide engine.
//!
//! Three layers, matching how errors reach the application:
//!
//! - [`ConfigError`]: rejected synchronously by builders and view mutators
//! - [`ModelError`]: a diff that does not fit the list it targets
//! - [`EngineError`]: failures while applying a whole response

use thiserror::Error;

/// Invalid configuration. Always returned synchronously, never from the loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// View name was empty
    #[error("view name must not be empty")]
    EmptyViewName,

    /// A view with this name already exists in the session
    #[error("duplicate view name: {name}")]
    DuplicateView {
        /// Conflicting name
        name: String,
    },

    /// No view with this name exists in the session
    #[error("unknown view: {name}")]
    UnknownView {
        /// Requested name
        name: String,
    },

    /// Range with `start > end`
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// First index (inclusive)
        start: u32,
        /// Last index (inclusive)
        end: u32,
    },

    /// Ranges cannot be set manually on a view whose ranges grow automatically
    #[error("view {view} computes its own ranges")]
    RangesManaged {
        /// View name
        view: String,
    },

    /// Sort specification was empty
    #[error("sort specification must not be empty")]
    EmptySort,

    /// A sort key was malformed or repeated
    #[error("invalid sort key {key}: {reason}")]
    InvalidSortKey {
        /// Offending key, rendered for display
        key: String,
        /// Which rule it broke
        reason: &'static str,
    },

    /// A required-state pair was malformed or repeated
    #[error("invalid required state ({event_type}, {state_key}): {reason}")]
    InvalidRequiredState {
        /// Event type of the pair
        event_type: String,
        /// State key of the pair
        state_key: String,
        /// Which rule it broke
        reason: &'static str,
    },

    /// Growing mode needs a positive batch size
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    /// Growing mode maximum, when set, must be positive
    #[error("maximum room count must be greater than zero")]
    ZeroMaximum,

    /// Homeserver URL could not be parsed or is not http(s)
    #[error("invalid homeserver url {url:?}: {reason}")]
    InvalidHomeserver {
        /// Rejected input
        url: String,
        /// Parser or scheme error
        reason: String,
    },
}

/// A diff that cannot be applied to the current list.
///
/// Never patched up: the list is left untouched and the error surfaces as a
/// consistency failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Diff index outside the list
    #[error("{op} at index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Diff operation name
        op: &'static str,
        /// Offending index (or target length for truncate)
        index: usize,
        /// List length when the diff was applied
        len: usize,
    },
}

/// Failure while applying a response to the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A view's diffs did not fit its room list
    #[error("view {view}: {source}")]
    Model {
        /// View whose diffs failed
        view: String,
        /// Underlying model error
        #[source]
        source: ModelError,
    },

    /// Response echoed a transaction id we did not send
    #[error("transaction mismatch: expected {expected:?}, got {got:?}")]
    TxnMismatch {
        /// Transaction id of the request in flight, if any
        expected: Option<String>,
        /// Transaction id the response carried
        got: String,
    },

    /// Snapshot could not be encoded or decoded
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl EngineError {
    /// Returns true if this error is transient and the next cycle may succeed.
    ///
    /// A transaction mismatch usually means a stale response raced a newer
    /// request. Model errors mean local and server state have diverged and are
    /// never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TxnMismatch { .. })
    }
}
