//! Session-level error types.

use glide_core::{ConfigError, EngineError};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned synchronously by session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session hit a fatal error and will not sync again
    #[error("session stopped after a fatal error")]
    Stopped,

    /// Called outside a tokio runtime
    #[error("no tokio runtime available to spawn onto")]
    NoRuntime,

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised inside the sync loop, delivered as session events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Round trip failed
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Response could not be applied
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
}

impl SyncError {
    /// Returns true if the loop retries after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Engine(e) => e.is_transient(),
        }
    }
}

/// Snapshot store failures. Logged by the session, never fatal to it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backing store failed
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Snapshot could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}
