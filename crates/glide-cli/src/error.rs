//! Binary-level errors.

use std::path::PathBuf;

use glide_client::{SessionError, StoreError, TransportError};
use glide_core::ConfigError;
use glide_proto::ProtocolError;
use thiserror::Error;

/// Anything that stops the `glide` binary.
#[derive(Error, Debug)]
pub enum CliError {
    /// Session file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Session file is not valid TOML for a session
    #[error("invalid session file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Views, subscriptions or homeserver rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Snapshot store could not be opened
    #[error("snapshot store: {0}")]
    Store(#[from] StoreError),

    /// Transport could not be constructed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session refused to start
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Simulated homeserver could not be seeded
    #[error("simulator: {0}")]
    Simulator(#[from] ProtocolError),

    /// No access token for a real homeserver
    #[error("an access token is required unless --sim is given")]
    MissingToken,

    /// The sync loop terminated with a fatal error
    #[error("sync terminated: {0}")]
    Terminated(String),
}
