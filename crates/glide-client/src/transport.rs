//! Network collaborator for the sync loop.
//!
//! The loop hands a [`SyncRequest`] to a [`Transport`] and gets back a decoded
//! [`SyncResponse`] or a classified [`TransportError`]. Authentication, HTTP
//! retries and body encoding are the transport's business; the loop only
//! cares whether an error is fatal, a lost position, or worth retrying.

use std::future::Future;

use glide_proto::{SyncRequest, SyncResponse};
use thiserror::Error;

/// Matrix error code for an expired position token.
pub const M_UNKNOWN_POS: &str = "M_UNKNOWN_POS";

/// Matrix error code for an invalid or expired access token.
pub const M_UNKNOWN_TOKEN: &str = "M_UNKNOWN_TOKEN";

/// Matrix error code for a forbidden request.
pub const M_FORBIDDEN: &str = "M_FORBIDDEN";

/// Performs one sliding sync round trip.
///
/// Implementations must be cheap to call repeatedly; the loop issues one call
/// per cycle and never overlaps calls from the same loop.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and wait for the decoded response.
    fn sync(
        &self,
        request: SyncRequest,
    ) -> impl Future<Output = Result<SyncResponse, TransportError>> + Send;
}

/// Transport errors, classified for the sync loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, timeout or other network-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Server answered with an error status
    #[error("server error {status} {errcode}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Matrix error code
        errcode: String,
        /// Human-readable message
        message: String,
    },

    /// Server no longer knows our position token
    #[error("unknown position token")]
    UnknownPos,

    /// Access token revoked or session logged out
    #[error("session revoked")]
    SessionRevoked,
}

impl TransportError {
    /// Returns true if the session cannot continue.
    ///
    /// Revoked sessions and authorization failures will not succeed on retry.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::SessionRevoked => true,
            Self::Server { status, errcode, .. } => {
                matches!(status, 401 | 403)
                    || errcode == M_UNKNOWN_TOKEN
                    || errcode == M_FORBIDDEN
            },
            Self::Network(_) | Self::Decode(_) | Self::UnknownPos => false,
        }
    }

    /// Returns true if the server lost our position and the session must
    /// restart from scratch.
    pub fn is_unknown_pos(&self) -> bool {
        match self {
            Self::UnknownPos => true,
            Self::Server { errcode, .. } => errcode == M_UNKNOWN_POS,
            _ => false,
        }
    }

    /// Returns true if the same request may succeed after a back-off.
    pub fn is_transient(&self) -> bool {
        !self.is_fatal() && !self.is_unknown_pos()
    }
}
