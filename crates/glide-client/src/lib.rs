//! Async runtime for the Glide sliding sync engine.
//!
//! Wraps the Sans-IO [`SyncEngine`](glide_core::SyncEngine) in a shared,
//! lock-protected session and drives it with one background tokio task per
//! sync loop. Updates fan out to observers through per-observer feeds on the
//! blocking pool, so a slow or panicking observer never stalls the loop.
//!
//! # Components
//!
//! - [`SlidingSync`] / [`SlidingSyncBuilder`]: the session and its builder
//! - [`ViewHandle`]: application-facing handle to one view
//! - [`TaskHandle`]: cancellable handle to a sync loop or observer feed
//! - [`Observer`] / [`Subscription`]: callback and channel delivery
//! - [`Transport`]: the network collaborator (`HttpTransport` with the
//!   `http` feature)
//! - [`SessionStore`]: snapshot persistence ([`MemoryStore`], [`RedbStore`])
//! - [`SystemEnv`]: production [`Environment`](glide_core::Environment)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod event;
#[cfg(feature = "http")]
pub mod http;
pub mod session;
pub mod store;
pub mod system_env;
pub mod task;
pub mod transport;
pub mod view_handle;

pub use dispatch::{Observer, Subscription};
pub use error::{SessionError, StoreError, SyncError};
pub use event::SessionEvent;
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use session::{SessionConfig, SlidingSync, SlidingSyncBuilder};
pub use store::{MemoryStore, RedbStore, SessionStore};
pub use system_env::SystemEnv;
pub use task::{TaskCanceller, TaskHandle};
pub use transport::{Transport, TransportError};
pub use view_handle::ViewHandle;
