//! Sans-IO core of the Glide sliding sync engine.
//!
//! Everything here is synchronous and deterministic. The [`SyncEngine`] turns
//! the application's views and room subscriptions into a [`SyncRequest`] and
//! folds each decoded [`SyncResponse`] back into local state, returning
//! [`EngineAction`]s that describe what changed. The async loop, transport and
//! observer fan-out live in `glide-client`.
//!
//! # Components
//!
//! - [`RoomListModel`]: ordered room list maintained purely by diffs
//! - [`View`] / [`ViewBuilder`]: one named sliding window over the room list
//! - [`RoomCache`] / [`SlidingSyncRoom`]: per-room summaries
//! - [`SyncEngine`]: request building and response application
//! - [`SessionSnapshot`]: CBOR-persisted view and room state
//! - [`Environment`]: time and randomness for drivers
//!
//! [`SyncRequest`]: glide_proto::SyncRequest
//! [`SyncResponse`]: glide_proto::SyncResponse

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod env;
pub mod error;
pub mod room;
pub mod room_list;
pub mod snapshot;
pub mod summary;
pub mod view;

pub use engine::{EngineAction, SyncEngine};
pub use env::Environment;
pub use error::{ConfigError, EngineError, ModelError};
pub use room::{RoomCache, RoomProvider, SlidingSyncRoom};
pub use room_list::{RoomListModel, RoomListSnapshot};
pub use snapshot::{SessionSnapshot, ViewSnapshot};
pub use summary::UpdateSummary;
pub use view::{SyncMode, View, ViewBuilder};
