//! Protocol types for Glide.
//!
//! The decoded shapes exchanged between the sliding sync engine and its
//! transport collaborator. Nothing in this crate performs I/O: a transport
//! turns bytes into a [`SyncResponse`] and a [`SyncRequest`] into bytes, and
//! the engine in `glide-core` only ever sees these values.
//!
//! # Components
//!
//! - [`RoomId`]: validated Matrix room identifier
//! - [`RoomListEntry`] / [`RoomListDiff`]: positional list slots and the edit
//!   operations applied to them
//! - [`SyncRequest`] / [`ListRequest`]: what the client asks for each cycle
//! - [`SyncResponse`] / [`ListUpdate`] / [`RoomUpdate`]: what comes back
//! - [`SyncState`]: per-view synchronization phase

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
mod ids;
mod list;
mod request;
mod response;

pub use errors::{ProtocolError, Result};
pub use ids::RoomId;
pub use list::{RoomListDiff, RoomListEntry};
pub use request::{
    ListFilters, ListRequest, RequiredStateField, RoomRange, RoomSubscription, SortKey, SyncRequest,
};
pub use response::{
    LatestMessage, ListUpdate, RoomUpdate, SyncResponse, SyncState, UnreadNotifications,
};
