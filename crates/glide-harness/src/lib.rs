//! Deterministic simulation harness for Glide.
//!
//! Seeded implementations of the environment, transport and store seams so
//! sync loops can be driven end to end without a network.
//!
//! # Components
//!
//! - [`SimEnv`]: seeded RNG, recorded (not slept) back-off
//! - [`SimHomeserver`]: in-memory sliding sync server over a random room
//!   universe, emitting real diffs via [`diff_lists`]
//! - [`ScriptedTransport`]: canned responses and errors, with gates for
//!   holding a request in flight
//! - [`ChaoticStore`]: snapshot store that fails at a configured rate
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold for any session
//! state, regardless of how it was reached. Use
//! [`InvariantRegistry::standard()`] for the common set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chaotic_store;
pub mod diff;
pub mod invariants;
pub mod scripted;
pub mod sim_env;
pub mod sim_homeserver;

pub use chaotic_store::ChaoticStore;
pub use diff::diff_lists;
pub use invariants::{
    CountMatchesList, FilledRoomsCached, Invariant, InvariantRegistry, InvariantResult,
    NoDuplicateFilled, StateMonotonicity, SystemSnapshot, ViewObservation, Violation,
};
pub use scripted::{Gate, ScriptedTransport};
pub use sim_env::SimEnv;
pub use sim_homeserver::{SimHomeserver, SimRoom};
