//! Invariant checking for session state.
//!
//! Invariants are properties that must hold for any session state, however
//! it was reached: after one clean response, after a thousand random ones,
//! after restarts and injected faults.
//!
//! Observable state is extracted from a [`glide_core::SyncEngine`] or a
//! running [`glide_client::SlidingSync`] into a [`SystemSnapshot`]. Every
//! registered [`Invariant`] is then run against each view in turn, so a
//! violation always names the view it was found in.
//!
//! ```ignore
//! let snapshot = SystemSnapshot::from_session(&session);
//! InvariantRegistry::standard().assert_all(&snapshot, "after cycle 12");
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{CountMatchesList, FilledRoomsCached, NoDuplicateFilled, StateMonotonicity};
pub use snapshot::{SystemSnapshot, ViewObservation};

/// Outcome of checking one view. `Err` carries a description of the breach.
pub type InvariantResult = Result<(), String>;

/// A broken invariant, located by view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Invariant that failed
    pub invariant: &'static str,
    /// View it failed on
    pub view: String,
    /// What was observed
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.invariant, self.view, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property every view of a session must satisfy.
pub trait Invariant: Send + Sync {
    /// Stable name used in reports.
    fn name(&self) -> &'static str;

    /// Check one view. `session` gives access to state shared across views,
    /// such as the room cache.
    fn check_view(&self, view: &ViewObservation, session: &SystemSnapshot) -> InvariantResult;
}

/// Set of invariants run together.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self { invariants: Vec::new() }
    }

    /// The invariants every session must satisfy, in report order:
    /// [`CountMatchesList`], [`FilledRoomsCached`], [`NoDuplicateFilled`],
    /// [`StateMonotonicity`].
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.add(CountMatchesList);
        registry.add(FilledRoomsCached);
        registry.add(NoDuplicateFilled);
        registry.add(StateMonotonicity);
        registry
    }

    /// Register an invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every invariant on every view. Violations are ordered by view
    /// name, then by registration order.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        for (name, view) in &state.views {
            for invariant in &self.invariants {
                if let Err(message) = invariant.check_view(view, state) {
                    violations.push(Violation {
                        invariant: invariant.name(),
                        view: name.clone(),
                        message,
                    });
                }
            }
        }
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// [`check_all`](Self::check_all), panicking with every violation and
    /// `context` (e.g. the cycle number) on failure.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let lines: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", lines.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use glide_proto::{RoomId, RoomListEntry, SyncState};

    use super::*;

    fn filled(s: &str) -> RoomListEntry {
        RoomListEntry::Filled(RoomId::parse(s).unwrap())
    }

    #[test]
    fn standard_registry_has_invariants() {
        assert_eq!(InvariantRegistry::standard().len(), 4);
        assert!(InvariantRegistry::empty().is_empty());
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&SystemSnapshot::empty()).is_ok());
    }

    #[test]
    fn every_violation_is_reported() {
        let mut snapshot = SystemSnapshot::empty();
        snapshot.add_view(
            "all",
            ViewObservation {
                state: SyncState::Live,
                count: Some(3),
                entries: vec![filled("!a:x"), filled("!a:x")],
                state_history: vec![SyncState::Live, SyncState::Preload],
            },
        );

        let violations = InvariantRegistry::standard().check_all(&snapshot).unwrap_err();
        let names: Vec<_> = violations.iter().map(|v| v.invariant).collect();
        assert_eq!(
            names,
            vec![
                "count_matches_list",
                "filled_rooms_cached",
                "no_duplicate_filled",
                "state_monotonicity",
            ]
        );
        assert!(violations.iter().all(|v| v.view == "all"));
    }

    #[test]
    fn violations_are_grouped_by_view() {
        let mut snapshot = SystemSnapshot::empty();
        snapshot.add_view("b", ViewObservation { count: Some(1), ..ViewObservation::default() });
        snapshot.add_view("a", ViewObservation { count: Some(2), ..ViewObservation::default() });

        let violations = InvariantRegistry::standard().check_all(&snapshot).unwrap_err();
        let views: Vec<_> = violations.iter().map(|v| v.view.as_str()).collect();
        assert_eq!(views, vec!["a", "b"]);
        assert_eq!(
            violations[0].to_string(),
            "count_matches_list [a]: count 2 but list holds 0 entries"
        );
    }

    #[test]
    #[should_panic(expected = "Invariant violation after cycle 3")]
    fn assert_all_panics_with_context() {
        let mut snapshot = SystemSnapshot::empty();
        snapshot.add_view("all", ViewObservation { count: Some(1), ..ViewObservation::default() });
        InvariantRegistry::standard().assert_all(&snapshot, "after cycle 3");
    }
}
