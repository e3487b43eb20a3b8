//! Consumer-visible binding state.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Position of a binding in its fetch state machine.
///
/// ```text
/// Idle ──► Loading ──► Fresh
///             │  ▲       │
///             ▼  └───────┤ (stale observe / refetch)
///          Errored ──────┘
///
/// any ──invalidate──► Invalidated ──observe──► Loading
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingPhase {
    /// No producer has run yet.
    Idle,
    /// A producer call is outstanding.
    Loading,
    /// The last call succeeded (or a fresh entry was served).
    Fresh,
    /// The last call failed.
    Errored,
    /// The key was invalidated; the next observation must fetch.
    Invalidated,
}

impl fmt::Display for BindingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindingPhase::Idle => "idle",
            BindingPhase::Loading => "loading",
            BindingPhase::Fresh => "fresh",
            BindingPhase::Errored => "errored",
            BindingPhase::Invalidated => "invalidated",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a binding.
///
/// `data` keeps the last resolved value while a refetch is in progress, so a
/// consumer can keep rendering it next to a loading indicator.
#[derive(Debug)]
pub struct BindingSnapshot<T> {
    /// Key the binding observes.
    pub key: String,
    /// Last known value, fresh or stale.
    pub data: Option<Arc<T>>,
    /// True while a producer call for this binding is outstanding
    /// (or after invalidation, until the next fetch settles).
    pub loading: bool,
    /// Message of the last genuine failure.
    pub error: Option<String>,
    /// State machine position.
    pub phase: BindingPhase,
}

impl<T> BindingSnapshot<T> {
    /// Snapshot of a binding that has not fetched anything.
    pub fn idle(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: None,
            loading: false,
            error: None,
            phase: BindingPhase::Idle,
        }
    }

    /// Borrow of the current value, if any.
    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }

    /// True when no fetch is outstanding and the binding is not waiting on one.
    pub fn is_settled(&self) -> bool {
        !self.loading
    }

    /// True if the last attempt failed.
    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }
}

impl<T> Clone for BindingSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            data: self.data.clone(),
            loading: self.loading,
            error: self.error.clone(),
            phase: self.phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_snapshot() {
        let snap: BindingSnapshot<Vec<u32>> = BindingSnapshot::idle("projects");
        assert_eq!(snap.key, "projects");
        assert!(snap.data().is_none());
        assert!(snap.is_settled());
        assert!(!snap.is_errored());
        assert_eq!(snap.phase, BindingPhase::Idle);
    }

    #[test]
    fn test_clone_shares_data() {
        // Values need not be Clone; the snapshot shares them through Arc
        struct Opaque(u8);

        let snap = BindingSnapshot {
            key: "k".into(),
            data: Some(Arc::new(Opaque(7))),
            loading: true,
            error: None,
            phase: BindingPhase::Loading,
        };
        let copy = snap.clone();

        assert_eq!(copy.data().map(|o| o.0), Some(7));
        assert!(Arc::ptr_eq(snap.data.as_ref().unwrap(), copy.data.as_ref().unwrap()));
        assert!(!copy.is_settled());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(BindingPhase::Invalidated.to_string(), "invalidated");
        assert_eq!(BindingPhase::Fresh.to_string(), "fresh");
    }
}
