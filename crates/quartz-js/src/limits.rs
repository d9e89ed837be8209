//! Resource governance: cooperative time limits and memory introspection.
//!
//! The engine checks for interruption at cooperative points (loop back-edges,
//! function calls) during long-running script execution. A script with no
//! such back-edges can overrun its nominal deadline; that is accepted, not a
//! bug. Memory and stack ceilings are enforced by the engine itself and only
//! configured from here.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Shared state read by the engine's interrupt callback.
///
/// A deadline is armed at the start of each evaluation from the owning
/// context's configured time limit; `None` means no limit is active. The
/// callback runs on the context's affine thread but the state itself is
/// `Send + Sync` so the boxed callback can be handed to the engine.
#[derive(Debug, Default)]
pub(crate) struct InterruptState {
    deadline: Mutex<Option<Instant>>,
}

impl InterruptState {
    /// Arm (or clear) the deadline for the evaluation that is about to run.
    ///
    /// A zero duration arms an already-expired deadline, so the very first
    /// cooperative check aborts execution.
    pub(crate) fn arm(&self, limit: Option<Duration>) {
        *self.deadline.lock() = limit.map(|l| Instant::now() + l);
    }

    /// Whether the armed deadline has passed. Called by the engine at every
    /// cooperative interrupt point; returning `true` aborts execution.
    pub(crate) fn expired(&self) -> bool {
        match *self.deadline.lock() {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// Immutable snapshot of the engine's memory accounting for one runtime.
///
/// All quantities come straight from the engine; `memory_used_size` and
/// `obj_count` are the ones resource-governance tests key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    /// Bytes currently used by live values.
    pub memory_used_size: i64,
    /// Number of live memory blocks backing those values.
    pub memory_used_count: i64,
    /// Bytes currently allocated from the host allocator.
    pub malloc_size: i64,
    /// Number of outstanding allocations.
    pub malloc_count: i64,
    /// Configured allocation ceiling, if any.
    pub malloc_limit: i64,
    /// Number of live objects.
    pub obj_count: i64,
}

impl MemorySnapshot {
    pub(crate) fn capture(runtime: &rquickjs::Runtime) -> Self {
        let usage = runtime.memory_usage();
        Self {
            memory_used_size: usage.memory_used_size,
            memory_used_count: usage.memory_used_count,
            malloc_size: usage.malloc_size,
            malloc_count: usage.malloc_count,
            malloc_limit: usage.malloc_limit,
            obj_count: usage.obj_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmed_state_never_expires() {
        let state = InterruptState::default();
        assert!(!state.expired());
    }

    #[test]
    fn test_zero_limit_expires_immediately() {
        let state = InterruptState::default();
        state.arm(Some(Duration::ZERO));
        assert!(state.expired());
    }

    #[test]
    fn test_disarming_clears_deadline() {
        let state = InterruptState::default();
        state.arm(Some(Duration::ZERO));
        state.arm(None);
        assert!(!state.expired());
    }

    #[test]
    fn test_generous_limit_does_not_expire_yet() {
        let state = InterruptState::default();
        state.arm(Some(Duration::from_secs(3600)));
        assert!(!state.expired());
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = MemorySnapshot {
            memory_used_size: 1024,
            memory_used_count: 10,
            malloc_size: 2048,
            malloc_count: 12,
            malloc_limit: -1,
            obj_count: 3,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["memory_used_size"], 1024);
        assert_eq!(json["obj_count"], 3);
    }
}
