//! Effects produced by the store's functional core (`commit::apply`).
//!
//! The core is pure; [`crate::store::Store`] executes these after releasing
//! the lock, the way `kimberlite-kernel::effects::Effect` is executed by its
//! runtime rather than by the kernel itself.

use warden_types::ChangeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The in-memory state changed in a way that must be persisted to the
    /// on-disk snapshot (§4.2 "on each commit that modifies persisted
    /// data").
    PersistSnapshot,
    /// A Change reached a ready state; wake anyone awaiting it (§4.2
    /// "notifying waiters when a change reaches a ready state").
    WakeChange(ChangeId),
    /// The task graph changed in a way that may have made a `Do` task
    /// dispatchable (new task, or a predecessor reaching `Done`); wakes the
    /// overlord's work loop (§4.6, §5 suspension point "a woken task").
    TaskGraphChanged,
}
