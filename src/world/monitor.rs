//! Observer hooks attached to an [`super::EVMWorld`].

use crate::engine::{Engine, EVMTransaction};
use crate::world::runtime::EVMRuntime;

/// Callbacks an `EVMWorld` fires as it runs, mirroring the monitor/listener
/// hooks a hybrid-fuzzing harness needs to record coverage or oracle state.
///
/// Default method bodies are no-ops so a monitor only needs to implement the
/// events it cares about.
pub trait WorldMonitor<E: Engine> {
    /// Called once, when the monitor is attached.
    fn on_attach(&mut self) {}

    /// Called whenever a top-level queued transaction is about to start
    /// running, after its frame has been pushed. Not fired for sub-calls.
    fn on_transaction(&mut self, _tx: &EVMTransaction) {}

    /// Called just after a new runtime frame is pushed onto some contract's
    /// stack, before it runs.
    fn on_new_runtime(&mut self, _rt: &EVMRuntime<E>) {}
}

/// A monitor that observes nothing; the default when a world has no
/// attached monitors.
pub struct NullMonitor;

impl<E: Engine> WorldMonitor<E> for NullMonitor {}
