//! A single pushed execution frame (`EVMRuntime` in the source tool).

use crate::engine::{Engine, Info};
use crate::world::tx::AbstractTx;

/// One frame of execution on a [`super::ContractRunner`]'s stack: the forked
/// engine it runs on, and the snapshot to roll back to if the frame reverts.
pub struct EVMRuntime<E: Engine> {
    pub engine: E,
    init_snapshot: E::Snapshot,
}

impl<E: Engine> EVMRuntime<E> {
    /// Install `tx` (if this frame starts a transaction rather than resuming
    /// a suspended one) and take the snapshot `revert()` rolls back to.
    pub fn new(mut engine: E, tx: Option<&AbstractTx>) -> Self {
        if let Some(tx) = tx {
            engine.merge_vars(&tx.ctx);
            engine.contract_mut().transaction = Some(tx.tx.deepcopy());
        }
        let init_snapshot = engine.take_snapshot();
        EVMRuntime { engine, init_snapshot }
    }

    pub fn run(&mut self) -> Info {
        self.engine.run()
    }

    /// Roll the frame's engine back to the snapshot taken when it started.
    pub fn revert(&mut self) {
        self.engine.restore_snapshot(&self.init_snapshot, false);
    }
}
