//! Queued transactions, as fed into [`super::EVMWorld`] by the corpus bridge.

use crate::{engine::EVMTransaction, value::VarContext};

/// One transaction waiting to run, together with the seed values for any
/// symbolic fields it carries and the block-state drift that should be
/// applied before it runs.
///
/// Mirrors `AbstractTx` in the source tool: a world is driven by a sequence
/// of these, each advancing the block number/timestamp by a (possibly
/// symbolic) amount before the transaction itself executes.
#[derive(Clone, Debug)]
pub struct AbstractTx {
    pub tx: EVMTransaction,
    pub block_num_inc: crate::value::Value,
    pub block_timestamp_inc: crate::value::Value,
    pub ctx: VarContext,
}

impl AbstractTx {
    pub fn new(tx: EVMTransaction) -> Self {
        AbstractTx {
            tx,
            block_num_inc: crate::value::Value::concrete(crate::types::EVMU256::from(1u64)),
            block_timestamp_inc: crate::value::Value::concrete(crate::types::EVMU256::from(1u64)),
            ctx: VarContext::new(),
        }
    }

    pub fn with_ctx(mut self, ctx: VarContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_block_increments(
        mut self,
        block_num_inc: crate::value::Value,
        block_timestamp_inc: crate::value::Value,
    ) -> Self {
        self.block_num_inc = block_num_inc;
        self.block_timestamp_inc = block_timestamp_inc;
        self
    }
}
