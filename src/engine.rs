//! The `Engine` interface required from the symbolic executor.
//!
//! This crate does not ship a symbolic EVM: the interpreter, the memory
//! model and the constraint solver are external collaborators. Everything
//! in this module is the *contract* the orchestrator drives, expressed as a
//! trait so [`crate::world::EVMWorld`] can be written once and instantiated
//! against either a real engine or [`crate::engine::mock::MockEngine`] (used
//! by this crate's own tests).
use crate::{
    error::WorldError,
    types::{EVMAddress, EVMU256},
    value::VarContext,
};
use bytes::Bytes;
use std::collections::HashMap;

/// Which parts of engine state a fork shares with its parent.
///
/// Maps directly onto `engine.duplicate(share={...})` in the source tool.
/// A `ContractRunner`'s root engine shares `{vars, path}` with the world
/// root; each pushed runtime additionally shares `mem` with its runner's
/// root so every frame on one contract sees the same code and storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShareSet {
    pub mem: bool,
    pub vars: bool,
    pub path: bool,
}

impl ShareSet {
    pub const VARS_PATH: ShareSet = ShareSet { mem: false, vars: true, path: true };
    pub const MEM_VARS_PATH: ShareSet = ShareSet { mem: true, vars: true, path: true };
}

/// The kind of an EVM sub-call / contract-creation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxKind {
    Call,
    CallCode,
    DelegateCall,
    Create,
    Create2,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TxKind::Call => "CALL",
            TxKind::CallCode => "CALLCODE",
            TxKind::DelegateCall => "DELEGATECALL",
            TxKind::Create => "CREATE",
            TxKind::Create2 => "CREATE2",
        };
        f.write_str(s)
    }
}

/// Output of a finished transaction, as observed by a caller frame through
/// `result_from_last_call`.
#[derive(Clone, Debug, Default)]
pub struct TxResult {
    pub return_data: Bytes,
    pub return_data_size: u64,
}

/// One EVM transaction, top-level or an outgoing sub-call.
///
/// Mirrors `maat::EVMTransaction`: most fields may be concrete or carry a
/// named symbolic variable (see [`crate::value::Value`]); `recipient` is
/// always concrete since the orchestrator must be able to look it up in
/// `EVMWorld::contracts` without consulting the engine.
#[derive(Clone, Debug)]
pub struct EVMTransaction {
    pub origin: crate::value::Value,
    pub sender: crate::value::Value,
    pub recipient: EVMAddress,
    pub value: crate::value::Value,
    pub data: Bytes,
    pub gas_price: crate::value::Value,
    pub gas_limit: crate::value::Value,
    pub kind: TxKind,
    pub ret_offset: EVMU256,
    pub ret_len: EVMU256,
    pub result: TxResult,
}

impl EVMTransaction {
    /// A deep copy, as `out_tx.deepcopy()` in the source tool.
    pub fn deepcopy(&self) -> Self {
        self.clone()
    }
}

/// Minimal EVM-memory view, just enough for `write_buffer`.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    pub data: Vec<u8>,
}

impl Memory {
    pub fn write_buffer(&mut self, offset: u64, buf: &[u8]) {
        let offset = offset as usize;
        let end = offset + buf.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(buf);
    }
}

/// The per-engine contract view (`contract(engine)` in the source tool):
/// the currently installed transaction, any outgoing sub-call the contract
/// has requested, the result of the last nested call, and the raw EVM
/// stack/memory the orchestrator pushes return values into.
#[derive(Clone, Debug, Default)]
pub struct ContractState {
    pub transaction: Option<EVMTransaction>,
    pub outgoing_transaction: Option<EVMTransaction>,
    pub result_from_last_call: Option<TxResult>,
    pub stack: Vec<EVMU256>,
    pub memory: Memory,
}

/// Decoded EVM exit status (`TX_RES` in the source tool). The engine
/// guarantees this is concrete whenever `Info::stop == StopReason::Exit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Stop,
    Return,
    Revert,
    Other(u32),
}

impl ExitStatus {
    /// `succeeded = exit_status ∈ {STOP, RETURN}`.
    pub fn succeeded(&self) -> bool {
        matches!(self, ExitStatus::Stop | ExitStatus::Return)
    }
}

/// Why the engine suspended execution.
#[derive(Clone, Debug)]
pub enum StopReason {
    /// The current frame terminated (STOP/RETURN/REVERT/other).
    Exit,
    /// The engine suspended mid-execution; check `outgoing_transaction`.
    None,
    /// Any other stop reason (monitor hook, error, instrumentation stop).
    /// The orchestrator does not interpret these; it returns them to its
    /// caller as-is.
    Other(String),
}

/// Result of one `Engine::run()` call.
#[derive(Clone, Debug)]
pub struct Info {
    pub stop: StopReason,
    pub exit_status: Option<ExitStatus>,
}

/// The symbolic-engine interface the orchestrator is generic over.
///
/// Implementations own the actual interpreter, memory model and constraint
/// solver; this crate never reaches past the trait boundary.
pub trait Engine: Sized {
    /// Opaque snapshot token. Only valid for the engine instance that
    /// produced it; becomes meaningless once that engine is dropped.
    type Snapshot: Clone + std::fmt::Debug;

    /// `Engine(ARCH.EVM)`.
    fn new_evm() -> Self;

    /// `engine.duplicate(share=set)`.
    fn fork(&self, share: ShareSet) -> Self;

    /// `engine.vars.update_from(ctx)`.
    fn merge_vars(&mut self, ctx: &VarContext);

    /// Read back the engine's current variable context, used to concretize
    /// a [`crate::value::Value`] (e.g. `out_tx.sender.as_uint(ctx)` when
    /// resolving the deployer of a CREATE).
    fn vars(&self) -> VarContext;

    /// `engine.load(file, args, envp)`. `args` is the constructor calldata
    /// (or, for a CREATE, the init-bytecode-carrying transaction data);
    /// `envp` carries the `address`/`deployer`/`no_run_init_bytecode` keys
    /// needed to install the target contract's identity before running.
    fn load(
        &mut self,
        file: &str,
        args: &[u8],
        envp: &HashMap<String, String>,
    ) -> Result<(), WorldError>;

    /// `engine.take_snapshot()`.
    fn take_snapshot(&mut self) -> Self::Snapshot;

    /// `engine.restore_snapshot(token, remove)`.
    fn restore_snapshot(&mut self, snapshot: &Self::Snapshot, remove: bool);

    /// `engine.run()`.
    fn run(&mut self) -> Info;

    /// `contract(engine)`, read-only.
    fn contract(&self) -> &ContractState;

    /// `contract(engine)`, mutable (used to install a transaction, clear
    /// `outgoing_transaction`, or push values on the stack).
    fn contract_mut(&mut self) -> &mut ContractState;

    /// `new_evm_runtime(new_engine, parent_engine)`: wires a freshly forked
    /// engine as a continuation of `parent`'s execution position.
    fn attach_runtime(&mut self, parent: &Self);

    /// `set_evm_bytecode(engine, bytes)`.
    fn set_bytecode(&mut self, code: Bytes);

    /// `increment_block_number(engine, value)`.
    fn increment_block_number(&mut self, inc: EVMU256);

    /// `increment_block_timestamp(engine, value)`.
    fn increment_block_timestamp(&mut self, inc: EVMU256);
}

pub mod mock;
