//! A scriptable [`Engine`] implementation used by this crate's own tests.
//!
//! Nothing here is meant to execute real EVM bytecode: each contract root
//! is given a queue of per-frame scripts (one [`ScriptedStep`] list per
//! transaction that will run against it); every time [`Engine::fork`] is
//! asked to share memory (a `push_runtime` fork) the new frame claims the
//! next queued script and replays it one [`Engine::run`] call at a time.
//! This is enough to drive [`crate::world::EVMWorld`] through an end-to-end
//! scenario without a real symbolic backend.
use super::{ContractState, Engine, ExitStatus, Info, ShareSet, StopReason, TxResult};
use crate::{error::WorldError, types::EVMAddress, types::EVMU256, value::VarContext};
use bytes::Bytes;
use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};

/// One programmed outcome of a single `run()` call.
#[derive(Clone, Debug)]
pub enum ScriptedStep {
    /// The frame terminates with `status`, producing `return_data` and
    /// applying `storage_writes` to the contract's shared storage.
    Exit { status: ExitStatus, return_data: Bytes, storage_writes: Vec<(EVMU256, EVMU256)> },
    /// The frame suspends mid-execution having requested `outgoing`.
    Suspend { outgoing: super::EVMTransaction },
    /// Any other stop reason (monitor hook, error, ...).
    Other(String),
}

impl ScriptedStep {
    pub fn exit(status: ExitStatus) -> Self {
        ScriptedStep::Exit { status, return_data: Bytes::new(), storage_writes: vec![] }
    }

    pub fn exit_with_data(status: ExitStatus, return_data: impl Into<Bytes>) -> Self {
        ScriptedStep::Exit { status, return_data: return_data.into(), storage_writes: vec![] }
    }

    pub fn suspend(outgoing: super::EVMTransaction) -> Self {
        ScriptedStep::Suspend { outgoing }
    }
}

#[derive(Clone, Debug)]
pub struct MockSnapshot {
    state: ContractState,
    storage: HashMap<EVMU256, EVMU256>,
}

#[derive(Clone)]
pub struct MockEngine {
    vars: Rc<RefCell<VarContext>>,
    path: Rc<RefCell<Vec<String>>>,
    code: Rc<RefCell<Bytes>>,
    storage: Rc<RefCell<HashMap<EVMU256, EVMU256>>>,
    /// Per-contract-root queue: one entry per transaction expected to run
    /// against this contract, in order.
    frame_scripts: Rc<RefCell<VecDeque<VecDeque<ScriptedStep>>>>,
    /// This frame's own remaining steps, claimed from `frame_scripts` the
    /// moment a memory-sharing fork creates it.
    my_script: Rc<RefCell<VecDeque<ScriptedStep>>>,
    /// Scripts staged ahead of time for a contract that doesn't exist yet
    /// (e.g. a CREATE's as-yet-undeployed new address), keyed by address
    /// and drained into that contract's own `frame_scripts` the moment its
    /// root engine is `load()`-ed. Shared globally, unlike `frame_scripts`,
    /// since the staging side never has a handle to the target contract's
    /// engine.
    staged: Rc<RefCell<HashMap<EVMAddress, VecDeque<VecDeque<ScriptedStep>>>>>,
    state: ContractState,
    block_number: EVMU256,
    block_timestamp: EVMU256,
}

impl MockEngine {
    /// Queue the scripted behavior for the next transaction/call that will
    /// run against this contract (or one of its reentrant frames, in the
    /// order they are pushed).
    pub fn queue_frame(&self, steps: Vec<ScriptedStep>) {
        self.frame_scripts.borrow_mut().push_back(steps.into_iter().collect());
    }

    /// Stage a frame's script for a contract that will be deployed later
    /// (e.g. the constructor frame of a CREATE whose address is only known
    /// in advance via [`crate::world::compute_new_contract_addr`]). Staged
    /// scripts are consumed in order, starting with that contract's very
    /// first pushed frame.
    pub fn stage_script_for_address(&self, address: EVMAddress, steps: Vec<ScriptedStep>) {
        self.staged.borrow_mut().entry(address).or_default().push_back(steps.into_iter().collect());
    }

    pub fn block_number(&self) -> EVMU256 {
        self.block_number
    }

    pub fn block_timestamp(&self) -> EVMU256 {
        self.block_timestamp
    }

    pub fn storage(&self) -> HashMap<EVMU256, EVMU256> {
        self.storage.borrow().clone()
    }

    pub fn code(&self) -> Bytes {
        self.code.borrow().clone()
    }
}

impl Engine for MockEngine {
    type Snapshot = MockSnapshot;

    fn new_evm() -> Self {
        MockEngine {
            vars: Rc::new(RefCell::new(VarContext::new())),
            path: Rc::new(RefCell::new(Vec::new())),
            code: Rc::new(RefCell::new(Bytes::new())),
            storage: Rc::new(RefCell::new(HashMap::new())),
            frame_scripts: Rc::new(RefCell::new(VecDeque::new())),
            my_script: Rc::new(RefCell::new(VecDeque::new())),
            staged: Rc::new(RefCell::new(HashMap::new())),
            state: ContractState::default(),
            block_number: EVMU256::ZERO,
            block_timestamp: EVMU256::ZERO,
        }
    }

    fn fork(&self, share: ShareSet) -> Self {
        let forked = MockEngine {
            vars: if share.vars {
                Rc::clone(&self.vars)
            } else {
                Rc::new(RefCell::new(self.vars.borrow().clone()))
            },
            path: if share.path {
                Rc::clone(&self.path)
            } else {
                Rc::new(RefCell::new(self.path.borrow().clone()))
            },
            code: if share.mem {
                Rc::clone(&self.code)
            } else {
                Rc::new(RefCell::new(self.code.borrow().clone()))
            },
            storage: if share.mem {
                Rc::clone(&self.storage)
            } else {
                Rc::new(RefCell::new(self.storage.borrow().clone()))
            },
            frame_scripts: if share.mem {
                Rc::clone(&self.frame_scripts)
            } else {
                Rc::new(RefCell::new(VecDeque::new()))
            },
            my_script: Rc::new(RefCell::new(VecDeque::new())),
            staged: Rc::clone(&self.staged),
            state: ContractState::default(),
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
        };
        if share.mem {
            // A memory-sharing fork is a freshly pushed runtime frame:
            // claim the next queued script for this contract, if any.
            if let Some(steps) = forked.frame_scripts.borrow_mut().pop_front() {
                *forked.my_script.borrow_mut() = steps;
            }
        }
        forked
    }

    fn merge_vars(&mut self, ctx: &VarContext) {
        self.vars.borrow_mut().update_from(ctx);
    }

    fn vars(&self) -> VarContext {
        self.vars.borrow().clone()
    }

    fn load(
        &mut self,
        _file: &str,
        _args: &[u8],
        envp: &HashMap<String, String>,
    ) -> Result<(), WorldError> {
        if let Some(address) = envp.get("address").and_then(|s| crate::types::parse_address(s).ok()) {
            if let Some(mut queued) = self.staged.borrow_mut().remove(&address) {
                let mut frame_scripts = self.frame_scripts.borrow_mut();
                while let Some(steps) = queued.pop_front() {
                    frame_scripts.push_back(steps);
                }
            }
        }
        Ok(())
    }

    fn take_snapshot(&mut self) -> Self::Snapshot {
        MockSnapshot { state: self.state.clone(), storage: self.storage.borrow().clone() }
    }

    fn restore_snapshot(&mut self, snapshot: &Self::Snapshot, _remove: bool) {
        self.state = snapshot.state.clone();
        *self.storage.borrow_mut() = snapshot.storage.clone();
    }

    fn run(&mut self) -> Info {
        let step = self
            .my_script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ScriptedStep::exit(ExitStatus::Stop));
        match step {
            ScriptedStep::Exit { status, return_data, storage_writes } => {
                for (k, v) in storage_writes {
                    self.storage.borrow_mut().insert(k, v);
                }
                if let Some(tx) = self.state.transaction.as_mut() {
                    tx.result =
                        TxResult { return_data_size: return_data.len() as u64, return_data };
                }
                Info { stop: StopReason::Exit, exit_status: Some(status) }
            }
            ScriptedStep::Suspend { outgoing } => {
                self.state.outgoing_transaction = Some(outgoing);
                Info { stop: StopReason::None, exit_status: None }
            }
            ScriptedStep::Other(reason) => {
                Info { stop: StopReason::Other(reason), exit_status: None }
            }
        }
    }

    fn contract(&self) -> &ContractState {
        &self.state
    }

    fn contract_mut(&mut self) -> &mut ContractState {
        &mut self.state
    }

    fn attach_runtime(&mut self, _parent: &Self) {}

    fn set_bytecode(&mut self, code: Bytes) {
        *self.code.borrow_mut() = code;
    }

    fn increment_block_number(&mut self, inc: EVMU256) {
        self.block_number = self.block_number.wrapping_add(inc);
    }

    fn increment_block_timestamp(&mut self, inc: EVMU256) {
        self.block_timestamp = self.block_timestamp.wrapping_add(inc);
    }
}
