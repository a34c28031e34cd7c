//! One deployed contract: its root engine, nonce, and call-stack of frames.

use crate::engine::{Engine, ShareSet};
use crate::error::WorldError;
use crate::types::{format_address, EVMAddress};
use crate::world::runtime::EVMRuntime;
use crate::world::tx::AbstractTx;
use std::collections::HashMap;

/// A deployed contract, as `ContractRunner` in the source tool.
///
/// `root_engine` holds the contract's code and storage; every pushed
/// [`EVMRuntime`] is a fork of it that additionally shares memory, so
/// reentrant frames on the same contract observe each other's writes.
pub struct ContractRunner<E: Engine> {
    pub address: EVMAddress,
    pub nonce: u64,
    pub initialized: bool,
    pub runtime_stack: Vec<EVMRuntime<E>>,
    root_engine: E,
}

impl<E: Engine> ContractRunner<E> {
    /// Fork `world_root` sharing `{vars, path}`, load the contract's code
    /// and constructor arguments, and record whether the init bytecode
    /// should run immediately (`run_init_bytecode`) or be deferred to a
    /// later explicit CREATE-completion step.
    pub fn new(
        world_root: &E,
        contract_file: &str,
        address: EVMAddress,
        deployer: EVMAddress,
        args: &[u8],
        run_init_bytecode: bool,
    ) -> Result<Self, WorldError> {
        let mut root_engine = world_root.fork(ShareSet::VARS_PATH);
        let mut envp = HashMap::new();
        envp.insert("address".to_string(), format_address(&address));
        envp.insert("deployer".to_string(), format_address(&deployer));
        if !run_init_bytecode {
            envp.insert("no_run_init_bytecode".to_string(), "1".to_string());
        }
        root_engine.load(contract_file, args, &envp)?;
        Ok(ContractRunner {
            address,
            nonce: 1,
            initialized: run_init_bytecode,
            runtime_stack: Vec::new(),
            root_engine,
        })
    }

    pub fn root_engine(&self) -> &E {
        &self.root_engine
    }

    pub fn root_engine_mut(&mut self) -> &mut E {
        &mut self.root_engine
    }

    pub fn current_runtime(&self) -> &EVMRuntime<E> {
        self.runtime_stack.last().expect("contract has no active runtime")
    }

    pub fn current_runtime_mut(&mut self) -> &mut EVMRuntime<E> {
        self.runtime_stack.last_mut().expect("contract has no active runtime")
    }

    /// Fork `root_engine` sharing `{mem, vars, path}`, attach it as a
    /// continuation of the root engine's execution position, and push the
    /// resulting frame.
    pub fn push_runtime(&mut self, tx: Option<&AbstractTx>) -> &mut EVMRuntime<E> {
        let mut new_engine = self.root_engine.fork(ShareSet::MEM_VARS_PATH);
        new_engine.attach_runtime(&self.root_engine);
        self.runtime_stack.push(EVMRuntime::new(new_engine, tx));
        self.runtime_stack.last_mut().unwrap()
    }

    pub fn pop_runtime(&mut self) -> EVMRuntime<E> {
        self.runtime_stack.pop().expect("no runtime to pop")
    }
}
