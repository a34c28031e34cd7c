//! The EVM World orchestrator: AbstractTx, EVMRuntime, ContractRunner,
//! WorldMonitor and the EVMWorld main loop.

pub mod monitor;
pub mod runner;
pub mod runtime;
pub mod tx;
#[allow(clippy::module_inception)]
pub mod world;

pub use monitor::{NullMonitor, WorldMonitor};
pub use runner::ContractRunner;
pub use runtime::EVMRuntime;
pub use tx::AbstractTx;
pub use world::{compute_new_contract_addr, EVMWorld};
