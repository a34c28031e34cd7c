//! Domain error types for the orchestrator and corpus bridge.
//!
//! One enum per failure domain, unified under [`OptikError`], following the
//! `EvmError`/`#[error(transparent)]` composition pattern used throughout
//! the Rust EVM-tooling ecosystem.
use crate::types::EVMAddress;
use thiserror::Error;

/// Failures raised by the [`crate::world::EVMWorld`] orchestrator.
#[derive(Error, Debug)]
pub enum WorldError {
    #[error("couldn't deploy contract, address {0:#x} already in use")]
    AddressInUse(EVMAddress),

    #[error("no contract deployed at {0:#x}")]
    NoContractAt(EVMAddress),

    #[error("no contract is currently executing")]
    NoActiveContract,

    #[error("contract emitted an unsupported outgoing transaction type: {0}")]
    UnsupportedTransactionKind(&'static str),

    #[error(
        "message call returned {got} bytes but the caller only allocated a buffer of {allowed} bytes"
    )]
    ReturnBufferOverflow { allowed: u64, got: u64 },

    #[error("no more transactions to execute")]
    NoMoreTransactions,

    #[error("monitor already attached")]
    MonitorAlreadyAttached,

    #[error("monitor was not attached")]
    MonitorNotAttached,
}

/// Failures raised while translating fuzzer corpus entries.
#[derive(Error, Debug)]
pub enum EchidnaError {
    #[error("unsupported ABI argument tag: {0}")]
    UnsupportedArgTag(String),

    #[error("unsupported `_call` tag: {0}")]
    UnsupportedCallTag(String),

    #[error("malformed corpus entry: {0}")]
    Malformed(String),
}

/// Catch-all failures that aren't specific to the world or the bridge.
#[derive(Error, Debug)]
pub enum GenericError {
    #[error("couldn't find an available filename with prefix `{prefix}` under {dir}")]
    FilenameSlotsExhausted { dir: String, prefix: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Translation(#[from] EchidnaError),
}

/// Top-level error type returned by this crate's public API.
#[derive(Error, Debug)]
pub enum OptikError {
    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Echidna(#[from] EchidnaError),

    #[error(transparent)]
    Generic(#[from] GenericError),
}
