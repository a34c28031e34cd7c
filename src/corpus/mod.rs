//! The fuzzer corpus bridge: tagged-ABI argument translation and
//! `AbstractTx` <-> on-disk JSON conversion.

pub mod abi;
pub mod bridge;

pub use abi::{encode_args, function_call, AbiArg, AbiType};
pub use bridge::{get_available_filename, load_tx, load_tx_sequence, store_new_tx_sequence, update_tx};
