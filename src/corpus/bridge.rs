//! Translation between the fuzzer's on-disk corpus format and
//! [`AbstractTx`].

use std::path::Path;

use crate::corpus::abi::{function_call, update_argument_json, AbiArg};
use crate::engine::{EVMTransaction, TxKind, TxResult};
use crate::error::{EchidnaError, GenericError};
use crate::types::{format_address, parse_address, parse_hex_u256, EVMU256};
use crate::value::{Value, VarContext};
use crate::world::AbstractTx;

const NEW_INPUT_PREFIX: &str = "optik_solved_input";

/// Translate one parsed corpus transaction into an [`AbstractTx`], naming
/// its symbolic variables with the `tx_name` prefix.
pub fn load_tx(tx: &serde_json::Value, tx_name: &str) -> Result<AbstractTx, EchidnaError> {
    let call = &tx["_call"];
    let tag = call["tag"].as_str().ok_or_else(|| malformed("missing `_call.tag`"))?;
    if tag != "SolCall" {
        return Err(EchidnaError::UnsupportedCallTag(tag.to_string()));
    }

    let contents = call["contents"].as_array().ok_or_else(|| malformed("`_call.contents`"))?;
    let func_name = contents[0].as_str().ok_or_else(|| malformed("function name"))?;
    let args: Vec<AbiArg> = match contents.get(1).and_then(|v| v.as_array()) {
        Some(raw_args) => raw_args.iter().map(AbiArg::parse).collect::<Result<_, _>>()?,
        None => Vec::new(),
    };

    let signature = format!("({})", args.iter().map(AbiArg::type_string).collect::<Vec<_>>().join(","));

    let mut ctx = VarContext::new();
    let call_data = function_call(func_name, &signature, tx_name, &args, &mut ctx);

    let sender = parse_address(str_field(tx, "_src")?).map_err(|_| malformed("`_src`"))?;
    let recipient = parse_address(str_field(tx, "_dst")?).map_err(|_| malformed("`_dst`"))?;
    let value = parse_hex_u256(str_field(tx, "_value")?)?;
    let gas_limit = parse_hex_u256(str_field(tx, "_gas'")?)?;
    let gas_price = parse_hex_u256(str_field(tx, "_gasprice'")?)?;

    let sender_u256 = crate::types::address_to_u256(&sender);
    ctx.insert(format!("{tx_name}_sender"), sender_u256);
    ctx.insert(format!("{tx_name}_value"), value);

    let delay = tx["_delay"].as_array().ok_or_else(|| malformed("`_delay`"))?;
    let timestamp_inc = parse_hex_u256(delay[0].as_str().ok_or_else(|| malformed("`_delay[0]`"))?)?;
    let block_num_inc = parse_hex_u256(delay[1].as_str().ok_or_else(|| malformed("`_delay[1]`"))?)?;
    ctx.insert(format!("{tx_name}_block_timestamp_inc"), timestamp_inc);
    ctx.insert(format!("{tx_name}_block_num_inc"), block_num_inc);

    let evm_tx = EVMTransaction {
        origin: Value::concrete(sender_u256),
        sender: Value::concrete(sender_u256),
        recipient,
        value: Value::concrete(value),
        data: call_data,
        gas_price: Value::concrete(gas_price),
        gas_limit: Value::concrete(gas_limit),
        kind: TxKind::Call,
        ret_offset: EVMU256::ZERO,
        ret_len: EVMU256::ZERO,
        result: TxResult::default(),
    };

    Ok(AbstractTx::new(evm_tx)
        .with_ctx(ctx)
        .with_block_increments(Value::symbolic(format!("{tx_name}_block_num_inc")), Value::symbolic(format!("{tx_name}_block_timestamp_inc"))))
}

/// Load a whole corpus file (a JSON array of transactions) into a sequence
/// of [`AbstractTx`], naming each `tx{i}`.
pub fn load_tx_sequence(filename: &Path) -> Result<Vec<AbstractTx>, GenericError> {
    let bytes = std::fs::read(filename)?;
    let data: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;
    data.iter()
        .enumerate()
        .map(|(i, tx)| load_tx(tx, &format!("tx{i}")).map_err(GenericError::Translation))
        .collect()
}

/// Rewrite a copy of corpus transaction `tx` according to solver model
/// `new_model`, whose variables are named with the `tx_name` prefix used
/// when the transaction was originally loaded by [`load_tx`].
pub fn update_tx(tx: &serde_json::Value, tx_name: &str, new_model: &VarContext) -> Result<serde_json::Value, EchidnaError> {
    let mut tx = tx.clone();

    let args = tx["_call"]["contents"][1].as_array().cloned().unwrap_or_default();
    let mut updated_args = Vec::with_capacity(args.len());
    for (i, mut arg) in args.into_iter().enumerate() {
        update_argument_json(&mut arg, &format!("{tx_name}_arg{i}"), new_model)?;
        updated_args.push(arg);
    }
    if tx["_call"]["contents"][1].is_array() {
        tx["_call"]["contents"][1] = serde_json::Value::Array(updated_args);
    }

    if let Some(v) = new_model.get(&format!("{tx_name}_block_timestamp_inc")) {
        tx["_delay"][0] = serde_json::Value::String(format!("0x{v:x}"));
    }
    if let Some(v) = new_model.get(&format!("{tx_name}_block_num_inc")) {
        tx["_delay"][1] = serde_json::Value::String(format!("0x{v:x}"));
    }
    if let Some(v) = new_model.get(&format!("{tx_name}_sender")) {
        let addr_bytes = v.to_be_bytes_vec();
        let addr = crate::types::EVMAddress::from_slice(&addr_bytes[12..32]);
        tx["_src"] = serde_json::Value::String(format_address(&addr));
    }
    if let Some(v) = new_model.get(&format!("{tx_name}_value")) {
        tx["_value"] = serde_json::Value::String(format!("0x{v:x}"));
    }

    Ok(tx)
}

/// Load `original_file`, apply `update_tx` (named `tx{i}`) to every entry
/// using `new_model`, and write the result to a freshly-allocated sibling
/// file with the `optik_solved_input` prefix.
pub fn store_new_tx_sequence(original_file: &Path, new_model: &VarContext) -> Result<(), GenericError> {
    let bytes = std::fs::read(original_file)?;
    let data: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;

    let new_data = data
        .iter()
        .enumerate()
        .map(|(i, tx)| update_tx(tx, &format!("tx{i}"), new_model).map_err(GenericError::Translation))
        .collect::<Result<Vec<_>, _>>()?;

    let dir = original_file.parent().unwrap_or_else(|| Path::new("."));
    let new_file = get_available_filename(dir, NEW_INPUT_PREFIX, ".txt")?;
    std::fs::write(new_file, serde_json::to_vec(&new_data)?)?;
    Ok(())
}

/// Find the smallest `n < 100000` for which `{dir}/{prefix}_{n}{suffix}`
/// doesn't exist.
pub fn get_available_filename(dir: &Path, prefix: &str, suffix: &str) -> Result<std::path::PathBuf, GenericError> {
    const NUM_MAX: u32 = 100_000;
    for n in 0..NUM_MAX {
        let candidate = dir.join(format!("{prefix}_{n}{suffix}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(GenericError::FilenameSlotsExhausted { dir: dir.display().to_string(), prefix: prefix.to_string() })
}

fn str_field<'a>(tx: &'a serde_json::Value, key: &str) -> Result<&'a str, EchidnaError> {
    tx[key].as_str().ok_or_else(|| malformed(&format!("missing `{key}`")))
}

fn malformed(what: &str) -> EchidnaError {
    EchidnaError::Malformed(what.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> serde_json::Value {
        serde_json::json!({
            "_call": {
                "tag": "SolCall",
                "contents": ["transfer", [
                    {"tag": "AbiAddress", "contents": "0x0000000000000000000000000000000000000001"},
                    {"tag": "AbiUInt", "contents": [256, "42"]}
                ]]
            },
            "_src": "0x0000000000000000000000000000000000000002",
            "_dst": "0x0000000000000000000000000000000000000003",
            "_value": "0x0",
            "_gas'": "0xabcdef",
            "_gasprice'": "0x1",
            "_delay": ["0x1", "0x1"]
        })
    }

    #[test]
    fn load_tx_builds_signature_and_seeds() {
        let tx = sample_tx();
        let abstract_tx = load_tx(&tx, "tx0").unwrap();
        assert!(abstract_tx.ctx.contains("tx0_arg0"));
        assert!(abstract_tx.ctx.contains("tx0_arg1"));
        assert!(abstract_tx.ctx.contains("tx0_sender"));
        assert!(abstract_tx.ctx.contains("tx0_value"));
        assert_eq!(abstract_tx.tx.data.len(), 4 + 64);
    }

    #[test]
    fn identity_model_round_trips_untouched_tx() {
        let tx = sample_tx();
        let abstract_tx = load_tx(&tx, "tx0").unwrap();
        let rewritten = update_tx(&tx, "tx0", &abstract_tx.ctx).unwrap();
        assert_eq!(rewritten["_gas'"], tx["_gas'"]);
        assert_eq!(rewritten["_gasprice'"], tx["_gasprice'"]);
        assert_eq!(rewritten["_call"]["contents"][1][1]["contents"][1], "42");
    }

    #[test]
    fn update_tx_preserves_untouched_keys() {
        let tx = sample_tx();
        let rewritten = update_tx(&tx, "tx0", &VarContext::new()).unwrap();
        assert_eq!(rewritten["_gas'"], tx["_gas'"]);
        assert_eq!(rewritten["_dst"], tx["_dst"]);
    }
}
