//! Tagged ABI argument values and a concrete Solidity ABI encoder.
//!
//! The real ABI encoder/decoder (symbolic-shaped calldata) is out of scope;
//! what lives here is everything the bridge needs to get there from an
//! Echidna-style tagged-JSON corpus: parsing the tagged union, building the
//! canonical type-signature string, and a concrete head/tail encoder, since
//! every fuzzer-seeded argument is concrete by construction.

use crate::error::EchidnaError;
use crate::types::{parse_address, EVMAddress, EVMU256};
use crate::value::VarContext;
use bytes::Bytes;

/// A value-less ABI type descriptor. Needed for `AbiArray`/`AbiArrayDynamic`,
/// whose declared element type must be known even when the array itself is
/// empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiType {
    UInt(u32),
    Int(u32),
    Address,
    Bytes(u32),
    Bool,
    Array(u32, Box<AbiType>),
    ArrayDynamic(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

impl AbiType {
    pub fn type_string(&self) -> String {
        match self {
            AbiType::UInt(bits) => format!("uint{bits}"),
            AbiType::Int(bits) => format!("int{bits}"),
            AbiType::Address => "address".to_string(),
            AbiType::Bytes(len) => format!("bytes{len}"),
            AbiType::Bool => "bool".to_string(),
            AbiType::Array(len, elem) => format!("{}[{len}]", elem.type_string()),
            AbiType::ArrayDynamic(elem) => format!("{}[]", elem.type_string()),
            AbiType::Tuple(types) => {
                let inner: Vec<String> = types.iter().map(AbiType::type_string).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    fn parse(json: &serde_json::Value) -> Result<AbiType, EchidnaError> {
        let tag = tag_of(json)?;
        let contents = &json["contents"];
        match tag.as_str() {
            "AbiUInt" => Ok(AbiType::UInt(scalar_u64(contents)? as u32)),
            "AbiInt" => Ok(AbiType::Int(scalar_u64(contents)? as u32)),
            "AbiAddress" => Ok(AbiType::Address),
            "AbiBool" => Ok(AbiType::Bool),
            "AbiBytes" => Ok(AbiType::Bytes(scalar_u64(contents)? as u32)),
            "AbiArray" => {
                let arr = as_array(contents, "AbiArray type")?;
                let len = arr[0].as_u64().ok_or_else(|| malformed("AbiArray length"))? as u32;
                Ok(AbiType::Array(len, Box::new(AbiType::parse(&arr[1])?)))
            }
            "AbiArrayDynamic" => {
                let arr = as_array(contents, "AbiArrayDynamic type")?;
                Ok(AbiType::ArrayDynamic(Box::new(AbiType::parse(&arr[0])?)))
            }
            "AbiTuple" => {
                let arr = as_array(contents, "AbiTuple type")?;
                let types = arr.iter().map(AbiType::parse).collect::<Result<_, _>>()?;
                Ok(AbiType::Tuple(types))
            }
            other => Err(EchidnaError::UnsupportedArgTag(other.to_string())),
        }
    }
}

/// One concrete ABI argument value, as seeded by the fuzzer.
#[derive(Clone, Debug)]
pub enum AbiArg {
    UInt { bits: u32, value: EVMU256 },
    /// `value` is already the full 256-bit two's-complement representation
    /// (sign-extended past `bits`), exactly as an EVM word would hold it.
    Int { bits: u32, value: EVMU256 },
    Address(EVMAddress),
    /// Fixed-size `bytesN`; `data.len() == len as usize`.
    Bytes { len: u32, data: Vec<u8> },
    Bool(bool),
    Array { elem_type: AbiType, elems: Vec<AbiArg> },
    ArrayDynamic { elem_type: AbiType, elems: Vec<AbiArg> },
    Tuple(Vec<AbiArg>),
}

impl AbiArg {
    pub fn type_string(&self) -> String {
        match self {
            AbiArg::UInt { bits, .. } => format!("uint{bits}"),
            AbiArg::Int { bits, .. } => format!("int{bits}"),
            AbiArg::Address(_) => "address".to_string(),
            AbiArg::Bytes { len, .. } => format!("bytes{len}"),
            AbiArg::Bool(_) => "bool".to_string(),
            AbiArg::Array { elem_type, elems } => {
                format!("{}[{}]", elem_type.type_string(), elems.len())
            }
            AbiArg::ArrayDynamic { elem_type, .. } => format!("{}[]", elem_type.type_string()),
            AbiArg::Tuple(elems) => {
                let inner: Vec<String> = elems.iter().map(AbiArg::type_string).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    pub fn parse(json: &serde_json::Value) -> Result<AbiArg, EchidnaError> {
        let tag = tag_of(json)?;
        let contents = &json["contents"];
        match tag.as_str() {
            "AbiUInt" => {
                let arr = as_array(contents, "AbiUInt")?;
                let bits = arr[0].as_u64().ok_or_else(|| malformed("AbiUInt bits"))? as u32;
                let value = parse_unsigned(&scalar_string(&arr[1]))?;
                Ok(AbiArg::UInt { bits, value })
            }
            "AbiInt" => {
                let arr = as_array(contents, "AbiInt")?;
                let bits = arr[0].as_u64().ok_or_else(|| malformed("AbiInt bits"))? as u32;
                let value = decimal_to_signed(&scalar_string(&arr[1]), bits)?;
                Ok(AbiArg::Int { bits, value })
            }
            "AbiAddress" => {
                let hex = scalar_or_first_str(contents).ok_or_else(|| malformed("AbiAddress"))?;
                let addr = parse_address(hex).map_err(|_| malformed("AbiAddress hex"))?;
                Ok(AbiArg::Address(addr))
            }
            "AbiBool" => {
                let b = scalar_or_first_bool(contents).ok_or_else(|| malformed("AbiBool"))?;
                Ok(AbiArg::Bool(b))
            }
            "AbiBytes" => {
                let arr = as_array(contents, "AbiBytes")?;
                let len = arr[0].as_u64().ok_or_else(|| malformed("AbiBytes length"))? as u32;
                let b64 = arr[1].as_str().ok_or_else(|| malformed("AbiBytes data"))?;
                let data = base64_decode(b64)?;
                Ok(AbiArg::Bytes { len, data })
            }
            "AbiArray" => {
                let arr = as_array(contents, "AbiArray")?;
                let elem_type = AbiType::parse(&arr[1])?;
                let elems = as_array(&arr[2], "AbiArray elems")?
                    .iter()
                    .map(AbiArg::parse)
                    .collect::<Result<_, _>>()?;
                Ok(AbiArg::Array { elem_type, elems })
            }
            "AbiArrayDynamic" => {
                let arr = as_array(contents, "AbiArrayDynamic")?;
                let elem_type = AbiType::parse(&arr[0])?;
                let elems = as_array(&arr[1], "AbiArrayDynamic elems")?
                    .iter()
                    .map(AbiArg::parse)
                    .collect::<Result<_, _>>()?;
                Ok(AbiArg::ArrayDynamic { elem_type, elems })
            }
            "AbiTuple" => {
                let arr = as_array(contents, "AbiTuple")?;
                let elems = arr.iter().map(AbiArg::parse).collect::<Result<_, _>>()?;
                Ok(AbiArg::Tuple(elems))
            }
            other => Err(EchidnaError::UnsupportedArgTag(other.to_string())),
        }
    }

    fn is_dynamic(&self) -> bool {
        match self {
            AbiArg::UInt { .. }
            | AbiArg::Int { .. }
            | AbiArg::Address(_)
            | AbiArg::Bool(_)
            | AbiArg::Bytes { .. } => false,
            AbiArg::ArrayDynamic { .. } => true,
            AbiArg::Array { elems, .. } => elems.iter().any(AbiArg::is_dynamic),
            AbiArg::Tuple(elems) => elems.iter().any(AbiArg::is_dynamic),
        }
    }

    /// One 32-byte head word, valid only when `!self.is_dynamic()`.
    fn encode_static(&self) -> Vec<u8> {
        match self {
            AbiArg::UInt { value, .. } | AbiArg::Int { value, .. } => value.to_be_bytes_vec(),
            AbiArg::Address(addr) => {
                let mut word = vec![0u8; 12];
                word.extend_from_slice(&addr.0);
                word
            }
            AbiArg::Bool(b) => {
                let mut word = vec![0u8; 31];
                word.push(u8::from(*b));
                word
            }
            AbiArg::Bytes { data, .. } => {
                let mut word = data.clone();
                word.resize(32, 0);
                word
            }
            AbiArg::Array { elems, .. } => elems.iter().flat_map(AbiArg::encode_static).collect(),
            AbiArg::Tuple(elems) => encode_args(elems),
            AbiArg::ArrayDynamic { .. } => unreachable!("ArrayDynamic is always dynamic"),
        }
    }

    /// This argument's tail contribution, valid only when `self.is_dynamic()`.
    fn encode_dynamic_tail(&self) -> Vec<u8> {
        match self {
            AbiArg::ArrayDynamic { elems, .. } => {
                let mut out = EVMU256::from(elems.len() as u64).to_be_bytes_vec();
                out.extend(encode_args(elems));
                out
            }
            AbiArg::Array { elems, .. } => encode_args(elems),
            AbiArg::Tuple(elems) => encode_args(elems),
            _ => unreachable!("only dynamic variants reach this path"),
        }
    }
}

/// Concrete Solidity ABI head/tail encoding of a flat argument list.
pub fn encode_args(args: &[AbiArg]) -> Vec<u8> {
    let head_size = args.len() * 32;
    let tails: Vec<Vec<u8>> = args
        .iter()
        .map(|a| if a.is_dynamic() { a.encode_dynamic_tail() } else { Vec::new() })
        .collect();

    let mut offsets = Vec::with_capacity(args.len());
    let mut running = head_size;
    for (arg, tail) in args.iter().zip(&tails) {
        if arg.is_dynamic() {
            offsets.push(running);
            running += tail.len();
        } else {
            offsets.push(0);
        }
    }

    let mut out = Vec::with_capacity(running);
    for (arg, offset) in args.iter().zip(&offsets) {
        if arg.is_dynamic() {
            out.extend(EVMU256::from(*offset as u64).to_be_bytes_vec());
        } else {
            out.extend(arg.encode_static());
        }
    }
    for tail in &tails {
        out.extend(tail);
    }
    out
}

/// Builds calldata for `name(signature)` and
/// registers a named symbolic seed in `ctx` for every leaf value reachable
/// from `args`, under `{tx_name}_arg{i}`, recursing into nested
/// tuples/arrays as `{tx_name}_arg{i}_{j}` and into byte arrays octet by
/// octet as `{tx_name}_arg{i}_{k}`.
pub fn function_call(name: &str, signature: &str, tx_name: &str, args: &[AbiArg], ctx: &mut VarContext) -> Bytes {
    for (i, arg) in args.iter().enumerate() {
        register_seeds(arg, &format!("{tx_name}_arg{i}"), ctx);
    }
    let selector = crate::crypto::keccak256(format!("{name}{signature}").as_bytes());
    let mut out = Vec::with_capacity(4 + args.len() * 32);
    out.extend_from_slice(&selector[0..4]);
    out.extend(encode_args(args));
    Bytes::from(out)
}

fn register_seeds(arg: &AbiArg, name: &str, ctx: &mut VarContext) {
    match arg {
        AbiArg::UInt { value, .. } | AbiArg::Int { value, .. } => {
            ctx.insert(name.to_string(), *value);
        }
        AbiArg::Address(addr) => {
            ctx.insert(name.to_string(), crate::types::address_to_u256(addr));
        }
        AbiArg::Bool(b) => {
            ctx.insert(name.to_string(), EVMU256::from(u64::from(*b)));
        }
        AbiArg::Bytes { data, .. } => {
            for (k, byte) in data.iter().enumerate() {
                ctx.insert(format!("{name}_{k}"), EVMU256::from(u64::from(*byte)));
            }
        }
        AbiArg::Array { elems, .. } | AbiArg::ArrayDynamic { elems, .. } => {
            for (j, elem) in elems.iter().enumerate() {
                register_seeds(elem, &format!("{name}_{j}"), ctx);
            }
        }
        AbiArg::Tuple(elems) => {
            for (j, elem) in elems.iter().enumerate() {
                register_seeds(elem, &format!("{name}_{j}"), ctx);
            }
        }
    }
}

/// Mutate the raw JSON `arg` node in place, rewriting any leaf value for
/// which `model` carries a matching variable name. Mirrors
/// [`register_seeds`]'s naming scheme exactly so a round-trip through an
/// identity model is a no-op.
pub fn update_argument_json(
    arg: &mut serde_json::Value,
    name: &str,
    model: &VarContext,
) -> Result<(), EchidnaError> {
    let tag = tag_of(arg)?;
    match tag.as_str() {
        "AbiUInt" => {
            if let Some(v) = model.get(name) {
                arg["contents"][1] = serde_json::Value::String(v.to_string());
            }
        }
        "AbiInt" => {
            let bits = arg["contents"][0].as_u64().ok_or_else(|| malformed("AbiInt bits"))? as u32;
            if let Some(v) = model.get(name) {
                let word = sign_extend(*v, bits);
                arg["contents"][1] = serde_json::Value::String(signed_to_decimal(word));
            }
        }
        "AbiAddress" => {
            if let Some(v) = model.get(name) {
                let hex = format!("0x{}", hex::encode(&v.to_be_bytes_vec()[12..32]));
                set_scalar_or_first(arg, serde_json::Value::String(hex));
            }
        }
        "AbiBool" => {
            if let Some(v) = model.get(name) {
                set_scalar_or_first(arg, serde_json::Value::Bool(*v != EVMU256::ZERO));
            }
        }
        "AbiBytes" => {
            let encoded = arg["contents"][1].as_str().ok_or_else(|| malformed("AbiBytes data"))?;
            let mut data = base64_decode(encoded)?;
            for (k, byte) in data.iter_mut().enumerate() {
                if let Some(v) = model.get(&format!("{name}_{k}")) {
                    *byte = v.to_be_bytes_vec()[31];
                }
            }
            arg["contents"][1] = serde_json::Value::String(base64_encode(&data));
        }
        "AbiArray" => update_elems_in_place(arg, 2, name, model)?,
        "AbiArrayDynamic" => update_elems_in_place(arg, 1, name, model)?,
        "AbiTuple" => {
            let elems = as_array(&arg["contents"], "AbiTuple")?.clone();
            let mut updated = Vec::with_capacity(elems.len());
            for (j, mut elem) in elems.into_iter().enumerate() {
                update_argument_json(&mut elem, &format!("{name}_{j}"), model)?;
                updated.push(elem);
            }
            arg["contents"] = serde_json::Value::Array(updated);
        }
        other => return Err(EchidnaError::UnsupportedArgTag(other.to_string())),
    }
    Ok(())
}

fn update_elems_in_place(
    arg: &mut serde_json::Value,
    elems_index: usize,
    name: &str,
    model: &VarContext,
) -> Result<(), EchidnaError> {
    let elems = as_array(&arg["contents"][elems_index], "array elems")?.clone();
    let mut updated = Vec::with_capacity(elems.len());
    for (j, mut elem) in elems.into_iter().enumerate() {
        update_argument_json(&mut elem, &format!("{name}_{j}"), model)?;
        updated.push(elem);
    }
    arg["contents"][elems_index] = serde_json::Value::Array(updated);
    Ok(())
}

fn set_scalar_or_first(arg: &mut serde_json::Value, value: serde_json::Value) {
    if arg["contents"].is_array() {
        arg["contents"][0] = value;
    } else {
        arg["contents"] = value;
    }
}

// ---- two's-complement helpers ----------------------------------------

/// Mask `word` to its low `bits` bits, then sign-extend back out to a full
/// 256-bit two's-complement word, the way the EVM treats a declared-width
/// signed slot.
fn sign_extend(word: EVMU256, bits: u32) -> EVMU256 {
    if bits >= 256 {
        return word;
    }
    let mask = (EVMU256::from(1u64) << bits) - EVMU256::from(1u64);
    let truncated = word & mask;
    let sign_bit = EVMU256::from(1u64) << (bits - 1);
    if truncated & sign_bit != EVMU256::ZERO {
        truncated | !mask
    } else {
        truncated
    }
}

fn signed_to_decimal(word: EVMU256) -> String {
    let sign_bit = EVMU256::from(1u64) << 255;
    if word & sign_bit != EVMU256::ZERO {
        let magnitude = (!word).wrapping_add(EVMU256::from(1u64));
        format!("-{magnitude}")
    } else {
        word.to_string()
    }
}

fn decimal_to_signed(s: &str, bits: u32) -> Result<EVMU256, EchidnaError> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = parse_unsigned(digits)?;
    let raw = if neg { (!magnitude).wrapping_add(EVMU256::from(1u64)) } else { magnitude };
    Ok(sign_extend(raw, bits))
}

fn parse_unsigned(s: &str) -> Result<EVMU256, EchidnaError> {
    s.parse().map_err(|_| malformed(&format!("not a valid unsigned integer: {s}")))
}

// ---- JSON helpers -------------------------------------------------------

fn malformed(what: &str) -> EchidnaError {
    EchidnaError::Malformed(what.to_string())
}

fn tag_of(json: &serde_json::Value) -> Result<String, EchidnaError> {
    json["tag"].as_str().map(str::to_string).ok_or_else(|| malformed("missing `tag`"))
}

fn as_array<'a>(v: &'a serde_json::Value, what: &str) -> Result<&'a Vec<serde_json::Value>, EchidnaError> {
    v.as_array().ok_or_else(|| malformed(what))
}

fn scalar_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn scalar_u64(v: &serde_json::Value) -> Result<u64, EchidnaError> {
    if let Some(n) = v.as_u64() {
        return Ok(n);
    }
    v.as_array()
        .and_then(|a| a.first())
        .and_then(|v| v.as_u64())
        .ok_or_else(|| malformed("expected a numeric ABI type parameter"))
}

fn scalar_or_first_str(v: &serde_json::Value) -> Option<&str> {
    v.as_str().or_else(|| v.as_array().and_then(|a| a.first()).and_then(|v| v.as_str()))
}

fn scalar_or_first_bool(v: &serde_json::Value) -> Option<bool> {
    v.as_bool().or_else(|| v.as_array().and_then(|a| a.first()).and_then(|v| v.as_bool()))
}

// ---- minimal base64 (no third-party dependency carries this in the
// existing stack; decoding/encoding a byte array is a narrow, bounded
// routine, the same justification used for the RLP encoder) -------------

const BASE64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_decode(s: &str) -> Result<Vec<u8>, EchidnaError> {
    let mut table = [255u8; 256];
    for (i, &c) in BASE64_ALPHABET.iter().enumerate() {
        table[c as usize] = i as u8;
    }
    let mut bits: u32 = 0;
    let mut nbits = 0u32;
    let mut out = Vec::new();
    for c in s.trim_end_matches('=').bytes() {
        let v = table[c as usize];
        if v == 255 {
            return Err(malformed("invalid base64 byte in AbiBytes contents"));
        }
        bits = (bits << 6) | u32::from(v);
        nbits += 6;
        if nbits >= 8 {
            nbits -= 8;
            out.push((bits >> nbits) as u8);
        }
    }
    Ok(out)
}

fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = u32::from(chunk[0]);
        let b1 = chunk.get(1).copied().map_or(0, u32::from);
        let b2 = chunk.get(2).copied().map_or(0, u32::from);
        let n = (b0 << 16) | (b1 << 8) | b2;
        out.push(BASE64_ALPHABET[((n >> 18) & 0x3f) as usize] as char);
        out.push(BASE64_ALPHABET[((n >> 12) & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 { BASE64_ALPHABET[((n >> 6) & 0x3f) as usize] as char } else { '=' });
        out.push(if chunk.len() > 2 { BASE64_ALPHABET[(n & 0x3f) as usize] as char } else { '=' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        let data = vec![0xde, 0xad, 0xbe, 0xef, 0x01];
        assert_eq!(base64_decode(&base64_encode(&data)).unwrap(), data);
    }

    #[test]
    fn uint_type_string() {
        let arg = AbiArg::UInt { bits: 256, value: EVMU256::from(42u64) };
        assert_eq!(arg.type_string(), "uint256");
    }

    #[test]
    fn tuple_type_string_is_canonical() {
        let arg = AbiArg::Tuple(vec![
            AbiArg::UInt { bits: 256, value: EVMU256::ZERO },
            AbiArg::Bool(true),
        ]);
        assert_eq!(arg.type_string(), "(uint256,bool)");
    }

    #[test]
    fn signed_round_trip_within_range() {
        let word = decimal_to_signed("-5", 8).unwrap();
        assert_eq!(signed_to_decimal(word), "-5");
        let word = decimal_to_signed("127", 8).unwrap();
        assert_eq!(signed_to_decimal(word), "127");
    }

    #[test]
    fn encode_static_uint_is_one_word() {
        let arg = AbiArg::UInt { bits: 256, value: EVMU256::from(1u64) };
        let encoded = encode_args(&[arg]);
        assert_eq!(encoded.len(), 32);
        assert_eq!(encoded[31], 1);
    }

    #[test]
    fn encode_dynamic_array_uses_offset_and_length() {
        let arg = AbiArg::ArrayDynamic {
            elem_type: AbiType::UInt(256),
            elems: vec![
                AbiArg::UInt { bits: 256, value: EVMU256::from(10u64) },
                AbiArg::UInt { bits: 256, value: EVMU256::from(20u64) },
            ],
        };
        let encoded = encode_args(&[arg]);
        // head: one offset word pointing past itself (32), then tail: length
        // word (2) followed by the two element words.
        assert_eq!(encoded.len(), 32 + 32 + 64);
        assert_eq!(encoded[31], 32);
        assert_eq!(encoded[63], 2);
    }
}
