//! Common type aliases shared by the orchestrator and the corpus bridge.
use revm_primitives::{B160, U256};

pub type EVMAddress = B160;
pub type EVMU256 = U256;

/// Parse a 40-hex-digit (optionally `0x`-prefixed) address.
pub fn parse_address(s: &str) -> Result<EVMAddress, hex::FromHexError> {
    let s = s.trim_start_matches("0x");
    let mut addr = EVMAddress::zero();
    hex::decode_to_slice(s, &mut addr.0)?;
    Ok(addr)
}

/// Format an address as a `0x`-prefixed, zero-padded 40 hex digit string.
pub fn format_address(addr: &EVMAddress) -> String {
    format!("0x{}", hex::encode(addr.0))
}

/// `true` if `v` is the zero word.
pub fn is_zero(v: EVMU256) -> bool {
    v == EVMU256::ZERO
}

/// Zero-extend a 160-bit address into a 256-bit word, as pushed on the EVM
/// stack by CREATE/CALL return handling.
pub fn address_to_u256(addr: &EVMAddress) -> EVMU256 {
    EVMU256::from_be_slice(&addr.0)
}

/// Parse a `0x`-prefixed (or bare) hex string into a 256-bit word, as used
/// throughout the fuzzer corpus format for `_value`/`_gas'`/`_delay`/etc.
pub fn parse_hex_u256(s: &str) -> Result<EVMU256, crate::error::EchidnaError> {
    EVMU256::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| crate::error::EchidnaError::Malformed(format!("not a valid hex word: {s}")))
}
