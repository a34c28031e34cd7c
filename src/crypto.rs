//! Keccak-256, the one piece of "address-derivation cryptography" this
//! crate can't treat as a black box (CREATE address derivation and ABI
//! function selectors both need it directly).
use crypto::digest::Digest;
use crypto::sha3::Sha3;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3::keccak256();
    let mut output = [0u8; 32];
    hasher.input(data);
    hasher.result(&mut output);
    output
}
