//! Content hashing for inline variation keys

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest
const KEY_HEX_LEN: usize = 12;

/// Compute SHA-256 of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

/// Key assigned to an inline literal
///
/// The leading `~` keeps these keys out of the namespace authors use in
/// VariationSet documents.
pub fn literal_key(literal: &str) -> String {
    let digest = sha256_hex(literal.as_bytes());
    format!("~{}", &digest[..KEY_HEX_LEN])
}
