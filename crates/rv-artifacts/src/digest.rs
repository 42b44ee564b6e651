//! Content digest of a snapshot's `data` payload.
//!
//! `sha256:<64 lowercase hex>` over the canonical JSON of the value. Only
//! `data` is hashed, so two runs that fetched identical records produce
//! identical digests regardless of timestamps in `metadata`.

use anyhow::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json;

pub const DIGEST_PREFIX: &str = "sha256:";

pub fn digest_value(data: &Value) -> Result<String> {
    let canonical = canonical_json(data)?;
    Ok(format!("{DIGEST_PREFIX}{}", sha256_hex(canonical.as_bytes())))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `sha256:` followed by exactly 64 lowercase hex characters.
pub fn is_valid_digest(s: &str) -> bool {
    match s.strip_prefix(DIGEST_PREFIX) {
        Some(h) => h.len() == 64 && h.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
        None => false,
    }
}
