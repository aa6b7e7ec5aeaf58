//! Content-derived layer identity.

use sha2::{Digest, Sha256};

/// Derive a layer ID from the canonical text of an instruction.
///
/// The ID is the lowercase hex encoding of the SHA-256 digest, truncated to
/// `length` characters (clamped to the digest length). Equal inputs always
/// produce equal IDs, which is what makes layer caching work.
pub fn layer_id(canonical: &str, length: usize) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let hex = hex::encode(digest);
    let length = length.min(hex.len());
    hex[..length].to_string()
}
