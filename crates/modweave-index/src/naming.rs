//! Stable, order-independent naming for index artifacts

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a generated name
const NAME_BYTES: usize = 8;

/// Derive a short name from an already sorted, deduplicated name list.
///
/// Each name is fed to SHA-256 behind its length as a little-endian `u64`, so
/// `["ab", "c"]` and `["a", "bc"]` never collide by concatenation. The result
/// is the lower-case hex of the first eight digest bytes and does not depend
/// on platform, process or toolchain.
pub fn stable_name(sorted_names: &[String]) -> String {
    let mut hasher = Sha256::new();
    for name in sorted_names {
        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..NAME_BYTES])
}
