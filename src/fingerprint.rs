//! Content fingerprints used to build revisioned filenames.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 8;

/// Lower-case hex SHA-256 of `bytes`, truncated to [`FINGERPRINT_LEN`].
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Fingerprint of the current wall-clock time in milliseconds. Stable for the value it was given,
/// so callers compute it once and keep it for the whole run.
pub fn startup_fingerprint() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    fingerprint(millis.to_string().as_bytes())
}
