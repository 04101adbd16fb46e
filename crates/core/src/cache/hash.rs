//! Composite cache key generation.

use sha2::{Digest, Sha256};

/// Cache key for a retrieval that has no PWID of its own.
///
/// Every part that changes the served bytes takes part in the key.
pub fn composite_key(target: &str, source: &str, render_type: &str, url: &str, form: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in [target, source, render_type, url, form].iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
