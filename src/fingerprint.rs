//! Cache-key fingerprinting.
//!
//! Derives a stable, content-addressable key from a resolved filesystem
//! path plus a transform request. The domain-separated SHA-256 shape
//! follows `cache::hash_responsive_params`/`hash_thumbnail_params` in the
//! teacher repo; the hex-encoding call is the same one
//! `other_examples/.../imgproxy/cache.rs` uses for its own URL-keyed cache.

use crate::params::TransformParams;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint a resolved asset path plus its requested transform.
///
/// Input to the hash is exactly `resolved_path ∥ "{W}x{H}" ∥ format ∥
/// "q{Q}"` — concatenated literally, no delimiter beyond the `x` and
/// `q` that are already part of those literal tokens.
pub fn fingerprint(resolved_path: &Path, params: &TransformParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resolved_path.to_string_lossy().as_bytes());
    hasher.update(format!("{}x{}", params.width, params.height).as_bytes());
    hasher.update(params.format.as_str().as_bytes());
    hasher.update(format!("q{}", params.quality).as_bytes());

    hex::encode(hasher.finalize())
}
