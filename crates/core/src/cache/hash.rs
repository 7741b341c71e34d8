//! Request identity keys.

use sha2::{Digest, Sha256};

use crate::Request;

/// Compute the storage key identifying a request: method plus URL.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Storage key for a request descriptor.
pub fn request_key(request: &Request) -> String {
    compute_request_key(request.method.as_str(), request.url.as_str())
}
