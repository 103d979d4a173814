//! Body digest
//!
//! `Digest: SHA-256=<base64>` as sent by Mastodon and friends.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};

/// Computes and checks request body digests.
pub trait DigestChecker: Send + Sync {
    /// Digest header value for `body`
    fn digest(&self, body: &[u8]) -> String;

    /// Compare the computed digest against the declared header value.
    ///
    /// Byte-for-byte equality, no normalization.
    fn verify(&self, body: &[u8], declared: &str) -> Result<(), DigestMismatch> {
        let computed = self.digest(body);
        if computed == declared {
            Ok(())
        } else {
            Err(DigestMismatch {
                computed,
                declared: declared.to_string(),
            })
        }
    }
}

/// Computed and declared digests differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMismatch {
    pub computed: String,
    pub declared: String,
}

/// SHA-256 digest checker
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl DigestChecker for Sha256Digest {
    fn digest(&self, body: &[u8]) -> String {
        generate_digest(body)
    }
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}
