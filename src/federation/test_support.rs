//! Shared fixtures for unit tests

use std::sync::OnceLock;

use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};

fn generate() -> (RsaPrivateKey, String) {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 1024).expect("key generation should work");
    let public_key_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("public key pem");
    (private_key, public_key_pem)
}

/// Keypair shared by every test in the process.
pub fn test_keypair() -> (&'static RsaPrivateKey, &'static str) {
    static KEYPAIR: OnceLock<(RsaPrivateKey, String)> = OnceLock::new();
    let (private_key, public_key_pem) = KEYPAIR.get_or_init(generate);
    (private_key, public_key_pem)
}

/// A second, unrelated keypair.
pub fn test_keypair_alt() -> (&'static RsaPrivateKey, &'static str) {
    static KEYPAIR: OnceLock<(RsaPrivateKey, String)> = OnceLock::new();
    let (private_key, public_key_pem) = KEYPAIR.get_or_init(generate);
    (private_key, public_key_pem)
}
