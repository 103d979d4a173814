//! Service key material
//!
//! Loads the relay's RSA private key from a PEM file and derives the
//! public key published in the actor document.

use std::path::Path;

use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use thiserror::Error;

const PKCS1_LABEL: &str = "RSA PRIVATE KEY";
const PKCS8_LABEL: &str = "PRIVATE KEY";

/// Key loading errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid PEM file format")]
    InvalidPem,

    #[error("PEM file is not an RSA private key (label: {0})")]
    UnsupportedLabel(String),

    #[error("Invalid PKCS#1 private key: {0}")]
    Pkcs1(#[from] rsa::pkcs1::Error),

    #[error("Invalid PKCS#8 private key: {0}")]
    Pkcs8(#[from] rsa::pkcs8::Error),

    #[error("Failed to encode public key: {0}")]
    PublicKey(#[from] rsa::pkcs8::spki::Error),
}

/// Read and parse a PEM private key file.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, KeyError> {
    let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_private_key(&pem)
}

/// Parse a PEM private key.
///
/// `RSA PRIVATE KEY` is read as PKCS#1, `PRIVATE KEY` as PKCS#8 (RSA only).
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    match pem_label(pem).ok_or(KeyError::InvalidPem)? {
        PKCS1_LABEL => Ok(RsaPrivateKey::from_pkcs1_pem(pem)?),
        PKCS8_LABEL => Ok(RsaPrivateKey::from_pkcs8_pem(pem)?),
        other => Err(KeyError::UnsupportedLabel(other.to_string())),
    }
}

/// SPKI PEM of the public half, as published in `publicKey.publicKeyPem`.
pub fn public_key_pem(private_key: &RsaPrivateKey) -> Result<String, KeyError> {
    Ok(private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)?)
}

fn pem_label(pem: &str) -> Option<&str> {
    let begin = pem.trim_start().strip_prefix("-----BEGIN ")?;
    let (label, _) = begin.split_once("-----")?;
    Some(label)
}
