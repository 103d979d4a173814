//! HTTP Signatures for ActivityPub
//!
//! Implements signing and verification per:
//! https://docs.joinmastodon.org/spec/security/
//!
//! Verification is split in two so that everything that can be checked
//! locally happens before any network I/O: [`SignatureEnvelope::from_request`]
//! parses the header and rebuilds the signing string, and
//! [`SignatureEnvelope::verify`] runs the RSA check once the signer's key
//! has been resolved.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use http::HeaderMap;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPrivateKey, RsaPublicKey, pkcs1v15::Signature as Pkcs1v15Signature};
use sha2::Sha256;
use thiserror::Error;

use super::digest::generate_digest;

/// Signed headers every inbound request must cover.
const REQUIRED_SIGNED_HEADERS: [&str; 3] = ["(request-target)", "host", "date"];

/// Signature handling failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Header missing or unusable; detected before any key lookup
    #[error("{0}")]
    InvalidHeader(String),

    /// Cryptographic check against the signer's key failed
    #[error("{0}")]
    Verification(String),
}

fn invalid(message: impl Into<String>) -> SignatureError {
    SignatureError::InvalidHeader(message.into())
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm (usually rsa-sha256)
    pub algorithm: String,
    /// Signed header names
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, SignatureError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    // Split by comma and parse key=value pairs
    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');

            match key {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_ascii_lowercase()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {} // Ignore unknown fields
            }
        }
    }

    Ok(ParsedSignature {
        key_id: key_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid("Missing keyId"))?,
        algorithm: algorithm.ok_or_else(|| invalid("Missing algorithm"))?,
        headers: headers.ok_or_else(|| invalid("Missing headers"))?,
        signature: signature.ok_or_else(|| invalid("Missing signature"))?,
    })
}

/// Everything needed to verify a request once the signer's key is known
#[derive(Debug, Clone)]
pub struct SignatureEnvelope {
    key_id: String,
    algorithm: String,
    signing_string: String,
    signature: Vec<u8>,
}

impl SignatureEnvelope {
    /// Parse the Signature header of an inbound request.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path_and_query` - Request target as received
    /// * `headers` - All request headers
    /// * `has_body` - Whether the request carries a body (requires `digest` to be signed)
    /// * `max_skew` - Accepted distance between the `Date` header and now
    pub fn from_request(
        method: &str,
        path_and_query: &str,
        headers: &HeaderMap,
        has_body: bool,
        max_skew: Duration,
    ) -> Result<Self, SignatureError> {
        // 1. Parse Signature header
        let signature_header = headers
            .get("signature")
            .ok_or_else(|| invalid("Missing Signature header"))?
            .to_str()
            .map_err(|_| invalid("Invalid Signature header"))?;

        let parsed = parse_signature_header(signature_header)?;

        // 2. Validate algorithm and required signed headers.
        if parsed.algorithm != "rsa-sha256" && parsed.algorithm != "hs2019" {
            return Err(invalid(format!(
                "Unsupported signature algorithm: {}",
                parsed.algorithm
            )));
        }

        for required in REQUIRED_SIGNED_HEADERS {
            if !parsed.headers.iter().any(|h| h == required) {
                return Err(invalid(format!("Signed headers must include: {}", required)));
            }
        }

        if has_body && !parsed.headers.iter().any(|h| h == "digest") {
            return Err(invalid("Signed headers must include: digest"));
        }

        // 3. Verify Date is recent.
        let date_str = header_value(headers, "date")?;
        let date = DateTime::parse_from_rfc2822(&date_str)
            .map_err(|_| invalid("Invalid Date format"))?;

        let diff = (Utc::now().timestamp() - date.timestamp()).unsigned_abs();
        if diff > max_skew.as_secs() {
            return Err(invalid("Date header too old or in future"));
        }

        // 4. Reconstruct signing string.
        let mut signing_parts = Vec::with_capacity(parsed.headers.len());
        for header_name in &parsed.headers {
            let value = match header_name.as_str() {
                "(request-target)" => {
                    format!("{} {}", method.to_lowercase(), path_and_query)
                }
                pseudo if pseudo.starts_with('(') => {
                    return Err(invalid(format!(
                        "Unsupported header in signature: {}",
                        pseudo
                    )));
                }
                name => header_value(headers, name)?,
            };

            signing_parts.push(format!("{}: {}", header_name, value));
        }

        let signature = BASE64
            .decode(&parsed.signature)
            .map_err(|_| invalid("Invalid signature encoding"))?;

        Ok(Self {
            key_id: parsed.key_id,
            algorithm: parsed.algorithm,
            signing_string: signing_parts.join("\n"),
            signature,
        })
    }

    /// Key ID claimed by the signer
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The reconstructed string the signer is expected to have signed
    pub fn signing_string(&self) -> &str {
        &self.signing_string
    }

    /// Verify the signature with RSASSA-PKCS1-v1_5 / SHA-256.
    ///
    /// Accepts SPKI (`PUBLIC KEY`) and PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub fn verify(&self, public_key_pem: &str) -> Result<(), SignatureError> {
        let public_key = parse_public_key(public_key_pem)?;
        let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key);

        let signature = Pkcs1v15Signature::try_from(self.signature.as_slice())
            .map_err(|e| SignatureError::Verification(format!("Invalid signature format: {}", e)))?;

        verifier
            .verify(self.signing_string.as_bytes(), &signature)
            .map_err(|_| SignatureError::Verification("Signature verification failed".to_string()))
    }
}

/// Combined value of a request header; repeated headers are joined with `, `.
fn header_value(headers: &HeaderMap, name: &str) -> Result<String, SignatureError> {
    let mut values = headers.get_all(name).iter().peekable();
    if values.peek().is_none() {
        return Err(invalid(format!("Missing {} header", name)));
    }

    let values = values
        .map(|value| value.to_str().map(str::trim))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid(format!("Invalid {} header", name)))?;

    Ok(values.join(", "))
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, SignatureError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| SignatureError::Verification(format!("Invalid public key: {}", e)))
}

/// Headers to add for signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 2616)
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
}

/// Sign an HTTP request
///
/// Creates HTTP Signature header for outgoing requests.
///
/// # Arguments
/// * `method` - HTTP method (e.g., "POST")
/// * `url` - Full URL being requested
/// * `body` - Request body (for digest)
/// * `private_key` - Signer's RSA private key
/// * `key_id` - Full URL to the public key (actor#main-key)
///
/// # Returns
/// Signature, Date, and Digest (if body present) header values
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key: &RsaPrivateKey,
    key_id: &str,
) -> Result<SignatureHeaders, SignatureError> {
    let digest = body.map(generate_digest);
    sign_request_with_digest(method, url, digest, private_key, key_id)
}

/// Sign an HTTP request with an explicit Digest header value.
pub fn sign_request_with_digest(
    method: &str,
    url: &str,
    digest: Option<String>,
    private_key: &RsaPrivateKey,
    key_id: &str,
) -> Result<SignatureHeaders, SignatureError> {
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    // 1. Parse URL to get host and path
    let parsed_url = url::Url::parse(url).map_err(|e| invalid(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| invalid("Missing host in URL"))?;
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path_and_query = match parsed_url.query() {
        Some(q) => format!("{}?{}", parsed_url.path(), q),
        None => parsed_url.path().to_string(),
    };

    // 2. Generate Date header (RFC 2822 format)
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

    // 3. Build signing string
    let mut signing_parts = vec![
        format!("(request-target): {} {}", method.to_lowercase(), path_and_query),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut headers_list = vec!["(request-target)", "host", "date"];

    if let Some(ref digest_value) = digest {
        signing_parts.push(format!("digest: {}", digest_value));
        headers_list.push("digest");
    }

    let signing_string = signing_parts.join("\n");

    // 4. Sign with RSA-SHA256
    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());
    let signature_b64 = BASE64.encode(signature.to_bytes());

    // 5. Build Signature header
    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        headers_list.join(" "),
        signature_b64
    );

    Ok(SignatureHeaders {
        signature: signature_header,
        date,
        digest,
    })
}
