//! Inbox admission pipeline
//!
//! Decides whether a signed delivery is accepted. Stages run in a fixed
//! order and each one short-circuits the request on failure:
//!
//! 1. Parse the Signature header (no network I/O)
//! 2. Resolve the signer's actor document
//! 3. Verify the signature with the signer's key
//! 4. Verify the body digest
//! 5. Decode the activity and apply the admission rules
//!
//! The body is buffered once by the caller and shared by stages 4 and 5.

use std::time::Duration;

use axum::body::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use super::activity::{Activity, ValidationError};
use super::digest::{DigestChecker, Sha256Digest};
use super::resolver::{ActorResolver, ResolveError};
use super::signature::{SignatureEnvelope, SignatureError};

/// Why a delivery was refused
#[derive(Debug, Error)]
pub enum InboxRejection {
    #[error("Invalid signature header: {0}")]
    SignatureHeaderInvalid(String),

    #[error("Could not resolve signer: {0}")]
    ActorResolutionFailed(#[from] ResolveError),

    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    #[error("Digest mismatch: declared {declared:?}, computed {computed:?}")]
    DigestMismatch { declared: String, computed: String },

    #[error("Malformed activity: {0}")]
    MalformedActivity(#[from] serde_json::Error),

    #[error("Activity rejected: {0}")]
    SemanticValidationFailed(#[from] ValidationError),

    #[error("Unsupported activity type")]
    UnsupportedActivityType,
}

impl InboxRejection {
    /// HTTP status the inbox endpoint answers with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ActorResolutionFailed(err) if err.is_internal() => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::SignatureHeaderInvalid(_) => "signature_header_invalid",
            Self::ActorResolutionFailed(_) => "actor_resolution_failed",
            Self::SignatureVerificationFailed(_) => "signature_verification_failed",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::MalformedActivity(_) => "malformed_activity",
            Self::SemanticValidationFailed(_) => "semantic_validation_failed",
            Self::UnsupportedActivityType => "unsupported_activity_type",
        }
    }
}

impl From<SignatureError> for InboxRejection {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidHeader(msg) => Self::SignatureHeaderInvalid(msg),
            SignatureError::Verification(msg) => Self::SignatureVerificationFailed(msg),
        }
    }
}

/// Terminal result of the pipeline
#[derive(Debug)]
pub enum VerificationOutcome {
    Accepted(Activity),
    Rejected(InboxRejection),
}

impl VerificationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn into_result(self) -> Result<Activity, InboxRejection> {
        match self {
            Self::Accepted(activity) => Ok(activity),
            Self::Rejected(rejection) => Err(rejection),
        }
    }
}

impl From<Result<Activity, InboxRejection>> for VerificationOutcome {
    fn from(result: Result<Activity, InboxRejection>) -> Self {
        match result {
            Ok(activity) => Self::Accepted(activity),
            Err(rejection) => Self::Rejected(rejection),
        }
    }
}

/// An inbound delivery with its body already buffered
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Request target exactly as received, e.g. `/inbox`
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct InboxSettings {
    /// Upper bound for the actor fetch
    pub fetch_timeout: Duration,
    /// Accepted distance between the `Date` header and now
    pub signature_max_skew: Duration,
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            signature_max_skew: Duration::from_secs(300),
        }
    }
}

/// The inbox admission filter
///
/// Stateless apart from its collaborators; one instance serves all requests.
pub struct InboxPipeline<R, D = Sha256Digest> {
    resolver: R,
    digest: D,
    settings: InboxSettings,
}

impl<R: ActorResolver> InboxPipeline<R, Sha256Digest> {
    pub fn new(resolver: R, settings: InboxSettings) -> Self {
        Self::with_digest(resolver, Sha256Digest, settings)
    }
}

impl<R: ActorResolver, D: DigestChecker> InboxPipeline<R, D> {
    pub fn with_digest(resolver: R, digest: D, settings: InboxSettings) -> Self {
        Self {
            resolver,
            digest,
            settings,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Run a delivery through all five stages.
    pub async fn process(&self, request: &InboundRequest) -> VerificationOutcome {
        self.run(request).await.into()
    }

    async fn run(&self, request: &InboundRequest) -> Result<Activity, InboxRejection> {
        // 1. Signature envelope. A signed body without a Digest header can
        // never pass stage 4, so it is refused here without a fetch.
        if !request.body.is_empty()
            && request.headers.contains_key("signature")
            && !request.headers.contains_key("digest")
        {
            return Err(InboxRejection::DigestMismatch {
                declared: String::new(),
                computed: self.digest.digest(&request.body),
            });
        }
        let envelope = SignatureEnvelope::from_request(
            request.method.as_str(),
            &request.path_and_query,
            &request.headers,
            !request.body.is_empty(),
            self.settings.signature_max_skew,
        )?;
        let key_id = envelope.key_id();
        tracing::debug!(key_id, "Signature header parsed");

        // 2. Signer's actor document
        let timeout = self.settings.fetch_timeout;
        let actor = tokio::time::timeout(timeout, self.resolver.resolve(key_id))
            .await
            .map_err(|_| ResolveError::Timeout(timeout))??;
        tracing::debug!(key_id, actor = %actor.id, "Signer resolved");

        // 3. Signature, against the resolved signer's key
        envelope.verify(&actor.public_key.public_key_pem)?;

        // 4. Digest over the raw body
        let declared = request
            .headers
            .get("digest")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        self.digest
            .verify(&request.body, declared)
            .map_err(|mismatch| InboxRejection::DigestMismatch {
                declared: mismatch.declared,
                computed: mismatch.computed,
            })?;

        // 5. Decode and validate
        let activity = Activity::from_slice(&request.body)?;
        activity.validate()?;

        Ok(activity)
    }
}
