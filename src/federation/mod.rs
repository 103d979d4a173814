//! ActivityPub federation module
//!
//! Handles:
//! - Activity model and admission rules
//! - Inbox admission pipeline
//! - HTTP Signatures
//! - Body digests
//! - Remote actor fetching and caching

mod activity;
mod actor;
mod digest;
mod inbox;
mod resolver;
mod signature;

#[cfg(test)]
mod test_support;

pub use activity::{Activity, ActivityObject, ActivityType, PUBLIC_COLLECTION, ValidationError};
pub use actor::{ActorDocument, PublicKeyDocument, RemoteActor};
pub use digest::{DigestChecker, DigestMismatch, Sha256Digest, generate_digest};
pub use inbox::{InboundRequest, InboxPipeline, InboxRejection, InboxSettings, VerificationOutcome};
pub use resolver::{
    ActorResolver, CacheStats, CachedActorResolver, HttpActorResolver, ResolveError,
    actor_url_from_key_id,
};
pub use signature::{
    ParsedSignature, SignatureEnvelope, SignatureError, SignatureHeaders, parse_signature_header,
    sign_request, sign_request_with_digest,
};

/// Resolver stack used by the running service
pub type ServiceResolver = CachedActorResolver<HttpActorResolver>;

/// Inbox pipeline used by the running service
pub type ServiceInboxPipeline = InboxPipeline<ServiceResolver>;
