//! Remote actor resolution
//!
//! Fetches the actor document named by a signature's keyId so the inbox
//! can verify the signature with the signer's own key.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;

use super::actor::RemoteActor;
use crate::metrics::{ACTOR_FETCH_DURATION_SECONDS, CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

/// Actor resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Invalid key id: {0}")]
    InvalidKeyId(String),

    #[error("Actor host is not allowed: {0}")]
    ForbiddenHost(String),

    #[error("Actor fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to fetch actor: {0}")]
    Transport(String),

    #[error("Failed to fetch actor: HTTP {0}")]
    Status(u16),

    #[error("Failed to parse actor: {0}")]
    Decode(String),

    #[error("Signature keyId does not match actor public key id")]
    KeyIdMismatch,

    /// Local fault unrelated to the remote party
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ResolveError {
    /// Whether the failure is ours rather than the remote party's.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Client(_))
    }
}

/// Resolves a signature keyId to the actor that owns it.
pub trait ActorResolver: Send + Sync {
    fn resolve(
        &self,
        key_id: &str,
    ) -> impl Future<Output = Result<RemoteActor, ResolveError>> + Send;
}

impl<R: ActorResolver> ActorResolver for Arc<R> {
    fn resolve(
        &self,
        key_id: &str,
    ) -> impl Future<Output = Result<RemoteActor, ResolveError>> + Send {
        self.as_ref().resolve(key_id)
    }
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), ResolveError> {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((normalized.as_str(), port))
        .await
        .map_err(|e| ResolveError::Transport(format!("Failed to resolve actor host: {}", e)))?
        .collect();

    if addrs.iter().any(|addr| is_disallowed_ip(addr.ip())) {
        return Err(ResolveError::ForbiddenHost(normalized));
    }

    if addrs.is_empty() {
        return Err(ResolveError::Transport(
            "No DNS records for actor host".to_string(),
        ));
    }

    Ok(())
}

/// Actor document URL for a key ID: the key ID without its fragment.
pub fn actor_url_from_key_id(key_id: &str) -> Result<url::Url, ResolveError> {
    let actor_url = key_id.split('#').next().unwrap_or(key_id);
    let parsed = url::Url::parse(actor_url)
        .map_err(|e| ResolveError::InvalidKeyId(format!("{}: {}", key_id, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ResolveError::InvalidKeyId(format!(
                "Unsupported actor URL scheme: {}",
                scheme
            )));
        }
    }

    if parsed.host_str().is_none() {
        return Err(ResolveError::InvalidKeyId(format!(
            "Missing host in actor URL: {}",
            key_id
        )));
    }

    Ok(parsed)
}

/// Fetches remote actors over HTTP
#[derive(Debug, Clone)]
pub struct HttpActorResolver {
    http_client: reqwest::Client,
    allow_private_hosts: bool,
}

impl HttpActorResolver {
    /// Build a resolver with its own HTTP client.
    ///
    /// # Arguments
    /// * `user_agent` - Sent with every actor fetch
    /// * `timeout` - Upper bound for a single fetch
    /// * `allow_private_hosts` - Skip the loopback/private address guard (tests, LAN setups)
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        allow_private_hosts: bool,
    ) -> Result<Self, ResolveError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ResolveError::Client(e.to_string()))?;

        Ok(Self::with_client(http_client, allow_private_hosts))
    }

    pub fn with_client(http_client: reqwest::Client, allow_private_hosts: bool) -> Self {
        Self {
            http_client,
            allow_private_hosts,
        }
    }

    async fn fetch(&self, key_id: &str) -> Result<RemoteActor, ResolveError> {
        let actor_url = actor_url_from_key_id(key_id)?;

        if !self.allow_private_hosts {
            let host = actor_url.host_str().unwrap_or_default();
            if is_disallowed_host(host) {
                return Err(ResolveError::ForbiddenHost(host.to_string()));
            }

            let port = actor_url.port_or_known_default().ok_or_else(|| {
                ResolveError::InvalidKeyId(format!("Missing port in actor URL: {}", key_id))
            })?;

            // Resolve DNS before fetching and reject local/private destinations.
            validate_resolved_host_ips(host, port).await?;
        }

        let response = self
            .http_client
            .get(actor_url)
            .header("Accept", "application/activity+json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolveError::Transport(format!("timed out: {}", e))
                } else if e.is_builder() {
                    ResolveError::Client(e.to_string())
                } else {
                    ResolveError::Transport(e.to_string())
                }
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ResolveError::Status(response.status().as_u16()));
        }

        let actor: RemoteActor = response
            .json()
            .await
            .map_err(|e| ResolveError::Decode(e.to_string()))?;

        // If a key fragment is provided, ensure actor advertises exactly that key id.
        if key_id.contains('#') && actor.public_key.id != key_id {
            return Err(ResolveError::KeyIdMismatch);
        }

        Ok(actor)
    }
}

impl ActorResolver for HttpActorResolver {
    async fn resolve(&self, key_id: &str) -> Result<RemoteActor, ResolveError> {
        let _timer = ACTOR_FETCH_DURATION_SECONDS.start_timer();
        tracing::debug!(key_id, "Fetching remote actor");
        self.fetch(key_id).await
    }
}

/// Cached actor entry
#[derive(Debug, Clone)]
struct CachedActor {
    actor: RemoteActor,
    /// When this entry was cached
    cached_at: Instant,
}

/// Short-lived actor cache in front of another resolver
///
/// With no TTL every lookup goes to the inner resolver.
pub struct CachedActorResolver<R> {
    inner: R,
    /// Cache storage: key_id -> cached actor
    cache: Arc<RwLock<HashMap<String, CachedActor>>>,
    ttl: Option<Duration>,
}

impl<R: ActorResolver> CachedActorResolver<R> {
    pub fn new(inner: R, ttl: Option<Duration>) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    fn is_valid(&self, entry: &CachedActor) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.cached_at.elapsed() < ttl)
    }

    /// Invalidate a cached key
    pub async fn invalidate(&self, key_id: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(key_id);
        tracing::debug!(key_id, "Invalidated actor cache entry");
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let cache = self.cache.read().await;
        let total = cache.len();
        let valid = cache.values().filter(|v| self.is_valid(v)).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }

    /// Prune expired entries
    ///
    /// Called periodically by the binary when caching is enabled.
    pub async fn prune_expired(&self) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        let ttl = self.ttl;
        cache.retain(|_, v| ttl.is_some_and(|ttl| v.cached_at.elapsed() < ttl));
        let removed = before - cache.len();

        if removed > 0 {
            tracing::info!("Pruned {} expired actor cache entries", removed);
        }
    }
}

impl<R: ActorResolver> ActorResolver for CachedActorResolver<R> {
    async fn resolve(&self, key_id: &str) -> Result<RemoteActor, ResolveError> {
        if self.ttl.is_none() {
            return self.inner.resolve(key_id).await;
        }

        // 1. Check cache (read lock)
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(key_id) {
                if self.is_valid(cached) {
                    CACHE_HITS_TOTAL.with_label_values(&["actor"]).inc();
                    tracing::debug!(key_id, "Actor cache hit");
                    return Ok(cached.actor.clone());
                }
            }
        }

        // 2. Cache miss or expired - fetch from remote
        CACHE_MISSES_TOTAL.with_label_values(&["actor"]).inc();
        let actor = self.inner.resolve(key_id).await?;

        // 3. Update cache (write lock)
        {
            let mut cache = self.cache.write().await;
            cache.insert(
                key_id.to_string(),
                CachedActor {
                    actor: actor.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        Ok(actor)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Number of valid (non-expired) entries
    pub valid_entries: usize,
    /// Number of expired entries
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::actor::PublicKeyDocument;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY_ID: &str = "https://remote.example/users/alice#main-key";

    fn remote_actor(key_id: &str) -> RemoteActor {
        RemoteActor {
            id: "https://remote.example/users/alice".to_string(),
            inbox: None,
            public_key: PublicKeyDocument {
                id: key_id.to_string(),
                owner: "https://remote.example/users/alice".to_string(),
                public_key_pem: "pem".to_string(),
            },
        }
    }

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl ActorResolver for CountingResolver {
        async fn resolve(&self, key_id: &str) -> Result<RemoteActor, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(remote_actor(key_id))
        }
    }

    #[test]
    fn actor_url_strips_fragment() {
        let url = actor_url_from_key_id(KEY_ID).expect("valid key id");
        assert_eq!(url.as_str(), "https://remote.example/users/alice");
    }

    #[test]
    fn actor_url_rejects_non_http_scheme() {
        assert!(matches!(
            actor_url_from_key_id("ftp://remote.example/users/alice"),
            Err(ResolveError::InvalidKeyId(_))
        ));
        assert!(matches!(
            actor_url_from_key_id("not a url"),
            Err(ResolveError::InvalidKeyId(_))
        ));
    }

    #[test]
    fn disallowed_host_covers_local_and_private_addresses() {
        assert!(is_disallowed_host("localhost"));
        assert!(is_disallowed_host("relay.localhost."));
        assert!(is_disallowed_host("192.168.1.10"));
        assert!(is_disallowed_host("[::1]"));
        assert!(!is_disallowed_host("example.com"));
        assert!(!is_disallowed_host("93.184.216.34"));
    }

    #[tokio::test]
    async fn http_resolver_rejects_localhost_without_network() {
        let resolver = HttpActorResolver::new("test", Duration::from_secs(1), false)
            .expect("client builds");
        match resolver.resolve("https://localhost/users/alice#main-key").await {
            Err(ResolveError::ForbiddenHost(host)) => assert_eq!(host, "localhost"),
            other => panic!("expected forbidden host, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_resolved_host_ips_rejects_loopback() {
        match validate_resolved_host_ips("127.0.0.1", 80).await {
            Err(ResolveError::ForbiddenHost(_)) => {}
            other => panic!("expected forbidden for loopback resolution, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_resolved_host_ips_reports_normalized_host() {
        match validate_resolved_host_ips("LocalHost.", 443).await {
            Err(ResolveError::ForbiddenHost(host)) => assert_eq!(host, "localhost"),
            other => panic!("expected forbidden for localhost resolution, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_disabled_always_delegates() {
        let cached = CachedActorResolver::new(CountingResolver::default(), Some(Duration::ZERO));
        assert!(!cached.is_enabled());

        cached.resolve(KEY_ID).await.expect("resolves");
        cached.resolve(KEY_ID).await.expect("resolves");
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups_until_expiry() {
        let cached = CachedActorResolver::new(
            CountingResolver::default(),
            Some(Duration::from_millis(100)),
        );

        cached.resolve(KEY_ID).await.expect("resolves");
        cached.resolve(KEY_ID).await.expect("resolves");
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.stats().await.valid_entries, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cached.stats().await.expired_entries, 1);

        cached.prune_expired().await;
        assert_eq!(cached.stats().await.total_entries, 0);

        cached.resolve(KEY_ID).await.expect("resolves");
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);

        cached.invalidate(KEY_ID).await;
        assert_eq!(cached.stats().await.total_entries, 0);
    }
}
