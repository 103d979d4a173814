//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::OnceLock;

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use relaygazer::{AppState, config};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const RELAY_DOMAIN: &str = "relay.test.example.com";

/// User agent the relay under test sends on actor fetches
pub const TEST_USER_AGENT: &str = "Relaygazer-test";

/// Body limit used by the test server
pub const MAX_BODY_BYTES: usize = 16 * 1024;

fn generate_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
}

/// Key held by the relay under test
pub fn relay_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

/// Key published by the stub remote actor
pub fn remote_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

/// Key nobody publishes
pub fn stranger_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

/// Spawn a router on an ephemeral port and return its base URL
async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Write the service key to a temporary file
        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("relay.pem");
        let pem = relay_key().to_pkcs8_pem(LineEnding::LF).unwrap();
        std::fs::write(&key_path, pem.as_bytes()).unwrap();

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: RELAY_DOMAIN.to_string(),
                protocol: "https".to_string(),
            },
            actor: config::ActorConfig {
                username: "relay".to_string(),
                name: "Test Relay".to_string(),
                summary: "Relay under test".to_string(),
                private_key_path: key_path,
                icon: None,
                image: None,
            },
            federation: config::FederationConfig {
                user_agent: TEST_USER_AGENT.to_string(),
                fetch_timeout_seconds: 5,
                max_body_bytes: MAX_BODY_BYTES,
                signature_max_skew_seconds: 300,
                key_cache_ttl_seconds: 0,
                // The stub remote actor listens on loopback
                allow_private_hosts: true,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let addr = spawn(relaygazer::build_router(state.clone())).await;

        Self {
            addr,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// POST a body to /inbox signed by `key` under `key_id`
    pub async fn deliver(
        &self,
        body: &[u8],
        key: &RsaPrivateKey,
        key_id: &str,
    ) -> reqwest::Response {
        let url = self.url("/inbox");
        let signed = relaygazer::federation::sign_request("POST", &url, Some(body), key, key_id)
            .unwrap();

        self.client
            .post(&url)
            .header("Content-Type", "application/activity+json")
            .header("Date", signed.date)
            .header("Digest", signed.digest.unwrap())
            .header("Signature", signed.signature)
            .body(body.to_vec())
            .send()
            .await
            .unwrap()
    }
}

/// A remote server publishing actor documents
///
/// Like a picky real server it answers 406 without an ActivityPub
/// `Accept` header and 403 to clients other than [`TEST_USER_AGENT`].
pub struct RemoteActorStub {
    pub addr: String,
}

impl RemoteActorStub {
    /// Serve `remote_key()` at /users/alice
    pub async fn new() -> Self {
        // The documents embed the stub's own URL, so bind first
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let alice = actor_document(&addr, "alice", "main-key");
        // Publishes a key under a different id than the one it is asked for
        let impostor = actor_document(&addr, "impostor", "other-key");
        let pending = actor_document(&addr, "pending", "main-key");

        let app = Router::new()
            .route(
                "/users/alice",
                get(move |headers: HeaderMap| serve_actor(headers, StatusCode::OK, alice.clone())),
            )
            .route(
                "/users/impostor",
                get(move |headers: HeaderMap| {
                    serve_actor(headers, StatusCode::OK, impostor.clone())
                }),
            )
            .route(
                "/users/pending",
                get(move |headers: HeaderMap| {
                    serve_actor(headers, StatusCode::ACCEPTED, pending.clone())
                }),
            )
            .route(
                "/users/moved",
                get(|| async {
                    (
                        StatusCode::MOVED_PERMANENTLY,
                        [(header::LOCATION, "/users/alice")],
                    )
                }),
            );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr }
    }

    pub fn actor_id(&self) -> String {
        format!("{}/users/alice", self.addr)
    }

    pub fn key_id(&self) -> String {
        format!("{}#main-key", self.actor_id())
    }

    /// A key id on the stub whose actor does not exist
    pub fn missing_key_id(&self) -> String {
        format!("{}/users/nobody#main-key", self.addr)
    }

    /// An actor that advertises `#other-key` instead of `#main-key`
    pub fn impostor_key_id(&self) -> String {
        format!("{}/users/impostor#main-key", self.addr)
    }

    /// An actor URL answering with a permanent redirect to alice
    pub fn moved_key_id(&self) -> String {
        format!("{}/users/moved#main-key", self.addr)
    }

    /// An actor served with 202 instead of 200
    pub fn pending_key_id(&self) -> String {
        format!("{}/users/pending#main-key", self.addr)
    }
}

async fn serve_actor(headers: HeaderMap, status: StatusCode, document: Value) -> Response {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    if !header_value(header::ACCEPT).contains("application/activity+json") {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    if header_value(header::USER_AGENT) != TEST_USER_AGENT {
        return StatusCode::FORBIDDEN.into_response();
    }

    (
        status,
        [(header::CONTENT_TYPE, "application/activity+json")],
        Json(document),
    )
        .into_response()
}

fn actor_document(base: &str, username: &str, key_fragment: &str) -> Value {
    let actor_id = format!("{}/users/{}", base, username);
    let public_key_pem = remote_key()
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();

    json!({
        "@context": [
            "https://www.w3.org/ns/activitystreams",
            "https://w3id.org/security/v1"
        ],
        "id": actor_id,
        "type": "Person",
        "preferredUsername": username,
        "inbox": format!("{}/inbox", actor_id),
        "publicKey": {
            "id": format!("{}#{}", actor_id, key_fragment),
            "owner": actor_id,
            "publicKeyPem": public_key_pem
        }
    })
}
