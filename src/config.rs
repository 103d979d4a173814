//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml, `$RELAYGAZER_CONFIG`)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub actor: ActorConfig,
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "relay.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://relay.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Relay actor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ActorConfig {
    /// preferredUsername (default: "relay")
    #[serde(default = "default_actor_username")]
    pub username: String,
    /// Display name
    #[serde(default = "default_actor_name")]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    /// PEM file holding the RSA private key (PKCS#1 or PKCS#8)
    pub private_key_path: PathBuf,
    /// Avatar URL
    pub icon: Option<String>,
    /// Header image URL
    pub image: Option<String>,
}

fn default_actor_username() -> String {
    "relay".to_string()
}

fn default_actor_name() -> String {
    "Relaygazer".to_string()
}

/// Federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// User-Agent sent when fetching remote actors
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound for a remote actor fetch
    pub fetch_timeout_seconds: u64,
    /// Largest accepted inbox body
    pub max_body_bytes: usize,
    /// Accepted distance between a signed Date header and now
    pub signature_max_skew_seconds: u64,
    /// Actor cache TTL; 0 disables caching
    pub key_cache_ttl_seconds: u64,
    /// Allow fetching actors from loopback/private addresses
    pub allow_private_hosts: bool,
}

fn default_user_agent() -> String {
    format!("Relaygazer/{}", env!("CARGO_PKG_VERSION"))
}

impl FederationConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn signature_max_skew(&self) -> Duration {
        Duration::from_secs(self.signature_max_skew_seconds)
    }

    pub fn key_cache_ttl(&self) -> Option<Duration> {
        (self.key_cache_ttl_seconds > 0).then(|| Duration::from_secs(self.key_cache_ttl_seconds))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. File named by RELAYGAZER_CONFIG (if set)
    /// 5. Environment variables (RELAYGAZER__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("federation.fetch_timeout_seconds", 10)?
            .set_default("federation.max_body_bytes", 1024 * 1024)?
            .set_default("federation.signature_max_skew_seconds", 300)?
            .set_default("federation.key_cache_ttl_seconds", 0)?
            .set_default("federation.allow_private_hosts", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false));

        if let Ok(path) = std::env::var("RELAYGAZER_CONFIG") {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        let config = builder
            // Load from environment variables (RELAYGAZER__*)
            .add_source(
                Environment::with_prefix("RELAYGAZER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.server.domain.trim().is_empty() {
            return Err(AppError::Config("server.domain must not be empty".to_string()));
        }

        if self.federation.fetch_timeout_seconds == 0 {
            return Err(AppError::Config(
                "federation.fetch_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.federation.max_body_bytes == 0 {
            return Err(AppError::Config(
                "federation.max_body_bytes must be greater than 0".to_string(),
            ));
        }

        if self.federation.allow_private_hosts {
            tracing::warn!("Fetching actors from private addresses is allowed");
        }

        if is_local_server_domain(&self.server.domain) {
            if !self.server.protocol.eq_ignore_ascii_case("https") {
                tracing::warn!(
                    domain = %self.server.domain,
                    "Serving over plain http for local development"
                );
            }
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
