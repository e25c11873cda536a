use std::collections::HashMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

/// Per-collection-family firehose subscription endpoints, e.g.
/// `community.post -> wss://relay.example/subscribe?collection=community.post`.
pub type FirehoseUrls = HashMap<String, String>;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    pub default_per_minute: u32,
    pub thread_read_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_per_minute: 100,
            thread_read_per_minute: 20,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub db_url: String,
    pub db_max_connections: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub db_acquire_timeout: Duration,

    /// Subscription endpoints, keyed by collection family
    /// (community.profile, community.subscription, community.post, feed.vote,
    /// feed.comment, aggregator.service, aggregator.authorization, the
    /// user-profile collection).
    pub firehose_urls: FirehoseUrls,

    pub identity_directory_url: String,
    #[serde(default = "default_identity_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub identity_cache_ttl: Duration,

    /// This instance's own DID; its domain is derived for did:web matching.
    pub instance_did: String,
    #[serde(default)]
    pub trust_external_hosts: bool,
    #[serde(default = "default_true")]
    pub did_web_verification_enabled: bool,

    /// Process-wide secret used to HMAC-sign opaque pagination cursors.
    pub cursor_hmac_secret: String,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,
}

fn default_identity_cache_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn new_from_file_and_env(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("coves").separator("__"))
            .build()
            .and_then(|cfg| cfg.try_deserialize::<Self>())
    }

    /// The domain segment of `instance_did` when it is a `did:web:<domain>`,
    /// used to verify `hostedBy` claims on community-profile records.
    pub fn instance_domain(&self) -> Option<&str> {
        self.instance_did.strip_prefix("did:web:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_domain_extracts_web_did_host() {
        let cfg = AppConfig {
            db_url: "postgres://localhost/coves".into(),
            db_max_connections: 5,
            db_acquire_timeout: Duration::from_secs(5),
            firehose_urls: HashMap::new(),
            identity_directory_url: "https://plc.example".into(),
            identity_cache_ttl: default_identity_cache_ttl(),
            instance_did: "did:web:coves.example".into(),
            trust_external_hosts: false,
            did_web_verification_enabled: true,
            cursor_hmac_secret: "secret".into(),
            rate_limits: RateLimitConfig::default(),
        };
        assert_eq!(cfg.instance_domain(), Some("coves.example"));
    }

    #[test]
    fn instance_domain_none_for_non_web_did() {
        let mut cfg_firehose = HashMap::new();
        cfg_firehose.insert("community.post".to_string(), "wss://example".to_string());
        let cfg = AppConfig {
            db_url: "postgres://localhost/coves".into(),
            db_max_connections: 5,
            db_acquire_timeout: Duration::from_secs(5),
            firehose_urls: cfg_firehose,
            identity_directory_url: "https://plc.example".into(),
            identity_cache_ttl: default_identity_cache_ttl(),
            instance_did: "did:plc:abc123".into(),
            trust_external_hosts: false,
            did_web_verification_enabled: true,
            cursor_hmac_secret: "secret".into(),
            rate_limits: RateLimitConfig::default(),
        };
        assert_eq!(cfg.instance_domain(), None);
    }
}
