//! Relay configuration.
//!
//! Every knob has a production default; `RelayConfig::from_env` applies
//! environment overrides on top so deployments only set what they change.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default streaming feed endpoint.
pub const DEFAULT_FEED_URI: &str = "wss://api.mongoosee.com/solsstattracker/v2/gateway";

/// Icon the feed attaches to ordinary global finds. A different icon on an
/// event marks it as coming from a special announcement track.
pub const DEFAULT_GLOBAL_ICON_URL: &str = "https://cdn.mongoosee.com/assets/stars/Global.png";

/// Retry budget and delay bounds for one connection regime.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Feed connection and reconnection configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket endpoint of the feed.
    pub feed_uri: String,

    /// Fail-fast regime used until the first frame has ever been received.
    pub startup: RetryPolicy,

    /// Lenient regime used once the connection has been up at least once.
    pub runtime: RetryPolicy,

    /// A connection that stays silent longer than this is dropped and
    /// reconnected.
    pub zombie_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            feed_uri: DEFAULT_FEED_URI.to_string(),
            startup: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(10),
            },
            runtime: RetryPolicy {
                max_retries: 10,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(300),
            },
            zombie_timeout: Duration::from_secs(60),
        }
    }
}

/// Envelope queue configuration.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum queued envelopes; overflow drops the oldest entry.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Duplicate-suppression window configuration.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Number of recent fingerprints to remember.
    pub window_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}

/// Permission cache TTL and size configuration.
#[derive(Debug, Clone, Copy)]
pub struct PermissionCacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 1000,
        }
    }
}

/// Webhook URL validation rules.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// A destination host must equal one of these domains or be a subdomain
    /// of one.
    pub allowed_domains: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_domains: vec!["discord.com".to_string(), "discordapp.com".to_string()],
        }
    }
}

/// Notification rendering configuration.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Numeric rarity at or above which a find gets the attention caption.
    pub exceptional_rarity_threshold: u64,

    /// Icon URL carried by ordinary finds; anything else flags the event.
    pub global_icon_url: String,

    /// Caption prepended to exceptional finds.
    pub exceptional_caption: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            exceptional_rarity_threshold: 750_000_000,
            global_icon_url: DEFAULT_GLOBAL_ICON_URL.to_string(),
            exceptional_caption: "Good find!".to_string(),
        }
    }
}

/// Identity stamped onto outgoing webhook posts.
#[derive(Debug, Clone)]
pub struct WebhookIdentity {
    pub username: String,
    pub avatar_url: Option<String>,
}

impl Default for WebhookIdentity {
    fn default() -> Self {
        Self {
            username: "Findcast".to_string(),
            avatar_url: None,
        }
    }
}

/// Root configuration for the relay pipeline.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub gateway: GatewayConfig,
    pub queue: QueueConfig,
    pub dedup: DedupConfig,
    pub permission: PermissionCacheConfig,
    pub validation: ValidationConfig,
    pub notify: NotifyConfig,
    pub identity: WebhookIdentity,
}

impl RelayConfig {
    /// Build a configuration from defaults with environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(uri) = std::env::var("FEED_URI")
            && !uri.is_empty()
        {
            config.gateway.feed_uri = uri;
        }
        config.gateway.zombie_timeout =
            Duration::from_secs(env_parse("WS_ZOMBIE_TIMEOUT", 60u64));
        config.gateway.startup = retry_policy_from_env("STARTUP", config.gateway.startup);
        config.gateway.runtime = retry_policy_from_env("RUNTIME", config.gateway.runtime);
        config.queue.capacity = env_parse("QUEUE_MAX_SIZE", config.queue.capacity);
        config.dedup.window_size = env_parse("DEDUP_WINDOW", config.dedup.window_size);
        config.notify.exceptional_rarity_threshold =
            env_parse("EXCEPTIONAL_RARITY", config.notify.exceptional_rarity_threshold);
        config.permission.ttl =
            Duration::from_secs(env_parse("PERMISSION_CACHE_TTL", 300u64));
        config.permission.max_entries =
            env_parse("PERMISSION_CACHE_SIZE", config.permission.max_entries);

        if let Ok(domains) = std::env::var("WEBHOOK_ALLOWED_DOMAINS") {
            let parsed: Vec<String> = domains
                .split(',')
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.validation.allowed_domains = parsed;
            }
        }

        config
    }
}

/// Apply `WS_<REGIME>_MAX_RETRIES` / `_BASE_DELAY` / `_MAX_DELAY` overrides.
fn retry_policy_from_env(regime: &str, defaults: RetryPolicy) -> RetryPolicy {
    RetryPolicy {
        max_retries: env_parse(&format!("WS_{regime}_MAX_RETRIES"), defaults.max_retries),
        base_delay: Duration::from_secs(env_parse(
            &format!("WS_{regime}_BASE_DELAY"),
            defaults.base_delay.as_secs(),
        )),
        max_delay: Duration::from_secs(env_parse(
            &format!("WS_{regime}_MAX_DELAY"),
            defaults.max_delay.as_secs(),
        )),
    }
}

/// Read an environment variable, falling back to `default` when it is unset
/// or fails to parse.
fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.queue.capacity, 1000);
        assert_eq!(config.dedup.window_size, 100);
        assert_eq!(config.notify.exceptional_rarity_threshold, 750_000_000);
        assert_eq!(config.permission.ttl, Duration::from_secs(300));
        assert_eq!(config.gateway.zombie_timeout, Duration::from_secs(60));
        assert!(config.gateway.startup.max_retries < config.gateway.runtime.max_retries);
    }

    #[test]
    fn test_env_parse_fallback() {
        // Unset variables fall back to the default.
        assert_eq!(env_parse("FINDCAST_TEST_UNSET_VAR", 42usize), 42);
    }
}
