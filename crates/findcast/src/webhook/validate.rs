//! Destination URL validation.
//!
//! Pure checks, no network. A destination must be an https webhook endpoint
//! on an allow-listed domain with well-formed id and token path segments.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::ValidationConfig;

/// Path marker every webhook endpoint carries.
const WEBHOOK_PATH_MARKER: &str = "/api/webhooks/";

static WEBHOOK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").unwrap());
static WEBHOOK_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Why a destination URL was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookUrlError {
    #[error("webhook URL is empty")]
    Empty,

    #[error("webhook URL is not parseable: {0}")]
    Malformed(String),

    #[error("webhook URL must use https")]
    InsecureScheme,

    #[error("host '{0}' is not an allowed webhook domain")]
    DisallowedDomain(String),

    #[error("URL path is not a webhook endpoint")]
    NotWebhookPath,

    #[error("webhook id segment is not numeric")]
    InvalidId,

    #[error("webhook token segment is malformed")]
    InvalidToken,
}

/// A validated destination with its decomposed parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedWebhook {
    pub webhook_id: String,
    pub token: String,
}

/// Validates and decomposes destination webhook URLs.
#[derive(Debug, Clone)]
pub struct WebhookValidator {
    allowed_domains: Vec<String>,
}

impl WebhookValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            allowed_domains: config
                .allowed_domains
                .into_iter()
                .map(|d| d.to_lowercase())
                .collect(),
        }
    }

    /// Validate a destination URL, returning its id and token.
    pub fn validate(&self, url: &str) -> Result<ValidatedWebhook, WebhookUrlError> {
        if url.is_empty() {
            return Err(WebhookUrlError::Empty);
        }

        let parsed = Url::parse(url).map_err(|e| WebhookUrlError::Malformed(e.to_string()))?;

        if parsed.scheme() != "https" {
            return Err(WebhookUrlError::InsecureScheme);
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| WebhookUrlError::Malformed("no host".to_string()))?
            .to_lowercase();
        let domain_allowed = self
            .allowed_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")));
        if !domain_allowed {
            return Err(WebhookUrlError::DisallowedDomain(host));
        }

        if !parsed.path().contains(WEBHOOK_PATH_MARKER) {
            return Err(WebhookUrlError::NotWebhookPath);
        }

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.collect())
            .unwrap_or_default();
        let marker_index = segments
            .iter()
            .position(|segment| *segment == "webhooks")
            .ok_or(WebhookUrlError::NotWebhookPath)?;

        let webhook_id = segments
            .get(marker_index + 1)
            .copied()
            .filter(|id| WEBHOOK_ID_RE.is_match(id))
            .ok_or(WebhookUrlError::InvalidId)?;
        let token = segments
            .get(marker_index + 2)
            .copied()
            .filter(|token| WEBHOOK_TOKEN_RE.is_match(token))
            .ok_or(WebhookUrlError::InvalidToken)?;

        Ok(ValidatedWebhook {
            webhook_id: webhook_id.to_string(),
            token: token.to_string(),
        })
    }

    /// Non-throwing wrapper around [`validate`](Self::validate).
    pub fn is_valid(&self, url: &str) -> bool {
        self.validate(url).is_ok()
    }
}

impl Default for WebhookValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
