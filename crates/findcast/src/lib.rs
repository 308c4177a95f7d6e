//! Findcast: relay item-found feed events to Discord webhooks.
//!
//! The pipeline has two halves joined by a bounded queue. The
//! [`GatewayWorker`] owns the streaming feed connection (auth, zombie
//! detection, reconnect with backoff) and produces raw envelopes; the
//! [`Notifier`] consumes them one at a time and runs each decoded find
//! through membership filtering, duplicate suppression, destination
//! resolution, permission gates, URL validation, and webhook delivery.
//!
//! Subscription storage and the chat platform client stay outside this
//! crate; see [`directory`] for the trait seams. [`RelayService`] wires the
//! whole thing together.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod notifier;
pub mod parser;
pub mod permission;
pub mod service;
pub mod webhook;

pub use cache::{DedupCache, MembershipCache, fingerprint};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use gateway::{GatewayWorker, RawEnvelope, RelayQueue};
pub use notifier::{DeliveryOutcome, DeliveryTarget, EventOutcome, Notifier, ProcessingReport};
pub use parser::{FindEvent, ParseOutcome, PayloadParser, parse_rarity_value};
pub use permission::PermissionChecker;
pub use service::{RelayRunning, RelayService};
pub use webhook::{
    DiscordWebhookClient, RenderedNotification, WebhookSender, WebhookUrlError, WebhookValidator,
};
