//! Destination webhook validation and delivery.

mod client;
mod validate;

pub use client::{DiscordWebhookClient, RenderedNotification, WebhookSender};
pub use validate::{ValidatedWebhook, WebhookUrlError, WebhookValidator};
