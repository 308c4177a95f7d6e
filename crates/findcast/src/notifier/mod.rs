//! Notification orchestration.
//!
//! Consumes raw envelopes from the relay queue one at a time and runs each
//! decoded find through the filter chain: membership, duplicate window,
//! destination resolution, permission gate, URL validation, render, deliver.
//! Envelopes are processed to completion before the next one is pulled, and
//! deliveries within one find go out target-by-target, so outbound order
//! stays deterministic.

mod render;

pub use render::{DEFAULT_AVATAR_URL, is_exceptional, render_notification};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{DedupCache, MembershipCache, fingerprint};
use crate::config::NotifyConfig;
use crate::directory::{ChatGateway, DestinationResolver};
use crate::gateway::RelayQueue;
use crate::parser::{FindEvent, PayloadParser, truncate};
use crate::permission::PermissionChecker;
use crate::webhook::{WebhookSender, WebhookValidator};

/// One delivery attempt's destination.
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    pub url: String,
    pub guild_id: u64,
    pub owner_id: u64,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub target: DeliveryTarget,
    pub success: bool,
    pub error: Option<String>,
}

/// What happened to one decoded find.
#[derive(Debug)]
pub enum EventOutcome {
    /// The username is not tracked. The common case; not worth logging.
    NotTracked,
    /// The find was already notified within the dedup window.
    Duplicate,
    /// No resolvable, permitted, valid destination remained.
    NoDestinations,
    /// Deliveries were attempted, one outcome per target.
    Delivered(Vec<DeliveryOutcome>),
}

/// Per-payload counters for observability.
#[derive(Debug, Default)]
pub struct ProcessingReport {
    /// Finds that reached the delivery stage.
    pub processed: usize,
    pub skipped_duplicates: usize,
    pub skipped_no_destinations: usize,
    pub deliveries: Vec<DeliveryOutcome>,
    pub errors: Vec<String>,
}

/// The pipeline's consumer half.
pub struct Notifier {
    parser: PayloadParser,
    membership: Arc<MembershipCache>,
    dedup: DedupCache,
    permissions: Arc<PermissionChecker>,
    validator: WebhookValidator,
    resolver: Arc<dyn DestinationResolver>,
    gateway: Arc<dyn ChatGateway>,
    sender: Arc<dyn WebhookSender>,
    config: NotifyConfig,
}

/// Everything the notifier needs, wired by the service layer.
pub struct NotifierParams {
    pub membership: Arc<MembershipCache>,
    pub dedup: DedupCache,
    pub permissions: Arc<PermissionChecker>,
    pub validator: WebhookValidator,
    pub resolver: Arc<dyn DestinationResolver>,
    pub gateway: Arc<dyn ChatGateway>,
    pub sender: Arc<dyn WebhookSender>,
    pub config: NotifyConfig,
}

impl Notifier {
    pub fn new(params: NotifierParams) -> Self {
        let NotifierParams {
            membership,
            dedup,
            permissions,
            validator,
            resolver,
            gateway,
            sender,
            config,
        } = params;
        Self {
            parser: PayloadParser::new(),
            membership,
            dedup,
            permissions,
            validator,
            resolver,
            gateway,
            sender,
            config,
        }
    }

    /// Consume the queue until cancelled. An in-flight envelope is finished
    /// before cancellation is honored, so recorded fingerprints stay
    /// consistent with what was attempted.
    pub async fn run(mut self, queue: Arc<RelayQueue>, cancel: CancellationToken) {
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("notifier shutting down");
                    return;
                }
                envelope = queue.pop() => envelope,
            };

            let report = self.process_payload(&envelope.payload).await;
            if report.processed > 0 || !report.errors.is_empty() {
                debug!(
                    processed = report.processed,
                    duplicates = report.skipped_duplicates,
                    no_destinations = report.skipped_no_destinations,
                    deliveries = report.deliveries.len(),
                    "payload processed"
                );
            }
        }
    }

    /// Process one raw payload end-to-end.
    pub async fn process_payload(&mut self, raw: &str) -> ProcessingReport {
        let mut report = ProcessingReport::default();

        let outcome = self.parser.parse(raw);
        for error in &outcome.errors {
            warn!("payload parse error: {error}");
        }
        if !outcome.errors.is_empty() {
            debug!(payload = %truncate(raw, 2000), "payload with parse failures");
            report.errors.extend(outcome.errors);
        }

        for event in &outcome.events {
            match self.process_event(event).await {
                EventOutcome::NotTracked => {}
                EventOutcome::Duplicate => report.skipped_duplicates += 1,
                EventOutcome::NoDestinations => report.skipped_no_destinations += 1,
                EventOutcome::Delivered(outcomes) => {
                    report.processed += 1;
                    report.deliveries.extend(outcomes);
                }
            }
        }

        report
    }

    /// Run one find through the filter chain.
    async fn process_event(&mut self, event: &FindEvent) -> EventOutcome {
        if !self.membership.contains(&event.username) {
            return EventOutcome::NotTracked;
        }

        let fingerprint = fingerprint(&event.username, &event.item_name, &event.timestamp);
        if self.dedup.is_duplicate(&fingerprint) {
            debug!(username = %event.username, "skipping duplicate find");
            return EventOutcome::Duplicate;
        }
        // Recorded before delivery: a crash mid-delivery under-notifies
        // rather than double-posting on redelivery.
        self.dedup.record(fingerprint);

        let destinations = match self.resolver.resolve_destinations(&event.username).await {
            Ok(Some(destinations)) => destinations,
            Ok(None) => {
                warn!(username = %event.username, "tracked username no longer registered");
                return EventOutcome::NoDestinations;
            }
            Err(e) => {
                debug!(username = %event.username, error = %e, "destination lookup failed");
                return EventOutcome::NoDestinations;
            }
        };
        if destinations.targets.is_empty() {
            debug!(username = %event.username, "no destinations configured");
            return EventOutcome::NoDestinations;
        }

        let owner_id = destinations.owner_id;
        let mut valid_targets = Vec::new();
        for entry in &destinations.targets {
            if !self
                .permissions
                .check(entry.guild_id, owner_id, entry.required_role_id)
                .await
            {
                continue;
            }
            if !self.validator.is_valid(&entry.url) {
                warn!(guild_id = entry.guild_id, "skipping invalid webhook destination");
                continue;
            }
            valid_targets.push(DeliveryTarget {
                url: entry.url.clone(),
                guild_id: entry.guild_id,
                owner_id,
            });
        }
        if valid_targets.is_empty() {
            return EventOutcome::NoDestinations;
        }

        let display = self.gateway.resolve_display(owner_id).await;
        let rendered = render_notification(event, owner_id, display.as_ref(), &self.config);

        let mut outcomes = Vec::with_capacity(valid_targets.len());
        for target in valid_targets {
            match self.sender.deliver(&target.url, &rendered).await {
                Ok(()) => outcomes.push(DeliveryOutcome {
                    target,
                    success: true,
                    error: None,
                }),
                Err(e) => {
                    debug!(guild_id = target.guild_id, error = %e, "webhook delivery failed");
                    outcomes.push(DeliveryOutcome {
                        target,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        EventOutcome::Delivered(outcomes)
    }
}
