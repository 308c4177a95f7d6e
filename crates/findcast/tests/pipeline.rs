//! End-to-end pipeline tests with fake collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use findcast::cache::{DedupCache, MembershipCache, fingerprint};
use findcast::config::{
    NotifyConfig, PermissionCacheConfig, RelayConfig, ValidationConfig,
};
use findcast::directory::{
    ChatGateway, DestinationEntry, DestinationResolver, GuildRef, Member, TrackedNameLoader,
    UserDestinations, UserDisplay,
};
use findcast::notifier::{Notifier, NotifierParams};
use findcast::permission::PermissionChecker;
use findcast::webhook::{RenderedNotification, WebhookSender, WebhookValidator};
use findcast::{RelayService, Result};

const WEBHOOK_URL: &str = "https://discord.com/api/webhooks/123456789/valid_token";
const OWNER_ID: u64 = 42;
const GUILD_ID: u64 = 7;

struct FakeLoader(Vec<&'static str>);

#[async_trait]
impl TrackedNameLoader for FakeLoader {
    async fn load_tracked_names(&self) -> Result<Vec<String>> {
        Ok(self.0.iter().map(|n| n.to_string()).collect())
    }
}

struct FakeResolver {
    targets: Vec<DestinationEntry>,
}

#[async_trait]
impl DestinationResolver for FakeResolver {
    async fn resolve_destinations(&self, username: &str) -> Result<Option<UserDestinations>> {
        if username == "someone" {
            Ok(Some(UserDestinations {
                owner_id: OWNER_ID,
                targets: self.targets.clone(),
            }))
        } else {
            Ok(None)
        }
    }
}

struct FakeGateway;

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn resolve_guild(&self, guild_id: u64) -> Option<GuildRef> {
        Some(GuildRef { id: guild_id })
    }

    async fn resolve_member(&self, _guild_id: u64, user_id: u64) -> Option<Member> {
        Some(Member {
            user_id,
            role_ids: vec![],
        })
    }

    async fn resolve_display(&self, _user_id: u64) -> Option<UserDisplay> {
        Some(UserDisplay {
            display_name: "someone".to_string(),
            avatar_url: "https://example.com/avatar.png".to_string(),
        })
    }
}

/// Sender fake that records every post and reports each one on a channel.
struct RecordingSender {
    delivered: Mutex<Vec<(String, RenderedNotification)>>,
    notify_tx: mpsc::UnboundedSender<String>,
}

impl RecordingSender {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                notify_tx,
            }),
            notify_rx,
        )
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn deliver(&self, url: &str, notification: &RenderedNotification) -> Result<()> {
        self.delivered
            .lock()
            .push((url.to_string(), notification.clone()));
        let _ = self.notify_tx.send(url.to_string());
        Ok(())
    }
}

fn inline_payload() -> String {
    serde_json::json!({
        "data": {
            "embeds": [{
                "author": {
                    "name": "Diami(@Someone)",
                    "url": "https://example.com/profile/someone",
                    "icon_url": "https://cdn.mongoosee.com/assets/stars/Global.png"
                },
                "description": "⭐ **Diami(@Someone)** HAS FOUND **Starlight**, CHANCE OF **1 in 1,000,000** ⭐",
                "fields": [
                    {"name": "Rolls", "value": "123,456"},
                    {"name": "Luck", "value": "x2.5"},
                    {"name": "Time Discovered", "value": "12:00:05"}
                ],
                "timestamp": "2024-05-01T12:00:05Z",
                "color": 16766720
            }]
        }
    })
    .to_string()
}

fn notifier_with(
    sender: Arc<dyn WebhookSender>,
    targets: Vec<DestinationEntry>,
) -> (Notifier, Arc<MembershipCache>) {
    let gateway = Arc::new(FakeGateway);
    let membership = Arc::new(MembershipCache::new(Arc::new(FakeLoader(vec!["Someone"]))));
    membership.add("someone");

    let notifier = Notifier::new(NotifierParams {
        membership: membership.clone(),
        dedup: DedupCache::new(100),
        permissions: Arc::new(PermissionChecker::new(
            gateway.clone(),
            PermissionCacheConfig::default(),
        )),
        validator: WebhookValidator::new(ValidationConfig::default()),
        resolver: Arc::new(FakeResolver { targets }),
        gateway,
        sender,
        config: NotifyConfig::default(),
    });
    (notifier, membership)
}

fn plain_target() -> DestinationEntry {
    DestinationEntry {
        url: WEBHOOK_URL.to_string(),
        guild_id: GUILD_ID,
        required_role_id: None,
    }
}

#[tokio::test]
async fn single_valid_find_is_delivered_exactly_once() {
    let (sender, _rx) = RecordingSender::new();
    let (mut notifier, _membership) = notifier_with(sender.clone(), vec![plain_target()]);

    let report = notifier.process_payload(&inline_payload()).await;
    assert_eq!(report.processed, 1);
    assert_eq!(report.deliveries.len(), 1);
    assert!(report.deliveries[0].success);
    assert!(report.errors.is_empty());

    let delivered = sender.delivered.lock();
    assert_eq!(delivered.len(), 1);
    let (url, notification) = &delivered[0];
    assert_eq!(url, WEBHOOK_URL);

    let rendered = notification.embed.to_string();
    assert!(rendered.contains("Starlight"));
    assert!(rendered.contains("123,456"));
    assert!(rendered.contains("x2.5"));
    assert!(rendered.contains("12:00:05"));
    assert!(rendered.contains("<@42>"));
}

#[tokio::test]
async fn second_occurrence_is_suppressed_as_duplicate() {
    let (sender, _rx) = RecordingSender::new();
    let (mut notifier, _membership) = notifier_with(sender.clone(), vec![plain_target()]);

    let first = notifier.process_payload(&inline_payload()).await;
    assert_eq!(first.processed, 1);

    let second = notifier.process_payload(&inline_payload()).await;
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped_duplicates, 1);
    assert_eq!(sender.delivered.lock().len(), 1);
}

#[tokio::test]
async fn untracked_username_produces_nothing() {
    let (sender, _rx) = RecordingSender::new();
    let (mut notifier, membership) = notifier_with(sender.clone(), vec![plain_target()]);
    membership.remove("someone");

    let report = notifier.process_payload(&inline_payload()).await;
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped_duplicates, 0);
    assert_eq!(report.skipped_no_destinations, 0);
    assert!(sender.delivered.lock().is_empty());
}

#[tokio::test]
async fn invalid_destination_url_is_skipped_without_failing_others() {
    let (sender, _rx) = RecordingSender::new();
    let targets = vec![
        DestinationEntry {
            url: "https://evil.example.com/api/webhooks/1/tok".to_string(),
            guild_id: 1,
            required_role_id: None,
        },
        plain_target(),
    ];
    let (mut notifier, _membership) = notifier_with(sender.clone(), targets);

    let report = notifier.process_payload(&inline_payload()).await;
    assert_eq!(report.processed, 1);
    assert_eq!(report.deliveries.len(), 1);
    assert_eq!(report.deliveries[0].target.guild_id, GUILD_ID);
}

#[tokio::test]
async fn unsatisfied_role_gate_filters_the_target() {
    let (sender, _rx) = RecordingSender::new();
    let targets = vec![DestinationEntry {
        url: WEBHOOK_URL.to_string(),
        guild_id: GUILD_ID,
        // FakeGateway members hold no roles.
        required_role_id: Some(999),
    }];
    let (mut notifier, _membership) = notifier_with(sender.clone(), targets);

    let report = notifier.process_payload(&inline_payload()).await;
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped_no_destinations, 1);
    assert!(sender.delivered.lock().is_empty());
}

#[tokio::test]
async fn failed_delivery_does_not_cancel_remaining_targets() {
    /// Fails the first URL, succeeds on everything else.
    struct FlakySender {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebhookSender for FlakySender {
        async fn deliver(&self, url: &str, _n: &RenderedNotification) -> Result<()> {
            if url.contains("111111111") {
                return Err(findcast::RelayError::delivery("boom"));
            }
            self.delivered.lock().push(url.to_string());
            Ok(())
        }
    }

    let sender = Arc::new(FlakySender {
        delivered: Mutex::new(Vec::new()),
    });
    let targets = vec![
        DestinationEntry {
            url: "https://discord.com/api/webhooks/111111111/tok".to_string(),
            guild_id: 1,
            required_role_id: None,
        },
        plain_target(),
    ];
    let (mut notifier, _membership) = notifier_with(sender.clone(), targets);

    let report = notifier.process_payload(&inline_payload()).await;
    assert_eq!(report.processed, 1);
    assert_eq!(report.deliveries.len(), 2);
    assert!(!report.deliveries[0].success);
    assert!(report.deliveries[1].success);
    assert_eq!(sender.delivered.lock().len(), 1);
}

#[tokio::test]
async fn service_relays_from_feed_to_webhook() {
    // A local feed stands in for the real gateway.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let feed_uri = format!("ws://{}", listener.local_addr().unwrap());

    let payload = inline_payload();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(socket).await.unwrap();
        ws.send(Message::Text(payload.into())).await.unwrap();
        let _ = ws.next().await;
    });

    let mut config = RelayConfig::default();
    config.gateway.feed_uri = feed_uri;

    let (sender, mut delivered_rx) = RecordingSender::new();
    let mut service = RelayService::with_sender(
        config,
        Arc::new(FakeLoader(vec!["Someone"])),
        Arc::new(FakeResolver {
            targets: vec![plain_target()],
        }),
        Arc::new(FakeGateway),
        sender.clone(),
    );

    let mut running = service.start("test-token").await.unwrap();
    assert_eq!(service.tracked_count(), 1);

    tokio::time::timeout(Duration::from_secs(5), &mut running.ready)
        .await
        .expect("feed should become ready")
        .unwrap();

    let delivered_url = tokio::time::timeout(Duration::from_secs(5), delivered_rx.recv())
        .await
        .expect("notification should be delivered")
        .unwrap();
    assert_eq!(delivered_url, WEBHOOK_URL);

    // The find's fingerprint is now recorded: reinjecting the same payload
    // must not deliver again.
    service.enqueue_raw(inline_payload());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sender.delivered.lock().len(), 1);

    service.shutdown();
    assert!(running.wait().await.is_ok());
}

#[tokio::test]
async fn fingerprint_matches_parsed_event_fields() {
    let outcome = findcast::PayloadParser::new().parse(&inline_payload());
    let event = &outcome.events[0];
    let fp = fingerprint(&event.username, &event.item_name, &event.timestamp);
    assert_eq!(fp, fingerprint("someone", "Starlight", "2024-05-01T12:00:05Z"));
}
