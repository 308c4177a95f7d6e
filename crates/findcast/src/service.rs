//! Relay service wiring.
//!
//! Owns the shared caches and the queue, wires the collaborator traits into
//! the gateway worker and the notifier, and exposes the small control surface
//! the command layer needs (live membership mutation, raw injection, start
//! and shutdown).

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::{DedupCache, MembershipCache};
use crate::config::RelayConfig;
use crate::directory::{ChatGateway, DestinationResolver, TrackedNameLoader};
use crate::error::{RelayError, Result};
use crate::gateway::{GatewayWorker, RawEnvelope, RelayQueue};
use crate::notifier::{Notifier, NotifierParams};
use crate::permission::PermissionChecker;
use crate::webhook::{DiscordWebhookClient, WebhookSender, WebhookValidator};

/// Handles to the running relay tasks.
pub struct RelayRunning {
    /// Fires once, when the first feed frame has been received.
    pub ready: oneshot::Receiver<()>,
    worker: JoinHandle<Result<()>>,
    notifier: JoinHandle<()>,
    cancel: CancellationToken,
}

impl RelayRunning {
    /// Wait for the gateway worker to finish and tear the notifier down.
    ///
    /// Returns the worker's fatal error, if any. Cancellation yields `Ok`.
    pub async fn wait(self) -> Result<()> {
        let result = match self.worker.await {
            Ok(result) => result,
            Err(e) => Err(RelayError::other(format!("gateway worker panicked: {e}"))),
        };
        self.cancel.cancel();
        let _ = self.notifier.await;
        result
    }
}

/// The notification pipeline behind one facade.
pub struct RelayService {
    config: RelayConfig,
    membership: Arc<MembershipCache>,
    permissions: Arc<PermissionChecker>,
    queue: Arc<RelayQueue>,
    resolver: Arc<dyn DestinationResolver>,
    gateway: Arc<dyn ChatGateway>,
    sender: Arc<dyn WebhookSender>,
    cancel: CancellationToken,
    started: bool,
}

impl RelayService {
    /// Wire the service with an explicit webhook sender (tests substitute a
    /// fake here).
    pub fn with_sender(
        config: RelayConfig,
        loader: Arc<dyn TrackedNameLoader>,
        resolver: Arc<dyn DestinationResolver>,
        gateway: Arc<dyn ChatGateway>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        let membership = Arc::new(MembershipCache::new(loader));
        let permissions = Arc::new(PermissionChecker::new(gateway.clone(), config.permission));
        let queue = Arc::new(RelayQueue::new(config.queue.capacity));

        Self {
            config,
            membership,
            permissions,
            queue,
            resolver,
            gateway,
            sender,
            cancel: CancellationToken::new(),
            started: false,
        }
    }

    /// Wire the service with the standard Discord webhook client.
    pub fn new(
        config: RelayConfig,
        loader: Arc<dyn TrackedNameLoader>,
        resolver: Arc<dyn DestinationResolver>,
        gateway: Arc<dyn ChatGateway>,
    ) -> Self {
        let sender = Arc::new(DiscordWebhookClient::new(config.identity.clone()));
        Self::with_sender(config, loader, resolver, gateway, sender)
    }

    /// Inject a raw payload as if the feed had sent it.
    pub fn enqueue_raw(&self, payload: impl Into<String>) {
        self.queue.push(RawEnvelope {
            payload: payload.into(),
        });
    }

    /// Track a username immediately, ahead of the next refresh.
    pub fn add_tracked(&self, username: &str) {
        self.membership.add(username);
    }

    /// Stop tracking a username immediately.
    pub fn remove_tracked(&self, username: &str) {
        self.membership.remove(username);
    }

    pub fn tracked_count(&self) -> usize {
        self.membership.len()
    }

    /// Reload the tracked set from storage.
    pub async fn refresh_tracked(&self) -> Result<usize> {
        self.membership.refresh().await
    }

    /// Permission cache handle, for invalidation when the outer layer learns
    /// of role or webhook changes.
    pub fn permissions(&self) -> &Arc<PermissionChecker> {
        &self.permissions
    }

    /// Load the membership cache and spawn the worker and notifier tasks.
    pub async fn start(&mut self, auth_token: &str) -> Result<RelayRunning> {
        if self.started {
            return Err(RelayError::WorkerAlreadyRunning);
        }
        self.started = true;

        let tracked = self.membership.refresh().await?;
        info!(tracked, "membership cache loaded");

        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = GatewayWorker::new(
            self.config.gateway.clone(),
            auth_token,
            self.queue.clone(),
            ready_tx,
        );
        let worker_handle = tokio::spawn(worker.run(self.cancel.child_token()));

        let notifier = Notifier::new(NotifierParams {
            membership: self.membership.clone(),
            dedup: DedupCache::new(self.config.dedup.window_size),
            permissions: self.permissions.clone(),
            validator: WebhookValidator::new(self.config.validation.clone()),
            resolver: self.resolver.clone(),
            gateway: self.gateway.clone(),
            sender: self.sender.clone(),
            config: self.config.notify.clone(),
        });
        let notifier_handle =
            tokio::spawn(notifier.run(self.queue.clone(), self.cancel.child_token()));

        Ok(RelayRunning {
            ready: ready_rx,
            worker: worker_handle,
            notifier: notifier_handle,
            cancel: self.cancel.clone(),
        })
    }

    /// Cancel both tasks. Safe to call more than once.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Clone of the root cancellation token, for external shutdown hooks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
