//! Feed gateway worker.
//!
//! Owns the streaming connection to the find feed: connect with the auth
//! header, read frames with zombie detection, reconnect with capped
//! exponential backoff, and push raw envelopes onto the relay queue.
//!
//! Two retry regimes apply. Until the first frame has ever been received the
//! worker fails fast (a bad endpoint or credential should stop startup);
//! afterwards it retries patiently, since the feed has proven reachable. Both
//! budgets are process-lifetime ceilings: exhausting either is fatal.

mod queue;

pub use queue::{RawEnvelope, RelayQueue};

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::{Request, Uri};
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{GatewayConfig, RetryPolicy};
use crate::error::{RelayError, Result};
use crate::parser::truncate;

/// Close code the feed sends for an invalid credential.
const CLOSE_CODE_AUTH_REJECTED: u16 = 4002;
/// Close code the feed sends when the credential is already connected.
const CLOSE_CODE_AUTH_IN_USE: u16 = 4003;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How an active session ended.
enum SessionEnd {
    /// No frame within the zombie timeout; silently reconnect.
    Zombie,
    /// The connection dropped or closed non-fatally.
    Disconnected,
    /// Cancellation requested; do not reconnect.
    Cancelled,
}

/// The pipeline's producer half.
pub struct GatewayWorker {
    config: GatewayConfig,
    auth_token: String,
    queue: Arc<RelayQueue>,
    ready_tx: Option<oneshot::Sender<()>>,
    has_connected: bool,
}

impl GatewayWorker {
    pub fn new(
        config: GatewayConfig,
        auth_token: impl Into<String>,
        queue: Arc<RelayQueue>,
        ready_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            config,
            auth_token: auth_token.into(),
            queue,
            ready_tx: Some(ready_tx),
            has_connected: false,
        }
    }

    /// Run the connection loop until cancelled or a fatal fault occurs.
    ///
    /// Returns `Ok(())` only on cancellation. Fatal faults — credential
    /// rejection, credential in use, or a spent retry budget — come back as
    /// their own error variants so the embedding process can exit.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut retries: u32 = 0;

        loop {
            let policy = self.current_policy();
            if retries >= policy.max_retries {
                let regime = self.regime_name();
                error!(
                    attempts = retries,
                    regime, "feed connection budget exhausted, shutting down"
                );
                return Err(RelayError::RetriesExhausted {
                    regime,
                    attempts: retries,
                });
            }

            if retries > 0 {
                info!(
                    attempt = retries + 1,
                    max = policy.max_retries,
                    "connecting to feed"
                );
            } else {
                info!(uri = %self.config.feed_uri, "connecting to feed");
            }

            let connected = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("gateway worker cancelled during connect");
                    return Ok(());
                }
                result = self.connect() => result,
            };

            let mut stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    retries += 1;
                    warn!(error = %e, "feed connection failed");
                    if !self.backoff(&policy, retries, &cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            match self.read_session(&mut stream, &cancel).await? {
                SessionEnd::Cancelled => {
                    info!("gateway worker cancelled, shutting down");
                    return Ok(());
                }
                SessionEnd::Zombie => {
                    retries += 1;
                    warn!(
                        timeout = ?self.config.zombie_timeout,
                        "no frame within zombie timeout, reconnecting"
                    );
                }
                SessionEnd::Disconnected => {
                    retries += 1;
                }
            }

            if !self.backoff(&self.current_policy(), retries, &cancel).await {
                return Ok(());
            }
        }
    }

    fn current_policy(&self) -> RetryPolicy {
        if self.has_connected {
            self.config.runtime
        } else {
            self.config.startup
        }
    }

    fn regime_name(&self) -> &'static str {
        if self.has_connected { "runtime" } else { "startup" }
    }

    async fn connect(&self) -> Result<FeedStream> {
        let request = self.upgrade_request()?;
        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| RelayError::connection(e.to_string()))?;
        Ok(stream)
    }

    /// Build the upgrade request by hand so the auth header rides along.
    fn upgrade_request(&self) -> Result<Request<()>> {
        let uri: Uri = self
            .config
            .feed_uri
            .parse()
            .map_err(|e| RelayError::config(format!("invalid feed URI: {e}")))?;
        let host = uri
            .host()
            .ok_or_else(|| RelayError::config("feed URI has no host"))?;
        let host_header = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Request::builder()
            .uri(uri)
            .header("Host", host_header)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .header("token", &self.auth_token)
            .body(())
            .map_err(|e| RelayError::connection(format!("failed to build upgrade request: {e}")))
    }

    /// Read frames until the session ends one way or another.
    async fn read_session(
        &mut self,
        stream: &mut FeedStream,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = stream.close(None).await;
                    return Ok(SessionEnd::Cancelled);
                }
                read = tokio::time::timeout(self.config.zombie_timeout, stream.next()) => read,
            };

            let frame = match read {
                Err(_) => return Ok(SessionEnd::Zombie),
                Ok(frame) => frame,
            };

            match frame {
                None => {
                    warn!("feed stream ended");
                    return Ok(SessionEnd::Disconnected);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "feed read error");
                    return Ok(SessionEnd::Disconnected);
                }
                Some(Ok(Message::Text(text))) => {
                    self.mark_connected();
                    self.enqueue(text.as_str());
                }
                Some(Ok(Message::Close(frame))) => return self.handle_close(frame),
                // Pings and pongs are answered by the transport.
                Some(Ok(_)) => {}
            }
        }
    }

    fn handle_close(&self, frame: Option<CloseFrame>) -> Result<SessionEnd> {
        let Some(frame) = frame else {
            warn!("feed closed without a close frame");
            return Ok(SessionEnd::Disconnected);
        };

        match u16::from(frame.code) {
            CLOSE_CODE_AUTH_REJECTED => {
                error!("feed credential rejected");
                Err(RelayError::AuthRejected)
            }
            CLOSE_CODE_AUTH_IN_USE => {
                error!("feed credential already in use by another connection");
                Err(RelayError::AuthInUse)
            }
            code => {
                warn!(code, reason = %frame.reason, "feed connection closed");
                Ok(SessionEnd::Disconnected)
            }
        }
    }

    fn mark_connected(&mut self) {
        if !self.has_connected {
            self.has_connected = true;
            if let Some(ready) = self.ready_tx.take() {
                let _ = ready.send(());
            }
        }
    }

    fn enqueue(&self, payload: &str) {
        debug!(frame = %truncate(payload, 200), "feed frame received");
        if self.queue.push(RawEnvelope {
            payload: payload.to_string(),
        }) {
            warn!(
                capacity = self.queue.capacity(),
                "relay queue full, dropped oldest envelope"
            );
        }
    }

    /// Sleep out the backoff delay; false means cancellation arrived first.
    async fn backoff(
        &self,
        policy: &RetryPolicy,
        retries: u32,
        cancel: &CancellationToken,
    ) -> bool {
        let delay = backoff_delay(policy, retries);
        info!(delay = ?delay, "reconnecting after backoff");
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// `min(base * 2^(retries - 1), max_delay)`.
fn backoff_delay(policy: &RetryPolicy, retries: u32) -> Duration {
    let exponent = retries.saturating_sub(1).min(16);
    policy
        .base_delay
        .saturating_mul(1u32 << exponent)
        .min(policy.max_delay)
}
