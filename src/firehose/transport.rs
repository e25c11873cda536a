use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::Message;

use crate::app_error::AppError;
use crate::counters::Counters;
use crate::firehose::envelope::Envelope;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_DEADLINE: Duration = Duration::from_secs(60);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Receives decoded firehose frames. Projector registries implement this to
/// route each envelope to the collection handler responsible for it.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, envelope: Envelope) -> Result<(), AppError>;
}

/// A long-lived WebSocket client for one collection-family firehose URL.
///
/// Runs until `shutdown` fires, reconnecting on any read error or missed
/// pong with a fixed backoff. Malformed frames are counted and dropped
/// rather than closing the connection, since one bad frame from a noisy
/// peer shouldn't take an entire consumer offline.
pub struct FirehoseConsumer {
    url: String,
    counters: Arc<Counters>,
}

impl FirehoseConsumer {
    pub fn new(url: String, counters: Arc<Counters>) -> Self {
        Self { url, counters }
    }

    pub async fn run(
        &self,
        dispatcher: Arc<dyn EventDispatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        while !*shutdown.borrow() {
            tokio::select! {
                result = self.connect_and_consume(dispatcher.clone(), shutdown.clone()) => {
                    if let Err(err) = result {
                        tracing::warn!(url = %self.url, error = %err, "firehose connection lost, reconnecting");
                        self.counters.record_reconnect();
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!(url = %self.url, "firehose consumer shut down");
    }

    async fn connect_and_consume(
        &self,
        dispatcher: Arc<dyn EventDispatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let (ws, _) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut write, mut read) = ws.split();

        let pong_received = Arc::new(AtomicBool::new(true));
        let mut ping_tick = interval(PING_INTERVAL);
        ping_tick.tick().await;

        loop {
            tokio::select! {
                _ = ping_tick.tick() => {
                    if !pong_received.swap(false, Ordering::SeqCst) {
                        anyhow::bail!("no pong received within keepalive window");
                    }
                    write.send(Message::Ping(Vec::new())).await?;
                }
                frame = timeout(PONG_DEADLINE, read.next()) => {
                    let frame = frame.map_err(|_| anyhow::anyhow!("read timed out waiting for frame"))?;
                    match frame {
                        Some(Ok(Message::Pong(_))) => {
                            pong_received.store(true, Ordering::SeqCst);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            write.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&dispatcher, &text).await;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if let Ok(text) = String::from_utf8(bytes) {
                                self.handle_text(&dispatcher, &text).await;
                            } else {
                                self.counters.record_rejected();
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            anyhow::bail!("connection closed by peer");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    async fn handle_text(&self, dispatcher: &Arc<dyn EventDispatcher>, text: &str) {
        self.counters.record_received();
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed firehose frame");
                self.counters.record_rejected();
                return;
            }
        };

        match dispatcher.dispatch(envelope).await {
            Ok(()) => self.counters.record_accepted(),
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "transient error dispatching firehose frame, dropping");
                self.counters.record_rejected();
            }
            Err(err) => {
                tracing::error!(error = %err, "rejected firehose frame");
                self.counters.record_rejected();
            }
        }
    }
}
