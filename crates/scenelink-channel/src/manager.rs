//! Connection lifecycle: connect, read loop, fixed-delay reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scenelink_core::events::{Envelope, PushEvent};
use scenelink_core::ids::SceneId;

use crate::registry::{Subscription, SubscriptionRegistry};

/// Channel tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfig {
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

struct ConnectionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Manages the single push-stream connection and its subscriptions.
///
/// At most one physical connection is live at a time; `connect` with a new
/// scene force-closes the previous connection first. Subscriptions are
/// registered on the manager, not the connection, and survive any number
/// of reconnects.
pub struct ChannelManager {
    ws_url: String,
    config: ChannelConfig,
    registry: Arc<SubscriptionRegistry>,
    connected: Arc<AtomicBool>,
    state: tokio::sync::Mutex<Option<ConnectionHandle>>,
    outbound: Mutex<Option<mpsc::Sender<Envelope>>>,
}

impl ChannelManager {
    /// Create a manager for the stream endpoint, e.g. `ws://host/ws`.
    #[must_use]
    pub fn new(ws_url: impl Into<String>, config: ChannelConfig) -> Self {
        Self {
            ws_url: ws_url.into(),
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            connected: Arc::new(AtomicBool::new(false)),
            state: tokio::sync::Mutex::new(None),
            outbound: Mutex::new(None),
        }
    }

    /// Register a handler for an event type. Works before, during, or
    /// after any connection.
    #[must_use]
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe(event_type, handler)
    }

    /// Whether the socket is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Open the connection for `scene_id` (scene-agnostic when `None`),
    /// closing any existing connection first. The connection task retries
    /// forever on failure until [`disconnect`](Self::disconnect).
    pub async fn connect(&self, scene_id: Option<&SceneId>) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.take() {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
        self.connected.store(false, Ordering::Relaxed);

        let url = match scene_id {
            Some(id) => format!("{}?scene_id={id}", self.ws_url),
            None => self.ws_url.clone(),
        };
        let (outbound_tx, outbound_rx) = mpsc::channel(32);
        *self.outbound.lock() = Some(outbound_tx);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_channel(
            url,
            Arc::clone(&self.registry),
            Arc::clone(&self.connected),
            cancel.clone(),
            outbound_rx,
            self.config.reconnect_delay,
        ));
        *state = Some(ConnectionHandle { cancel, task });
    }

    /// Close the connection and stop reconnecting. Subscriptions stay
    /// registered.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        *self.outbound.lock() = None;
        if let Some(handle) = state.take() {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Queue an envelope for the server. Returns `false` (and drops the
    /// envelope) while disconnected or when the queue is full.
    pub fn publish(&self, envelope: Envelope) -> bool {
        if !self.is_connected() {
            warn!(
                event_type = %envelope.event_type,
                "dropping publish while disconnected"
            );
            return false;
        }
        let sent = self
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.try_send(envelope).is_ok());
        if !sent {
            warn!("dropping publish: outbound queue unavailable");
        }
        sent
    }
}

/// Connection task: connect, pump frames, reconnect after the fixed delay.
async fn run_channel(
    url: String,
    registry: Arc<SubscriptionRegistry>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    reconnect_delay: Duration,
) {
    loop {
        tokio::select! {
            result = connect_async(url.as_str()) => match result {
                Ok((ws, _)) => {
                    info!(url = %url, "push channel connected");
                    connected.store(true, Ordering::Relaxed);
                    pump(ws, &registry, &mut outbound_rx, &cancel).await;
                    connected.store(false, Ordering::Relaxed);
                    if cancel.is_cancelled() {
                        return;
                    }
                    warn!("push channel closed; will reconnect");
                }
                Err(error) => {
                    warn!(error = %error, "push channel connect failed; will retry");
                }
            },
            () = cancel.cancelled() => return,
        }

        tokio::select! {
            () = time::sleep(reconnect_delay) => {}
            () = cancel.cancelled() => return,
        }
    }
}

/// Pump one live socket until it closes, errors, or is cancelled.
async fn pump(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    registry: &SubscriptionRegistry,
    outbound_rx: &mut mpsc::Receiver<Envelope>,
    cancel: &CancellationToken,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&text, registry),
                Some(Ok(Message::Ping(payload))) => {
                    // tungstenite queues the pong; flushing keeps us honest
                    // with servers that track liveness.
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(error = %error, "push channel read error");
                    return;
                }
            },
            envelope = outbound_rx.recv() => {
                let Some(envelope) = envelope else { return };
                match serde_json::to_string(&envelope) {
                    Ok(text) => {
                        if let Err(error) = sink.send(Message::Text(text.into())).await {
                            warn!(error = %error, "push channel write error");
                            return;
                        }
                    }
                    Err(error) => warn!(error = %error, "failed to serialize envelope"),
                }
            }
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

/// Decode one text frame and dispatch it. Anything malformed or unknown is
/// logged and dropped; handlers never see it.
fn handle_frame(text: &str, registry: &SubscriptionRegistry) {
    let event = Envelope::parse(text).and_then(Envelope::into_event);
    match event {
        Ok(event) => {
            debug!(event_type = event.event_type(), "push event");
            registry.dispatch(&event);
        }
        Err(error) => {
            warn!(error = %error, "dropping bad push frame");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use scenelink_core::ids::RequestId;

    #[test]
    fn handle_frame_dispatches_valid_event() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let seen: Arc<PlMutex<Vec<RequestId>>> = Arc::default();
        let seen2 = Arc::clone(&seen);
        let _sub = registry.subscribe("chat.session.ended", move |e| {
            if let PushEvent::SessionEnded { request_id } = e {
                seen2.lock().push(request_id.clone());
            }
        });

        handle_frame(
            r#"{ "type": "chat.session.ended", "data": { "request_id": "r1" } }"#,
            &registry,
        );
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn handle_frame_drops_malformed_and_unknown() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let count: Arc<PlMutex<u32>> = Arc::default();
        let c = Arc::clone(&count);
        let _sub = registry.subscribe("chat.session.ended", move |_| *c.lock() += 1);

        handle_frame("{{{{ not json", &registry);
        handle_frame(r#"{ "type": "yell.created", "data": {} }"#, &registry);
        handle_frame(
            r#"{ "type": "chat.session.ended", "data": { "request_id": 12 } }"#,
            &registry,
        );
        assert_eq!(*count.lock(), 0);
    }

    #[tokio::test]
    async fn publish_while_disconnected_is_dropped() {
        let manager = ChannelManager::new("ws://127.0.0.1:1/ws", ChannelConfig::default());
        assert!(!manager.is_connected());
        assert!(!manager.publish(Envelope::new("location.update", serde_json::json!({}))));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_harmless() {
        let manager = ChannelManager::new("ws://127.0.0.1:1/ws", ChannelConfig::default());
        manager.disconnect().await;
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn connect_replaces_previous_connection_task() {
        // No server is listening; both tasks just retry. What matters is
        // that the second connect cleanly supersedes the first.
        let manager = ChannelManager::new(
            "ws://127.0.0.1:1/ws",
            ChannelConfig {
                reconnect_delay: Duration::from_millis(10),
            },
        );
        manager.connect(Some(&SceneId::from("scn-a"))).await;
        manager.connect(Some(&SceneId::from("scn-b"))).await;
        manager.disconnect().await;
        assert!(!manager.is_connected());
    }
}
