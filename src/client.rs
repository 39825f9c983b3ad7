// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The chain client transport: one long-lived duplex websocket carrying
//! JSON messages to and from a chain node. Requests are correlated to
//! replies by a monotonically increasing 32-bit id; every inbound message
//! that does not match a pending request is handed to the single consumer
//! in wire order. The connection reconnects forever with capped
//! exponential backoff; pending requests are failed on disconnect and the
//! consumer is told about each (re)connect so it can re-subscribe.

use crate::error::{WitnessError, WitnessResult};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Correlated requests time out after this long with no reply.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const KEEPALIVE_SILENCE_LIMIT: Duration = Duration::from_secs(60);

/// What the transport delivers to its single consumer.
#[derive(Clone, Debug)]
pub enum ChainMessage {
    /// The connection is (re)established; subscriptions must be replayed
    /// by the consumer, the transport does not do it.
    Connected,
    /// A decoded inbound message that did not correlate to a pending
    /// request. Delivered in wire order.
    Message(Value),
}

pub(crate) struct Outbound {
    pub(crate) id: u32,
    pub(crate) text: String,
    pub(crate) respond: Option<oneshot::Sender<Value>>,
}

/// Cheaply cloneable handle to one chain connection.
#[derive(Clone)]
pub struct ChainClientHandle {
    chain: Arc<str>,
    tx: mpsc::UnboundedSender<Outbound>,
    next_id: Arc<AtomicU32>,
}

impl ChainClientHandle {
    /// Fire-and-forget send of `{id, command, ...params}`. Returns the
    /// assigned request id.
    pub fn send(&self, command: &str, params: Value) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = encode_request(id, command, params);
        trace!(chain = %self.chain, id, command, "send");
        if self
            .tx
            .send(Outbound {
                id,
                text,
                respond: None,
            })
            .is_err()
        {
            debug!(chain = %self.chain, command, "send after transport shutdown");
        }
        id
    }

    /// Send a request and wait for the reply with the matching id. Returns
    /// the full reply message. Times out after [`REQUEST_TIMEOUT`].
    pub async fn request(&self, command: &str, params: Value) -> WitnessResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = encode_request(id, command, params);
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Outbound {
                id,
                text,
                respond: Some(respond),
            })
            .map_err(|_| WitnessError::Transport(format!("{}: transport is shut down", self.chain)))?;
        match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(WitnessError::Transport(format!(
                "{}: connection lost before reply to {command} (id {id})",
                self.chain
            ))),
            Err(_) => {
                warn!(chain = %self.chain, id, command, "request timed out");
                Err(WitnessError::RequestTimeout(format!(
                    "{}: no reply to {command} (id {id})",
                    self.chain
                )))
            }
        }
    }

    /// Handle whose sends go nowhere, plus the receiving end to observe
    /// them. Lets tests drive components that hold a client handle.
    #[cfg(test)]
    pub(crate) fn detached_for_testing(
        chain: &str,
    ) -> (ChainClientHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChainClientHandle {
                chain: chain.into(),
                tx,
                next_id: Arc::new(AtomicU32::new(0)),
            },
            rx,
        )
    }
}

fn encode_request(id: u32, command: &str, params: Value) -> String {
    let mut msg = match params {
        Value::Object(map) => Value::Object(map),
        Value::Null => json!({}),
        other => json!({ "params": other }),
    };
    msg["id"] = json!(id);
    msg["command"] = json!(command);
    msg.to_string()
}

/// Spawn the connection task for one chain and return its handle. The task
/// lives until the token is cancelled.
pub fn spawn_chain_client(
    chain: &str,
    url: String,
    inbound: mpsc::Sender<ChainMessage>,
    cancel: CancellationToken,
) -> ChainClientHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ChainClientHandle {
        chain: chain.into(),
        tx,
        next_id: Arc::new(AtomicU32::new(0)),
    };
    let chain: Arc<str> = handle.chain.clone();
    tokio::spawn(run_connection(chain, url, rx, inbound, cancel));
    handle
}

async fn run_connection(
    chain: Arc<str>,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::Sender<ChainMessage>,
    cancel: CancellationToken,
) {
    let mut delay = INITIAL_RECONNECT_DELAY;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let ws = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = connect_async(url.as_str()) => match connected {
                Ok((ws, _)) => ws,
                Err(e) => {
                    warn!(chain = %chain, url = %url, error = %e, "connect failed, retrying in {delay:?}");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                    continue;
                }
            },
        };
        info!(chain = %chain, url = %url, "chain connection established");
        delay = INITIAL_RECONNECT_DELAY;
        if inbound.send(ChainMessage::Connected).await.is_err() {
            return;
        }

        let (mut sink, mut stream) = ws.split();
        // Pending request callbacks, keyed by id. Entries are dropped on
        // reply, on expiry, and wholesale on disconnect (which wakes the
        // waiting requesters with an error).
        let mut pending: HashMap<u32, (oneshot::Sender<Value>, Instant)> = HashMap::new();
        let mut keepalive = interval(KEEPALIVE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return;
                }
                out = outbound.recv() => {
                    let Some(out) = out else { return };
                    purge_expired(&chain, &mut pending);
                    if let Some(respond) = out.respond {
                        pending.insert(out.id, (respond, Instant::now()));
                    }
                    if let Err(e) = sink.send(WsMessage::Text(out.text)).await {
                        warn!(chain = %chain, error = %e, "write failed, reconnecting");
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    if last_seen.elapsed() > KEEPALIVE_SILENCE_LIMIT {
                        warn!(chain = %chain, "connection silent too long, reconnecting");
                        break;
                    }
                    if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                msg = stream.next() => {
                    let Some(Ok(msg)) = msg else {
                        warn!(chain = %chain, "connection closed by peer, reconnecting");
                        break;
                    };
                    last_seen = Instant::now();
                    match msg {
                        WsMessage::Text(text) => {
                            handle_text(&chain, &text, &mut pending, &inbound).await;
                        }
                        WsMessage::Ping(payload) => {
                            let _ = sink.send(WsMessage::Pong(payload)).await;
                        }
                        WsMessage::Close(_) => {
                            warn!(chain = %chain, "close frame received, reconnecting");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
        // Dropping the map wakes every waiting requester with a transport
        // error. Subscriptions are replayed by the consumer on the next
        // Connected notification.
    }
}

async fn handle_text(
    chain: &str,
    text: &str,
    pending: &mut HashMap<u32, (oneshot::Sender<Value>, Instant)>,
    inbound: &mpsc::Sender<ChainMessage>,
) {
    let msg: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(chain, error = %e, "undecodable frame ignored");
            return;
        }
    };
    if let Some(id) = msg.get("id").and_then(Value::as_u64) {
        if let Some((respond, _)) = pending.remove(&(id as u32)) {
            let _ = respond.send(msg);
            return;
        }
    }
    if inbound.send(ChainMessage::Message(msg)).await.is_err() {
        debug!(chain, "inbound message dropped, consumer is gone");
    }
}

fn purge_expired(chain: &str, pending: &mut HashMap<u32, (oneshot::Sender<Value>, Instant)>) {
    pending.retain(|id, (_, since)| {
        let live = since.elapsed() <= REQUEST_TIMEOUT;
        if !live {
            warn!(chain, id, "dropping timed out request callback");
        }
        live
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn encode_request_merges_params() {
        let text = encode_request(3, "subscribe", json!({"streams": ["x"]}));
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["id"], 3);
        assert_eq!(v["command"], "subscribe");
        assert_eq!(v["streams"][0], "x");
    }

    #[test]
    fn encode_request_with_null_params() {
        let text = encode_request(0, "server_info", Value::Null);
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["id"], 0);
        assert_eq!(v["command"], "server_info");
    }

    #[test]
    fn ids_are_monotonic() {
        let (handle, _rx) = ChainClientHandle::detached_for_testing("test");
        assert_eq!(handle.send("a", json!({})), 0);
        assert_eq!(handle.send("b", json!({})), 1);
        assert_eq!(handle.send("c", json!({})), 2);
    }

    /// A minimal chain node: answers any request carrying an id, and emits
    /// one uncorrelated stream message after the first request.
    async fn run_fake_node(listener: TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut sink, mut stream) = ws.split();
        while let Some(Ok(msg)) = stream.next().await {
            if let WsMessage::Text(text) = msg {
                let v: Value = serde_json::from_str(&text).unwrap();
                let reply = json!({"id": v["id"], "result": {"echo": v["command"]}});
                sink.send(WsMessage::Text(reply.to_string())).await.unwrap();
                let push = json!({"type": "transaction", "validated": true});
                sink.send(WsMessage::Text(push.to_string())).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn request_correlation_and_stream_delivery() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_fake_node(listener));

        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = spawn_chain_client(
            "test",
            format!("ws://{addr}"),
            inbound_tx,
            cancel.clone(),
        );

        // Connected notification arrives first
        assert!(matches!(
            inbound_rx.recv().await,
            Some(ChainMessage::Connected)
        ));

        let reply = handle.request("server_info", json!({})).await.unwrap();
        assert_eq!(reply["result"]["echo"], "server_info");

        // The uncorrelated push is forwarded in wire order
        match inbound_rx.recv().await {
            Some(ChainMessage::Message(v)) => assert_eq!(v["type"], "transaction"),
            other => panic!("expected stream message, got {other:?}"),
        }

        cancel.cancel();
    }
}
