//! The BiDi Transport: a single duplex JSON-message channel to the
//! browser. Correlates request/response pairs and fans events out to
//! subscribers.
//!
//! A single actor owns `pending_commands` and polls the connection in
//! a loop, expressed as three cooperating `tokio::spawn`ed tasks —
//! reader, writer, and the correlating actor — rather than manually
//! implemented `Stream`/`Sink` combinators, now that the engine
//! commits to `tokio` rather than supporting either async runtime.

use std::borrow::Cow;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_tungstenite::tokio::ConnectStream;
use async_tungstenite::tungstenite::Message as WsMessage;
use async_tungstenite::WebSocketStream;
use fnv::FnvHashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use vibium_bidi::BidiEvent;
use vibium_types::{CallId, Command, CommandResponse, JsonEventMessage, Message, Method, Response};

use crate::error::{EngineError, Result, TransportError};
use crate::job::PeriodicJob;

/// Requests older than this without a reply are evicted from the
/// pending table and fail with a connection-closed style error.
const PENDING_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Cheaply cloneable handle to a live BiDi connection. All clones
/// share the same underlying actor task and websocket.
#[derive(Debug, Clone)]
pub struct Transport {
    to_actor: mpsc::UnboundedSender<ActorMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum ActorMessage {
    Send {
        method: Cow<'static, str>,
        params: serde_json::Value,
        respond_to: oneshot::Sender<Result<Response, EngineError>>,
    },
    Subscribe {
        prefix: String,
        tx: mpsc::UnboundedSender<BidiEvent>,
        id_tx: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Close,
}

enum Incoming {
    Message(Message<JsonEventMessage>),
    ParseError(String),
    Closed,
}

impl Transport {
    /// Connects to the browser's BiDi WebSocket endpoint and spawns
    /// the reader/writer/actor tasks that back this handle.
    pub async fn connect(bidi_ws_url: impl AsRef<str>) -> Result<Self> {
        let (ws, _) = async_tungstenite::tokio::connect_async(bidi_ws_url.as_ref())
            .await
            .map_err(TransportError::Ws)?;
        Ok(Self::spawn(ws))
    }

    fn spawn(ws: WebSocketStream<ConnectStream>) -> Self {
        let (ws_sink, mut ws_stream) = ws.split();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<Incoming>();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (to_actor, from_clients) = mpsc::unbounded_channel::<ActorMessage>();

        // Reader: the only task that ever reads from the socket.
        tokio::spawn(async move {
            while let Some(frame) = ws_stream.next().await {
                let outcome = match frame {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<Message<JsonEventMessage>>(&text) {
                            Ok(msg) => Incoming::Message(msg),
                            Err(err) => {
                                error!("failed to decode BiDi message: {err}: {text}");
                                Incoming::ParseError(err.to_string())
                            }
                        }
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        warn!("websocket read error: {err}");
                        Incoming::Closed
                    }
                };
                let closed = matches!(outcome, Incoming::Closed);
                if incoming_tx.send(outcome).is_err() || closed {
                    break;
                }
            }
            let _ = incoming_tx.send(Incoming::Closed);
        });

        // Writer: the only task that ever writes to the socket, so
        // send order on the wire matches submission order (FIFO).
        tokio::spawn(async move {
            let mut sink = ws_sink;
            let mut rx = outgoing_rx;
            while let Some(payload) = rx.recv().await {
                if let Err(err) = sink.send(WsMessage::Text(payload)).await {
                    warn!("websocket write error: {err}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Actor: owns command correlation and the subscriber registry.
        tokio::spawn(run_actor(from_clients, incoming_rx, outgoing_tx));

        Transport { to_actor }
    }

    /// Serializes `cmd`, sends it, and awaits the matching reply.
    pub async fn send<C: Command>(&self, cmd: C) -> Result<CommandResponse<C::Response>> {
        let method = cmd.identifier();
        let params = serde_json::to_value(&cmd).map_err(TransportError::MessageParseFailure)?;
        let (respond_to, rx) = oneshot::channel();
        self.to_actor
            .send(ActorMessage::Send {
                method: method.clone(),
                params,
                respond_to,
            })
            .map_err(|_| EngineError::Transport(TransportError::ConnectionClosed))?;
        let resp = rx
            .await
            .map_err(|_| EngineError::Transport(TransportError::ConnectionClosed))??;
        resp.into_command_response(method).map_err(EngineError::Browser)
    }

    /// Registers interest in events whose BiDi method starts with
    /// `prefix` (e.g. `"browsingContext"` or the exact method name
    /// `"log.entryAdded"`). Returns the subscription's id, needed to
    /// later `unsubscribe`, alongside the event stream itself.
    pub async fn subscribe(
        &self,
        prefix: impl Into<String>,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<BidiEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (id_tx, id_rx) = oneshot::channel();
        self.to_actor
            .send(ActorMessage::Subscribe {
                prefix: prefix.into(),
                tx,
                id_tx,
            })
            .map_err(|_| EngineError::Transport(TransportError::ConnectionClosed))?;
        let id = id_rx
            .await
            .map_err(|_| EngineError::Transport(TransportError::ConnectionClosed))?;
        Ok((id, rx))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.to_actor.send(ActorMessage::Unsubscribe { id });
    }

    /// Idempotent: completes all pending sends with a "connection
    /// closed" failure and stops the background tasks.
    pub fn close(&self) {
        let _ = self.to_actor.send(ActorMessage::Close);
    }
}

struct ActorState {
    next_id: u64,
    pending: FnvHashMap<CallId, (oneshot::Sender<Result<Response, EngineError>>, Instant)>,
    subscriptions: HashMap<SubscriptionId, (String, mpsc::UnboundedSender<BidiEvent>)>,
    next_sub_id: u64,
    outgoing: mpsc::UnboundedSender<String>,
    closed: bool,
}

impl ActorState {
    fn next_call_id(&mut self) -> CallId {
        let id = CallId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn submit(&mut self, method: Cow<'static, str>, params: serde_json::Value) -> Result<CallId> {
        if self.closed {
            return Err(EngineError::Transport(TransportError::SendAfterClose));
        }
        let id = self.next_call_id();
        let call = vibium_types::MethodCall {
            id,
            method: method.clone(),
            params,
        };
        let payload = serde_json::to_string(&call).map_err(TransportError::MessageParseFailure)?;
        debug!(call_id = %id, %method, module = module_of(&method), "submit BiDi command");
        self.outgoing
            .send(payload)
            .map_err(|_| EngineError::Transport(TransportError::ConnectionClosed))?;
        Ok(id)
    }

    fn dispatch_event(&mut self, event: JsonEventMessage) {
        let parsed = match BidiEvent::from_json(event.clone()) {
            Ok(event) => event,
            Err(err) => {
                error!("failed to classify BiDi event {}: {err}", event.method);
                return;
            }
        };
        self.subscriptions.retain(|_, (prefix, tx)| {
            if event.method.starts_with(prefix.as_str()) {
                tx.send(parsed.clone()).is_ok()
            } else {
                !tx.is_closed()
            }
        });
    }

    fn fail_all_pending(&mut self) {
        for (_, (tx, _)) in self.pending.drain() {
            let _ = tx.send(Err(EngineError::Transport(TransportError::ConnectionClosed)));
        }
    }

    fn evict_stale(&mut self) {
        let now = Instant::now();
        let stale: Vec<CallId> = self
            .pending
            .iter()
            .filter(|(_, (_, sent_at))| now.duration_since(*sent_at) >= PENDING_COMMAND_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some((tx, _)) = self.pending.remove(&id) {
                let _ = tx.send(Err(EngineError::Transport(TransportError::ConnectionClosed)));
            }
        }
    }
}

async fn run_actor(
    mut from_clients: mpsc::UnboundedReceiver<ActorMessage>,
    mut incoming: mpsc::UnboundedReceiver<Incoming>,
    outgoing: mpsc::UnboundedSender<String>,
) {
    let mut state = ActorState {
        next_id: 0,
        pending: Default::default(),
        subscriptions: Default::default(),
        next_sub_id: 0,
        outgoing,
        closed: false,
    };
    let mut eviction = PeriodicJob::new(EVICTION_SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = eviction.tick() => {
                state.evict_stale();
            }
            msg = from_clients.recv() => {
                match msg {
                    Some(ActorMessage::Send { method, params, respond_to }) => {
                        match state.submit(method, params) {
                            Ok(id) => {
                                state.pending.insert(id, (respond_to, Instant::now()));
                            }
                            Err(err) => {
                                let _ = respond_to.send(Err(err));
                            }
                        }
                    }
                    Some(ActorMessage::Subscribe { prefix, tx, id_tx }) => {
                        let id = SubscriptionId(state.next_sub_id);
                        state.next_sub_id = state.next_sub_id.wrapping_add(1);
                        state.subscriptions.insert(id, (prefix, tx));
                        let _ = id_tx.send(id);
                    }
                    Some(ActorMessage::Unsubscribe { id }) => {
                        state.subscriptions.remove(&id);
                    }
                    Some(ActorMessage::Close) | None => {
                        state.closed = true;
                        state.fail_all_pending();
                        break;
                    }
                }
            }
            msg = incoming.recv() => {
                match msg {
                    Some(Incoming::Message(Message::Response(resp))) => {
                        if let Some((tx, _)) = state.pending.remove(&resp.id) {
                            let _ = tx.send(Ok(resp));
                        }
                    }
                    Some(Incoming::Message(Message::Event(event))) => {
                        state.dispatch_event(event);
                    }
                    Some(Incoming::ParseError(_)) => {
                        // malformed frame: already logged, stream keeps running
                    }
                    Some(Incoming::Closed) | None => {
                        state.closed = true;
                        state.fail_all_pending();
                        break;
                    }
                }
            }
        }
    }
}

/// Splits a dotted BiDi method name into its top-level module, for
/// matching against a subscription prefix like `"browsingContext"`.
pub fn module_of(method: &str) -> &str {
    method.split('.').next().unwrap_or(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_of_splits_on_dot() {
        assert_eq!(module_of("browsingContext.navigate"), "browsingContext");
        assert_eq!(module_of("log.entryAdded"), "log");
    }
}
