//! WebSocket endpoint (§4.6 "WebSocket endpoint"), grounded on the teacher's
//! `turbomcp-server::runtime::websocket` connect/send-loop/receive-loop
//! split, simplified to this system's subscribe/sampling-response protocol
//! instead of a generic bidirectional JSON-RPC dispatcher.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use mcphost_types::{ErrorKind, HostError};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::{ws_key_is_valid, WsAuthQuery};
use crate::bridge::BridgeState;
use crate::sinks::WsSamplingSink;

struct WsConnection {
    tx: mpsc::UnboundedSender<Message>,
    subscriptions: parking_lot::RwLock<HashSet<String>>,
}

/// Registry of live WebSocket peers, used by both the Sampling Broker's sink
/// registration and the event fanout task.
#[derive(Default)]
pub struct WsHub {
    connections: DashMap<String, Arc<WsConnection>>,
}

impl WsHub {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn insert(&self, id: String, conn: Arc<WsConnection>) {
        self.connections.insert(id, conn);
    }

    fn remove(&self, id: &str) {
        self.connections.remove(id);
    }

    /// Fans one host event out to every connection whose subscriptions
    /// intersect `topics`; `topics: None` broadcasts unconditionally (§4.6).
    pub fn broadcast(&self, event_name: &str, payload: &serde_json::Value, topics: Option<&[String]>) {
        let message = serde_json::json!({ "type": event_name, "data": payload }).to_string();
        for entry in self.connections.iter() {
            let matches = match topics {
                None => true,
                Some(topics) => {
                    let subs = entry.value().subscriptions.read();
                    topics.iter().any(|t| subs.contains(t))
                }
            };
            if matches {
                let _ = entry.value().tx.send(Message::Text(message.clone().into()));
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    SamplingResponse {
        #[serde(rename = "requestId")]
        request_id: String,
        result: serde_json::Value,
    },
    SamplingError {
        #[serde(rename = "requestId")]
        request_id: String,
        error: SamplingErrorPayload,
    },
}

#[derive(Debug, Deserialize)]
struct SamplingErrorPayload {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

pub async fn ws_handler(
    State(state): State<BridgeState>,
    headers: HeaderMap,
    query: Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let header_key = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
    if !ws_key_is_valid(&state.auth, header_key, &query) {
        return (axum::http::StatusCode::UNAUTHORIZED, "invalid or missing api key")
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BridgeState) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let conn = Arc::new(WsConnection { tx: tx.clone(), subscriptions: parking_lot::RwLock::new(HashSet::new()) });
    state.ws_hub.insert(connection_id.clone(), conn);
    state
        .sampling
        .register_ws_sink(connection_id.clone(), Arc::new(WsSamplingSink(tx.clone())));

    let _ = tx.send(Message::Text(
        serde_json::json!({ "type": "connection", "connectionId": connection_id }).to_string().into(),
    ));

    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
        ping_interval.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                maybe_msg = rx.recv() => {
                    match maybe_msg {
                        Some(msg) => {
                            if ws_sink.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => handle_text_message(&state, &connection_id, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    state.ws_hub.remove(&connection_id);
    state.sampling.unregister_sink(&connection_id);
}

async fn handle_text_message(state: &BridgeState, connection_id: &str, text: &str) {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
        tracing::debug!(connection_id, "ignoring unparseable websocket message");
        return;
    };

    match message {
        ClientMessage::Subscribe { topic } => {
            if let Some(entry) = state.ws_hub.connections.get(connection_id) {
                entry.value().subscriptions.write().insert(topic);
            }
        }
        ClientMessage::Unsubscribe { topic } => {
            if let Some(entry) = state.ws_hub.connections.get(connection_id) {
                entry.value().subscriptions.write().remove(&topic);
            }
        }
        ClientMessage::SamplingResponse { request_id, result } => {
            state.sampling.complete(&request_id, Ok(result));
        }
        ClientMessage::SamplingError { request_id, error } => {
            let host_error = HostError::new(ErrorKind::InternalError, error.message)
                .with_data(error.data.unwrap_or(serde_json::json!({ "code": error.code })));
            state.sampling.complete(&request_id, Err(host_error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_parses_subscribe_and_sampling_reply() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","topic":"resources"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { topic } if topic == "resources"));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"sampling_response","requestId":"r1","result":{"content":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::SamplingResponse { request_id, .. } if request_id == "r1"));
    }
}
