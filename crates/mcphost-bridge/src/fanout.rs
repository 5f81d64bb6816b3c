//! Fans `HostEvent`s out to every attached SSE session and WebSocket peer
//! (§4.6 "Subscription topics").
//!
//! Server connect/disconnect, capability updates, and log events are
//! unconditional broadcasts; resource updates are filtered by topic
//! (`resources`, `resource:<uri>`, `server:<serverId>`).

use std::sync::Arc;

use mcphost_core::Host;
use mcphost_types::HostEvent;

use crate::session::SessionManager;
use crate::ws::WsHub;

fn event_name(event: &HostEvent) -> &'static str {
    match event {
        HostEvent::ServerConnected { .. } => "serverConnected",
        HostEvent::ServerDisconnected { .. } => "serverDisconnected",
        HostEvent::ServerError { .. } => "serverError",
        HostEvent::CapabilitiesUpdated => "capabilitiesUpdated",
        HostEvent::ResourceUpdated { .. } => "resourceUpdated",
        HostEvent::SamplingRequest { .. } => "sampling_request",
        HostEvent::Log { .. } => "log",
    }
}

/// `None` means "unconditional broadcast"; `Some(topics)` gates delivery to
/// sinks subscribed to at least one of the listed topics.
fn event_topics(event: &HostEvent) -> Option<Vec<String>> {
    match event {
        HostEvent::ResourceUpdated { server_id, uri } => {
            Some(vec!["resources".to_string(), format!("resource:{uri}"), format!("server:{server_id}")])
        }
        _ => None,
    }
}

fn event_payload(event: &HostEvent) -> serde_json::Value {
    serde_json::to_value(event).unwrap_or(serde_json::Value::Null)
}

/// Spawns the long-lived task that drains the host's event broadcaster and
/// fans events out to sessions and WS peers. `sampling_request` is excluded
/// from that fan-out: the Sampling Broker already delivered it directly to
/// the one sink handling the request, and rebroadcasting would both
/// duplicate that delivery and leak the request to unrelated sessions.
pub fn spawn(
    host: Arc<Host>,
    sessions: Arc<SessionManager>,
    ws_hub: Arc<WsHub>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = host.events().subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(HostEvent::SamplingRequest { request_id, server_id, .. }) => {
                    tracing::trace!(request_id, server_id, "sampling request dispatched");
                }
                Ok(event) => {
                    let name = event_name(&event);
                    let payload = event_payload(&event);
                    let topics = event_topics(&event);
                    broadcast_to_sessions(&sessions, name, &payload, topics.as_deref());
                    ws_hub.broadcast(name, &payload, topics.as_deref());
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event fanout lagged, dropping oldest events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn broadcast_to_sessions(
    sessions: &SessionManager,
    name: &str,
    payload: &serde_json::Value,
    topics: Option<&[String]>,
) {
    sessions.for_each_session(|session| {
        if topics.is_none() || session.matches_any_topic(topics.unwrap_or(&[])) {
            session.broadcast(name, payload.clone());
        }
    });
}
