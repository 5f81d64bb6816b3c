//! `SamplingSink` implementations for the two kinds of live outbound channel
//! the bridge can hand the Sampling Broker (§4.2 "Sink selection policy").

use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use mcphost_core::{SamplingRequestMessage, SamplingSink};
use mcphost_types::{ErrorKind, HostError};
use tokio::sync::mpsc;

use crate::session::SessionState;

/// Delivers a `sampling_request` as a server-pushed SSE event on the
/// session's event stream.
pub struct SseSamplingSink(pub Arc<SessionState>);

impl SamplingSink for SseSamplingSink {
    fn deliver(&self, request: SamplingRequestMessage) -> Result<(), HostError> {
        self.0.register_pending_sampling(request.request_id.clone());
        self.0.broadcast(
            "sampling_request",
            serde_json::json!({
                "requestId": request.request_id,
                "serverId": request.server_id,
                "params": request.params,
            }),
        );
        Ok(())
    }
}

/// Delivers a `sampling_request` as a typed WebSocket text frame.
pub struct WsSamplingSink(pub mpsc::UnboundedSender<WsMessage>);

impl SamplingSink for WsSamplingSink {
    fn deliver(&self, request: SamplingRequestMessage) -> Result<(), HostError> {
        let payload = serde_json::json!({
            "type": "sampling_request",
            "requestId": request.request_id,
            "serverId": request.server_id,
            "params": request.params,
        });
        self.0
            .send(WsMessage::Text(payload.to_string().into()))
            .map_err(|_| HostError::new(ErrorKind::InternalError, "websocket sink closed"))
    }
}
