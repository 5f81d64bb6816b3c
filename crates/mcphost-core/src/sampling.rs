//! Sampling Broker (§4.2): relays server-initiated `createMessage` requests
//! to an external sink — a WebSocket peer, an SSE session, or an in-process
//! handler — and resolves the originating request exactly once.
//!
//! Grounded on the teacher's `turbomcp-server::runtime::http::HttpDispatcher`
//! pending-map pattern: a `oneshot::Sender` keyed by request id, armed with a
//! deadline, fired by whichever completes first.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use mcphost_types::{DEFAULT_SAMPLING_TIMEOUT_SECS, ErrorKind, HostError, HostEvent};
use tokio::sync::{oneshot, RwLock};
use uuid::Uuid;

use crate::broadcaster::EventBroadcaster;
use crate::client_adapter::CreateMessageHandler;

/// The wire-independent payload a sink is asked to deliver.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SamplingRequestMessage {
    pub request_id: String,
    pub server_id: String,
    pub params: serde_json::Value,
}

/// A destination capable of carrying a `sampling_request` out to whatever is
/// on the other end (WebSocket peer, SSE session). Implemented in the HTTP
/// bridge crate; the broker only ever sees this trait.
pub trait SamplingSink: Send + Sync {
    fn deliver(&self, request: SamplingRequestMessage) -> Result<(), HostError>;
}

/// Result shape for the simplified in-process handler installed via
/// `setSamplingHandler` (§4.7) — adapted into the full `CreateMessageResult`
/// shape before it reaches the server.
#[derive(Debug, Clone)]
pub struct SimplifiedSamplingResult {
    pub content: serde_json::Value,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    pub usage: Option<serde_json::Value>,
}

#[async_trait]
pub trait DirectSamplingHandler: Send + Sync {
    async fn handle(
        &self,
        server_id: &str,
        params: serde_json::Value,
    ) -> Result<SimplifiedSamplingResult, HostError>;
}

fn simplified_to_result(result: SimplifiedSamplingResult) -> serde_json::Value {
    serde_json::json!({
        "content": result.content,
        "model": result.model,
        "stopReason": result.stop_reason,
        "usage": result.usage,
    })
}

enum SinkKind {
    WebSocket,
    Sse,
}

struct RegisteredSink {
    kind: SinkKind,
    sink: Arc<dyn SamplingSink>,
}

pub struct SamplingBroker {
    default_timeout: Duration,
    direct_handler: RwLock<Option<Arc<dyn DirectSamplingHandler>>>,
    /// Set once by `Host` at construction so a dispatched request can also
    /// surface as `HostEvent::SamplingRequest` (§4.1's emitted-events list),
    /// independent of the point-to-point sink delivery below.
    events: OnceLock<EventBroadcaster>,
    /// Which sink within a kind gets picked is arbitrary: `DashMap`'s
    /// iteration order is not registration order. Still always prefers any
    /// WebSocket sink over any SSE sink, which is all §4.2 requires.
    sinks: DashMap<String, RegisteredSink>,
    pending: DashMap<String, oneshot::Sender<Result<serde_json::Value, HostError>>>,
    /// Tracks which sink a pending request was handed to, so a sink
    /// disappearing early can force-complete its orphaned requests.
    pending_sink: DashMap<String, String>,
}

impl SamplingBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_SAMPLING_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            direct_handler: RwLock::new(None),
            events: OnceLock::new(),
            sinks: DashMap::new(),
            pending: DashMap::new(),
            pending_sink: DashMap::new(),
        }
    }

    /// Wires the Host Core's event broadcaster. Idempotent: a second call
    /// after the first is a no-op.
    pub fn set_events(&self, events: EventBroadcaster) {
        let _ = self.events.set(events);
    }

    pub async fn set_direct_handler(&self, handler: Arc<dyn DirectSamplingHandler>) {
        *self.direct_handler.write().await = Some(handler);
    }

    pub fn register_ws_sink(&self, sink_id: impl Into<String>, sink: Arc<dyn SamplingSink>) {
        self.sinks.insert(sink_id.into(), RegisteredSink { kind: SinkKind::WebSocket, sink });
    }

    pub fn register_sse_sink(&self, sink_id: impl Into<String>, sink: Arc<dyn SamplingSink>) {
        self.sinks.insert(sink_id.into(), RegisteredSink { kind: SinkKind::Sse, sink });
    }

    /// Unregisters a sink and force-completes any of its orphaned pending
    /// requests with `INTERNAL_ERROR` per the §4.2 early-termination rule.
    pub fn unregister_sink(&self, sink_id: &str) {
        self.sinks.remove(sink_id);
        let orphaned: Vec<String> = self
            .pending_sink
            .iter()
            .filter(|entry| entry.value() == sink_id)
            .map(|entry| entry.key().clone())
            .collect();
        for request_id in orphaned {
            self.fail_pending(
                &request_id,
                HostError::new(ErrorKind::InternalError, "sink disconnected before responding"),
            );
        }
    }

    /// Delivers a `sampling_response`/`sampling_error` arriving from a sink
    /// back to the awaiting `handle_create_message` call. Unknown ids are
    /// logged and discarded (§4.2 step 5).
    pub fn complete(&self, request_id: &str, result: Result<serde_json::Value, HostError>) {
        self.pending_sink.remove(request_id);
        match self.pending.remove(request_id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => tracing::warn!(request_id, "sampling response for unknown request id"),
        }
    }

    fn fail_pending(&self, request_id: &str, error: HostError) {
        self.pending_sink.remove(request_id);
        if let Some((_, tx)) = self.pending.remove(request_id) {
            let _ = tx.send(Err(error));
        }
    }

    /// Any open WebSocket sink takes priority over any SSE sink; which one
    /// within a kind is arbitrary. `None` if no sink is registered.
    fn pick_sink(&self) -> Option<(String, Arc<dyn SamplingSink>)> {
        let mut ws = None;
        let mut sse = None;
        for entry in self.sinks.iter() {
            match entry.value().kind {
                SinkKind::WebSocket if ws.is_none() => {
                    ws = Some((entry.key().clone(), entry.value().sink.clone()));
                }
                SinkKind::Sse if sse.is_none() => {
                    sse = Some((entry.key().clone(), entry.value().sink.clone()));
                }
                _ => {}
            }
        }
        ws.or(sse)
    }

    async fn deliver_via_sink(
        &self,
        server_id: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, HostError> {
        let Some((sink_id, sink)) = self.pick_sink() else {
            return Err(HostError::new(
                ErrorKind::InternalError,
                "no active client to handle sampling request",
            ));
        };

        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);
        self.pending_sink.insert(request_id.clone(), sink_id);

        if let Some(events) = self.events.get() {
            events.emit(HostEvent::SamplingRequest {
                request_id: request_id.clone(),
                server_id: server_id.to_string(),
                params: params.clone(),
            });
        }

        if let Err(err) = sink.deliver(SamplingRequestMessage {
            request_id: request_id.clone(),
            server_id: server_id.to_string(),
            params,
        }) {
            self.pending.remove(&request_id);
            self.pending_sink.remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(self.default_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending_sink.remove(&request_id);
                Err(HostError::new(
                    ErrorKind::InternalError,
                    "sink disconnected before responding",
                ))
            }
            Err(_elapsed) => {
                self.fail_pending(
                    &request_id,
                    HostError::new(ErrorKind::RequestTimeout, "sampling request timed out"),
                );
                Err(HostError::new(ErrorKind::RequestTimeout, "sampling request timed out"))
            }
        }
    }
}

impl Default for SamplingBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CreateMessageHandler for SamplingBroker {
    async fn handle_create_message(
        &self,
        server_id: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, HostError> {
        let direct = self.direct_handler.read().await.clone();
        if let Some(handler) = direct {
            return handler
                .handle(server_id, params)
                .await
                .map(simplified_to_result)
                .map_err(|e| {
                    HostError::wrap(ErrorKind::InternalError, "sampling handler failed", e)
                });
        }
        self.deliver_via_sink(server_id, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        delivered: Mutex<Vec<SamplingRequestMessage>>,
    }

    impl SamplingSink for RecordingSink {
        fn deliver(&self, request: SamplingRequestMessage) -> Result<(), HostError> {
            self.delivered.lock().unwrap().push(request);
            Ok(())
        }
    }

    #[tokio::test]
    async fn no_sink_fails_immediately() {
        let broker = SamplingBroker::new();
        let err = broker
            .handle_create_message("srv-1", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
    }

    #[tokio::test]
    async fn sink_reply_completes_the_call() {
        let broker = Arc::new(SamplingBroker::new());
        let sink = Arc::new(RecordingSink { delivered: Mutex::new(Vec::new()) });
        broker.register_ws_sink("peer-1", sink.clone());

        let broker_clone = broker.clone();
        let call = tokio::spawn(async move {
            broker_clone
                .handle_create_message("srv-1", serde_json::json!({"messages": []}))
                .await
        });

        // Wait until the request has actually been registered and handed off.
        let request_id = loop {
            let delivered = sink.delivered.lock().unwrap();
            if let Some(msg) = delivered.first() {
                break msg.request_id.clone();
            }
            drop(delivered);
            tokio::task::yield_now().await;
        };

        broker.complete(&request_id, Ok(serde_json::json!({"content": "hi"})));
        let result = call.await.unwrap().unwrap();
        assert_eq!(result["content"], "hi");
    }

    #[tokio::test]
    async fn dispatch_emits_sampling_request_event() {
        let broker = Arc::new(SamplingBroker::new());
        let events = EventBroadcaster::default();
        broker.set_events(events.clone());
        let mut rx = events.subscribe();
        let sink = Arc::new(RecordingSink { delivered: Mutex::new(Vec::new()) });
        broker.register_ws_sink("peer-1", sink.clone());

        let broker_clone = broker.clone();
        let call = tokio::spawn(async move {
            broker_clone
                .handle_create_message("srv-1", serde_json::json!({"messages": []}))
                .await
        });

        let event = rx.recv().await.unwrap();
        let HostEvent::SamplingRequest { server_id, .. } = event else {
            panic!("expected a SamplingRequest event, got {event:?}");
        };
        assert_eq!(server_id, "srv-1");

        let request_id = sink.delivered.lock().unwrap().first().unwrap().request_id.clone();
        broker.complete(&request_id, Ok(serde_json::json!({"content": "hi"})));
        call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unregistering_sink_fails_its_orphaned_requests() {
        let broker = Arc::new(SamplingBroker::new());
        let sink = Arc::new(RecordingSink { delivered: Mutex::new(Vec::new()) });
        broker.register_ws_sink("peer-1", sink.clone());

        let broker_clone = broker.clone();
        let call = tokio::spawn(async move {
            broker_clone
                .handle_create_message("srv-1", serde_json::json!({}))
                .await
        });

        loop {
            if !sink.delivered.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        broker.unregister_sink("peer-1");
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
    }

    #[tokio::test]
    async fn direct_handler_bypasses_sinks_entirely() {
        struct EchoHandler;
        #[async_trait]
        impl DirectSamplingHandler for EchoHandler {
            async fn handle(
                &self,
                _server_id: &str,
                _params: serde_json::Value,
            ) -> Result<SimplifiedSamplingResult, HostError> {
                Ok(SimplifiedSamplingResult {
                    content: serde_json::json!("ok"),
                    model: Some("test-model".to_string()),
                    stop_reason: None,
                    usage: None,
                })
            }
        }

        let broker = SamplingBroker::new();
        broker.set_direct_handler(Arc::new(EchoHandler)).await;
        let result = broker
            .handle_create_message("srv-1", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["content"], "ok");
        assert_eq!(result["model"], "test-model");
    }
}
