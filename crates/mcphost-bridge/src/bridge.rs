//! SSE/WS Bridge (§4.6): the `axum::Router` an embedder mounts to expose a
//! `Host` over HTTP, SSE and WebSocket.
//!
//! Grounded on the teacher's `turbomcp-server::runtime::http::run_http`
//! (POST/GET/DELETE `/mcp` triad, session-id headers, SSE keep-alive) and
//! `turbomcp-transport::streamable_http_v2` (the GET stream's replay-then-live
//! event shape), with the teacher's JWT-based `middleware::auth` simplified
//! to a shared-secret scheme in `auth.rs`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use mcphost_core::{Host, SamplingBroker};
use mcphost_types::{ErrorKind, HostError, Root};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthConfig;
use crate::session::{SessionManager, SessionState, StoredEvent};
use crate::sinks::SseSamplingSink;
use crate::ws::{self, WsHub};
use crate::{fanout, rpc};

/// Result of `initialize`'s `protocolVersion`. This bridge speaks one
/// protocol revision; there is no content negotiation to do here.
const PROTOCOL_VERSION: &str = "2025-03-26";

/// Where the JSON-RPC triad is mounted. Everything else (`/status`,
/// `/ws`, ...) is unconditionally rooted at `/`.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mcp_path: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { mcp_path: "/mcp".to_string() }
    }
}

/// Shared state for every bridge handler. Cheap to clone: everything behind
/// an `Arc` or a small value type.
#[derive(Clone)]
pub struct BridgeState {
    pub host: Arc<Host>,
    pub sessions: Arc<SessionManager>,
    pub sampling: Arc<SamplingBroker>,
    pub ws_hub: Arc<WsHub>,
    pub auth: AuthConfig,
}

/// Builds the bridge's router and spawns its background fanout task.
/// Callers own the returned `JoinHandle` and should abort it on shutdown.
#[must_use]
pub fn build_router(
    host: Arc<Host>,
    sessions: Arc<SessionManager>,
    auth: AuthConfig,
    config: BridgeConfig,
) -> (Router, tokio::task::JoinHandle<()>) {
    let ws_hub = WsHub::new();
    let sampling = host.sampling_broker().clone();
    let state = BridgeState { host: host.clone(), sessions: sessions.clone(), sampling, ws_hub: ws_hub.clone(), auth };

    let fanout_handle = fanout::spawn(host, sessions, ws_hub);

    let protected: Router<BridgeState> = Router::new()
        .route(&config.mcp_path, post(post_mcp).get(get_mcp).delete(delete_mcp))
        .route("/mcp/sampling_response", post(sampling_response))
        .route("/mcp/sampling_error", post(sampling_error))
        .route("/status", get(get_status))
        .route("/servers", get(get_servers))
        .route("/capabilities/tools", get(get_tools))
        .route("/capabilities/resources", get(get_resources))
        .route("/capabilities/templates", get(get_templates))
        .route("/capabilities/prompts", get(get_prompts))
        .route("/suggest/resource", get(suggest_resource))
        .route("/suggest/tool", get(suggest_tool))
        .route("/suggest/prompt", get(suggest_prompt))
        .route("/config/roots", get(get_roots).post(post_roots))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), crate::auth::require_api_key));

    let ws_route: Router<BridgeState> = Router::new().route("/ws", get(ws::ws_handler));

    let app = protected.merge(ws_route).with_state(state);
    (app, fanout_handle)
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers.get("Mcp-Session-Id").and_then(|v| v.to_str().ok()).map(str::to_string)
}

struct ProcessedMessage {
    response: Option<Value>,
    new_session: Option<String>,
    was_request: bool,
}

async fn process_message(
    state: &BridgeState,
    existing_session_id: Option<&str>,
    value: &Value,
) -> ProcessedMessage {
    match rpc::classify(value) {
        rpc::RpcMessage::Request { id, method, params } if method == "initialize" => {
            if existing_session_id.is_some() {
                ProcessedMessage {
                    response: Some(rpc::custom_error_response(
                        id,
                        -32600,
                        "Mcp-Session-Id already present; initialize starts a new session",
                    )),
                    new_session: None,
                    was_request: true,
                }
            } else {
                let _ = params;
                let session = state.sessions.create();
                let result = json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": state.host.host_capabilities(),
                    "serverInfo": state.host.host_info(),
                });
                ProcessedMessage {
                    response: Some(rpc::success_response(id, result)),
                    new_session: Some(session.id.clone()),
                    was_request: true,
                }
            }
        }
        rpc::RpcMessage::Request { id, method, params } => {
            let Some(session_id) = existing_session_id else {
                return ProcessedMessage {
                    response: Some(rpc::custom_error_response(id, -32600, "missing Mcp-Session-Id header")),
                    new_session: None,
                    was_request: true,
                };
            };
            if state.sessions.get(session_id).is_none() {
                return ProcessedMessage {
                    response: Some(rpc::custom_error_response(id, -32600, "unknown session id")),
                    new_session: None,
                    was_request: true,
                };
            }
            let response = rpc::dispatch_request(&state.host, id, &method, params).await;
            ProcessedMessage { response: Some(response), new_session: None, was_request: true }
        }
        rpc::RpcMessage::Notification { .. } | rpc::RpcMessage::Response { .. } => {
            ProcessedMessage { response: None, new_session: None, was_request: false }
        }
        rpc::RpcMessage::Malformed => ProcessedMessage {
            response: Some(rpc::custom_error_response(Value::Null, -32600, "malformed JSON-RPC message")),
            new_session: None,
            was_request: true,
        },
    }
}

/// POST `/mcp`: the JSON-RPC Request Router's HTTP entry point (§4.5).
///
/// Accepts a single message or a batch array. Batches are processed
/// independently per-message; the response shape mirrors the input shape.
async fn post_mcp(State(state): State<BridgeState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let existing_session_id = session_header(&headers);
    let is_batch = body.is_array();
    let messages: Vec<Value> = if is_batch { body.as_array().cloned().unwrap_or_default() } else { vec![body] };

    // SSE upgrade is only offered for a single message (not a batch) that is
    // either `initialize` or carries `params.options.onprogress`.
    let wants_sse = !is_batch
        && accepts_event_stream(&headers)
        && messages.first().is_some_and(|m| {
            m.get("method").and_then(Value::as_str) == Some("initialize")
                || m.pointer("/params/options/onprogress").is_some()
        });

    let mut responses = Vec::with_capacity(messages.len());
    let mut new_session_id = None;
    let mut had_request = false;
    for message in &messages {
        let processed = process_message(&state, existing_session_id.as_deref(), message).await;
        had_request |= processed.was_request;
        if processed.new_session.is_some() {
            new_session_id = processed.new_session;
        }
        if let Some(response) = processed.response {
            responses.push(response);
        }
    }

    if wants_sse {
        if let Some(session_id) = new_session_id.clone().or_else(|| existing_session_id.clone()) {
            if let Some(session) = state.sessions.get(&session_id) {
                return stream_initial_response_over_sse(&state, session, session_id, responses);
            }
        }
    }

    build_json_response(is_batch, responses, had_request, new_session_id)
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn build_json_response(
    is_batch: bool,
    responses: Vec<Value>,
    had_request: bool,
    new_session_id: Option<String>,
) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(id) = new_session_id.as_deref() {
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert("Mcp-Session-Id", value);
        }
    }

    let body_response = if !responses.is_empty() {
        let body = if is_batch { json!(responses) } else { responses[0].clone() };
        (StatusCode::OK, Json(body)).into_response()
    } else if had_request {
        // Only reachable for a malformed-only batch, since every real
        // request always yields a response object.
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::ACCEPTED.into_response()
    };

    (headers, body_response).into_response()
}

fn stored_event_to_sse(event: &StoredEvent) -> Event {
    Event::default().event(event.event_type.clone()).id(event.id.to_string()).data(event.data.to_string())
}

/// Drops the Sampling Broker's registration for a session's SSE sink once
/// its stream ends, whichever way it ends.
struct SseSinkGuard {
    broker: Arc<SamplingBroker>,
    sink_id: String,
}

impl Drop for SseSinkGuard {
    fn drop(&mut self) {
        self.broker.unregister_sink(&self.sink_id);
    }
}

fn stream_initial_response_over_sse(
    state: &BridgeState,
    session: Arc<SessionState>,
    session_id: String,
    initial_responses: Vec<Value>,
) -> Response {
    state.sampling.register_sse_sink(session_id.clone(), Arc::new(SseSamplingSink(session.clone())));
    let guard = SseSinkGuard { broker: state.sampling.clone(), sink_id: session_id.clone() };
    let (rx, _replay) = session.attach_sse(None);

    let initial_event = Event::default().event("response").data(json!(initial_responses).to_string());
    let live = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        rx.recv().await.map(|item| (Ok::<_, Infallible>(stored_event_to_sse(&item)), (rx, guard)))
    });
    let body_stream = stream::once(async move { Ok::<_, Infallible>(initial_event) }).chain(live);

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        headers.insert("Mcp-Session-Id", value);
    }

    (headers, Sse::new(body_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("")))
        .into_response()
}

/// GET `/mcp`: opens (or resumes, via `Last-Event-ID`) a session's SSE
/// stream of server-pushed events.
async fn get_mcp(State(state): State<BridgeState>, headers: HeaderMap) -> Response {
    if !accepts_event_stream(&headers) {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    let Some(session_id) = session_header(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id").into_response();
    };
    let Some(session) = state.sessions.get(&session_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let last_event_id =
        headers.get("Last-Event-ID").and_then(|v| v.to_str().ok()).and_then(|s| s.parse::<u64>().ok());
    let (rx, replay) = session.attach_sse(last_event_id);

    state.sampling.register_sse_sink(session_id.clone(), Arc::new(SseSamplingSink(session.clone())));
    let guard = SseSinkGuard { broker: state.sampling.clone(), sink_id: session_id.clone() };

    let replay_stream = stream::iter(replay.into_iter().map(|e| Ok::<_, Infallible>(stored_event_to_sse(&e))));
    let live = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        rx.recv().await.map(|item| (Ok::<_, Infallible>(stored_event_to_sse(&item)), (rx, guard)))
    });
    let body_stream = replay_stream.chain(live);

    let mut response_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response_headers.insert("Mcp-Session-Id", value);
    }

    (response_headers, Sse::new(body_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("")))
        .into_response()
}

/// DELETE `/mcp`: ends a session, failing any sampling request it still owed.
async fn delete_mcp(State(state): State<BridgeState>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let sampling = state.sampling.clone();
    let removed = state.sessions.destroy(&session_id, |request_id| {
        sampling.complete(request_id, Err(HostError::new(ErrorKind::InternalError, "session closed")));
    });
    if removed {
        state.sampling.unregister_sink(&session_id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SamplingResponseBody {
    #[serde(rename = "requestId")]
    request_id: String,
    result: Value,
}

async fn sampling_response(State(state): State<BridgeState>, Json(body): Json<SamplingResponseBody>) -> StatusCode {
    state.sampling.complete(&body.request_id, Ok(body.result));
    state.sessions.complete_pending_sampling_everywhere(&body.request_id);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct SamplingErrorDetail {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SamplingErrorBody {
    #[serde(rename = "requestId")]
    request_id: String,
    error: SamplingErrorDetail,
}

async fn sampling_error(State(state): State<BridgeState>, Json(body): Json<SamplingErrorBody>) -> StatusCode {
    let error = HostError::new(ErrorKind::InternalError, body.error.message)
        .with_data(body.error.data.unwrap_or_else(|| json!({ "code": body.error.code })));
    state.sampling.complete(&body.request_id, Err(error));
    state.sessions.complete_pending_sampling_everywhere(&body.request_id);
    StatusCode::NO_CONTENT
}

async fn get_status(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connectedServers": state.host.connected_server_ids(),
        "sessionCount": state.sessions.len(),
    }))
}

async fn get_servers(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!(state.host.server_summaries()))
}

async fn get_tools(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!(state.host.tools().await))
}

async fn get_resources(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!(state.host.resources().await))
}

async fn get_templates(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!(state.host.resource_templates().await))
}

async fn get_prompts(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!(state.host.prompts().await))
}

#[derive(Debug, Deserialize)]
struct UriQuery {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: String,
}

async fn suggest_resource(State(state): State<BridgeState>, Query(q): Query<UriQuery>) -> Json<Value> {
    Json(json!(state.host.suggest_server_for_resource(&q.uri).await))
}

async fn suggest_tool(State(state): State<BridgeState>, Query(q): Query<NameQuery>) -> Json<Value> {
    Json(json!(state.host.suggest_server_for_tool(&q.name).await))
}

async fn suggest_prompt(State(state): State<BridgeState>, Query(q): Query<NameQuery>) -> Json<Value> {
    Json(json!(state.host.suggest_server_for_prompt(&q.name).await))
}

async fn get_roots(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!(state.host.current_roots()))
}

/// POST `/config/roots`: replaces the whole roots list. The body must be a
/// JSON array of `{uri, name}` objects (§4.7 "Public Host API" validation);
/// anything else is a `400`.
async fn post_roots(State(state): State<BridgeState>, Json(body): Json<Value>) -> Response {
    let Some(items) = body.as_array() else {
        return (StatusCode::BAD_REQUEST, "body must be a JSON array of roots").into_response();
    };
    let mut roots = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Root>(item.clone()) {
            Ok(root) if !root.uri.is_empty() && !root.name.is_empty() => roots.push(root),
            _ => {
                return (StatusCode::BAD_REQUEST, "each root needs non-empty string 'uri' and 'name'")
                    .into_response()
            }
        }
    }

    match state.host.set_roots(roots).await {
        Ok(()) => Json(json!(state.host.current_roots())).into_response(),
        Err(aggregate) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "errors": aggregate.errors }))).into_response()
        }
    }
}
