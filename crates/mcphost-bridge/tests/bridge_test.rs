//! Integration tests for the `/mcp` JSON-RPC triad, exercised the way the
//! teacher's `http_headers_test.rs` does: build requests by hand, drive the
//! router with `tower::ServiceExt::oneshot`, inspect the response.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use mcphost_bridge::{bridge, session::SessionManager, AuthConfig};
use mcphost_core::{Host, SamplingBroker};
use mcphost_types::{HostCapabilities, HostInfo};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_router() -> axum::Router {
    let host = Host::new(HostInfo::default(), HostCapabilities::default(), vec![], Arc::new(SamplingBroker::new()));
    let sessions = SessionManager::new(Duration::from_secs(3600));
    let (router, _fanout) =
        bridge::build_router(host, sessions, AuthConfig::disabled(), bridge::BridgeConfig::default());
    router
}

fn json_request(body: Value, session_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/mcp").header("content-type", "application/json");
    if let Some(id) = session_id {
        builder = builder.header("Mcp-Session-Id", id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn initialize_then_list_tools_on_the_new_session() {
    let router = test_router();

    let init_request = json_request(
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        None,
    );
    let response = router.clone().oneshot(init_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("Mcp-Session-Id")
        .expect("initialize must mint a session id")
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");

    let list_request = json_request(
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        Some(&session_id),
    );
    let response = router.clone().oneshot(list_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"], json!([]));
}

#[tokio::test]
async fn request_without_session_id_is_rejected() {
    let router = test_router();
    let request = json_request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}), None);
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn second_initialize_on_an_existing_session_is_rejected() {
    let router = test_router();
    let init_request = json_request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}), None);
    let response = router.clone().oneshot(init_request).await.unwrap();
    let session_id =
        response.headers().get("Mcp-Session-Id").unwrap().to_str().unwrap().to_string();

    let second_init = json_request(
        json!({"jsonrpc": "2.0", "id": 2, "method": "initialize"}),
        Some(&session_id),
    );
    let response = router.oneshot(second_init).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn batch_of_notifications_yields_202() {
    let router = test_router();
    let init_request = json_request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}), None);
    let response = router.clone().oneshot(init_request).await.unwrap();
    let session_id =
        response.headers().get("Mcp-Session-Id").unwrap().to_str().unwrap().to_string();

    let batch = json_request(
        json!([{"jsonrpc": "2.0", "method": "notifications/initialized"}]),
        Some(&session_id),
    );
    let response = router.oneshot(batch).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn delete_removes_the_session() {
    let router = test_router();
    let init_request = json_request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}), None);
    let response = router.clone().oneshot(init_request).await.unwrap();
    let session_id =
        response.headers().get("Mcp-Session-Id").unwrap().to_str().unwrap().to_string();

    let delete_request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("Mcp-Session-Id", session_id.clone())
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(delete_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let second_delete = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("Mcp-Session-Id", session_id)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(second_delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_endpoint_reports_zero_connected_servers() {
    let router = test_router();
    let request = Request::builder().method("GET").uri("/status").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["connectedServers"], json!([]));
}
