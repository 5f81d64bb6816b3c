//! JSON-RPC Request Router (§4.5): classifies inbound messages and dispatches
//! them to Host Core calls, independent of the HTTP framework plumbing in
//! `bridge.rs`.

use mcphost_core::{Host, RequestOptions};
use mcphost_types::{ErrorKind, HostError};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub enum RpcMessage {
    Request { id: Value, method: String, params: Value },
    Notification { method: String, params: Value },
    Response { id: Value },
    Malformed,
}

/// Classifies one JSON-RPC message object per §4.5's rules.
#[must_use]
pub fn classify(value: &Value) -> RpcMessage {
    let Some(obj) = value.as_object() else {
        return RpcMessage::Malformed;
    };
    let method = obj.get("method").and_then(Value::as_str);
    let has_id = obj.get("id").is_some_and(|v| !v.is_null());

    if let Some(method) = method {
        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        return if has_id {
            RpcMessage::Request { id: obj["id"].clone(), method: method.to_string(), params }
        } else {
            RpcMessage::Notification { method: method.to_string(), params }
        };
    }

    if has_id && (obj.contains_key("result") || obj.contains_key("error")) {
        return RpcMessage::Response { id: obj["id"].clone() };
    }

    RpcMessage::Malformed
}

fn error_response(id: Value, error: &HostError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.kind.json_rpc_code(),
            "message": error.message,
            "data": error.data,
        },
    })
}

/// Public for the session-gating errors the bridge's HTTP layer raises
/// before a message ever reaches `route` (missing/unknown session id, a
/// second `initialize` on one session) — §4.5 "Session gating".
#[must_use]
pub fn custom_error_response(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

#[must_use]
pub fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Parses `servers/{serverId}/...` method tails used by the per-server
/// dispatch table (§4.5).
fn server_scoped(method: &str, suffix: &str) -> Option<(String, ())> {
    let rest = method.strip_prefix("servers/")?;
    let rest = rest.strip_suffix(suffix)?;
    let server_id = rest.strip_suffix('/')?;
    Some((server_id.to_string(), ()))
}

/// Dispatches one already-classified `Request` to the Host, returning the
/// JSON-RPC response object. Never panics on malformed `params` — invalid
/// shapes surface as `INVALID_PARAMS`.
pub async fn dispatch_request(host: &Host, id: Value, method: &str, params: Value) -> Value {
    let result = route(host, method, params).await;
    match result {
        Ok(value) => success_response(id, value),
        Err(error) => error_response(id, &error),
    }
}

async fn route(host: &Host, method: &str, params: Value) -> Result<Value, HostError> {
    match method {
        "tools/list" => Ok(json!(host.tools().await)),
        "resources/list" => Ok(json!(host.resources().await)),
        "resources/templates/list" => Ok(json!(host.resource_templates().await)),
        "prompts/list" => Ok(json!(host.prompts().await)),
        _ => {
            if let Some((server_id, ())) = server_scoped(method, "/resource/read") {
                let uri = params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid_params("missing 'uri'"))?;
                return host.read_resource(&server_id, uri, RequestOptions::default()).await;
            }
            if let Some((server_id, ())) = server_scoped(method, "/prompt/get") {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid_params("missing 'name'"))?;
                let arguments = params.get("arguments").cloned();
                return host
                    .get_prompt(&server_id, name, arguments, RequestOptions::default())
                    .await;
            }
            if let Some((server_id, name)) = tool_call_route(method) {
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                return host.call_tool(&server_id, &name, arguments, RequestOptions::default()).await;
            }
            Err(HostError::new(ErrorKind::MethodNotFound, format!("unknown method: {method}")))
        }
    }
}

/// `servers/{serverId}/tools/{name}/call`
fn tool_call_route(method: &str) -> Option<(String, String)> {
    let rest = method.strip_prefix("servers/")?;
    let rest = rest.strip_suffix("/call")?;
    let (server_id, rest) = rest.split_once("/tools/")?;
    Some((server_id.to_string(), rest.to_string()))
}

fn invalid_params(message: &str) -> HostError {
    HostError::new(ErrorKind::InvalidParams, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request_notification_response_and_malformed() {
        assert!(matches!(
            classify(&json!({"method": "tools/list", "id": 1})),
            RpcMessage::Request { .. }
        ));
        assert!(matches!(
            classify(&json!({"method": "notifications/initialized"})),
            RpcMessage::Notification { .. }
        ));
        assert!(matches!(classify(&json!({"id": 1, "result": {}})), RpcMessage::Response { .. }));
        assert!(matches!(classify(&json!({"foo": "bar"})), RpcMessage::Malformed));
    }

    #[test]
    fn tool_call_route_parses_server_and_tool_name() {
        let (server_id, name) = tool_call_route("servers/srv-1/tools/search/call").unwrap();
        assert_eq!(server_id, "srv-1");
        assert_eq!(name, "search");
        assert!(tool_call_route("tools/list").is_none());
    }

    #[test]
    fn server_scoped_parses_resource_and_prompt_routes() {
        let (server_id, ()) = server_scoped("servers/srv-1/resource/read", "/resource/read").unwrap();
        assert_eq!(server_id, "srv-1");
        assert!(server_scoped("servers/srv-1/tools/x/call", "/resource/read").is_none());
    }
}
