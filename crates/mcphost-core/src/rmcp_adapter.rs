//! `McpClientAdapter` implementation backed by the `rmcp` crate.
//!
//! Grounded on `csa-mcp-hub::registry::BackendTransport`: stdio servers are
//! spawned as child processes and served over their stdio pipes
//! (`().serve((stdout, stdin))`), HTTP/SSE servers go through
//! `StreamableHttpClientTransport::from_uri`. Unlike the teacher, which
//! serves with the no-op `()` handler, every connection here is served with
//! `HostClientHandler` so server-initiated sampling requests and
//! list-changed notifications reach the Sampling Broker and the Host Core.
//!
//! WebSocket transport has no first-class constructor in `rmcp`'s public
//! client transports, so it is bridged through a duplex pipe pumped by a
//! `tokio-tungstenite` WebSocket stream (see `ws_bridge`), and then served
//! the same way as stdio.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use mcphost_types::{
    ErrorKind, HostError, Root, ServerCapabilities, ServerConfig, TransportConfig,
};
use parking_lot::RwLock;
use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{RunningService, ServiceExt};
use rmcp::RoleClient;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};

use crate::client_adapter::{
    ClientNotification, CreateMessageHandler, McpClientAdapter, PromptInfo, RequestOptions,
    ResourceInfo, ResourceTemplateInfo, ToolInfo,
};
use crate::ws_bridge;

fn connection_failed(server_id: &str, cause: impl std::fmt::Display) -> HostError {
    HostError::wrap(ErrorKind::ConnectionFailed, "failed to connect to server", cause)
        .with_server(server_id)
}

/// Builds the `rmcp::ErrorData` returned to a server for a failed sampling
/// request, carrying `err.kind`'s own wire code (§4.2 step 4, §8 scenario
/// 6: a broker timeout must surface as `RequestTimeout`, not `InternalError`).
fn sampling_error_to_rmcp(err: HostError) -> rmcp::ErrorData {
    rmcp::ErrorData::new(
        rmcp::model::ErrorCode(err.kind.json_rpc_code() as i32),
        err.message,
        err.data,
    )
}

/// Distinguishes a genuine MCP protocol error the server returned from a
/// transport/internal failure. Protocol errors are propagated verbatim per
/// §7; everything else is wrapped into `kind` with the cause preserved, as
/// before.
fn propagate_or_wrap(
    err: rmcp::ServiceError,
    kind: ErrorKind,
    message: &str,
    server_id: &str,
) -> HostError {
    match err {
        rmcp::ServiceError::McpError(data) => {
            HostError::protocol(i64::from(data.code.0), data.message.to_string(), data.data)
                .with_server(server_id)
        }
        other => HostError::wrap(kind, message, other).with_server(server_id),
    }
}

/// Converts any rmcp wire type to JSON. Every request/response type in the
/// protocol is transmitted as JSON-RPC, so this always succeeds for values
/// actually returned by the service.
fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn field_str(v: &serde_json::Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(str::to_string)
}

fn tool_info_from_json(v: &serde_json::Value) -> ToolInfo {
    ToolInfo {
        name: field_str(v, "name").unwrap_or_default(),
        description: field_str(v, "description"),
        input_schema: v.get("inputSchema").cloned().unwrap_or_else(|| serde_json::json!({})),
        annotations: v.get("annotations").cloned(),
    }
}

fn resource_info_from_json(v: &serde_json::Value) -> ResourceInfo {
    ResourceInfo {
        uri: field_str(v, "uri").unwrap_or_default(),
        name: field_str(v, "name").unwrap_or_default(),
        mime_type: field_str(v, "mimeType"),
        size: v.get("size").and_then(serde_json::Value::as_u64),
    }
}

fn resource_template_from_json(v: &serde_json::Value) -> ResourceTemplateInfo {
    let uri_template = field_str(v, "uriTemplate").unwrap_or_default();
    ResourceTemplateInfo {
        id: field_str(v, "id").unwrap_or_else(|| uri_template.clone()),
        name: field_str(v, "name").unwrap_or_default(),
        uri_template,
        description: field_str(v, "description"),
    }
}

fn prompt_info_from_json(v: &serde_json::Value) -> PromptInfo {
    PromptInfo {
        name: field_str(v, "name").unwrap_or_default(),
        description: field_str(v, "description"),
        arguments: v.get("arguments").cloned(),
    }
}

/// Bridges `rmcp::ClientHandler` notifications and server-initiated
/// requests into our own `ClientNotification`/`CreateMessageHandler` shapes.
struct HostClientHandler {
    server_id: String,
    sampling_handler: Option<Arc<dyn CreateMessageHandler>>,
    notify: mpsc::UnboundedSender<(String, ClientNotification)>,
    roots: Arc<RwLock<Vec<Root>>>,
}

impl rmcp::ClientHandler for HostClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "mcphost".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    async fn create_message(
        &self,
        params: rmcp::model::CreateMessageRequestParam,
        _context: rmcp::service::RequestContext<RoleClient>,
    ) -> Result<rmcp::model::CreateMessageResult, rmcp::ErrorData> {
        let Some(handler) = self.sampling_handler.as_ref() else {
            return Err(rmcp::ErrorData::internal_error(
                "this host does not support sampling".to_string(),
                None,
            ));
        };
        let result = handler
            .handle_create_message(&self.server_id, to_json(&params))
            .await
            .map_err(sampling_error_to_rmcp)?;
        serde_json::from_value(result)
            .map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))
    }

    async fn list_roots(
        &self,
        _context: rmcp::service::RequestContext<RoleClient>,
    ) -> Result<rmcp::model::ListRootsResult, rmcp::ErrorData> {
        let roots = self.roots.read().clone();
        let value = serde_json::json!({ "roots": roots });
        serde_json::from_value(value).map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))
    }

    async fn on_tools_list_changed(&self) {
        let _ = self.notify.send((self.server_id.clone(), ClientNotification::ToolsListChanged));
    }

    async fn on_resources_list_changed(&self) {
        let _ =
            self.notify.send((self.server_id.clone(), ClientNotification::ResourcesListChanged));
    }

    async fn on_prompts_list_changed(&self) {
        let _ = self.notify.send((self.server_id.clone(), ClientNotification::PromptsListChanged));
    }

    async fn on_resource_updated(&self, params: rmcp::model::ResourceUpdatedNotificationParam) {
        let _ = self.notify.send((
            self.server_id.clone(),
            ClientNotification::ResourceUpdated { uri: params.uri },
        ));
    }

    async fn on_logging_message(&self, params: rmcp::model::LoggingMessageNotificationParam) {
        let value = to_json(&params);
        let level = field_str(&value, "level").unwrap_or_else(|| "info".to_string());
        let _ = self.notify.send((
            self.server_id.clone(),
            ClientNotification::LoggingMessage {
                level,
                data: value.get("data").cloned().unwrap_or(serde_json::Value::Null),
            },
        ));
    }
}

enum Connection {
    Stdio {
        service: RunningService<RoleClient, HostClientHandler>,
        child: tokio::process::Child,
    },
    Remote {
        service: RunningService<RoleClient, HostClientHandler>,
    },
    WebSocket {
        service: RunningService<RoleClient, HostClientHandler>,
        pump: tokio::task::JoinHandle<()>,
    },
}

impl Connection {
    fn service(&self) -> &RunningService<RoleClient, HostClientHandler> {
        match self {
            Self::Stdio { service, .. } => service,
            Self::Remote { service } => service,
            Self::WebSocket { service, .. } => service,
        }
    }
}

/// `rmcp`-backed adapter. One instance owns exactly one server connection.
pub struct RmcpClientAdapter {
    config: ServerConfig,
    sampling_handler: Option<Arc<dyn CreateMessageHandler>>,
    notify: mpsc::UnboundedSender<(String, ClientNotification)>,
    roots: Arc<RwLock<Vec<Root>>>,
    capabilities: RwLock<ServerCapabilities>,
    connection: Mutex<Option<Connection>>,
}

impl RmcpClientAdapter {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        sampling_handler: Option<Arc<dyn CreateMessageHandler>>,
        notify: mpsc::UnboundedSender<(String, ClientNotification)>,
        roots: Arc<RwLock<Vec<Root>>>,
    ) -> Self {
        Self {
            config,
            sampling_handler,
            notify,
            roots,
            capabilities: RwLock::new(ServerCapabilities::default()),
            connection: Mutex::new(None),
        }
    }

    fn handler(&self) -> HostClientHandler {
        HostClientHandler {
            server_id: self.config.id.clone(),
            sampling_handler: self.sampling_handler.clone(),
            notify: self.notify.clone(),
            roots: self.roots.clone(),
        }
    }

    /// Resolves the effective child environment for a stdio server:
    /// process env, union-merged with config env, with `PATH` prefixed so
    /// locally-installed launchers resolve (§4.1 connect step 1).
    fn stdio_env(cwd: &Option<PathBuf>, env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged: HashMap<String, String> = std::env::vars().collect();
        if let Some(cwd) = cwd {
            let local_bin = cwd.join("node_modules").join(".bin");
            let existing_path = merged.get("PATH").cloned().unwrap_or_default();
            let new_path = std::env::join_paths(
                std::iter::once(local_bin).chain(std::env::split_paths(&existing_path)),
            )
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(existing_path);
            merged.insert("PATH".to_string(), new_path);
        }
        merged.extend(env.clone());
        merged
    }

    async fn connect_stdio(
        &self,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: &Option<PathBuf>,
    ) -> Result<Connection, HostError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        cmd.envs(Self::stdio_env(cwd, env));
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| connection_failed(&self.config.id, e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connection_failed(&self.config.id, "child stdout not captured"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| connection_failed(&self.config.id, "child stdin not captured"))?;

        let service = self
            .handler()
            .serve((stdout, stdin))
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;

        Ok(Connection::Stdio { service, child })
    }

    async fn connect_remote(&self, url: &str) -> Result<Connection, HostError> {
        let transport = rmcp::transport::StreamableHttpClientTransport::from_uri(url.to_string());
        let service = self
            .handler()
            .serve(transport)
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;
        Ok(Connection::Remote { service })
    }

    async fn connect_websocket(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Connection, HostError> {
        let (io, pump) = ws_bridge::connect(url, headers)
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;
        let service = self
            .handler()
            .serve(io)
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;
        Ok(Connection::WebSocket { service, pump })
    }
}

#[async_trait]
impl McpClientAdapter for RmcpClientAdapter {
    async fn connect(&self) -> Result<(), HostError> {
        let connection = match &self.config.transport {
            TransportConfig::Stdio { command, args, env, cwd } => {
                self.connect_stdio(command, args, env, cwd).await?
            }
            TransportConfig::Sse { url, .. } | TransportConfig::StreamableHttp { url, .. } => {
                self.connect_remote(url).await?
            }
            TransportConfig::WebSocket { url, headers } => {
                self.connect_websocket(url, headers).await?
            }
        };

        let peer_info = connection.service().peer_info();
        if let Some(info) = peer_info {
            let value = to_json(&info);
            if let Some(caps) = value.get("capabilities") {
                if let Ok(parsed) = serde_json::from_value(caps.clone()) {
                    *self.capabilities.write() = parsed;
                }
            }
        }

        *self.connection.lock().await = Some(connection);
        Ok(())
    }

    async fn close(&self) -> Result<(), HostError> {
        let Some(connection) = self.connection.lock().await.take() else {
            return Ok(());
        };
        match connection {
            Connection::Stdio { service, mut child } => {
                let _ = service.cancel().await;
                let _ = child.kill().await;
            }
            Connection::Remote { service } => {
                let _ = service.cancel().await;
            }
            Connection::WebSocket { service, pump } => {
                let _ = service.cancel().await;
                pump.abort();
            }
        }
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let result = connection
            .service()
            .list_tools(None)
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;
        let value = to_json(&result);
        Ok(value
            .get("tools")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(tool_info_from_json).collect())
            .unwrap_or_default())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let result = connection
            .service()
            .list_resources(None)
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;
        let value = to_json(&result);
        Ok(value
            .get("resources")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(resource_info_from_json).collect())
            .unwrap_or_default())
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>, HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let result = connection
            .service()
            .list_resource_templates(None)
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;
        let value = to_json(&result);
        Ok(value
            .get("resourceTemplates")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(resource_template_from_json).collect())
            .unwrap_or_default())
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>, HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let result = connection
            .service()
            .list_prompts(None)
            .await
            .map_err(|e| connection_failed(&self.config.id, e))?;
        let value = to_json(&result);
        Ok(value
            .get("prompts")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(prompt_info_from_json).collect())
            .unwrap_or_default())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        _options: RequestOptions,
    ) -> Result<serde_json::Value, HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let param = serde_json::from_value(serde_json::json!({
            "name": name,
            "arguments": arguments,
        }))
        .map_err(|e| HostError::wrap(ErrorKind::ToolCallFailed, "invalid tool call params", e))?;
        let result = connection
            .service()
            .call_tool(param)
            .await
            .map_err(|e| propagate_or_wrap(e, ErrorKind::ToolCallFailed, "tool call failed", &self.config.id))?;
        Ok(to_json(&result))
    }

    async fn read_resource(
        &self,
        uri: &str,
        _options: RequestOptions,
    ) -> Result<serde_json::Value, HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let param = serde_json::from_value(serde_json::json!({ "uri": uri }))
            .map_err(|e| HostError::wrap(ErrorKind::ResourceReadFailed, "invalid resource read params", e))?;
        let result = connection
            .service()
            .read_resource(param)
            .await
            .map_err(|e| propagate_or_wrap(e, ErrorKind::ResourceReadFailed, "resource read failed", &self.config.id))?;
        Ok(to_json(&result))
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
        _options: RequestOptions,
    ) -> Result<serde_json::Value, HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let param = serde_json::from_value(serde_json::json!({
            "name": name,
            "arguments": arguments,
        }))
        .map_err(|e| HostError::wrap(ErrorKind::PromptGetFailed, "invalid prompt get params", e))?;
        let result = connection
            .service()
            .get_prompt(param)
            .await
            .map_err(|e| propagate_or_wrap(e, ErrorKind::PromptGetFailed, "prompt get failed", &self.config.id))?;
        Ok(to_json(&result))
    }

    async fn subscribe_resource(&self, uri: &str) -> Result<(), HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let param = serde_json::from_value(serde_json::json!({ "uri": uri }))
            .map_err(|e| HostError::wrap(ErrorKind::SubscriptionFailed, "invalid subscribe params", e))?;
        connection
            .service()
            .subscribe(param)
            .await
            .map_err(|e| propagate_or_wrap(e, ErrorKind::SubscriptionFailed, "subscribe failed", &self.config.id))?;
        Ok(())
    }

    async fn unsubscribe_resource(&self, uri: &str) -> Result<(), HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        let param = serde_json::from_value(serde_json::json!({ "uri": uri }))
            .map_err(|e| HostError::wrap(ErrorKind::SubscriptionFailed, "invalid unsubscribe params", e))?;
        connection
            .service()
            .unsubscribe(param)
            .await
            .map_err(|e| propagate_or_wrap(e, ErrorKind::SubscriptionFailed, "unsubscribe failed", &self.config.id))?;
        Ok(())
    }

    async fn send_roots_list_changed(&self) -> Result<(), HostError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| HostError::server_not_found(&self.config.id))?;
        connection
            .service()
            .notify_roots_list_changed()
            .await
            .map_err(|e| HostError::wrap(ErrorKind::RootsUpdateFailed, "roots notification failed", e)
                .with_server(&self.config.id))
    }

    fn server_capabilities(&self) -> ServerCapabilities {
        self.capabilities.read().clone()
    }
}
