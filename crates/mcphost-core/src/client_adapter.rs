//! The Client Adapter contract (§2 "Client Adapter (external contract)").
//!
//! This is the seam the spec calls out as external: the concrete MCP wire
//! codec and per-transport framing are assumed to be provided by an MCP
//! protocol library. `McpClientAdapter` is that contract as the Host Core
//! consumes it; `crate::rmcp_adapter` is the one implementation, backed by
//! the `rmcp` crate (the same crate the `csa-mcp-hub` example in the
//! retrieval pack depends on for an identical purpose).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcphost_types::{HostError, Progress, ServerCapabilities};
use tokio_util::sync::CancellationToken;

/// Raw tool/resource/template/prompt listings, as reported by one server —
/// these get a `server_id` attached by the Host when folded into the
/// aggregated maps (§3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub annotations: Option<serde_json::Value>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResourceTemplateInfo {
    pub id: String,
    pub name: String,
    pub uri_template: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PromptInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
}

/// Per-call knobs (§4.1 `callTool`'s `options`).
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub on_progress: Option<Arc<dyn Fn(Progress) + Send + Sync>>,
    pub cancellation: Option<CancellationToken>,
    pub timeout: Option<Duration>,
    pub reset_timeout_on_progress: bool,
    pub max_total_timeout: Option<Duration>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("has_progress_cb", &self.on_progress.is_some())
            .field("cancellation", &self.cancellation.is_some())
            .field("timeout", &self.timeout)
            .field("reset_timeout_on_progress", &self.reset_timeout_on_progress)
            .field("max_total_timeout", &self.max_total_timeout)
            .finish()
    }
}

/// Notifications a connected server can push, forwarded from the adapter up
/// to the Host Core's connect-time handler registration (§4.1 step 3).
#[derive(Debug, Clone)]
pub enum ClientNotification {
    ToolsListChanged,
    ResourcesListChanged,
    PromptsListChanged,
    ResourceUpdated { uri: String },
    LoggingMessage { level: String, data: serde_json::Value },
    Closed { error: Option<HostError> },
}

/// Handles a server-initiated `sampling/createMessage` request. Implemented
/// by the Sampling Broker; the adapter calls this and nothing else for
/// inbound sampling traffic (§4.2).
#[async_trait]
pub trait CreateMessageHandler: Send + Sync {
    async fn handle_create_message(
        &self,
        server_id: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, HostError>;
}

/// The per-server MCP protocol endpoint the Host Core owns exclusively.
///
/// Implementations own one live connection. `connect`/`close` drive the
/// connection lifecycle; the listing/call methods proxy directly to the
/// underlying MCP session. All methods are cancel-safe: dropping the
/// returned future must not corrupt adapter state.
#[async_trait]
pub trait McpClientAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), HostError>;
    async fn close(&self) -> Result<(), HostError>;

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, HostError>;
    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, HostError>;
    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>, HostError>;
    async fn list_prompts(&self) -> Result<Vec<PromptInfo>, HostError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        options: RequestOptions,
    ) -> Result<serde_json::Value, HostError>;

    async fn read_resource(
        &self,
        uri: &str,
        options: RequestOptions,
    ) -> Result<serde_json::Value, HostError>;

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<serde_json::Value, HostError>;

    async fn subscribe_resource(&self, uri: &str) -> Result<(), HostError>;
    async fn unsubscribe_resource(&self, uri: &str) -> Result<(), HostError>;
    async fn send_roots_list_changed(&self) -> Result<(), HostError>;

    /// Snapshot of the server's declared capabilities, negotiated at connect time.
    fn server_capabilities(&self) -> ServerCapabilities;
}
