//! `ServerConfig` / `HostConfig` — the host's construction-time input (§3).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One configured MCP server, as supplied by the caller.
///
/// Immutable once constructed. The host indexes a set of these by `id`;
/// duplicates are rejected at construction (only the first is retained, a
/// warning is logged — see `mcphost_core::host::Host::new`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

/// Transport-specific connection parameters.
///
/// `Sse` and `StreamableHttp` share the same wire shape (a URL plus optional
/// headers) but are kept as distinct variants because a server's declared
/// transport is part of its identity in diagnostics and in the
/// `INVALID_TRANSPORT` error path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "kebab-case")]
pub enum TransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    #[serde(rename = "websocket")]
    WebSocket {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl TransportConfig {
    /// Short label used in logs and the `/servers` read-only view.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Sse { .. } => "sse",
            Self::WebSocket { .. } => "websocket",
            Self::StreamableHttp { .. } => "streamable-http",
        }
    }
}

/// `{name, version}` identity the host announces to every server it connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    pub version: String,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            name: "mcphost".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Capabilities the host declares during MCP initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsHostCapability>,
    #[serde(flatten)]
    pub experimental: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootsHostCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Top-level configuration: what the host announces plus the servers to dial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub host_info: Option<HostInfo>,
    #[serde(default)]
    pub host_capabilities: HostCapabilities,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl HostConfig {
    /// `host_info`, defaulted if the caller omitted it.
    #[must_use]
    pub fn host_info(&self) -> HostInfo {
        self.host_info.clone().unwrap_or_default()
    }
}
