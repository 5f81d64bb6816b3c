//! Error taxonomy (§7), grounded on `turbomcp-core::error::McpError`'s shape:
//! one struct carrying a classification, a message, and an optional boxed
//! cause, rather than a sprawling enum-per-error-site.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error classification. Protocol kinds are preserved verbatim from MCP;
/// host kinds are introduced by this system for errors the host itself
/// raises rather than propagates from a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Protocol errors, preserved from MCP/JSON-RPC.
    MethodNotFound,
    InvalidParams,
    InvalidRequest,
    InternalError,
    RequestTimeout,

    // Host errors.
    RootsUpdateFailed,
    ServerNotFound,
    InvalidTransport,
    ConnectionFailed,
    SubscriptionFailed,
    ToolCallFailed,
    ResourceReadFailed,
    PromptGetFailed,
}

impl ErrorKind {
    /// JSON-RPC numeric code for this kind, used by the HTTP bridge (§7).
    #[must_use]
    pub fn json_rpc_code(self) -> i64 {
        match self {
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InvalidRequest => -32600,
            Self::InternalError => -32603,
            Self::RequestTimeout => -32001,
            Self::RootsUpdateFailed => -32010,
            Self::ServerNotFound => -32011,
            Self::InvalidTransport => -32012,
            Self::ConnectionFailed => -32013,
            Self::SubscriptionFailed => -32014,
            Self::ToolCallFailed => -32015,
            Self::ResourceReadFailed => -32016,
            Self::PromptGetFailed => -32017,
        }
    }

    /// HTTP status mapping per §7 "User-visible mapping (HTTP)".
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::MethodNotFound | Self::InvalidParams => 400,
            _ => 500,
        }
    }

    /// Reverses `json_rpc_code`: the protocol kind that wire code belongs
    /// to, if it's one of the ones MCP/JSON-RPC defines. `None` for
    /// host-specific or server-invented codes.
    #[must_use]
    pub fn from_json_rpc_code(code: i64) -> Option<Self> {
        match code {
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParams),
            -32600 => Some(Self::InvalidRequest),
            -32603 => Some(Self::InternalError),
            -32001 => Some(Self::RequestTimeout),
            _ => None,
        }
    }
}

/// A single host-level error: classification, message, optional server
/// attribution, optional cause chain. Every instance carries `code`,
/// `message`, optional `server_id`, optional `cause` per §7.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[error("{kind:?}: {message}{}", server_id.as_deref().map(|s| format!(" (server={s})")).unwrap_or_default())]
pub struct HostError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Boxed so `HostError` stays small even though `cause` can itself be a
    /// whole `HostError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<HostError>>,
}

impl HostError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            server_id: None,
            data: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: HostError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn server_not_found(server_id: impl Into<String>) -> Self {
        let server_id = server_id.into();
        Self::new(
            ErrorKind::ServerNotFound,
            format!("server not found or not connected: {server_id}"),
        )
        .with_server(server_id)
    }

    /// Wraps any non-protocol error into `InternalError`, preserving the
    /// original message as `cause` per the §7 propagation policy.
    #[must_use]
    pub fn wrap(kind: ErrorKind, message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::new(kind, message).with_cause(Self::new(ErrorKind::InternalError, cause.to_string()))
    }

    /// Builds a host error from a genuine protocol error a server returned,
    /// per the §7 policy that such errors are propagated verbatim rather
    /// than wrapped: the server's message passes through unchanged, and its
    /// code round-trips back onto the wire via `kind.json_rpc_code()` when
    /// it's one of MCP/JSON-RPC's own codes. A server-invented code outside
    /// that set still becomes `InternalError` on the wire, but its original
    /// value is kept in `data` rather than silently dropped.
    #[must_use]
    pub fn protocol(code: i64, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        let message = message.into();
        match ErrorKind::from_json_rpc_code(code) {
            Some(kind) => {
                let err = Self::new(kind, message);
                match data {
                    Some(data) => err.with_data(data),
                    None => err,
                }
            }
            None => {
                let mut payload = serde_json::json!({ "originalCode": code });
                if let Some(data) = data {
                    payload["data"] = data;
                }
                Self::new(ErrorKind::InternalError, message).with_data(payload)
            }
        }
    }
}

/// Carries a list of host errors for operations that can fail per-server
/// (notably `setRoots`) (§7 "Aggregate error").
#[derive(Debug, Error, Clone, Serialize, Deserialize, Default)]
#[error("{} server(s) failed", errors.len())]
pub struct AggregateHostError {
    pub errors: Vec<HostError>,
}

impl AggregateHostError {
    #[must_use]
    pub fn new(errors: Vec<HostError>) -> Self {
        Self { errors }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` if empty, `Err(self)` otherwise — the common call shape for
    /// fan-out operations like `setRoots`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}
