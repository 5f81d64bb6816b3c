//! Shared data model for the MCP host: server configuration, aggregated
//! capability snapshots, the error taxonomy, and host event payloads.
//!
//! This crate has no async runtime dependency and no I/O — everything here is
//! plain, cloneable, serde-friendly data, mirroring the foundation-layer split
//! the teacher codebase uses (`turbomcp-core`/`turbomcp-types`).

pub mod config;
pub mod capabilities;
pub mod aggregated;
pub mod error;
pub mod events;

pub use aggregated::{
    AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool, Progress,
    Root,
};
pub use capabilities::ServerCapabilities;
pub use config::{HostCapabilities, HostConfig, HostInfo, ServerConfig, TransportConfig};
pub use error::{AggregateHostError, ErrorKind, HostError};
pub use events::HostEvent;

/// Maximum number of buffered SSE events retained per session (§3 invariant).
pub const SESSION_EVENT_BUFFER_CAP: usize = 100;

/// Default per-sampling-request deadline in seconds (§4.2).
pub const DEFAULT_SAMPLING_TIMEOUT_SECS: u64 = 300;

/// Default idle TTL for an HTTP-bridge session, in seconds (§6).
pub const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 3600;
