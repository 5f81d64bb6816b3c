//! Embeddable HTTP/SSE/WebSocket front end for a `mcphost_core::Host`.
//!
//! `bridge::build_router` is the entry point: it returns an `axum::Router`
//! an embedder mounts into its own server (or serves standalone), plus the
//! `JoinHandle` of the background event-fanout task.

pub mod auth;
pub mod bridge;
pub mod fanout;
pub mod rpc;
pub mod session;
pub mod sinks;
pub mod ws;

pub use auth::AuthConfig;
pub use bridge::{build_router, BridgeConfig, BridgeState};
pub use session::{SessionManager, SessionState};
pub use ws::WsHub;
