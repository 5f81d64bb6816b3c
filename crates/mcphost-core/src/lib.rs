//! Multi-connection MCP host engine.
//!
//! Brings together connection lifecycle (`host`), server-suggestion
//! (`resolver`), event fan-out (`broadcaster`), and the sampling broker
//! (`sampling`) behind the `McpClientAdapter` contract (`client_adapter`),
//! implemented for real traffic by `rmcp_adapter`.

pub mod broadcaster;
pub mod client_adapter;
pub mod host;
pub mod resolver;
pub mod rmcp_adapter;
pub mod sampling;
mod ws_bridge;

pub use broadcaster::EventBroadcaster;
pub use client_adapter::{
    ClientNotification, CreateMessageHandler, McpClientAdapter, PromptInfo, RequestOptions,
    ResourceInfo, ResourceTemplateInfo, ToolInfo,
};
pub use host::{AdapterFactory, Host, ServerSummary};
pub use resolver::{MatchType, Suggestion};
pub use rmcp_adapter::RmcpClientAdapter;
pub use sampling::{
    DirectSamplingHandler, SamplingBroker, SamplingRequestMessage, SamplingSink,
    SimplifiedSamplingResult,
};
