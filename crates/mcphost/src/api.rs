//! Public Host API (spec.md §4.7): the facade an embedding application
//! programs against instead of reaching into `mcphost_core::Host` directly.
//!
//! `HostHandle` is deliberately thin — it adds input validation at the one
//! spot the spec calls out (`setRoots`) and a convenience adapter for
//! installing a simplified sampling handler, and otherwise forwards straight
//! through to the `Host` it wraps.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use mcphost_core::{
    AdapterFactory, DirectSamplingHandler, Host, RequestOptions, ServerSummary, SimplifiedSamplingResult,
};
use mcphost_types::{
    AggregateHostError, AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool,
    ErrorKind, HostCapabilities, HostConfig, HostError, HostInfo, Root,
};
use serde_json::Value;

/// Thin `Arc<Host>` wrapper exposed to embedders.
#[derive(Clone)]
pub struct HostHandle {
    host: Arc<Host>,
}

impl HostHandle {
    /// Builds a `Host` from `config` and wraps it. Does not connect to any
    /// server until `start()` is called.
    #[must_use]
    pub fn from_config(config: &HostConfig, sampling: Arc<mcphost_core::SamplingBroker>) -> Self {
        let host = Host::new(
            config.host_info(),
            config.host_capabilities.clone(),
            config.servers.clone(),
            sampling,
        );
        Self { host }
    }

    /// Builds a `Host` with a caller-supplied `AdapterFactory`, for tests
    /// that substitute a fake adapter instead of the real `rmcp` transport.
    #[must_use]
    pub fn from_config_with_adapter_factory(
        config: &HostConfig,
        sampling: Arc<mcphost_core::SamplingBroker>,
        adapter_factory: AdapterFactory,
    ) -> Self {
        let host = Host::with_adapter_factory(
            config.host_info(),
            config.host_capabilities.clone(),
            config.servers.clone(),
            sampling,
            adapter_factory,
        );
        Self { host }
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<Host> {
        &self.host
    }

    pub async fn start(&self) {
        self.host.start().await;
    }

    pub async fn stop(&self) {
        self.host.stop().await;
    }

    #[must_use]
    pub fn host_info(&self) -> &HostInfo {
        self.host.host_info()
    }

    #[must_use]
    pub fn host_capabilities(&self) -> &HostCapabilities {
        self.host.host_capabilities()
    }

    #[must_use]
    pub fn connected_server_ids(&self) -> Vec<String> {
        self.host.connected_server_ids()
    }

    #[must_use]
    pub fn server_summaries(&self) -> Vec<ServerSummary> {
        self.host.server_summaries()
    }

    pub async fn tools(&self) -> Vec<AggregatedTool> {
        self.host.tools().await
    }

    pub async fn resources(&self) -> Vec<AggregatedResource> {
        self.host.resources().await
    }

    pub async fn resource_templates(&self) -> Vec<AggregatedResourceTemplate> {
        self.host.resource_templates().await
    }

    pub async fn prompts(&self) -> Vec<AggregatedPrompt> {
        self.host.prompts().await
    }

    pub async fn call_tool(
        &self,
        server_id: &str,
        name: &str,
        arguments: Value,
        options: RequestOptions,
    ) -> Result<Value, HostError> {
        self.host.call_tool(server_id, name, arguments, options).await
    }

    pub async fn read_resource(
        &self,
        server_id: &str,
        uri: &str,
        options: RequestOptions,
    ) -> Result<Value, HostError> {
        self.host.read_resource(server_id, uri, options).await
    }

    pub async fn get_prompt(
        &self,
        server_id: &str,
        name: &str,
        arguments: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, HostError> {
        self.host.get_prompt(server_id, name, arguments, options).await
    }

    #[must_use]
    pub fn current_roots(&self) -> Vec<Root> {
        self.host.current_roots()
    }

    /// Validates every root has a non-empty `uri` and `name` before
    /// delegating to the Host Core (§4.7's one documented validation rule).
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<(), AggregateHostError> {
        for root in &roots {
            if root.uri.is_empty() || root.name.is_empty() {
                return Err(AggregateHostError {
                    errors: vec![HostError::new(
                        ErrorKind::InvalidParams,
                        "each root requires a non-empty 'uri' and 'name'",
                    )],
                });
            }
        }
        self.host.set_roots(roots).await
    }

    /// Installs a simplified, closure-based sampling handler, adapting it
    /// into the full `DirectSamplingHandler` trait the broker expects.
    pub async fn set_sampling_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SimplifiedSamplingResult, HostError>> + Send + 'static,
    {
        self.host
            .sampling_broker()
            .set_direct_handler(Arc::new(ClosureSamplingHandler { handler }))
            .await;
    }
}

struct ClosureSamplingHandler<F> {
    handler: F,
}

#[async_trait]
impl<F, Fut> DirectSamplingHandler for ClosureSamplingHandler<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SimplifiedSamplingResult, HostError>> + Send + 'static,
{
    async fn handle(&self, server_id: &str, params: Value) -> Result<SimplifiedSamplingResult, HostError> {
        (self.handler)(server_id.to_string(), params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcphost_core::SamplingBroker;

    #[tokio::test]
    async fn set_roots_rejects_blank_uri_or_name() {
        let handle = HostHandle::from_config(&HostConfig::default(), Arc::new(SamplingBroker::new()));
        let result = handle
            .set_roots(vec![Root { uri: String::new(), name: "x".to_string() }])
            .await;
        assert!(result.is_err());
    }
}
