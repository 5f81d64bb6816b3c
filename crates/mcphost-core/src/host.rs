//! Host Core (§4.1): owns every live connection, drives connect/disconnect,
//! maintains the aggregated capability snapshot, and routes invocations.
//!
//! Grounded on the teacher's `turbomcp-client::client::manager::Manager` for
//! the overall shape (a map of named connections plus one shared broadcaster
//! for lifecycle/log events), generalized from the teacher's failover
//! semantics to this system's aggregate-everything, namespace-by-server-id
//! model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mcphost_types::{
    AggregateHostError, AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate,
    AggregatedTool, ErrorKind, HostCapabilities, HostError, HostEvent, HostInfo, Root,
    ServerConfig,
};
use tokio::sync::{mpsc, RwLock};

use crate::broadcaster::EventBroadcaster;
use crate::client_adapter::{ClientNotification, CreateMessageHandler, McpClientAdapter, RequestOptions};
use crate::resolver::{self, Suggestion};
use crate::rmcp_adapter::RmcpClientAdapter;
use crate::sampling::SamplingBroker;

/// Builds the per-server adapter. Parameterized so tests can substitute a
/// fake adapter without touching any real transport.
pub type AdapterFactory = Arc<
    dyn Fn(
            ServerConfig,
            Option<Arc<dyn CreateMessageHandler>>,
            mpsc::UnboundedSender<(String, ClientNotification)>,
            Arc<parking_lot::RwLock<Vec<Root>>>,
        ) -> Arc<dyn McpClientAdapter>
        + Send
        + Sync,
>;

fn default_adapter_factory() -> AdapterFactory {
    Arc::new(|config, sampling_handler, notify, roots| {
        Arc::new(RmcpClientAdapter::new(config, sampling_handler, notify, roots))
            as Arc<dyn McpClientAdapter>
    })
}

#[derive(Default)]
struct AggregatedState {
    tools: Vec<AggregatedTool>,
    resources: Vec<AggregatedResource>,
    resource_templates: Vec<AggregatedResourceTemplate>,
    prompts: Vec<AggregatedPrompt>,
}

impl AggregatedState {
    fn remove_server(&mut self, server_id: &str) {
        self.tools.retain(|t| t.server_id != server_id);
        self.resources.retain(|r| r.server_id != server_id);
        self.resource_templates.retain(|t| t.server_id != server_id);
        self.prompts.retain(|p| p.server_id != server_id);
    }
}

/// Owns every configured server's connection and the aggregated snapshot.
pub struct Host {
    host_info: HostInfo,
    host_capabilities: HostCapabilities,
    configs: Vec<ServerConfig>,
    adapter_factory: AdapterFactory,

    clients: DashMap<String, Arc<dyn McpClientAdapter>>,
    aggregated: RwLock<AggregatedState>,
    current_roots: Arc<parking_lot::RwLock<Vec<Root>>>,

    events: EventBroadcaster,
    sampling: Arc<SamplingBroker>,

    notify_tx: mpsc::UnboundedSender<(String, ClientNotification)>,
    notify_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<(String, ClientNotification)>>>,
    notify_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,

    started: AtomicBool,
}

impl Host {
    #[must_use]
    pub fn new(
        host_info: HostInfo,
        host_capabilities: HostCapabilities,
        servers: Vec<ServerConfig>,
        sampling: Arc<SamplingBroker>,
    ) -> Arc<Self> {
        Self::with_adapter_factory(
            host_info,
            host_capabilities,
            servers,
            sampling,
            default_adapter_factory(),
        )
    }

    #[must_use]
    pub fn with_adapter_factory(
        host_info: HostInfo,
        host_capabilities: HostCapabilities,
        servers: Vec<ServerConfig>,
        sampling: Arc<SamplingBroker>,
        adapter_factory: AdapterFactory,
    ) -> Arc<Self> {
        let configs = dedup_server_configs(servers);
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let events = EventBroadcaster::default();
        sampling.set_events(events.clone());
        Arc::new(Self {
            host_info,
            host_capabilities,
            configs,
            adapter_factory,
            clients: DashMap::new(),
            aggregated: RwLock::new(AggregatedState::default()),
            current_roots: Arc::new(parking_lot::RwLock::new(Vec::new())),
            events,
            sampling,
            notify_tx,
            notify_rx: tokio::sync::Mutex::new(Some(notify_rx)),
            notify_task: tokio::sync::Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    #[must_use]
    pub fn sampling_broker(&self) -> &Arc<SamplingBroker> {
        &self.sampling
    }

    /// Idempotent: connects every configured server in parallel and waits
    /// for each attempt to settle, then emits `capabilitiesUpdated` once.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(rx) = self.notify_rx.lock().await.take() {
            let this = self.clone();
            let handle = tokio::spawn(this.drain_notifications(rx));
            *self.notify_task.lock().await = Some(handle);
        }

        let attempts = self.configs.iter().cloned().map(|config| {
            let this = self.clone();
            async move { this.connect_one(config).await }
        });
        futures::future::join_all(attempts).await;

        self.events.emit(HostEvent::CapabilitiesUpdated);
    }

    /// Idempotent: closes every live client, clears aggregated state.
    pub async fn stop(self: &Arc<Self>) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }

        let server_ids: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        for server_id in server_ids {
            if let Some((_, client)) = self.clients.remove(&server_id) {
                if let Err(err) = client.close().await {
                    tracing::warn!(server_id, error = %err, "error closing client during stop");
                }
            }
        }

        *self.aggregated.write().await = AggregatedState::default();
        self.events.emit(HostEvent::CapabilitiesUpdated);

        if let Some(task) = self.notify_task.lock().await.take() {
            task.abort();
        }
    }

    async fn connect_one(self: &Arc<Self>, config: ServerConfig) {
        let server_id = config.id.clone();
        let sampling_handler: Option<Arc<dyn CreateMessageHandler>> = self
            .host_capabilities
            .sampling
            .as_ref()
            .map(|_| self.sampling.clone() as Arc<dyn CreateMessageHandler>);

        let adapter = (self.adapter_factory)(
            config,
            sampling_handler,
            self.notify_tx.clone(),
            self.current_roots.clone(),
        );

        if let Err(error) = adapter.connect().await {
            self.events.emit(HostEvent::ServerError { server_id: server_id.clone(), error });
            return;
        }

        self.clients.insert(server_id.clone(), adapter.clone());
        self.events.emit(HostEvent::ServerConnected { server_id: server_id.clone() });
        self.refresh_capabilities(&server_id).await;

        let roots_snapshot = self.current_roots.read().clone();
        if !roots_snapshot.is_empty() && adapter.server_capabilities().wants_roots_list_changed() {
            if let Err(err) = adapter.send_roots_list_changed().await {
                tracing::warn!(server_id, error = %err, "initial roots notification failed");
            }
        }
    }

    /// §4.1 `refreshCapabilities`: drop the server's aggregated entries, then
    /// re-list whatever capability bits it declares, concurrently.
    pub async fn refresh_capabilities(&self, server_id: &str) {
        self.aggregated.write().await.remove_server(server_id);

        let Some(client) = self.clients.get(server_id).map(|e| e.clone()) else {
            return;
        };
        let capabilities = client.server_capabilities();

        let (tools_res, resources_res, templates_res, prompts_res) = tokio::join!(
            async {
                if capabilities.supports_tools() { Some(client.list_tools().await) } else { None }
            },
            async {
                if capabilities.supports_resources() {
                    Some(client.list_resources().await)
                } else {
                    None
                }
            },
            async {
                if capabilities.supports_resource_templates() {
                    Some(client.list_resource_templates().await)
                } else {
                    None
                }
            },
            async {
                if capabilities.supports_prompts() {
                    Some(client.list_prompts().await)
                } else {
                    None
                }
            },
        );

        let mut state = self.aggregated.write().await;
        if let Some(result) = tools_res {
            match result {
                Ok(items) => state.tools.extend(items.into_iter().map(|t| AggregatedTool {
                    server_id: server_id.to_string(),
                    name: t.name,
                    description: t.description,
                    input_schema: t.input_schema,
                    annotations: t.annotations,
                })),
                Err(err) => tracing::warn!(server_id, error = %err, "listTools failed"),
            }
        }
        if let Some(result) = resources_res {
            match result {
                Ok(items) => {
                    state.resources.extend(items.into_iter().map(|r| AggregatedResource {
                        server_id: server_id.to_string(),
                        uri: r.uri,
                        name: r.name,
                        mime_type: r.mime_type,
                        size: r.size,
                    }));
                }
                Err(err) => tracing::warn!(server_id, error = %err, "listResources failed"),
            }
        }
        if let Some(result) = templates_res {
            match result {
                Ok(items) => state.resource_templates.extend(items.into_iter().map(|t| {
                    AggregatedResourceTemplate {
                        server_id: server_id.to_string(),
                        id: t.id,
                        name: t.name,
                        uri_template: t.uri_template,
                        description: t.description,
                    }
                })),
                Err(err) => tracing::warn!(server_id, error = %err, "listResourceTemplates failed"),
            }
        }
        if let Some(result) = prompts_res {
            match result {
                Ok(items) => state.prompts.extend(items.into_iter().map(|p| AggregatedPrompt {
                    server_id: server_id.to_string(),
                    name: p.name,
                    description: p.description,
                    arguments: p.arguments,
                })),
                Err(err) => tracing::warn!(server_id, error = %err, "listPrompts failed"),
            }
        }
        drop(state);

        self.events.emit(HostEvent::CapabilitiesUpdated);
    }

    async fn drain_notifications(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<(String, ClientNotification)>,
    ) {
        while let Some((server_id, notification)) = rx.recv().await {
            match notification {
                ClientNotification::ToolsListChanged
                | ClientNotification::ResourcesListChanged
                | ClientNotification::PromptsListChanged => {
                    self.refresh_capabilities(&server_id).await;
                }
                ClientNotification::ResourceUpdated { uri } => {
                    self.events.emit(HostEvent::ResourceUpdated { server_id, uri });
                }
                ClientNotification::LoggingMessage { level, data } => {
                    self.events.emit(HostEvent::Log {
                        level: format!("server-{level}"),
                        server_id,
                        message: data,
                    });
                }
                ClientNotification::Closed { error } => {
                    self.disconnect_server(&server_id, error).await;
                }
            }
        }
    }

    /// §4.1 "Disconnect": removes the client, drops its aggregated entries,
    /// emits `serverDisconnected` strictly before `capabilitiesUpdated`.
    async fn disconnect_server(&self, server_id: &str, error: Option<HostError>) {
        self.clients.remove(server_id);
        self.aggregated.write().await.remove_server(server_id);
        self.events.emit(HostEvent::ServerDisconnected {
            server_id: server_id.to_string(),
            error,
        });
        self.events.emit(HostEvent::CapabilitiesUpdated);
    }

    /// A connection-level failure surfaced from a regular call is treated the
    /// same as an out-of-band close notification, since this adapter has no
    /// push channel for passive disconnects (see DESIGN.md).
    async fn handle_possible_disconnect(&self, server_id: &str, error: &HostError) {
        if error.kind == ErrorKind::ConnectionFailed && self.clients.contains_key(server_id) {
            self.disconnect_server(server_id, Some(error.clone())).await;
        }
    }

    fn get_client(&self, server_id: &str) -> Result<Arc<dyn McpClientAdapter>, HostError> {
        self.clients
            .get(server_id)
            .map(|e| e.clone())
            .ok_or_else(|| HostError::server_not_found(server_id))
    }

    pub async fn call_tool(
        &self,
        server_id: &str,
        name: &str,
        arguments: serde_json::Value,
        options: RequestOptions,
    ) -> Result<serde_json::Value, HostError> {
        let client = self.get_client(server_id)?;
        let result = client.call_tool(name, arguments, options).await;
        if let Err(ref err) = result {
            self.handle_possible_disconnect(server_id, err).await;
        }
        result
    }

    pub async fn read_resource(
        &self,
        server_id: &str,
        uri: &str,
        options: RequestOptions,
    ) -> Result<serde_json::Value, HostError> {
        let client = self.get_client(server_id)?;
        let result = client.read_resource(uri, options).await;
        if let Err(ref err) = result {
            self.handle_possible_disconnect(server_id, err).await;
        }
        result
    }

    pub async fn get_prompt(
        &self,
        server_id: &str,
        name: &str,
        arguments: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<serde_json::Value, HostError> {
        let client = self.get_client(server_id)?;
        let result = client.get_prompt(name, arguments, options).await;
        if let Err(ref err) = result {
            self.handle_possible_disconnect(server_id, err).await;
        }
        result
    }

    pub async fn subscribe_resource(&self, server_id: &str, uri: &str) -> Result<(), HostError> {
        let client = self.get_client(server_id)?;
        client
            .subscribe_resource(uri)
            .await
            .map_err(|e| HostError::wrap(ErrorKind::SubscriptionFailed, "subscribe failed", e))
    }

    pub async fn unsubscribe_resource(&self, server_id: &str, uri: &str) -> Result<(), HostError> {
        let client = self.get_client(server_id)?;
        client
            .unsubscribe_resource(uri)
            .await
            .map_err(|e| HostError::wrap(ErrorKind::SubscriptionFailed, "unsubscribe failed", e))
    }

    /// §4.1 `setRoots`: atomic replace, fan out to every server wanting
    /// `roots.listChanged`, collect per-server failures into one error.
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<(), AggregateHostError> {
        *self.current_roots.write() = roots;

        let mut errors = Vec::new();
        for entry in self.clients.iter() {
            let (server_id, client) = (entry.key().clone(), entry.value().clone());
            if client.server_capabilities().wants_roots_list_changed() {
                if let Err(err) = client.send_roots_list_changed().await {
                    errors.push(err.with_server(server_id));
                }
            }
        }
        AggregateHostError::new(errors).into_result()
    }

    #[must_use]
    pub fn current_roots(&self) -> Vec<Root> {
        self.current_roots.read().clone()
    }

    pub async fn tools(&self) -> Vec<AggregatedTool> {
        self.aggregated.read().await.tools.clone()
    }

    pub async fn resources(&self) -> Vec<AggregatedResource> {
        self.aggregated.read().await.resources.clone()
    }

    pub async fn resource_templates(&self) -> Vec<AggregatedResourceTemplate> {
        self.aggregated.read().await.resource_templates.clone()
    }

    pub async fn prompts(&self) -> Vec<AggregatedPrompt> {
        self.aggregated.read().await.prompts.clone()
    }

    pub async fn suggest_server_for_resource(&self, target_uri: &str) -> Vec<Suggestion> {
        let state = self.aggregated.read().await;
        resolver::resolve_resource_server(target_uri, &state.resources, &state.resource_templates)
    }

    pub async fn suggest_server_for_tool(&self, name: &str) -> Vec<Suggestion> {
        let state = self.aggregated.read().await;
        resolver::resolve_tool_server(name, &state.tools)
    }

    pub async fn suggest_server_for_prompt(&self, name: &str) -> Vec<Suggestion> {
        let state = self.aggregated.read().await;
        resolver::resolve_prompt_server(name, &state.prompts)
    }

    #[must_use]
    pub fn host_info(&self) -> &HostInfo {
        &self.host_info
    }

    #[must_use]
    pub fn host_capabilities(&self) -> &HostCapabilities {
        &self.host_capabilities
    }

    #[must_use]
    pub fn connected_server_ids(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    /// One summary row per configured server, for the bridge's `/servers`
    /// listing endpoint.
    #[must_use]
    pub fn server_summaries(&self) -> Vec<ServerSummary> {
        self.configs
            .iter()
            .map(|config| ServerSummary {
                id: config.id.clone(),
                name: config.name.clone().unwrap_or_else(|| config.id.clone()),
                transport: config.transport.label().to_string(),
                connected: self.clients.contains_key(&config.id),
            })
            .collect()
    }
}

/// One row of the `/servers` listing: a configured server plus its live
/// connection state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerSummary {
    pub id: String,
    pub name: String,
    pub transport: String,
    pub connected: bool,
}

/// Keeps the first `ServerConfig` for any repeated `id`, logging a warning
/// for each duplicate dropped (config.rs doc comment on `ServerConfig`).
fn dedup_server_configs(servers: Vec<ServerConfig>) -> Vec<ServerConfig> {
    let mut seen = HashMap::new();
    let mut unique = Vec::with_capacity(servers.len());
    for server in servers {
        if seen.contains_key(&server.id) {
            tracing::warn!(server_id = %server.id, "duplicate server id in configuration, ignoring");
            continue;
        }
        seen.insert(server.id.clone(), ());
        unique.push(server);
    }
    unique
}
