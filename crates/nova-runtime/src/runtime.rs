//! The Nova runtime: wiring plus a worker pool draining the event queue.
//!
//! ```text
//! ┌──────────┐ run() ┌─────────────┐        ┌──────────┐ process ┌──────────┐
//! │ Platform │──────▶│ EventIngress│──mpsc─▶│ Worker N │────────▶│ Pipeline │
//! └──────────┘       └─────────────┘        └──────────┘         └──────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nova_runtime::NovaRuntime;
//!
//! let runtime = NovaRuntime::builder()
//!     .config_file("nova.toml")
//!     .platform(Arc::new(ConsolePlatform::new()))
//!     .provider(Arc::new(MyProvider::new()))
//!     .plugin(Arc::new(SpamDetector::default()))
//!     .build()
//!     .await?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nova_core::{
    BoxedPlatform, ConversationStore, EventIngress, EventQueue, EventReceiver,
    MemoryConversationStore, MessageChain, MessageSender, PlatformManager, Provider,
    ProviderRegistry, SessionId,
};
use nova_framework::{HandlerRegistry, LlmOrchestrator, Pipeline, Plugin, PluginManager};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigLoader, NovaConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging::{self, LogGuard};

/// Owns every shared component and runs the event loop.
///
/// A runtime runs once: after [`run`](Self::run) or
/// [`run_until`](Self::run_until) returns, build a new one to start again.
pub struct NovaRuntime {
    config: NovaConfig,
    registry: Arc<HandlerRegistry>,
    providers: Arc<ProviderRegistry>,
    platforms: Arc<PlatformManager>,
    plugins: Arc<PluginManager>,
    pipeline: Arc<Pipeline>,
    ingress: EventIngress,
    receiver: Arc<EventReceiver>,
    shutdown: CancellationToken,
    started: AtomicBool,
    _log_guard: Option<LogGuard>,
}

impl NovaRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    fn from_parts(
        config: NovaConfig,
        conversations: Arc<dyn ConversationStore>,
        log_guard: Option<LogGuard>,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let providers = Arc::new(ProviderRegistry::new());
        let platforms = Arc::new(PlatformManager::new());

        let orchestrator = Arc::new(
            LlmOrchestrator::new(
                Arc::clone(&providers),
                conversations,
                Arc::clone(&registry),
            )
            .with_max_tool_rounds(config.pipeline.llm.max_tool_rounds),
        );
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&registry),
            orchestrator,
            config.pipeline.clone(),
        ));
        let plugins = Arc::new(PluginManager::new(
            Arc::clone(&registry),
            config.plugins.clone(),
            config.disabled_plugins.clone(),
        ));

        let sender: Arc<dyn MessageSender> = platforms.clone();
        let (ingress, receiver) = EventQueue::bounded(config.runtime.queue_capacity, sender);

        Self {
            config,
            registry,
            providers,
            platforms,
            plugins,
            pipeline,
            ingress,
            receiver: Arc::new(receiver),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            _log_guard: log_guard,
        }
    }

    pub fn config(&self) -> &NovaConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn platforms(&self) -> &Arc<PlatformManager> {
        &self.platforms
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// A producer handle for push-based adapters.
    pub fn ingress(&self) -> EventIngress {
        self.ingress.clone()
    }

    /// The token cancelled on shutdown. Cancelling it stops the runtime.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a chat provider. The configured `provider.default` becomes
    /// the using provider once registered; otherwise the first one does.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        let meta = provider.meta();
        self.providers.register_provider(provider);
        if self.config.provider.default.as_deref() == Some(meta.id.as_str()) {
            self.providers.set_using_provider(&meta.id);
        }
        info!(provider = %meta.id, model = %meta.model, "Provider registered");
    }

    pub fn register_platform(&self, platform: BoxedPlatform) {
        self.platforms.register(platform);
    }

    /// Registers a plugin and its handlers. Plugins are initialized when
    /// the runtime starts.
    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> RuntimeResult<()> {
        let name = plugin.metadata().name;
        if self.plugins.register_plugin(plugin).await {
            Ok(())
        } else {
            Err(RuntimeError::Plugin(format!(
                "plugin '{name}' is already registered"
            )))
        }
    }

    /// Sends a chain to a session outside of any event.
    pub async fn send_message(&self, session: &SessionId, chain: impl Into<MessageChain>) -> bool {
        self.platforms.send(session, &chain.into()).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs until `until` completes or the shutdown token is cancelled.
    ///
    /// Events still queued at shutdown are dropped; events already taken by
    /// a worker finish processing first.
    pub async fn run_until<F>(&self, until: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }

        info!("Starting Nova runtime");
        self.plugins
            .start_all(&self.providers, &self.platforms)
            .await;

        let mut platform_tasks = JoinSet::new();
        for platform in self.platforms.all() {
            let ingress = self.ingress.clone();
            let shutdown = self.shutdown.clone();
            platform_tasks.spawn(async move {
                let name = platform.meta().name;
                debug!(platform = %name, "Platform loop started");
                match platform.run(ingress, shutdown).await {
                    Ok(()) => debug!(platform = %name, "Platform loop finished"),
                    Err(e) => error!(platform = %name, error = %e, "Platform loop failed"),
                }
            });
        }

        let workers = self.config.runtime.workers;
        let mut worker_tasks = JoinSet::new();
        for id in 0..workers {
            worker_tasks.spawn(worker_loop(
                id,
                Arc::clone(&self.receiver),
                Arc::clone(&self.pipeline),
                self.shutdown.clone(),
            ));
        }

        info!(
            workers,
            platforms = platform_tasks.len(),
            "Nova runtime is running"
        );

        tokio::select! {
            _ = until => {}
            _ = self.shutdown.cancelled() => {}
        }

        info!("Stopping Nova runtime");
        self.shutdown.cancel();
        join_all(&mut platform_tasks, "platform").await;
        join_all(&mut worker_tasks, "worker").await;
        self.plugins.stop_all().await;
        info!("Nova runtime stopped");

        Ok(())
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<EventReceiver>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = receiver.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        let report = pipeline.process(event).await;
        trace!(worker = id, ?report, "Event processed");
    }
    debug!(worker = id, "Worker stopped");
}

async fn join_all(tasks: &mut JoinSet<()>, kind: &'static str) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(task = kind, error = %e, "Task ended abnormally");
        }
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => ctrl_c_received(result),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c_received(signal::ctrl_c().await);
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c_received(signal::ctrl_c().await);
    }
}

fn ctrl_c_received(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`NovaRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<NovaConfig>,
    init_logging: bool,
    conversations: Option<Arc<dyn ConversationStore>>,
    providers: Vec<Arc<dyn Provider>>,
    platforms: Vec<BoxedPlatform>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            init_logging: true,
            conversations: None,
            providers: Vec::new(),
            platforms: Vec::new(),
            plugins: Vec::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration under the file and environment layers.
    pub fn merge(mut self, config: NovaConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses this configuration as is, skipping file and environment loading.
    pub fn config(mut self, config: NovaConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves the global subscriber alone, for hosts that install their own.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Replaces the in-memory conversation store.
    pub fn conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn platform(mut self, platform: BoxedPlatform) -> Self {
        self.platforms.push(platform);
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub async fn build(self) -> RuntimeResult<NovaRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };

        let log_guard = if self.init_logging {
            let guard = logging::init_from_config(&config.logging)
                .map_err(|e| RuntimeError::Logging(e.to_string()))?;
            Some(guard)
        } else {
            None
        };

        let conversations = self
            .conversations
            .unwrap_or_else(|| Arc::new(MemoryConversationStore::new()));
        let runtime = NovaRuntime::from_parts(config, conversations, log_guard);

        for provider in self.providers {
            runtime.register_provider(provider);
        }
        if let Some(default) = &runtime.config.provider.default
            && runtime.providers.get_provider_by_id(default).is_none()
        {
            warn!(provider = %default, "Configured default provider is not registered");
        }

        for platform in self.platforms {
            runtime.register_platform(platform);
        }
        for plugin in self.plugins {
            runtime.register_plugin(plugin).await?;
        }

        info!(
            log_level = %runtime.config.logging.level,
            workers = runtime.config.runtime.workers,
            queue_capacity = runtime.config.runtime.queue_capacity,
            "Runtime built"
        );
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
