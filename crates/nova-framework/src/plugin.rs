//! Plugins and their lifecycle.
//!
//! A [`Plugin`] contributes handlers and tools to the shared
//! [`HandlerRegistry`] through a [`Registrar`], then gets an
//! [`initialize`](Plugin::initialize) call with its [`PluginContext`] when the
//! runtime starts and a [`terminate`](Plugin::terminate) call when it stops.
//!
//! The [`PluginManager`] drives the state machine:
//!
//! ```text
//! register_plugin() ──► Registered ──► Disabled  (listed in disabled_plugins)
//!     start_all()  ──► Active      (initialize succeeded)
//!                  ──► Failed      (initialize returned an error)
//!     stop_all()   ──► Registered  (Active → Registered after terminate)
//! ```
//!
//! Handlers of a plugin that is not active never match: the manager mirrors
//! every state change into the registry's enabled-owner set.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl Plugin for Echo {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new("echo", "0.1.0")
//!     }
//!
//!     fn register(self: Arc<Self>, registrar: &mut Registrar<'_>) {
//!         registrar.on(
//!             Trigger::command("echo"),
//!             Handler::single_shot(|event: Arc<MessageEvent>| async move {
//!                 event.set_result(event.command_args().join(" "));
//!             }),
//!         );
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nova_core::{
    BoxError, MessageChain, MessageSender, PlatformManager, ProviderRegistry, SessionId,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{error, info, warn};

use crate::handler::{FunctionTool, Handler};
use crate::registry::{HandlerEntry, HandlerRegistry};
use crate::trigger::{Permission, Trigger};

// =============================================================================
// Metadata
// =============================================================================

/// Descriptive metadata attached to every plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMetadata {
    /// Unique plugin name, also the config lookup key and the owner of its
    /// handlers.
    pub name: String,
    pub version: String,
    pub desc: String,
    pub author: String,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            desc: String::new(),
            author: String::new(),
        }
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Registers a plugin's handlers and tools under the plugin's name.
pub struct Registrar<'a> {
    registry: &'a HandlerRegistry,
    owner: String,
}

impl<'a> Registrar<'a> {
    pub fn new(registry: &'a HandlerRegistry, owner: impl Into<String>) -> Self {
        Self {
            registry,
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Registers a handler open to everyone.
    pub fn on(&mut self, trigger: Trigger, handler: Handler) -> &mut Self {
        self.registry.register(trigger, handler, self.owner.clone());
        self
    }

    /// Registers a handler with a description and a permission filter.
    pub fn on_with(
        &mut self,
        trigger: Trigger,
        handler: Handler,
        description: impl Into<String>,
        permission: Permission,
    ) -> &mut Self {
        self.registry.register_entry(
            HandlerEntry::new(trigger, handler, self.owner.clone())
                .description(description)
                .permission(permission),
        );
        self
    }

    /// Registers a function tool.
    pub fn tool(&mut self, tool: FunctionTool) -> &mut Self {
        self.registry.register_tool(tool, self.owner.clone());
        self
    }
}

// =============================================================================
// Context
// =============================================================================

/// What a plugin can reach at runtime.
///
/// Cheap to clone; plugins usually keep a copy from
/// [`initialize`](Plugin::initialize) for use inside handlers.
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    config: Arc<Value>,
    registry: Arc<HandlerRegistry>,
    providers: Arc<ProviderRegistry>,
    platforms: Arc<PlatformManager>,
}

impl PluginContext {
    pub fn new(
        name: impl Into<String>,
        config: Value,
        registry: Arc<HandlerRegistry>,
        providers: Arc<ProviderRegistry>,
        platforms: Arc<PlatformManager>,
    ) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            registry,
            providers,
            platforms,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw JSON of this plugin's config section, an empty object if absent.
    pub fn raw_config(&self) -> &Value {
        &self.config
    }

    /// Deserializes the plugin config section into `T`.
    ///
    /// Use `#[serde(default)]` on `T` to make every field optional.
    pub fn get_config<T>(&self) -> serde_json::Result<T>
    where
        T: DeserializeOwned,
    {
        T::deserialize(self.config.as_ref())
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

    /// Sends a chain to any session, outside of an event.
    ///
    /// Returns `false` if no platform serves the session.
    pub async fn send_message(&self, session: &SessionId, chain: impl Into<MessageChain>) -> bool {
        let chain = chain.into();
        self.platforms.send(session, &chain).await
    }

    /// Recalls a message. Returns `false` when the platform cannot.
    pub async fn recall(&self, session: &SessionId, message_id: &str) -> bool {
        self.platforms.recall(session, message_id).await
    }

    /// Mutes a group member. Returns `false` when the platform cannot.
    pub async fn mute(&self, session: &SessionId, user_id: &str, duration: Duration) -> bool {
        self.platforms.mute(session, user_id, duration).await
    }
}

// =============================================================================
// Plugin trait
// =============================================================================

/// A unit of bot functionality.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn metadata(&self) -> PluginMetadata;

    /// Adds handlers and tools. Called once, when the plugin is registered.
    fn register(self: Arc<Self>, registrar: &mut Registrar<'_>);

    /// Called once at startup. An error marks the plugin as failed and
    /// disables its handlers.
    async fn initialize(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called once at shutdown.
    async fn terminate(&self) {}
}

/// Load state of a plugin registered with [`PluginManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginLoadState {
    /// Registered but not yet initialized.
    Registered,
    /// Initialized; its handlers take part in dispatch.
    Active,
    /// Initialization failed. Its handlers are ignored.
    Failed,
    /// Turned off by configuration or at runtime.
    Disabled,
}

// =============================================================================
// PluginManager
// =============================================================================

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    metadata: PluginMetadata,
    state: PluginLoadState,
    initialized: bool,
}

/// Owns the registered plugins and drives their lifecycle.
///
/// `plugin_configs` maps plugin name to its config section, taken from the
/// `plugins` table of the configuration file.
pub struct PluginManager {
    plugins: AsyncRwLock<Vec<PluginEntry>>,
    plugin_configs: HashMap<String, Value>,
    disabled: HashSet<String>,
    registry: Arc<HandlerRegistry>,
}

impl PluginManager {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        plugin_configs: HashMap<String, Value>,
        disabled: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            plugins: AsyncRwLock::new(Vec::new()),
            plugin_configs,
            disabled: disabled.into_iter().collect(),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Registers a plugin and its handlers.
    ///
    /// Returns `false` if a plugin with the same name is already registered.
    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> bool {
        let metadata = plugin.metadata();
        let mut plugins = self.plugins.write().await;
        if plugins.iter().any(|e| e.metadata.name == metadata.name) {
            warn!(plugin = %metadata.name, "Plugin already registered, ignoring");
            return false;
        }

        let mut registrar = Registrar::new(&self.registry, metadata.name.clone());
        Arc::clone(&plugin).register(&mut registrar);

        // Handlers stay dormant until `initialize` succeeds.
        self.registry.set_owner_enabled(&metadata.name, false);
        let state = if self.disabled.contains(&metadata.name) {
            PluginLoadState::Disabled
        } else {
            PluginLoadState::Registered
        };
        info!(plugin = %metadata.name, version = %metadata.version, ?state, "Plugin registered");

        plugins.push(PluginEntry {
            plugin,
            metadata,
            state,
            initialized: false,
        });
        true
    }

    /// Unregisters a plugin and removes its handlers and tools.
    ///
    /// Call [`stop_all`](Self::stop_all) first if it is active.
    pub async fn remove_plugin(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write().await;
        let Some(pos) = plugins.iter().position(|e| e.metadata.name == name) else {
            return false;
        };
        plugins.remove(pos);
        let removed = self.registry.unregister_owner(name);
        self.registry.set_owner_enabled(name, true);
        info!(plugin = %name, handlers = removed, "Plugin removed");
        true
    }

    pub async fn plugin_count(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn plugin_state(&self, name: &str) -> Option<PluginLoadState> {
        self.plugins
            .read()
            .await
            .iter()
            .find(|e| e.metadata.name == name)
            .map(|e| e.state)
    }

    /// Metadata of every registered plugin, in registration order.
    pub async fn plugins(&self) -> Vec<PluginMetadata> {
        self.plugins
            .read()
            .await
            .iter()
            .map(|e| e.metadata.clone())
            .collect()
    }

    fn context_for(
        &self,
        name: &str,
        providers: &Arc<ProviderRegistry>,
        platforms: &Arc<PlatformManager>,
    ) -> PluginContext {
        let config = self
            .plugin_configs
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::default()));
        PluginContext::new(
            name,
            config,
            Arc::clone(&self.registry),
            Arc::clone(providers),
            Arc::clone(platforms),
        )
    }

    /// Initializes every registered plugin in registration order.
    pub async fn start_all(
        &self,
        providers: &Arc<ProviderRegistry>,
        platforms: &Arc<PlatformManager>,
    ) {
        let mut plugins = self.plugins.write().await;
        for entry in plugins.iter_mut() {
            if entry.state != PluginLoadState::Registered {
                continue;
            }
            let name = entry.metadata.name.clone();
            let ctx = self.context_for(&name, providers, platforms);
            match entry.plugin.initialize(&ctx).await {
                Ok(()) => {
                    entry.state = PluginLoadState::Active;
                    entry.initialized = true;
                    self.registry.set_owner_enabled(&name, true);
                    info!(plugin = %name, "Plugin loaded and active");
                }
                Err(e) => {
                    entry.state = PluginLoadState::Failed;
                    self.registry.set_owner_enabled(&name, false);
                    error!(plugin = %name, error = %e, "Plugin failed to initialize");
                }
            }
        }
    }

    /// Terminates every active plugin in reverse registration order.
    pub async fn stop_all(&self) {
        let mut plugins = self.plugins.write().await;
        for entry in plugins.iter_mut().rev() {
            if !entry.initialized {
                continue;
            }
            entry.plugin.terminate().await;
            entry.initialized = false;
            self.registry.set_owner_enabled(&entry.metadata.name, false);
            if entry.state == PluginLoadState::Active {
                entry.state = PluginLoadState::Registered;
            }
            info!(plugin = %entry.metadata.name, "Plugin terminated");
        }
    }

    /// Enables or disables a plugin at runtime.
    ///
    /// Enabling a plugin that was never initialized puts it back to
    /// `Registered`; it becomes active on the next [`start_all`](Self::start_all).
    /// Returns `false` for an unknown or failed plugin.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut plugins = self.plugins.write().await;
        let Some(entry) = plugins.iter_mut().find(|e| e.metadata.name == name) else {
            return false;
        };
        if entry.state == PluginLoadState::Failed {
            return false;
        }

        entry.state = match (enabled, entry.initialized) {
            (false, _) => PluginLoadState::Disabled,
            (true, true) => PluginLoadState::Active,
            (true, false) => PluginLoadState::Registered,
        };
        self.registry
            .set_owner_enabled(name, enabled && entry.initialized);
        info!(plugin = %name, enabled, "Plugin enable state changed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::private_event;
    use nova_core::MessageEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        name: &'static str,
        fail: bool,
        initialized: AtomicUsize,
        terminated: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for Counting {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new(self.name, "0.1.0").desc("counts lifecycle calls")
        }

        fn register(self: Arc<Self>, registrar: &mut Registrar<'_>) {
            registrar.on(
                Trigger::regex(".*").unwrap(),
                Handler::single_shot(|_event: Arc<MessageEvent>| async {}),
            );
        }

        async fn initialize(&self, ctx: &PluginContext) -> Result<(), BoxError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(format!("{} refuses to start", ctx.name()).into());
            }
            Ok(())
        }

        async fn terminate(&self) {
            self.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn plugin(name: &'static str, fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            name,
            fail,
            ..Counting::default()
        })
    }

    fn collaborators() -> (Arc<ProviderRegistry>, Arc<PlatformManager>) {
        (
            Arc::new(ProviderRegistry::new()),
            Arc::new(PlatformManager::new()),
        )
    }

    fn matching_owners(registry: &HandlerRegistry) -> Vec<String> {
        registry
            .matching(&private_event("x"))
            .into_iter()
            .map(|m| m.entry.owner().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let registry = Arc::new(HandlerRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry), HashMap::new(), Vec::new());
        let (providers, platforms) = collaborators();
        let good = plugin("good", false);
        let bad = plugin("bad", true);

        assert!(manager.register_plugin(good.clone()).await);
        assert!(manager.register_plugin(bad.clone()).await);
        assert!(!manager.register_plugin(plugin("good", false)).await);
        assert_eq!(manager.plugin_count().await, 2);

        manager.start_all(&providers, &platforms).await;
        assert_eq!(manager.plugin_state("good").await, Some(PluginLoadState::Active));
        assert_eq!(manager.plugin_state("bad").await, Some(PluginLoadState::Failed));
        assert_eq!(matching_owners(&registry), vec!["good"]);

        manager.stop_all().await;
        assert_eq!(good.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(bad.terminated.load(Ordering::SeqCst), 0);
        assert_eq!(manager.plugin_state("good").await, Some(PluginLoadState::Registered));
    }

    #[tokio::test]
    async fn test_handlers_match_only_while_active() {
        let registry = Arc::new(HandlerRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry), HashMap::new(), Vec::new());
        let (providers, platforms) = collaborators();

        manager.register_plugin(plugin("p", false)).await;
        assert_eq!(manager.plugin_state("p").await, Some(PluginLoadState::Registered));
        assert!(matching_owners(&registry).is_empty());

        manager.start_all(&providers, &platforms).await;
        assert_eq!(matching_owners(&registry), vec!["p"]);

        manager.stop_all().await;
        assert_eq!(manager.plugin_state("p").await, Some(PluginLoadState::Registered));
        assert!(matching_owners(&registry).is_empty());

        manager.start_all(&providers, &platforms).await;
        assert_eq!(matching_owners(&registry), vec!["p"]);
    }

    #[tokio::test]
    async fn test_disabled_by_config() {
        let registry = Arc::new(HandlerRegistry::new());
        let manager = PluginManager::new(
            Arc::clone(&registry),
            HashMap::new(),
            vec!["quiet".to_string()],
        );
        let (providers, platforms) = collaborators();
        let quiet = plugin("quiet", false);

        manager.register_plugin(quiet.clone()).await;
        manager.start_all(&providers, &platforms).await;

        assert_eq!(manager.plugin_state("quiet").await, Some(PluginLoadState::Disabled));
        assert_eq!(quiet.initialized.load(Ordering::SeqCst), 0);
        assert!(matching_owners(&registry).is_empty());

        assert!(manager.set_enabled("quiet", true).await);
        manager.start_all(&providers, &platforms).await;
        assert_eq!(manager.plugin_state("quiet").await, Some(PluginLoadState::Active));
        assert_eq!(matching_owners(&registry), vec!["quiet"]);
    }

    #[tokio::test]
    async fn test_runtime_toggle_and_remove() {
        let registry = Arc::new(HandlerRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry), HashMap::new(), Vec::new());
        let (providers, platforms) = collaborators();
        manager.register_plugin(plugin("p", false)).await;
        manager.start_all(&providers, &platforms).await;

        assert!(manager.set_enabled("p", false).await);
        assert!(matching_owners(&registry).is_empty());
        assert!(manager.set_enabled("p", true).await);
        assert_eq!(matching_owners(&registry), vec!["p"]);
        assert!(!manager.set_enabled("missing", true).await);

        assert!(manager.remove_plugin("p").await);
        assert!(registry.handlers().is_empty());
        assert!(!manager.remove_plugin("p").await);
    }

    #[tokio::test]
    async fn test_plugin_config_section() {
        #[derive(serde::Deserialize, Default)]
        #[serde(default)]
        struct Cfg {
            greeting: String,
            retries: u32,
        }

        let registry = Arc::new(HandlerRegistry::new());
        let (providers, platforms) = collaborators();
        let mut configs = HashMap::new();
        configs.insert("greeter".to_string(), serde_json::json!({ "greeting": "hey" }));
        let manager = PluginManager::new(Arc::clone(&registry), configs, Vec::new());

        let ctx = manager.context_for("greeter", &providers, &platforms);
        let cfg: Cfg = ctx.get_config().unwrap();
        assert_eq!(cfg.greeting, "hey");
        assert_eq!(cfg.retries, 0);

        let empty = manager.context_for("other", &providers, &platforms);
        assert_eq!(empty.raw_config(), &serde_json::json!({}));
        assert!(!empty.send_message(&private_event("x").session().clone(), "hi").await);
    }
}
