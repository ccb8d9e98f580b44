//! The handler registry.
//!
//! Shared and read-mostly. Message handlers are kept in registration order,
//! which is also dispatch order. Function tools carry an activation flag that
//! can be flipped by name while lookups run concurrently: each flag is a
//! single atomic, so a reader sees either the old or the new state.
//!
//! Plugin enable state is mirrored here as a set of disabled owners; entries
//! of a disabled owner never match and their tools are never offered.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nova_core::{MessageEvent, ToolSet};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::handler::{FunctionTool, Handler};
use crate::trigger::{Permission, Trigger, TriggerMatch};

// ============================================================================
// Entries
// ============================================================================

/// A registered message handler.
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    trigger: Trigger,
    handler: Handler,
    owner: String,
    description: String,
    permission: Permission,
}

impl HandlerEntry {
    pub fn new(trigger: Trigger, handler: Handler, owner: impl Into<String>) -> Self {
        Self {
            trigger,
            handler,
            owner: owner.into(),
            description: String::new(),
            permission: Permission::Everyone,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// Name used in logs: `owner::trigger-key`.
    pub fn name(&self) -> String {
        format!("{}::{}", self.owner, self.trigger.key())
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn get_description(&self) -> &str {
        &self.description
    }

    pub fn get_permission(&self) -> Permission {
        self.permission
    }
}

struct ToolEntry {
    tool: FunctionTool,
    owner: String,
    active: AtomicBool,
}

/// A handler selected for an event, with what its trigger matched.
#[derive(Debug, Clone)]
pub struct MatchedHandler {
    pub entry: Arc<HandlerEntry>,
    pub matched: TriggerMatch,
}

// ============================================================================
// Registry
// ============================================================================

/// Mapping from triggers and tool names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Arc<HandlerEntry>>>,
    tools: RwLock<Vec<Arc<ToolEntry>>>,
    disabled_owners: RwLock<HashSet<String>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a message handler after all existing ones.
    pub fn register(&self, trigger: Trigger, handler: Handler, owner: impl Into<String>) {
        self.register_entry(HandlerEntry::new(trigger, handler, owner));
    }

    /// Registers a fully described handler entry.
    pub fn register_entry(&self, entry: HandlerEntry) {
        debug!(
            handler = %entry.name(),
            kind = entry.handler.kind(),
            "Handler registered"
        );
        self.handlers.write().push(Arc::new(entry));
    }

    /// Registers a function tool, active by default. A tool with the same name
    /// is replaced.
    pub fn register_tool(&self, tool: FunctionTool, owner: impl Into<String>) {
        let owner = owner.into();
        info!(tool = %tool.name(), plugin = %owner, "Function tool registered");
        let mut tools = self.tools.write();
        tools.retain(|entry| entry.tool.name() != tool.name());
        tools.push(Arc::new(ToolEntry {
            tool,
            owner,
            active: AtomicBool::new(true),
        }));
    }

    /// Activates a tool. Returns `false` if no tool has this name.
    pub fn activate(&self, name: &str) -> bool {
        self.set_tool_active(name, true)
    }

    /// Deactivates a tool. Returns `false` if no tool has this name.
    pub fn deactivate(&self, name: &str) -> bool {
        self.set_tool_active(name, false)
    }

    fn set_tool_active(&self, name: &str, active: bool) -> bool {
        let tools = self.tools.read();
        match tools.iter().find(|entry| entry.tool.name() == name) {
            Some(entry) => {
                entry.active.store(active, Ordering::SeqCst);
                debug!(tool = %name, active, "Tool activation changed");
                true
            }
            None => false,
        }
    }

    /// Activation state of a tool, `None` for an unknown name.
    pub fn is_tool_active(&self, name: &str) -> Option<bool> {
        self.tools
            .read()
            .iter()
            .find(|entry| entry.tool.name() == name)
            .map(|entry| entry.active.load(Ordering::SeqCst))
    }

    /// Looks up the first handler whose trigger answers to `key` (command
    /// name or alias, pattern source, or listener filter name).
    pub fn lookup(&self, key: &str) -> Option<Handler> {
        self.handlers
            .read()
            .iter()
            .find(|entry| entry.trigger.answers_to(key))
            .map(|entry| entry.handler.clone())
    }

    /// Returns an active tool of an enabled owner.
    pub fn get_tool(&self, name: &str) -> Option<FunctionTool> {
        let disabled = self.disabled_owners.read();
        self.tools
            .read()
            .iter()
            .find(|entry| {
                entry.tool.name() == name
                    && entry.active.load(Ordering::SeqCst)
                    && !disabled.contains(&entry.owner)
            })
            .map(|entry| entry.tool.clone())
    }

    /// The tools currently offered to models.
    pub fn tool_set(&self) -> ToolSet {
        let disabled = self.disabled_owners.read();
        ToolSet::new(
            self.tools
                .read()
                .iter()
                .filter(|entry| {
                    entry.active.load(Ordering::SeqCst) && !disabled.contains(&entry.owner)
                })
                .map(|entry| entry.tool.spec().clone())
                .collect(),
        )
    }

    /// The handlers matching an event, in registration order.
    pub fn matching(&self, event: &MessageEvent) -> Vec<MatchedHandler> {
        let disabled = self.disabled_owners.read();
        self.handlers
            .read()
            .iter()
            .filter(|entry| !disabled.contains(&entry.owner))
            .filter_map(|entry| {
                let matched = entry.trigger.matches(event)?;
                if !entry.permission.allows(event) {
                    debug!(handler = %entry.name(), "Permission denied, skipping handler");
                    return None;
                }
                Some(MatchedHandler {
                    entry: Arc::clone(entry),
                    matched,
                })
            })
            .collect()
    }

    /// Whether an enabled passive listener accepts this event.
    pub fn has_passive_listener_for(&self, event: &MessageEvent) -> bool {
        let disabled = self.disabled_owners.read();
        self.handlers.read().iter().any(|entry| {
            entry.trigger.is_passive_listener()
                && !disabled.contains(&entry.owner)
                && entry.trigger.matches(event).is_some()
        })
    }

    /// Enables or disables every handler and tool of an owner.
    pub fn set_owner_enabled(&self, owner: &str, enabled: bool) {
        let mut disabled = self.disabled_owners.write();
        if enabled {
            disabled.remove(owner);
        } else {
            disabled.insert(owner.to_string());
        }
    }

    pub fn is_owner_enabled(&self, owner: &str) -> bool {
        !self.disabled_owners.read().contains(owner)
    }

    /// Removes every handler and tool of an owner. Returns how many entries
    /// were removed.
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let mut handlers = self.handlers.write();
        let mut tools = self.tools.write();
        let before = handlers.len() + tools.len();
        handlers.retain(|entry| entry.owner != owner);
        tools.retain(|entry| entry.owner != owner);
        before - handlers.len() - tools.len()
    }

    /// Snapshot of all message handlers, in registration order.
    pub fn handlers(&self) -> Vec<Arc<HandlerEntry>> {
        self.handlers.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{group_event, private_event};
    use crate::trigger::MessageTypeFilter;
    use nova_core::{BoxError, Role};
    use serde_json::json;

    fn noop() -> Handler {
        Handler::single_shot(|_event: Arc<MessageEvent>| async {})
    }

    fn tool(name: &str) -> FunctionTool {
        FunctionTool::new(name, "test tool", json!({}), |_event, _args| async {
            Ok::<_, BoxError>("ok")
        })
    }

    #[test]
    fn test_activate_unknown_tool_is_false_and_harmless() {
        let registry = HandlerRegistry::new();
        registry.register_tool(tool("weather"), "p");

        assert!(!registry.activate("toolX"));
        assert!(!registry.deactivate("toolX"));
        assert_eq!(registry.is_tool_active("toolX"), None);
        assert_eq!(registry.is_tool_active("weather"), Some(true));
        assert_eq!(registry.tool_set().tools().len(), 1);
    }

    #[test]
    fn test_tool_activation_toggles_offer() {
        let registry = HandlerRegistry::new();
        registry.register_tool(tool("weather"), "p");

        assert!(registry.deactivate("weather"));
        assert!(registry.tool_set().is_empty());
        assert!(registry.get_tool("weather").is_none());

        assert!(registry.activate("weather"));
        assert!(registry.get_tool("weather").is_some());
    }

    #[test]
    fn test_activation_does_not_apply_to_commands() {
        let registry = HandlerRegistry::new();
        registry.register(Trigger::command("help"), noop(), "p");
        assert!(!registry.activate("help"));
        assert!(registry.lookup("help").is_some());
    }

    #[test]
    fn test_matching_keeps_registration_order() {
        let registry = HandlerRegistry::new();
        registry.register(Trigger::regex("a").unwrap(), noop(), "first");
        registry.register(Trigger::message_type(MessageTypeFilter::All), noop(), "second");
        registry.register(Trigger::regex("zzz").unwrap(), noop(), "third");
        registry.register(Trigger::regex("b").unwrap(), noop(), "fourth");

        let owners: Vec<_> = registry
            .matching(&private_event("ab"))
            .into_iter()
            .map(|m| m.entry.owner().to_string())
            .collect();
        assert_eq!(owners, vec!["first", "second", "fourth"]);
    }

    #[test]
    fn test_disabled_owner_never_matches() {
        let registry = HandlerRegistry::new();
        registry.register(Trigger::message_type(MessageTypeFilter::All), noop(), "p");
        registry.register_tool(tool("t"), "p");

        registry.set_owner_enabled("p", false);
        assert!(registry.matching(&private_event("x")).is_empty());
        assert!(registry.tool_set().is_empty());
        assert!(!registry.has_passive_listener_for(&group_event("x")));

        registry.set_owner_enabled("p", true);
        assert_eq!(registry.matching(&private_event("x")).len(), 1);
    }

    #[test]
    fn test_admin_only_handler() {
        let registry = HandlerRegistry::new();
        registry.register_entry(
            HandlerEntry::new(Trigger::regex(".*").unwrap(), noop(), "p")
                .permission(Permission::Admin),
        );

        let event = private_event("x");
        assert!(registry.matching(&event).is_empty());
        event.set_role(Role::Admin);
        assert_eq!(registry.matching(&event).len(), 1);
    }

    #[test]
    fn test_unregister_owner() {
        let registry = HandlerRegistry::new();
        registry.register(Trigger::command("a"), noop(), "p");
        registry.register(Trigger::command("b"), noop(), "q");
        registry.register_tool(tool("t"), "p");

        assert_eq!(registry.unregister_owner("p"), 2);
        assert_eq!(registry.handlers().len(), 1);
        assert!(registry.lookup("a").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_toggle_and_lookup() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_tool(tool("t"), "p");

        let writer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 0..200 {
                    if i % 2 == 0 {
                        registry.deactivate("t");
                    } else {
                        registry.activate("t");
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..200 {
            let len = registry.tool_set().tools().len();
            assert!(len <= 1);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(registry.is_tool_active("t"), Some(true));
    }
}
