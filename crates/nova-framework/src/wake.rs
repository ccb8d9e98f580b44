//! Wake detection.
//!
//! Decides whether the bot was addressed at all. An event wakes when:
//!
//! 1. its text starts with a configured wake prefix (the prefix is stripped
//!    from the event's plain text),
//! 2. it mentions the bot's own id, or
//! 3. it is a private chat, unless `private_requires_prefix` is set.
//!
//! All three also mark the event as a direct address, which command triggers
//! require. With `passive_listeners` enabled, an event that only matches a
//! registered message-type listener wakes without being a direct address.

use nova_core::{MessageEvent, Role, Segment};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::HandlerRegistry;

fn default_prefixes() -> Vec<String> {
    vec!["/".to_string()]
}

/// Configuration of the wake stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Text prefixes that address the bot.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,

    /// Sender ids treated as admins.
    #[serde(default)]
    pub admins: Vec<String>,

    /// Require a prefix or mention in private chats too.
    #[serde(default)]
    pub private_requires_prefix: bool,

    /// Let message-type listeners wake unaddressed events.
    #[serde(default)]
    pub passive_listeners: bool,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            prefixes: default_prefixes(),
            admins: Vec::new(),
            private_requires_prefix: false,
            passive_listeners: false,
        }
    }
}

/// The first pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct WakeStage {
    config: WakeConfig,
}

impl WakeStage {
    pub fn new(config: WakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WakeConfig {
        &self.config
    }

    /// Classifies the sender and sets the wake flags. Returns the wake flag.
    pub fn apply(&self, event: &MessageEvent, registry: &HandlerRegistry) -> bool {
        if self.config.admins.iter().any(|id| id == event.get_sender_id()) {
            event.set_role(Role::Admin);
        }

        let addressed = self.strip_prefix(event)
            || self.mentions_self(event)
            || (event.is_private_chat() && !self.config.private_requires_prefix);

        let wake = addressed
            || (self.config.passive_listeners && registry.has_passive_listener_for(event));

        event.set_at_or_wake_command(addressed);
        event.set_wake(wake);
        debug!(session = %event.session(), addressed, wake, "Wake check finished");
        wake
    }

    fn strip_prefix(&self, event: &MessageEvent) -> bool {
        let text = event.message_str();
        let trimmed = text.trim_start();
        let stripped = self
            .config
            .prefixes
            .iter()
            .filter(|prefix| !prefix.is_empty())
            .find_map(|prefix| trimmed.strip_prefix(prefix.as_str()));

        match stripped {
            Some(rest) => {
                event.set_message_str(rest.trim_start());
                true
            }
            None => false,
        }
    }

    fn mentions_self(&self, event: &MessageEvent) -> bool {
        let self_id = event.get_self_id();
        !self_id.is_empty()
            && event
                .get_messages()
                .iter()
                .any(|segment| matches!(segment, Segment::At(target) if target == self_id))
    }
}
