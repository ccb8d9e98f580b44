//! Triggers and filters deciding which handlers an event reaches.
//!
//! - [`Trigger::Command`]: first word of the wake-stripped text, addressed only
//! - [`Trigger::Regex`]: pattern over the plain text
//! - [`Trigger::MessageType`]: passive listener for a kind of chat

use std::fmt;

use nova_core::{MessageEvent, MessageType};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which chat kinds a passive listener receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageTypeFilter {
    Group,
    Private,
    All,
}

impl MessageTypeFilter {
    pub fn accepts(&self, message_type: MessageType) -> bool {
        match self {
            MessageTypeFilter::Group => message_type == MessageType::Group,
            MessageTypeFilter::Private => message_type == MessageType::Private,
            MessageTypeFilter::All => true,
        }
    }
}

/// Who may trigger a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Everyone,
    Admin,
}

impl Permission {
    pub fn allows(&self, event: &MessageEvent) -> bool {
        match self {
            Permission::Everyone => true,
            Permission::Admin => event.is_admin(),
        }
    }
}

/// What a handler is bound to.
#[derive(Clone)]
pub enum Trigger {
    Command { name: String, aliases: Vec<String> },
    Regex(Regex),
    MessageType(MessageTypeFilter),
}

/// The outcome of matching a trigger against an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerMatch {
    /// A command matched; these are its shell-split arguments.
    Command(Vec<String>),
    /// A pattern or listener matched.
    Message,
}

impl Trigger {
    /// A command trigger without aliases.
    pub fn command(name: impl Into<String>) -> Self {
        Trigger::Command {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    /// A command trigger with aliases.
    pub fn command_with_aliases<I, S>(name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Trigger::Command {
            name: name.into(),
            aliases: aliases.into_iter().map(Into::into).collect(),
        }
    }

    /// A regex trigger. Fails on an invalid pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Trigger::Regex)
    }

    /// A passive listener trigger.
    pub fn message_type(filter: MessageTypeFilter) -> Self {
        Trigger::MessageType(filter)
    }

    /// The name a trigger is looked up by: the command name, the pattern
    /// source, or the filter name.
    pub fn key(&self) -> String {
        match self {
            Trigger::Command { name, .. } => name.clone(),
            Trigger::Regex(regex) => regex.as_str().to_string(),
            Trigger::MessageType(filter) => format!("{filter:?}").to_lowercase(),
        }
    }

    /// Whether `key` names this trigger. Commands also answer to aliases.
    pub fn answers_to(&self, key: &str) -> bool {
        match self {
            Trigger::Command { name, aliases } => name == key || aliases.iter().any(|a| a == key),
            _ => self.key() == key,
        }
    }

    pub fn is_passive_listener(&self) -> bool {
        matches!(self, Trigger::MessageType(_))
    }

    /// Matches this trigger against an event.
    pub fn matches(&self, event: &MessageEvent) -> Option<TriggerMatch> {
        match self {
            Trigger::Command { .. } => {
                if !event.is_at_or_wake_command() {
                    return None;
                }
                let text = event.message_str();
                let text = text.trim_start();
                let (head, rest) = text
                    .split_once(char::is_whitespace)
                    .unwrap_or((text, ""));
                self.answers_to(head)
                    .then(|| TriggerMatch::Command(shell_split(rest)))
            }
            Trigger::Regex(regex) => regex
                .is_match(&event.message_str())
                .then_some(TriggerMatch::Message),
            Trigger::MessageType(filter) => filter
                .accepts(event.get_message_type())
                .then_some(TriggerMatch::Message),
        }
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Command { name, aliases } => f
                .debug_struct("Command")
                .field("name", name)
                .field("aliases", aliases)
                .finish(),
            Trigger::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Trigger::MessageType(filter) => f.debug_tuple("MessageType").field(filter).finish(),
        }
    }
}

/// Simple shell-like argument splitting for plain text.
///
/// Handles:
/// - Space-separated arguments
/// - Quoted strings (single and double quotes)
/// - Escape sequences within double quotes
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;
    let mut quoted = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => escape_next = true,
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                quoted = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                quoted = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}
