//! # Nova Framework
//!
//! Handler dispatch and LLM orchestration on top of `nova-core`.
//!
//! This layer provides:
//! - The handler model: single-shot bodies and incremental action streams
//! - Triggers (commands, patterns, message-type listeners) and permission
//!   filters
//! - The shared [`HandlerRegistry`] with per-tool activation flags
//! - The [`Pipeline`]: wake, dispatch, default LLM, delivery
//! - The [`LlmOrchestrator`] with context resolution and tool calls
//! - Plugins and their lifecycle
//! - Clap-based command argument parsing (with `command` feature)

pub mod delivery;
pub mod error;
pub mod handler;
pub mod llm;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod trigger;
pub mod wake;

#[cfg(feature = "command")]
pub mod command;

#[cfg(test)]
pub(crate) mod test_support;

pub use delivery::{DecorateConfig, Delivery};
pub use error::{OrchestrationError, OrchestrationResult};
pub use handler::{
    Action, ActionStream, FunctionTool, Handler, HandlerOutcome, IntoAction, ToolFn,
};
pub use llm::{LlmConfig, LlmOrchestrator};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport};
pub use plugin::{
    Plugin, PluginContext, PluginLoadState, PluginManager, PluginMetadata, Registrar,
};
pub use registry::{HandlerEntry, HandlerRegistry, MatchedHandler};
pub use trigger::{MessageTypeFilter, Permission, Trigger, TriggerMatch, shell_split};
pub use wake::{WakeConfig, WakeStage};

#[cfg(feature = "command")]
pub use command::{parse_args, parse_command};
#[cfg(feature = "command")]
pub use error::CommandError;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Action, FunctionTool, Handler, HandlerRegistry, MessageTypeFilter, Permission, Plugin,
        PluginContext, PluginMetadata, Registrar, Trigger,
    };
    #[cfg(feature = "command")]
    pub use super::parse_command;
}
