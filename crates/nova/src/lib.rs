//! # Nova
//!
//! A message-bot framework built around one event object and the pipeline
//! it flows through.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌───────┐    ┌──────┐    ┌──────────┐    ┌─────────────┐    ┌──────────┐
//! │ Platform │───▶│ Queue │───▶│ Wake │───▶│ Dispatch │───▶│ Default LLM │───▶│ Delivery │
//! └──────────┘    └───────┘    └──────┘    └──────────┘    └─────────────┘    └──────────┘
//!                                               │                 │
//!                                               ▼                 ▼
//!                                          handlers ───▶ LLM Orchestrator ───▶ providers
//! ```
//!
//! - **Platforms**: adapters that normalize chat messages and send replies
//! - **Pipeline**: wake detection, handler dispatch, the default LLM stage
//!   and delivery, stoppable by any handler
//! - **Handlers**: single-shot async bodies or streams of delivery actions
//! - **Plugins**: named groups of handlers and tools with a lifecycle
//! - **Runtime**: configuration, logging and the worker pool
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use nova::prelude::*;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Plugin for Hello {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new("hello", "0.1.0")
//!     }
//!
//!     fn register(self: Arc<Self>, registrar: &mut Registrar<'_>) {
//!         registrar.on(
//!             Trigger::command("helloworld"),
//!             Handler::single_shot(|event: Arc<MessageEvent>| async move {
//!                 event.set_result(format!("Hello, {}!", event.get_sender_name()));
//!             }),
//!         );
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = NovaRuntime::builder()
//!         .platform(Arc::new(MyPlatform::new()))
//!         .plugin(Arc::new(Hello))
//!         .build()
//!         .await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `command`: clap-based command argument parsing (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use nova_core as core;
pub use nova_framework as framework;
pub use nova_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use nova::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use nova_runtime::{NovaConfig, NovaRuntime};

    // Event and message model
    pub use nova_core::{
        BoxError, EventResult, ImageRef, InboundMessage, LlmRequest, LlmResponse, MessageChain,
        MessageEvent, MessageMember, MessageType, Segment, SendError, SendResult, SessionId,
    };

    // Collaborator traits for custom implementations
    pub use nova_core::{
        CancellationToken, ConversationStore, EventIngress, MessageSender, Platform, PlatformMeta,
        Provider, ProviderKind, ProviderMeta,
    };

    // Handlers and plugins
    pub use nova_framework::{
        Action, FunctionTool, Handler, MessageTypeFilter, Permission, Plugin, PluginContext,
        PluginMetadata, Registrar, Trigger,
    };

    // Structured command support (requires "command" feature)
    #[cfg(feature = "command")]
    pub use nova_framework::{parse_args, parse_command};
}
