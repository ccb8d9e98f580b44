//! # Nova Core
//!
//! The event model of the Nova bot pipeline.
//!
//! This crate defines what flows through the pipeline and the narrow
//! interfaces to everything outside it. Handler dispatch and the pipeline
//! itself live in `nova-framework`.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Message Model**: [`InboundMessage`], [`Segment`], [`MessageChain`]
//! - **Session Identity**: [`SessionId`]
//! - **Event Object**: [`MessageEvent`] with wake, stop, result and extras
//! - **Results**: [`EventResult`]
//! - **LLM types**: [`LlmRequest`], [`LlmResponse`], [`ContextMessage`]
//!
//! ### Integration Layer
//!
//! - **Platforms**: [`Platform`], [`PlatformManager`], [`MessageSender`]
//! - **Ingestion**: [`EventQueue`], [`EventIngress`], [`EventReceiver`]
//! - **Providers**: [`Provider`], [`ProviderRegistry`]
//! - **Conversations**: [`ConversationStore`], [`MemoryConversationStore`]
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐     ┌─────────────┐     ┌──────────────┐     ┌──────────┐
//! │ Platform │────▶│ EventIngress│────▶│ MessageEvent │────▶│ Pipeline │
//! └──────────┘     └─────────────┘     └──────────────┘     └──────────┘
//!       ▲                                                        │
//!       └────────────────── MessageSender::send ◀────────────────┘
//! ```

pub mod foundation;
pub mod integration;

pub use foundation::{
    BoxError, ChatRole, ContextMessage, Conversation, ConversationError, ConversationResult,
    EventResult, ImageRef, InboundMessage, IngestError, LlmRequest, LlmResponse, MessageChain,
    MessageEvent, MessageMember, MessageType, ProviderError, ProviderResult, ResultKind, Role,
    Segment, SendError, SendResult, SessionId, SessionParseError, ToolCall, ToolSet, ToolSpec,
};

pub use integration::{
    BoxedPlatform, ConversationStore, EventIngress, EventQueue, EventReceiver,
    MemoryConversationStore, MessageSender, NullSender, Platform, PlatformManager, PlatformMeta,
    Provider, ProviderKind, ProviderMeta, ProviderRegistry, SttProvider, TtsProvider,
};

/// Passed to [`Platform::run`] to signal shutdown.
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::integration::{
        ConversationStore, MessageSender, Platform, PlatformMeta, Provider, ProviderRegistry,
    };
}
