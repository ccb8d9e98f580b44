//! Foundation layer - the data model of one pipeline run.
//!
//! - Message model and message chains
//! - Session identity
//! - The event object and its result
//! - LLM request and response types

pub mod error;
pub mod event;
pub mod llm;
pub mod message;
pub mod result;
pub mod session;

pub use error::{
    BoxError, ConversationError, ConversationResult, IngestError, ProviderError, ProviderResult,
    SendError, SendResult, SessionParseError,
};
pub use event::{MessageEvent, Role};
pub use llm::{
    ChatRole, ContextMessage, Conversation, LlmRequest, LlmResponse, ToolCall, ToolSet, ToolSpec,
};
pub use message::{ImageRef, InboundMessage, MessageChain, MessageMember, MessageType, Segment};
pub use result::{EventResult, ResultKind};
pub use session::SessionId;
