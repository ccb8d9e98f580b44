//! Integration layer - the collaborators the pipeline talks to.
//!
//! - Platform adapters and the send collaborator
//! - The ingestion queue
//! - Provider interfaces and registry
//! - Conversation storage

pub mod conversation;
pub mod platform;
pub mod provider;
pub mod queue;

pub use conversation::{ConversationStore, MemoryConversationStore};
pub use platform::{
    BoxedPlatform, MessageSender, NullSender, Platform, PlatformManager, PlatformMeta,
};
pub use provider::{
    Provider, ProviderKind, ProviderMeta, ProviderRegistry, SttProvider, TtsProvider,
};
pub use queue::{EventIngress, EventQueue, EventReceiver};
