//! Unified error types for the Nova core.
//!
//! Framework-level errors (orchestration, command parsing) are defined in
//! `nova-framework`; runtime and configuration errors in `nova-runtime`.

use thiserror::Error;

/// Boxed error type returned by handler bodies and tool callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Session Errors
// =============================================================================

/// Errors produced when parsing a canonical `platform:kind:id` session string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionParseError {
    /// The string did not have three `:`-separated parts.
    #[error("malformed session '{0}', expected 'platform:kind:id'")]
    Malformed(String),

    /// The message kind part was not recognised.
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),
}

// =============================================================================
// Send Errors
// =============================================================================

/// Errors reported by a platform when sending or performing an action.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The platform is known but currently has no live connection.
    #[error("platform '{0}' is not connected")]
    NotConnected(String),

    /// The platform does not support the requested action.
    #[error("'{action}' is not supported by platform '{platform}'")]
    Unsupported {
        /// Platform name.
        platform: String,
        /// The action that was attempted.
        action: &'static str,
    },

    /// The platform rejected the request.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Result type for platform actions.
pub type SendResult<T> = Result<T, SendError>;

// =============================================================================
// Provider Errors
// =============================================================================

/// Errors surfaced by LLM, TTS and STT providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider could not be reached.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// The provider answered with something that could not be interpreted.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// The call did not finish in time.
    #[error("provider call timed out after {0} seconds")]
    Timeout(u64),

    /// Any other provider failure.
    #[error("{0}")]
    Other(String),
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

// =============================================================================
// Conversation Errors
// =============================================================================

/// Errors reported by a conversation store.
#[derive(Debug, Clone, Error)]
pub enum ConversationError {
    /// No conversation with the given id exists.
    #[error("conversation '{0}' not found")]
    NotFound(String),

    /// The backing storage failed.
    #[error("conversation storage error: {0}")]
    Storage(String),
}

/// Result type for conversation store operations.
pub type ConversationResult<T> = Result<T, ConversationError>;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors returned when committing an event to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The queue is at capacity.
    #[error("event queue is full")]
    QueueFull,

    /// Every receiver has been dropped.
    #[error("event queue is closed")]
    QueueClosed,
}
