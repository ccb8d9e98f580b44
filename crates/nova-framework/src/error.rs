//! Error types for the Nova framework.

use nova_core::{ConversationError, ProviderError};
use thiserror::Error;

/// Errors surfaced by the LLM orchestrator.
///
/// The pipeline treats every variant as a non-fatal stage failure.
#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    /// No provider is configured at all.
    #[error("no text generation provider is available")]
    NoProvider,

    /// A conversation is bound to a provider that does not exist.
    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    /// The provider call failed.
    #[error("provider '{provider}' failed: {source}")]
    Provider {
        /// Id of the provider that failed.
        provider: String,
        #[source]
        source: ProviderError,
    },

    /// The provider answered with neither text nor tool calls.
    #[error("provider '{0}' returned an empty response")]
    MalformedResponse(String),

    /// The model kept requesting tools past the configured limit.
    #[error("tool call rounds exceeded the limit of {0}")]
    ToolRoundsExceeded(usize),

    /// The conversation store failed while resolving context.
    #[error("conversation store error: {0}")]
    Conversation(#[from] ConversationError),
}

/// Result type for orchestration.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Errors produced when parsing command arguments.
#[cfg(feature = "command")]
#[derive(Debug, Error)]
pub enum CommandError {
    /// The arguments did not parse. The message is the rendered clap output,
    /// suitable for sending back to the user.
    #[error("{0}")]
    Parse(String),

    /// The user asked for help or the version.
    #[error("{0}")]
    Help(String),
}
