//! Provider-agnostic LLM request and response types.
//!
//! An [`LlmRequest`] is built fresh for every call, usually through
//! `MessageEvent::request_llm`, and handed to the orchestrator unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::ImageRef;
use super::session::SessionId;

// ============================================================================
// Context messages
// ============================================================================

/// Role of a message in an LLM context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back with the tool output.
    pub id: String,
    /// Name of the tool to run.
    pub name: String,
    /// JSON arguments for the tool.
    pub arguments: Value,
}

/// One message of conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ContextMessage {
    fn with_role(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content)
    }

    /// An assistant turn that requested tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(ChatRole::Assistant, content)
        }
    }

    /// The output of one tool call.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::with_role(ChatRole::Tool, content)
        }
    }
}

// ============================================================================
// Tools
// ============================================================================

/// The declaration of a function tool as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// The set of tools offered to the model for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolSet {
    tools: Vec<ToolSpec>,
}

impl ToolSet {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Conversation binding
// ============================================================================

/// A stored conversation a request can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id, unique within the store.
    pub cid: String,
    /// Session the conversation belongs to.
    pub session: SessionId,
    /// Provider bound to this conversation, overriding the default.
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Optional human readable title.
    #[serde(default)]
    pub title: Option<String>,
}

// ============================================================================
// Request
// ============================================================================

/// A provider-agnostic text generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The user prompt.
    pub prompt: String,
    /// Tools the model may call.
    #[serde(default)]
    pub func_tool: Option<ToolSet>,
    /// Images passed through to the provider as-is.
    #[serde(default)]
    pub image_urls: Vec<ImageRef>,
    /// Explicit context. `Some` replaces the conversation history, even when
    /// empty; `None` falls back to the bound conversation.
    #[serde(default)]
    pub contexts: Option<Vec<ContextMessage>>,
    /// System prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Conversation binding.
    #[serde(default)]
    pub conversation: Option<Conversation>,
    /// Session the request originates from.
    #[serde(default)]
    pub session: Option<SessionId>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn func_tool(mut self, tools: ToolSet) -> Self {
        self.func_tool = Some(tools);
        self
    }

    pub fn image_urls(mut self, images: impl IntoIterator<Item = ImageRef>) -> Self {
        self.image_urls = images.into_iter().collect();
        self
    }

    pub fn contexts(mut self, contexts: Vec<ContextMessage>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }
}

// ============================================================================
// Response
// ============================================================================

/// A provider's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub role: ChatRole,
    pub completion_text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Raw provider payload, kept for debugging.
    #[serde(default)]
    pub raw: Option<Value>,
}

impl LlmResponse {
    /// A plain assistant answer.
    pub fn text(completion_text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            completion_text: completion_text.into(),
            tool_calls: Vec::new(),
            raw: None,
        }
    }

    /// An assistant turn asking for tool calls.
    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::text("")
        }
    }
}
