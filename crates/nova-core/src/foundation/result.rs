//! Outbound results.
//!
//! An [`EventResult`] is what the pipeline sends back for an event: a
//! [`MessageChain`] plus a marker for where it came from. Handlers build
//! results with the chaining helpers or the event's `*_result` builders.
//!
//! ```rust,ignore
//! let result = EventResult::new()
//!     .message("Here is the chart:")
//!     .url_image("https://example.com/chart.png");
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::message::{ImageRef, MessageChain, Segment};

/// Where a result came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Produced by a handler.
    #[default]
    General,
    /// Folded back from an LLM response.
    Llm,
}

/// The outbound message chain for an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    chain: MessageChain,
    #[serde(default)]
    kind: ResultKind,
}

impl EventResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single text component.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new().message(text)
    }

    /// A single image component.
    pub fn image(image: ImageRef) -> Self {
        Self::from(MessageChain::from(vec![Segment::Image(image)]))
    }

    /// A pre-built chain, taken wholesale.
    pub fn chain(chain: impl Into<MessageChain>) -> Self {
        Self {
            chain: chain.into(),
            kind: ResultKind::General,
        }
    }

    /// A text result marked as coming from an LLM.
    pub fn llm(text: impl Into<String>) -> Self {
        Self::plain(text).with_kind(ResultKind::Llm)
    }

    /// Appends a text component.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.chain = self.chain.message(text);
        self
    }

    /// Appends a URL image component.
    pub fn url_image(mut self, url: impl Into<String>) -> Self {
        self.chain = self.chain.url_image(url);
        self
    }

    /// Appends a local file image component.
    pub fn file_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.chain = self.chain.file_image(path);
        self
    }

    /// Appends a mention component.
    pub fn at(mut self, user_id: impl Into<String>) -> Self {
        self.chain = self.chain.at(user_id);
        self
    }

    pub fn with_kind(mut self, kind: ResultKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn is_llm_result(&self) -> bool {
        self.kind == ResultKind::Llm
    }

    pub fn message_chain(&self) -> &MessageChain {
        &self.chain
    }

    pub fn into_chain(self) -> MessageChain {
        self.chain
    }

    /// Returns `true` if there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl From<&str> for EventResult {
    fn from(text: &str) -> Self {
        Self::plain(text)
    }
}

impl From<String> for EventResult {
    fn from(text: String) -> Self {
        Self::plain(text)
    }
}

impl From<MessageChain> for EventResult {
    fn from(chain: MessageChain) -> Self {
        Self::chain(chain)
    }
}
