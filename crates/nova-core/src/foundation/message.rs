//! Normalized message model.
//!
//! Platform adapters translate their wire formats into the types in this
//! module before anything else in Nova sees a message:
//!
//! - [`Segment`]: a single unit of content (text, image, mention, ...)
//! - [`MessageChain`]: an ordered, append-only sequence of segments
//! - [`InboundMessage`]: one received message with sender and routing data
//!
//! # Example
//!
//! ```rust,ignore
//! use nova_core::{InboundMessage, MessageChain, MessageType};
//!
//! let chain = MessageChain::new().message("hello ").at("10001");
//! let message = InboundMessage::new(MessageType::Group, "group-42")
//!     .with_self_id("10001")
//!     .with_group_id("group-42")
//!     .with_segments(chain);
//!
//! assert_eq!(message.message_str(), "hello ");
//! ```

use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SessionParseError;

// ============================================================================
// Message Type
// ============================================================================

/// The kind of conversation a message was received in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A multi-user group chat.
    #[serde(rename = "GroupMessage")]
    Group,
    /// A one-to-one chat with the bot.
    #[serde(rename = "FriendMessage")]
    Private,
    /// Anything else the platform reports (channels, system notices, ...).
    #[serde(rename = "OtherMessage")]
    Other,
}

impl MessageType {
    /// Returns the canonical name used in session identifiers.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Group => "GroupMessage",
            MessageType::Private => "FriendMessage",
            MessageType::Other => "OtherMessage",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = SessionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groupmessage" | "group" => Ok(MessageType::Group),
            "friendmessage" | "friend" | "private" => Ok(MessageType::Private),
            "othermessage" | "other" => Ok(MessageType::Other),
            _ => Err(SessionParseError::UnknownMessageType(s.to_string())),
        }
    }
}

// ============================================================================
// Image references
// ============================================================================

/// Where an image lives. Nova never fetches or validates these itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageRef {
    /// A remote `http(s)` URL.
    Url(String),
    /// A path on the local filesystem.
    File(PathBuf),
    /// Inline base64 data, without the `base64://` scheme.
    Base64(String),
}

impl ImageRef {
    /// Classifies a raw reference string.
    ///
    /// `http://` and `https://` become [`ImageRef::Url`], `base64://` becomes
    /// [`ImageRef::Base64`] and everything else is treated as a local path.
    pub fn parse(reference: impl Into<String>) -> Self {
        let reference = reference.into();
        if reference.starts_with("http://") || reference.starts_with("https://") {
            ImageRef::Url(reference)
        } else if let Some(data) = reference.strip_prefix("base64://") {
            ImageRef::Base64(data.to_string())
        } else {
            ImageRef::File(PathBuf::from(reference))
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Url(url) => f.write_str(url),
            ImageRef::File(path) => write!(f, "file://{}", path.display()),
            ImageRef::Base64(_) => f.write_str("base64://..."),
        }
    }
}

// ============================================================================
// Segment
// ============================================================================

/// A single component of a message. Order within a chain is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text.
    Text(String),
    /// An image.
    Image(ImageRef),
    /// A mention of a user, by platform user id.
    At(String),
    /// A quote of an earlier message, by message id.
    Reply(String),
    /// A platform-specific component Nova does not model.
    Other {
        /// Platform type name of the component.
        kind: String,
        /// Raw component payload.
        data: Value,
    },
}

impl Segment {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(text.into())
    }

    /// Creates an image segment from a raw reference, see [`ImageRef::parse`].
    pub fn image(reference: impl Into<String>) -> Self {
        Segment::Image(ImageRef::parse(reference))
    }

    /// Creates a mention segment.
    pub fn at(user_id: impl Into<String>) -> Self {
        Segment::At(user_id.into())
    }

    /// Returns the type identifier of this segment.
    pub fn segment_type(&self) -> &str {
        match self {
            Segment::Text(_) => "text",
            Segment::Image(_) => "image",
            Segment::At(_) => "at",
            Segment::Reply(_) => "reply",
            Segment::Other { kind, .. } => kind,
        }
    }

    /// Returns the text content if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the image reference if this is an image segment.
    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            Segment::Image(image) => Some(image),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text(text) => f.write_str(text),
            Segment::Image(image) => write!(f, "[image:{image}]"),
            Segment::At(user_id) => write!(f, "[at:{user_id}]"),
            Segment::Reply(message_id) => write!(f, "[reply:{message_id}]"),
            Segment::Other { kind, .. } => write!(f, "[{kind}]"),
        }
    }
}

// ============================================================================
// Message Chain
// ============================================================================

/// An ordered, append-only sequence of [`Segment`]s.
///
/// Chains are built with the chaining helpers and read through `Deref` to a
/// slice. Segments cannot be removed or reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageChain {
    segments: Vec<Segment>,
}

impl MessageChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text segment.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.segments.push(Segment::text(text));
        self
    }

    /// Appends an image segment pointing at a URL.
    pub fn url_image(mut self, url: impl Into<String>) -> Self {
        self.segments.push(Segment::Image(ImageRef::Url(url.into())));
        self
    }

    /// Appends an image segment pointing at a local file.
    pub fn file_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.segments.push(Segment::Image(ImageRef::File(path.into())));
        self
    }

    /// Appends an inline base64 image segment.
    pub fn base64_image(mut self, data: impl Into<String>) -> Self {
        self.segments.push(Segment::Image(ImageRef::Base64(data.into())));
        self
    }

    /// Appends a mention segment.
    pub fn at(mut self, user_id: impl Into<String>) -> Self {
        self.segments.push(Segment::at(user_id));
        self
    }

    /// Appends an arbitrary segment.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Returns the segments as a slice.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Concatenates the content of all text segments.
    pub fn plain_text(&self) -> String {
        self.segments.iter().filter_map(Segment::as_text).collect()
    }

    /// Returns an iterator over the image references in the chain.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.segments.iter().filter_map(Segment::as_image)
    }
}

impl Deref for MessageChain {
    type Target = [Segment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

impl fmt::Display for MessageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<Segment>> for MessageChain {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl From<&str> for MessageChain {
    fn from(text: &str) -> Self {
        Self::new().message(text)
    }
}

impl From<String> for MessageChain {
    fn from(text: String) -> Self {
        Self::new().message(text)
    }
}

impl FromIterator<Segment> for MessageChain {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for MessageChain {
    type Item = Segment;
    type IntoIter = std::vec::IntoIter<Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.into_iter()
    }
}

impl<'a> IntoIterator for &'a MessageChain {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

// ============================================================================
// Inbound Message
// ============================================================================

/// The sender of an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMember {
    /// Platform user id.
    pub user_id: String,
    /// Display name, when the platform provides one.
    #[serde(default)]
    pub nickname: Option<String>,
}

impl MessageMember {
    /// Creates a sender with an id and a display name.
    pub fn new(user_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            nickname: Some(nickname.into()),
        }
    }
}

/// One normalized inbound message.
///
/// Built by a platform adapter through the `with_*` methods and read-only
/// afterwards: the owning event only ever hands out shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    message_type: MessageType,
    self_id: String,
    session_id: String,
    message_id: String,
    group_id: Option<String>,
    sender: MessageMember,
    segments: MessageChain,
    message_str: String,
    raw: Value,
    timestamp: i64,
}

impl InboundMessage {
    /// Starts a message of the given kind for a platform-local session id.
    pub fn new(message_type: MessageType, session_id: impl Into<String>) -> Self {
        Self {
            message_type,
            self_id: String::new(),
            session_id: session_id.into(),
            message_id: String::new(),
            group_id: None,
            sender: MessageMember::default(),
            segments: MessageChain::new(),
            message_str: String::new(),
            raw: Value::Null,
            timestamp: 0,
        }
    }

    /// Sets the bot's own id on the platform.
    pub fn with_self_id(mut self, self_id: impl Into<String>) -> Self {
        self.self_id = self_id.into();
        self
    }

    /// Sets the platform message id.
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    /// Sets the group id. Private messages leave it unset.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets the sender.
    pub fn with_sender(mut self, sender: MessageMember) -> Self {
        self.sender = sender;
        self
    }

    /// Sets the content and recomputes the plain-text projection.
    pub fn with_segments(mut self, segments: impl Into<MessageChain>) -> Self {
        self.segments = segments.into();
        self.message_str = self.segments.plain_text();
        self
    }

    /// Overrides the plain-text projection, for platforms that provide one.
    pub fn with_message_str(mut self, message_str: impl Into<String>) -> Self {
        self.message_str = message_str.into();
        self
    }

    /// Attaches the raw platform payload.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Sets the receipt time as unix seconds.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn sender(&self) -> &MessageMember {
        &self.sender
    }

    pub fn segments(&self) -> &MessageChain {
        &self.segments
    }

    /// The plain-text projection of the content.
    pub fn message_str(&self) -> &str {
        &self.message_str
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_parse_accepts_aliases() {
        assert_eq!("GroupMessage".parse::<MessageType>().unwrap(), MessageType::Group);
        assert_eq!("group".parse::<MessageType>().unwrap(), MessageType::Group);
        assert_eq!("private".parse::<MessageType>().unwrap(), MessageType::Private);
        assert_eq!("FriendMessage".parse::<MessageType>().unwrap(), MessageType::Private);
        assert!("channel".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_image_ref_parse() {
        assert_eq!(
            ImageRef::parse("https://example.com/a.png"),
            ImageRef::Url("https://example.com/a.png".into())
        );
        assert_eq!(ImageRef::parse("base64://AAAA"), ImageRef::Base64("AAAA".into()));
        assert_eq!(
            ImageRef::parse("/tmp/a.png"),
            ImageRef::File(PathBuf::from("/tmp/a.png"))
        );
    }

    #[test]
    fn test_chain_preserves_order() {
        let chain = MessageChain::new()
            .message("a")
            .url_image("https://example.com/x.png")
            .at("42")
            .message("b");

        let kinds: Vec<_> = chain.iter().map(Segment::segment_type).collect();
        assert_eq!(kinds, vec!["text", "image", "at", "text"]);
        assert_eq!(chain.plain_text(), "ab");
        assert_eq!(chain.images().count(), 1);
    }

    #[test]
    fn test_inbound_message_projection() {
        let message = InboundMessage::new(MessageType::Private, "u1")
            .with_sender(MessageMember::new("u1", "Alice"))
            .with_segments(vec![Segment::text("hello"), Segment::image("pic.png")]);

        assert_eq!(message.message_str(), "hello");
        assert_eq!(message.group_id(), None);
        assert_eq!(message.segments().len(), 2);
        assert_eq!(message.sender().nickname.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_segment_serde_shape() {
        let json = serde_json::to_value(Segment::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "data": "hi"}));
    }
}
