//! Canonical conversation addressing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SessionParseError;
use super::message::MessageType;

/// Identifies one conversation on one platform.
///
/// Serialized canonically as `platform:kind:id`, for example
/// `aiocqhttp:GroupMessage:123456`. Two sessions are equal iff all three
/// parts are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId {
    platform: String,
    message_type: MessageType,
    session_id: String,
}

impl SessionId {
    pub fn new(
        platform: impl Into<String>,
        message_type: MessageType,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            message_type,
            session_id: session_id.into(),
        }
    }

    /// Name of the platform serving this session.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The platform-local id (group id or user id).
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.platform, self.message_type, self.session_id)
    }
}

impl FromStr for SessionId {
    type Err = SessionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(platform), Some(kind), Some(id))
                if !platform.is_empty() && !id.is_empty() =>
            {
                Ok(Self::new(platform, kind.parse()?, id))
            }
            _ => Err(SessionParseError::Malformed(s.to_string())),
        }
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(session: SessionId) -> Self {
        session.to_string()
    }
}
