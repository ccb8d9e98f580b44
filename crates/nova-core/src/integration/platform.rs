//! Platform adapters and the send collaborator.
//!
//! A [`Platform`] is an adapter that turns a chat protocol into normalized
//! [`InboundMessage`](crate::InboundMessage)s and back. Nova only talks to it
//! through this trait. The [`PlatformManager`] routes outbound chains to the
//! platform serving a session and is the default [`MessageSender`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::EventIngress;
use crate::foundation::error::{BoxError, SendError, SendResult};
use crate::foundation::message::MessageChain;
use crate::foundation::session::SessionId;

// ============================================================================
// Platform metadata
// ============================================================================

/// Describes the platform an event came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMeta {
    /// Platform name, the first part of every session id it serves.
    pub name: String,
    /// Instance id, for deployments with several accounts on one platform.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl PlatformMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Send collaborator
// ============================================================================

/// Delivers a chain to a session.
///
/// Fire-and-confirm: the return value says whether a platform serving the
/// session was found, not whether the remote party received anything.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, session: &SessionId, chain: &MessageChain) -> bool;
}

/// A sender with no platforms behind it. Every send returns `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSender;

#[async_trait]
impl MessageSender for NullSender {
    async fn send(&self, session: &SessionId, _chain: &MessageChain) -> bool {
        debug!(session = %session, "No platform attached, dropping message");
        false
    }
}

// ============================================================================
// Platform trait
// ============================================================================

/// A chat platform adapter.
///
/// Only [`meta`](Self::meta) and [`send_by_session`](Self::send_by_session)
/// are required. Adapters that pull messages implement [`run`](Self::run);
/// push-based adapters commit to an ingress handle they were given elsewhere.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Returns this platform's metadata. `meta().name` must be stable.
    fn meta(&self) -> PlatformMeta;

    /// Sends a chain to a session served by this platform.
    async fn send_by_session(&self, session: &SessionId, chain: &MessageChain) -> SendResult<()>;

    /// Recalls (deletes) a message.
    async fn recall_message(&self, _session: &SessionId, _message_id: &str) -> SendResult<()> {
        Err(SendError::Unsupported {
            platform: self.meta().name,
            action: "recall_message",
        })
    }

    /// Mutes a group member.
    async fn mute_member(
        &self,
        _session: &SessionId,
        _user_id: &str,
        _duration: Duration,
    ) -> SendResult<()> {
        Err(SendError::Unsupported {
            platform: self.meta().name,
            action: "mute_member",
        })
    }

    /// Receives messages until `shutdown` fires, committing each to `ingress`.
    async fn run(
        &self,
        _ingress: EventIngress,
        shutdown: CancellationToken,
    ) -> Result<(), BoxError> {
        shutdown.cancelled().await;
        Ok(())
    }
}

/// A shared platform trait object.
pub type BoxedPlatform = Arc<dyn Platform>;

// ============================================================================
// Platform manager
// ============================================================================

/// Registry of running platforms, keyed by platform name.
#[derive(Default)]
pub struct PlatformManager {
    platforms: RwLock<HashMap<String, BoxedPlatform>>,
}

impl PlatformManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a platform, replacing any platform with the same name.
    pub fn register(&self, platform: BoxedPlatform) {
        let name = platform.meta().name;
        if self.platforms.write().insert(name.clone(), platform).is_some() {
            warn!(platform = %name, "Platform replaced");
        } else {
            info!(platform = %name, "Platform registered");
        }
    }

    /// Removes a platform. Returns `false` if it was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.platforms.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<BoxedPlatform> {
        self.platforms.read().get(name).cloned()
    }

    pub fn all(&self) -> Vec<BoxedPlatform> {
        self.platforms.read().values().cloned().collect()
    }

    /// Tries to recall a message. Returns `false` when no platform serves the
    /// session or the platform could not do it.
    pub async fn recall(&self, session: &SessionId, message_id: &str) -> bool {
        let Some(platform) = self.get(session.platform()) else {
            return false;
        };
        match platform.recall_message(session, message_id).await {
            Ok(()) => true,
            Err(e) => {
                debug!(session = %session, error = %e, "Recall failed");
                false
            }
        }
    }

    /// Tries to mute a member. Same return semantics as [`recall`](Self::recall).
    pub async fn mute(&self, session: &SessionId, user_id: &str, duration: Duration) -> bool {
        let Some(platform) = self.get(session.platform()) else {
            return false;
        };
        match platform.mute_member(session, user_id, duration).await {
            Ok(()) => true,
            Err(e) => {
                debug!(session = %session, error = %e, "Mute failed");
                false
            }
        }
    }
}

#[async_trait]
impl MessageSender for PlatformManager {
    async fn send(&self, session: &SessionId, chain: &MessageChain) -> bool {
        let Some(platform) = self.get(session.platform()) else {
            debug!(session = %session, "No platform serves session");
            return false;
        };
        if let Err(e) = platform.send_by_session(session, chain).await {
            warn!(session = %session, error = %e, "Platform failed to send message");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageType;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPlatform {
        sent: Mutex<Vec<(SessionId, MessageChain)>>,
    }

    #[async_trait]
    impl Platform for RecordingPlatform {
        fn meta(&self) -> PlatformMeta {
            PlatformMeta::new("mock")
        }

        async fn send_by_session(
            &self,
            session: &SessionId,
            chain: &MessageChain,
        ) -> SendResult<()> {
            self.sent.lock().push((session.clone(), chain.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_routes_by_platform_name() {
        let manager = PlatformManager::new();
        let platform = Arc::new(RecordingPlatform::default());
        manager.register(platform.clone());

        let served = SessionId::new("mock", MessageType::Group, "1");
        let unserved = SessionId::new("other", MessageType::Group, "1");

        assert!(manager.send(&served, &MessageChain::from("hi")).await);
        assert!(!manager.send(&unserved, &MessageChain::from("hi")).await);
        assert_eq!(platform.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_optional_capabilities_default_to_unsupported() {
        let manager = PlatformManager::new();
        manager.register(Arc::new(RecordingPlatform::default()));
        let session = SessionId::new("mock", MessageType::Group, "1");

        assert!(!manager.recall(&session, "m1").await);
        assert!(!manager.mute(&session, "u1", Duration::from_secs(60)).await);
    }

    #[test]
    fn test_unregister() {
        let manager = PlatformManager::new();
        manager.register(Arc::new(RecordingPlatform::default()));
        assert!(manager.unregister("mock"));
        assert!(!manager.unregister("mock"));
        assert!(manager.get("mock").is_none());
    }
}
