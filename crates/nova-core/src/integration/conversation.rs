//! Conversation store interface and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::foundation::error::{ConversationError, ConversationResult};
use crate::foundation::llm::{ContextMessage, Conversation};
use crate::foundation::session::SessionId;

/// Stores conversations and their history, keyed by conversation id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The conversation currently selected for a session, if any.
    async fn current_conversation(&self, session: &SessionId) -> Option<Conversation>;

    /// Creates a conversation for a session and makes it current.
    async fn new_conversation(&self, session: &SessionId) -> ConversationResult<Conversation>;

    /// The current conversation of a session, created if there is none.
    ///
    /// Concurrent calls for one session must agree on a single conversation.
    async fn get_or_create_conversation(
        &self,
        session: &SessionId,
    ) -> ConversationResult<Conversation>;

    /// The stored history of a conversation, oldest first.
    async fn history(&self, cid: &str) -> ConversationResult<Vec<ContextMessage>>;

    /// Appends one prompt/response exchange to a conversation.
    async fn append_exchange(
        &self,
        cid: &str,
        user: ContextMessage,
        assistant: ContextMessage,
    ) -> ConversationResult<()>;
}

struct StoredConversation {
    conversation: Conversation,
    history: Vec<ContextMessage>,
}

/// A [`ConversationStore`] that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, StoredConversation>>,
    current: RwLock<HashMap<SessionId, String>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a conversation to a specific provider.
    pub fn set_provider(&self, cid: &str, provider_id: Option<String>) -> ConversationResult<()> {
        let mut conversations = self.conversations.write();
        let stored = conversations
            .get_mut(cid)
            .ok_or_else(|| ConversationError::NotFound(cid.to_string()))?;
        stored.conversation.provider_id = provider_id;
        Ok(())
    }

    /// Lock order is `current` before `conversations`.
    fn create_current(
        &self,
        current: &mut HashMap<SessionId, String>,
        session: &SessionId,
    ) -> Conversation {
        let conversation = Conversation {
            cid: Uuid::new_v4().to_string(),
            session: session.clone(),
            provider_id: None,
            title: None,
        };
        self.conversations.write().insert(
            conversation.cid.clone(),
            StoredConversation {
                conversation: conversation.clone(),
                history: Vec::new(),
            },
        );
        current.insert(session.clone(), conversation.cid.clone());
        conversation
    }

    /// Replaces the history of a conversation.
    pub fn set_history(&self, cid: &str, history: Vec<ContextMessage>) -> ConversationResult<()> {
        let mut conversations = self.conversations.write();
        let stored = conversations
            .get_mut(cid)
            .ok_or_else(|| ConversationError::NotFound(cid.to_string()))?;
        stored.history = history;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn current_conversation(&self, session: &SessionId) -> Option<Conversation> {
        let cid = self.current.read().get(session).cloned()?;
        self.conversations
            .read()
            .get(&cid)
            .map(|stored| stored.conversation.clone())
    }

    async fn new_conversation(&self, session: &SessionId) -> ConversationResult<Conversation> {
        let mut current = self.current.write();
        Ok(self.create_current(&mut current, session))
    }

    async fn get_or_create_conversation(
        &self,
        session: &SessionId,
    ) -> ConversationResult<Conversation> {
        // `current` stays locked from lookup to insert.
        let mut current = self.current.write();
        if let Some(cid) = current.get(session)
            && let Some(stored) = self.conversations.read().get(cid)
        {
            return Ok(stored.conversation.clone());
        }
        Ok(self.create_current(&mut current, session))
    }

    async fn history(&self, cid: &str) -> ConversationResult<Vec<ContextMessage>> {
        self.conversations
            .read()
            .get(cid)
            .map(|stored| stored.history.clone())
            .ok_or_else(|| ConversationError::NotFound(cid.to_string()))
    }

    async fn append_exchange(
        &self,
        cid: &str,
        user: ContextMessage,
        assistant: ContextMessage,
    ) -> ConversationResult<()> {
        let mut conversations = self.conversations.write();
        let stored = conversations
            .get_mut(cid)
            .ok_or_else(|| ConversationError::NotFound(cid.to_string()))?;
        stored.history.push(user);
        stored.history.push(assistant);
        Ok(())
    }
}
