//! The event object.
//!
//! A [`MessageEvent`] is one unit of pipeline work. It wraps an
//! [`InboundMessage`] together with the mutable state the pipeline stages and
//! handlers share while processing it:
//!
//! - the wake flag, set only by the wake stage
//! - the stop flag, the one cooperative cancellation primitive
//! - the default-LLM suppression flag
//! - the current [`EventResult`]
//! - a string-keyed side channel ("extras") for cross-stage data
//!
//! Events are handed to handlers as `Arc<MessageEvent>`. Every piece of state
//! belongs to exactly one pipeline run, so the locks below are never
//! contended across events.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn greet(event: Arc<MessageEvent>) {
//!     if event.is_private_chat() {
//!         event.set_result(format!("hello, {}", event.get_sender_name()));
//!         event.stop_event();
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::llm::LlmRequest;
use super::message::{ImageRef, InboundMessage, MessageChain, MessageType, Segment};
use super::result::EventResult;
use super::session::SessionId;
use crate::integration::platform::{MessageSender, PlatformMeta};

/// Role of the sender relative to the bot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

#[derive(Debug, Default)]
struct ResultSlot {
    result: Option<EventResult>,
    delivered: bool,
}

/// The mutable unit of work flowing through the pipeline.
pub struct MessageEvent {
    message: InboundMessage,
    message_str: RwLock<String>,
    session: SessionId,
    platform: PlatformMeta,
    role: RwLock<Role>,
    is_wake: AtomicBool,
    is_at_or_wake_command: AtomicBool,
    stopped: AtomicBool,
    call_llm: AtomicBool,
    result: Mutex<ResultSlot>,
    extras: Mutex<HashMap<String, Value>>,
    command_args: RwLock<Vec<String>>,
    sender: Arc<dyn MessageSender>,
}

impl MessageEvent {
    /// Wraps a normalized message received from `platform`.
    ///
    /// `sender` is the send collaborator used by [`send`](Self::send) and by
    /// the delivery stage.
    pub fn new(
        message: InboundMessage,
        platform: PlatformMeta,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let session = SessionId::new(
            platform.name.clone(),
            message.message_type(),
            message.session_id(),
        );
        Self {
            message_str: RwLock::new(message.message_str().to_string()),
            message,
            session,
            platform,
            role: RwLock::new(Role::Member),
            is_wake: AtomicBool::new(false),
            is_at_or_wake_command: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            call_llm: AtomicBool::new(false),
            result: Mutex::new(ResultSlot::default()),
            extras: Mutex::new(HashMap::new()),
            command_args: RwLock::new(Vec::new()),
            sender,
        }
    }

    // ------------------------------------------------------------------
    // Message accessors
    // ------------------------------------------------------------------

    /// The wrapped message.
    pub fn message_obj(&self) -> &InboundMessage {
        &self.message
    }

    /// The plain-text projection, after the wake stage stripped any prefix.
    pub fn message_str(&self) -> String {
        self.message_str.read().clone()
    }

    /// Replaces the cached plain-text projection.
    pub fn set_message_str(&self, message_str: impl Into<String>) {
        *self.message_str.write() = message_str.into();
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The canonical `platform:kind:id` string of the session.
    pub fn unified_msg_origin(&self) -> String {
        self.session.to_string()
    }

    pub fn platform(&self) -> &PlatformMeta {
        &self.platform
    }

    pub fn get_platform_name(&self) -> &str {
        &self.platform.name
    }

    pub fn get_sender_id(&self) -> &str {
        &self.message.sender().user_id
    }

    /// The sender's display name, or an empty string.
    pub fn get_sender_name(&self) -> &str {
        self.message.sender().nickname.as_deref().unwrap_or_default()
    }

    pub fn get_group_id(&self) -> Option<&str> {
        self.message.group_id()
    }

    pub fn get_self_id(&self) -> &str {
        self.message.self_id()
    }

    pub fn get_messages(&self) -> &[Segment] {
        self.message.segments()
    }

    pub fn get_message_type(&self) -> MessageType {
        self.message.message_type()
    }

    /// Arguments of the command that matched this event, if any.
    pub fn command_args(&self) -> Vec<String> {
        self.command_args.read().clone()
    }

    pub fn set_command_args(&self, args: Vec<String>) {
        *self.command_args.write() = args;
    }

    // ------------------------------------------------------------------
    // Predicates and role
    // ------------------------------------------------------------------

    pub fn is_wake_up(&self) -> bool {
        self.is_wake.load(Ordering::SeqCst)
    }

    /// Sets the wake flag. Only the wake stage should call this.
    pub fn set_wake(&self, wake: bool) {
        self.is_wake.store(wake, Ordering::SeqCst);
    }

    /// Whether the bot was addressed directly (prefix, mention or private chat).
    pub fn is_at_or_wake_command(&self) -> bool {
        self.is_at_or_wake_command.load(Ordering::SeqCst)
    }

    pub fn set_at_or_wake_command(&self, value: bool) {
        self.is_at_or_wake_command.store(value, Ordering::SeqCst);
    }

    pub fn is_private_chat(&self) -> bool {
        self.message.message_type() == MessageType::Private
    }

    pub fn is_admin(&self) -> bool {
        *self.role.read() == Role::Admin
    }

    pub fn role(&self) -> Role {
        *self.role.read()
    }

    pub fn set_role(&self, role: Role) {
        *self.role.write() = role;
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Stops the event. Handlers after the current one are skipped.
    pub fn stop_event(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Clears the stop flag.
    ///
    /// Has no effect on a pipeline run that has already observed the flag
    /// and terminated.
    pub fn continue_event(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Result
    // ------------------------------------------------------------------

    /// Replaces the current result. Accepts a string or a built result.
    pub fn set_result(&self, result: impl Into<EventResult>) {
        let mut slot = self.result.lock();
        slot.result = Some(result.into());
        slot.delivered = false;
    }

    pub fn get_result(&self) -> Option<EventResult> {
        self.result.lock().result.clone()
    }

    pub fn clear_result(&self) {
        let mut slot = self.result.lock();
        slot.result = None;
        slot.delivered = false;
    }

    /// Returns the current result if it is non-empty and not yet delivered,
    /// and marks it delivered.
    pub fn claim_undelivered_result(&self) -> Option<EventResult> {
        let mut slot = self.result.lock();
        if slot.delivered {
            return None;
        }
        let result = slot.result.as_ref().filter(|r| !r.is_empty())?.clone();
        slot.delivered = true;
        Some(result)
    }

    // ------------------------------------------------------------------
    // Extras
    // ------------------------------------------------------------------

    pub fn set_extra(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.extras.lock().insert(key.into(), value.into());
    }

    pub fn get_extra(&self, key: &str) -> Option<Value> {
        self.extras.lock().get(key).cloned()
    }

    /// Live view of the whole side channel.
    ///
    /// Writes through the guard are visible to every later stage. Do not hold
    /// the guard across an `.await`.
    pub fn extras(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.extras.lock()
    }

    pub fn clear_extra(&self) {
        self.extras.lock().clear();
    }

    // ------------------------------------------------------------------
    // LLM
    // ------------------------------------------------------------------

    /// Sets the default-LLM suppression flag. `true` suppresses the default
    /// LLM stage; handler-initiated requests are unaffected.
    pub fn should_call_llm(&self, suppress: bool) {
        self.call_llm.store(suppress, Ordering::SeqCst);
    }

    pub fn is_default_llm_suppressed(&self) -> bool {
        self.call_llm.load(Ordering::SeqCst)
    }

    /// Starts an LLM request for this event's session. Nothing happens until
    /// the request is yielded to or run by the orchestrator.
    pub fn request_llm(&self, prompt: impl Into<String>) -> LlmRequest {
        LlmRequest::new(prompt).session(self.session.clone())
    }

    // ------------------------------------------------------------------
    // Result builders
    // ------------------------------------------------------------------

    pub fn make_result(&self) -> EventResult {
        EventResult::new()
    }

    pub fn plain_result(&self, text: impl Into<String>) -> EventResult {
        EventResult::plain(text)
    }

    /// An image result. URLs, `base64://` data and local paths are accepted.
    pub fn image_result(&self, reference: impl Into<String>) -> EventResult {
        EventResult::image(ImageRef::parse(reference))
    }

    pub fn chain_result(&self, chain: impl Into<MessageChain>) -> EventResult {
        EventResult::chain(chain)
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Sends a chain to this event's session right away.
    ///
    /// Returns `false` if no platform serves the session.
    pub async fn send(&self, chain: impl Into<MessageChain>) -> bool {
        let chain = chain.into();
        self.sender.send(&self.session, &chain).await
    }

    /// The send collaborator this event delivers through.
    pub fn sender(&self) -> &Arc<dyn MessageSender> {
        &self.sender
    }
}

impl fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("session", &self.session)
            .field("message_str", &*self.message_str.read())
            .field("is_wake", &self.is_wake_up())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
