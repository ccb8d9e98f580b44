//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use nova_core::{
    InboundMessage, LlmRequest, LlmResponse, MessageChain, MessageEvent, MessageMember,
    MessageSender, MessageType, NullSender, PlatformMeta, Provider, ProviderError, ProviderKind,
    ProviderMeta, ProviderResult, Segment, SessionId,
};
use parking_lot::Mutex;

fn inbound(message_type: MessageType, segments: Vec<Segment>) -> InboundMessage {
    let session_id = match message_type {
        MessageType::Group => "g1",
        _ => "u1",
    };
    let mut message = InboundMessage::new(message_type, session_id)
        .with_self_id("bot")
        .with_message_id("m1")
        .with_sender(MessageMember::new("u1", "Alice"))
        .with_segments(segments);
    if message_type == MessageType::Group {
        message = message.with_group_id("g1");
    }
    message
}

/// An event from platform `test`, sent by `u1` to bot `bot`.
pub(crate) fn event_with(message_type: MessageType, segments: Vec<Segment>) -> Arc<MessageEvent> {
    event_with_sender(message_type, segments, Arc::new(NullSender))
}

pub(crate) fn event_with_sender(
    message_type: MessageType,
    segments: Vec<Segment>,
    sender: Arc<dyn MessageSender>,
) -> Arc<MessageEvent> {
    Arc::new(MessageEvent::new(
        inbound(message_type, segments),
        PlatformMeta::new("test"),
        sender,
    ))
}

pub(crate) fn private_event(text: &str) -> Arc<MessageEvent> {
    event_with(MessageType::Private, vec![Segment::text(text)])
}

pub(crate) fn group_event(text: &str) -> Arc<MessageEvent> {
    event_with(MessageType::Group, vec![Segment::text(text)])
}

/// Records every send and reports success.
#[derive(Default)]
pub(crate) struct RecordingSender {
    sent: Mutex<Vec<(SessionId, MessageChain)>>,
}

impl RecordingSender {
    pub(crate) fn sent(&self) -> Vec<(SessionId, MessageChain)> {
        self.sent.lock().clone()
    }

    /// Plain text of every sent chain, in send order.
    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|(_, chain)| chain.plain_text())
            .collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, session: &SessionId, chain: &MessageChain) -> bool {
        self.sent.lock().push((session.clone(), chain.clone()));
        true
    }
}

/// A provider answering from a queue of scripted responses.
///
/// When the queue runs dry it echoes the prompt.
pub(crate) struct ScriptedProvider {
    id: String,
    responses: Mutex<VecDeque<ProviderResult<LlmResponse>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reply(self, text: &str) -> Self {
        self.respond(LlmResponse::text(text))
    }

    pub(crate) fn respond(self, response: LlmResponse) -> Self {
        self.responses.lock().push_back(Ok(response));
        self
    }

    pub(crate) fn fail(self, error: ProviderError) -> Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta::new(self.id.clone(), "scripted", ProviderKind::Chat)
    }

    async fn text_chat(&self, request: LlmRequest) -> ProviderResult<LlmResponse> {
        let echo = format!("echo: {}", request.prompt);
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(LlmResponse::text(echo)))
    }
}
