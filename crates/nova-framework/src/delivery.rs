//! Result decoration and delivery.
//!
//! Every chain leaving the pipeline goes through [`Delivery::deliver`]: the
//! result is decorated per [`DecorateConfig`] and handed to the event's send
//! collaborator, addressed at the event's session.

use nova_core::{EventResult, MessageChain, MessageEvent, Segment};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How outbound results are decorated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorateConfig {
    /// Text put in front of the first text component.
    #[serde(default)]
    pub reply_prefix: String,

    /// Mention the sender in group chats.
    #[serde(default)]
    pub mention_sender: bool,

    /// Quote the message being answered.
    #[serde(default)]
    pub quote_message: bool,
}

/// The delivery stage.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    config: DecorateConfig,
}

impl Delivery {
    pub fn new(config: DecorateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecorateConfig {
        &self.config
    }

    /// Applies the configured decoration to a result's chain.
    pub fn decorate(&self, event: &MessageEvent, result: EventResult) -> MessageChain {
        let mut segments: Vec<Segment> = result.into_chain().into_iter().collect();

        if !self.config.reply_prefix.is_empty() {
            match segments.iter_mut().find_map(|segment| match segment {
                Segment::Text(text) => Some(text),
                _ => None,
            }) {
                Some(text) => text.insert_str(0, &self.config.reply_prefix),
                None => segments.insert(0, Segment::text(self.config.reply_prefix.clone())),
            }
        }

        let mut head = Vec::new();
        let message_id = event.message_obj().message_id();
        if self.config.quote_message && !message_id.is_empty() {
            head.push(Segment::Reply(message_id.to_string()));
        }
        if self.config.mention_sender && !event.is_private_chat() {
            head.push(Segment::at(event.get_sender_id()));
            head.push(Segment::text(" "));
        }

        head.into_iter().chain(segments).collect()
    }

    /// Sends a result to the event's session.
    ///
    /// Empty results are skipped and report `false`. Otherwise returns what
    /// the send collaborator returned.
    pub async fn deliver(&self, event: &MessageEvent, result: EventResult) -> bool {
        if result.is_empty() {
            debug!(session = %event.session(), "Skipping empty result");
            return false;
        }
        let llm = result.is_llm_result();
        let chain = self.decorate(event, result);
        let sent = event.sender().send(event.session(), &chain).await;
        if sent {
            debug!(session = %event.session(), llm, segments = chain.len(), "Result delivered");
        } else {
            warn!(session = %event.session(), "No platform serves this session, result dropped");
        }
        sent
    }
}
