//! A platform that reads messages from stdin and prints replies to stdout.

use std::time::Duration;

use async_trait::async_trait;
use nova::prelude::*;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Queued lines get this long to be answered after stdin closes.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Who the console user is.
#[derive(Debug, Clone)]
pub struct ConsoleIdentity {
    pub user_id: String,
    pub nickname: String,
    /// Messages are sent to this group instead of a private chat.
    pub group_id: Option<String>,
}

pub struct ConsolePlatform {
    identity: ConsoleIdentity,
}

impl ConsolePlatform {
    pub fn new(identity: ConsoleIdentity) -> Self {
        Self { identity }
    }

    fn message(&self, seq: u64, line: &str) -> InboundMessage {
        let sender = MessageMember::new(&self.identity.user_id, &self.identity.nickname);
        let message = match &self.identity.group_id {
            Some(group) => InboundMessage::new(MessageType::Group, group).with_group_id(group),
            None => InboundMessage::new(MessageType::Private, &self.identity.user_id),
        };
        message
            .with_self_id("console-bot")
            .with_message_id(format!("c{seq}"))
            .with_sender(sender)
            .with_segments(line)
            .with_timestamp(OffsetDateTime::now_utc().unix_timestamp())
    }

    async fn print(&self, line: String) -> SendResult<()> {
        let stamp = OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        let mut stdout = tokio::io::stdout();
        let written = async {
            stdout.write_all(format!("[{stamp}] {line}\n").as_bytes()).await?;
            stdout.flush().await
        };
        written
            .await
            .map_err(|e| SendError::Platform(format!("stdout: {e}")))
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    fn meta(&self) -> PlatformMeta {
        PlatformMeta::new("console")
    }

    async fn send_by_session(&self, session: &SessionId, chain: &MessageChain) -> SendResult<()> {
        self.print(format!("bot -> {}: {}", session.session_id(), chain.plain_text()))
            .await
    }

    async fn recall_message(&self, _session: &SessionId, message_id: &str) -> SendResult<()> {
        self.print(format!("(message {message_id} recalled)")).await
    }

    async fn mute_member(
        &self,
        _session: &SessionId,
        user_id: &str,
        duration: Duration,
    ) -> SendResult<()> {
        self.print(format!("({user_id} muted for {}s)", duration.as_secs()))
            .await
    }

    async fn run(
        &self,
        ingress: EventIngress,
        shutdown: CancellationToken,
    ) -> Result<(), BoxError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let meta = self.meta();
        let mut seq = 0;
        info!(user = %self.identity.user_id, "Console ready, type a message");

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            seq += 1;
            ingress.commit(self.message(seq, line), &meta).await?;
        }

        debug!("Stdin closed, shutting down");
        tokio::time::sleep(DRAIN_GRACE).await;
        shutdown.cancel();
        Ok(())
    }
}
