//! # Spam Detector
//!
//! Flags promotional messages in group chats with an LLM.
//!
//! Every group message not covered by a whitelist is classified by the text
//! provider, with images described by the vision provider first. A hit is
//! reported to the admin group together with the sender's recent messages,
//! then recalled, optionally muted, and answered with an alert.
//!
//! ## Commands
//!
//! - `/spam_whitelist add|remove|list` (admins): edits the user whitelist
//!   for the lifetime of the process
//! - `/spam_test <text>` (admins): classifies `text` without side effects
//!
//! ## Configuration
//!
//! Read from the `plugins.spam_detector` section, see
//! [`SpamDetectorConfig`].

mod classifier;
mod config;
mod history;

pub use classifier::{SpamClassifier, build_prompt, is_spam_verdict};
pub use config::SpamDetectorConfig;
pub use history::{MessageHistory, RETENTION};

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use nova_core::{BoxError, EventResult, ImageRef, MessageEvent, Segment, SessionId};
use nova_framework::{
    Handler, MessageTypeFilter, Permission, Plugin, PluginContext, PluginMetadata, Registrar,
    Trigger, parse_command,
};
use parking_lot::RwLock;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info, warn};

/// Name of the plugin and of its config section.
pub const PLUGIN_NAME: &str = "spam_detector";

const WHITELIST_USAGE: &str = "📝 推销检测白名单管理命令:\n\
    /spam_whitelist add <用户ID> - 添加用户到白名单\n\
    /spam_whitelist remove <用户ID> - 从白名单移除用户\n\
    /spam_whitelist list - 查看白名单";

const TEST_USAGE: &str = "用法: /spam_test <消息内容>";

#[derive(Parser, Debug)]
#[command(name = "spam_whitelist")]
struct WhitelistCommand {
    #[command(subcommand)]
    action: WhitelistAction,
}

#[derive(Subcommand, Debug)]
enum WhitelistAction {
    /// Adds a user to the whitelist
    Add { user_id: String },
    /// Removes a user from the whitelist
    Remove { user_id: String },
    /// Lists whitelisted users
    List,
}

#[derive(Default)]
pub struct SpamDetector {
    config: RwLock<SpamDetectorConfig>,
    context: RwLock<Option<PluginContext>>,
    history: MessageHistory,
}

impl SpamDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the current settings.
    pub fn config(&self) -> SpamDetectorConfig {
        self.config.read().clone()
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    fn context(&self) -> Option<PluginContext> {
        self.context.read().clone()
    }

    /// Classifies one group message, returning the alert on a hit.
    async fn inspect(&self, event: &MessageEvent) -> Option<EventResult> {
        let ctx = self.context()?;
        let config = self.config();
        let user_id = event.get_sender_id();

        if config.is_user_whitelisted(user_id)
            || event
                .get_group_id()
                .is_some_and(|group| config.is_group_whitelisted(group))
        {
            debug!(user = %user_id, "Sender or group whitelisted, skipping");
            return None;
        }

        let content = event.message_str();
        let now = Instant::now();
        let context = self.history.last(user_id, config.context_message_count);
        self.history.record(user_id, content.clone(), now);

        let images: Vec<ImageRef> = event
            .get_messages()
            .iter()
            .filter_map(Segment::as_image)
            .cloned()
            .collect();
        let classifier = SpamClassifier::new(ctx.providers(), &config);
        let image_content = classifier.describe_images(images).await;
        if !classifier.is_spam(&content, &context, &image_content).await {
            return None;
        }

        info!(
            user = %user_id,
            name = %event.get_sender_name(),
            session = %event.session(),
            "Promotional message detected"
        );
        self.punish(&ctx, event, &config, now).await;
        Some(event.plain_result(config.spam_alert_message.clone()))
    }

    async fn punish(
        &self,
        ctx: &PluginContext,
        event: &MessageEvent,
        config: &SpamDetectorConfig,
        now: Instant,
    ) {
        let user_id = event.get_sender_id();

        if !config.admin_chat_id.is_empty() {
            let window = Duration::from_secs(config.last_time * 60);
            let recent = self.history.recent(user_id, window, now);
            if let Err(e) = forward_report(ctx, event, &config.admin_chat_id, &recent).await {
                warn!(error = %format!("{e:#}"), "Failed to forward spam report");
            }
        }

        let message_id = event.message_obj().message_id();
        if !message_id.is_empty() {
            if ctx.recall(event.session(), message_id).await {
                info!(message_id = %message_id, "Promotional message recalled");
            } else {
                debug!(message_id = %message_id, "Message could not be recalled");
            }
        }

        if config.mute_duration_secs > 0 {
            let duration = Duration::from_secs(config.mute_duration_secs);
            if ctx.mute(event.session(), user_id, duration).await {
                info!(user = %user_id, secs = config.mute_duration_secs, "Sender muted");
            } else {
                debug!(user = %user_id, "Sender could not be muted");
            }
        }
    }

    fn manage_whitelist(&self, event: &MessageEvent) -> String {
        let command = match parse_command::<WhitelistCommand>(event) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "Invalid whitelist command");
                return WHITELIST_USAGE.to_string();
            }
        };

        match command.action {
            WhitelistAction::Add { user_id } => {
                let mut config = self.config.write();
                if config.is_user_whitelisted(&user_id) {
                    return format!("ℹ️ 用户 {user_id} 已在白名单中");
                }
                config.whitelist_users.push(user_id.clone());
                info!(user = %user_id, "User added to spam whitelist");
                format!("✅ 用户 {user_id} 已添加到推销检测白名单")
            }
            WhitelistAction::Remove { user_id } => {
                let mut config = self.config.write();
                let before = config.whitelist_users.len();
                config.whitelist_users.retain(|u| *u != user_id);
                if config.whitelist_users.len() == before {
                    return format!("ℹ️ 用户 {user_id} 不在白名单中");
                }
                info!(user = %user_id, "User removed from spam whitelist");
                format!("✅ 用户 {user_id} 已从推销检测白名单移除")
            }
            WhitelistAction::List => {
                let config = self.config.read();
                if config.whitelist_users.is_empty() {
                    return "📋 推销检测白名单为空".to_string();
                }
                let users: Vec<String> = config
                    .whitelist_users
                    .iter()
                    .map(|u| format!("- {u}"))
                    .collect();
                format!("📋 推销检测白名单:\n{}", users.join("\n"))
            }
        }
    }

    async fn test_detection(&self, event: &MessageEvent) -> String {
        let message = event.command_args().join(" ");
        if message.is_empty() {
            return TEST_USAGE.to_string();
        }
        let Some(ctx) = self.context() else {
            return "❌ 推销检测插件尚未初始化".to_string();
        };
        let config = self.config();
        let spam = SpamClassifier::new(ctx.providers(), &config)
            .is_spam(&message, &[], "")
            .await;
        let verdict = if spam {
            "✅ 是推销信息"
        } else {
            "❌ 不是推销信息"
        };
        format!("🔍 推销检测结果: {verdict}\n测试消息: {message}")
    }
}

async fn forward_report(
    ctx: &PluginContext,
    event: &MessageEvent,
    admin_chat_id: &str,
    recent: &[String],
) -> anyhow::Result<()> {
    let session: SessionId = format!("{}:group:{}", event.get_platform_name(), admin_chat_id)
        .parse()
        .with_context(|| format!("invalid admin_chat_id '{admin_chat_id}'"))?;
    let report = spam_report(event, recent, &report_time());
    if !ctx.send_message(&session, report).await {
        bail!("no platform accepted the report for {session}");
    }
    debug!(session = %session, "Spam report forwarded");
    Ok(())
}

fn spam_report(event: &MessageEvent, recent: &[String], time: &str) -> String {
    let mut report = format!(
        "🚨 推销检测报告\n\
         用户: {} ({})\n\
         平台: {}\n\
         群组: {}\n\
         时间: {}\n\n\
         最近 {} 条消息:\n",
        event.get_sender_name(),
        event.get_sender_id(),
        event.get_platform_name(),
        event.get_group_id().unwrap_or("私聊"),
        time,
        recent.len(),
    );
    for (i, message) in recent.iter().enumerate() {
        report.push_str(&format!("{}. {}\n", i + 1, message));
    }
    report
}

fn report_time() -> String {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

#[async_trait]
impl Plugin for SpamDetector {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(PLUGIN_NAME, env!("CARGO_PKG_VERSION"))
            .desc("使用 LLM 检测群聊中的推销信息")
            .author("XeF2")
    }

    fn register(self: Arc<Self>, registrar: &mut Registrar<'_>) {
        let this = Arc::clone(&self);
        registrar.on_with(
            Trigger::message_type(MessageTypeFilter::Group),
            Handler::incremental(move |event: Arc<MessageEvent>| {
                let this = Arc::clone(&this);
                async_stream::stream! {
                    if let Some(alert) = this.inspect(&event).await {
                        yield alert;
                    }
                }
            }),
            "检测群聊中的推销信息",
            Permission::Everyone,
        );

        let this = Arc::clone(&self);
        registrar.on_with(
            Trigger::command_with_aliases("spam_whitelist", ["垃圾白名单", "推销白名单"]),
            Handler::single_shot(move |event: Arc<MessageEvent>| {
                let this = Arc::clone(&this);
                async move {
                    let reply = this.manage_whitelist(&event);
                    event.set_result(reply);
                    event.should_call_llm(true);
                }
            }),
            "管理推销检测白名单",
            Permission::Admin,
        );

        let this = self;
        registrar.on_with(
            Trigger::command_with_aliases("spam_test", ["推销测试"]),
            Handler::single_shot(move |event: Arc<MessageEvent>| {
                let this = Arc::clone(&this);
                async move {
                    let reply = this.test_detection(&event).await;
                    event.set_result(reply);
                    event.should_call_llm(true);
                }
            }),
            "测试一条消息是否为推销信息",
            Permission::Admin,
        );
    }

    async fn initialize(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        let config: SpamDetectorConfig = ctx
            .get_config()
            .context("invalid plugins.spam_detector section")?;
        info!(
            admin_chat = %config.admin_chat_id,
            whitelist_users = config.whitelist_users.len(),
            whitelist_groups = config.whitelist_groups.len(),
            "Spam detector started"
        );
        *self.config.write() = config;
        *self.context.write() = Some(ctx.clone());
        Ok(())
    }

    async fn terminate(&self) {
        self.context.write().take();
        self.history.clear();
        info!("Spam detector stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use nova_core::{
        InboundMessage, LlmRequest, LlmResponse, MemoryConversationStore, MessageChain,
        MessageMember, MessageType, Platform, PlatformManager, PlatformMeta, Provider,
        ProviderKind, ProviderMeta, ProviderRegistry, ProviderResult, SendResult,
    };
    use nova_framework::{
        HandlerRegistry, LlmOrchestrator, Pipeline, PipelineConfig, PluginLoadState,
        PluginManager,
    };
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Default)]
    struct MockPlatform {
        sent: Mutex<Vec<(String, String)>>,
        recalled: Mutex<Vec<String>>,
        muted: Mutex<Vec<(String, u64)>>,
    }

    impl MockPlatform {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Platform for MockPlatform {
        fn meta(&self) -> PlatformMeta {
            PlatformMeta::new("test")
        }

        async fn send_by_session(
            &self,
            session: &SessionId,
            chain: &MessageChain,
        ) -> SendResult<()> {
            self.sent
                .lock()
                .push((session.to_string(), chain.plain_text()));
            Ok(())
        }

        async fn recall_message(&self, _session: &SessionId, message_id: &str) -> SendResult<()> {
            self.recalled.lock().push(message_id.to_string());
            Ok(())
        }

        async fn mute_member(
            &self,
            _session: &SessionId,
            user_id: &str,
            duration: Duration,
        ) -> SendResult<()> {
            self.muted
                .lock()
                .push((user_id.to_string(), duration.as_secs()));
            Ok(())
        }
    }

    struct ScriptedProvider {
        id: &'static str,
        answers: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedProvider {
        fn new(id: &'static str, answers: &[&str]) -> Self {
            Self {
                id,
                answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<LlmRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn meta(&self) -> ProviderMeta {
            ProviderMeta::new(self.id, "scripted", ProviderKind::Chat)
        }

        async fn text_chat(&self, request: LlmRequest) -> ProviderResult<LlmResponse> {
            self.requests.lock().push(request);
            let answer = self.answers.lock().pop_front().unwrap_or_else(|| "否".into());
            Ok(LlmResponse::text(answer))
        }
    }

    struct Harness {
        plugin: Arc<SpamDetector>,
        manager: PluginManager,
        pipeline: Pipeline,
        platform: Arc<MockPlatform>,
        platforms: Arc<PlatformManager>,
        providers: Arc<ProviderRegistry>,
        text: Arc<ScriptedProvider>,
    }

    impl Harness {
        async fn new(config: Value, answers: &[&str]) -> Self {
            let registry = Arc::new(HandlerRegistry::new());
            let providers = Arc::new(ProviderRegistry::new());
            let text = Arc::new(ScriptedProvider::new("text", answers));
            providers.register_provider(text.clone());

            let platform = Arc::new(MockPlatform::default());
            let platforms = Arc::new(PlatformManager::new());
            platforms.register(platform.clone());

            let manager = PluginManager::new(
                Arc::clone(&registry),
                HashMap::from([(PLUGIN_NAME.to_string(), config)]),
                Vec::new(),
            );
            let plugin = Arc::new(SpamDetector::new());
            assert!(manager.register_plugin(plugin.clone()).await);
            manager.start_all(&providers, &platforms).await;

            let orchestrator = Arc::new(LlmOrchestrator::new(
                Arc::clone(&providers),
                Arc::new(MemoryConversationStore::new()),
                Arc::clone(&registry),
            ));
            let mut pipeline_config = PipelineConfig::default();
            pipeline_config.wake.passive_listeners = true;
            pipeline_config.wake.admins = vec!["admin".to_string()];
            pipeline_config.llm.enable_default = false;
            let pipeline = Pipeline::new(registry, orchestrator, pipeline_config);

            Self {
                plugin,
                manager,
                pipeline,
                platform,
                platforms,
                providers,
                text,
            }
        }

        fn group_message(&self, user: &str, segments: Vec<Segment>) -> Arc<MessageEvent> {
            let message = InboundMessage::new(MessageType::Group, "g1")
                .with_group_id("g1")
                .with_self_id("bot")
                .with_message_id("m42")
                .with_sender(MessageMember::new(user, "Mallory"))
                .with_segments(segments);
            Arc::new(MessageEvent::new(
                message,
                PlatformMeta::new("test"),
                self.platforms.clone(),
            ))
        }

        fn private_message(&self, user: &str, text: &str) -> Arc<MessageEvent> {
            let message = InboundMessage::new(MessageType::Private, user)
                .with_self_id("bot")
                .with_message_id("p1")
                .with_sender(MessageMember::new(user, "Admin"))
                .with_segments(vec![Segment::text(text)]);
            Arc::new(MessageEvent::new(
                message,
                PlatformMeta::new("test"),
                self.platforms.clone(),
            ))
        }
    }

    #[tokio::test]
    async fn test_spam_is_reported_recalled_and_muted() {
        let harness = Harness::new(
            json!({ "admin_chat_id": "999", "mute_duration_secs": 600 }),
            &["是"],
        )
        .await;

        let event = harness.group_message("u7", vec![Segment::text("加微信领优惠券")]);
        let report = harness.pipeline.process(event).await;
        assert_eq!(report.handler_failures, 0);

        let sent = harness.platform.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "test:GroupMessage:999");
        assert!(sent[0].1.starts_with("🚨 推销检测报告"));
        assert!(sent[0].1.contains("Mallory (u7)"));
        assert!(sent[0].1.contains("1. 加微信领优惠券"));
        assert_eq!(sent[1].0, "test:GroupMessage:g1");
        assert_eq!(sent[1].1, SpamDetectorConfig::default().spam_alert_message);

        assert_eq!(*harness.platform.recalled.lock(), vec!["m42"]);
        assert_eq!(*harness.platform.muted.lock(), vec![("u7".to_string(), 600)]);
    }

    #[tokio::test]
    async fn test_clean_message_is_left_alone() {
        let harness = Harness::new(json!({ "admin_chat_id": "999" }), &["否"]).await;

        let event = harness.group_message("u7", vec![Segment::text("今晚一起吃饭吗")]);
        harness.pipeline.process(event).await;

        assert!(harness.platform.sent().is_empty());
        assert!(harness.platform.recalled.lock().is_empty());
        assert_eq!(harness.plugin.history().last("u7", 5), vec!["今晚一起吃饭吗"]);
    }

    #[tokio::test]
    async fn test_earlier_messages_are_given_as_context() {
        let harness = Harness::new(json!({ "context_message_count": 1 }), &["否", "否"]).await;

        for text in ["第一条", "第二条"] {
            let event = harness.group_message("u7", vec![Segment::text(text)]);
            harness.pipeline.process(event).await;
        }

        let requests = harness.text.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].prompt.contains("最近的对话上下文"));
        assert!(requests[1].prompt.ends_with("最近的对话上下文：\n第一条"));
    }

    #[tokio::test]
    async fn test_whitelisted_senders_are_not_classified() {
        let harness = Harness::new(
            json!({ "whitelist_users": "u7", "whitelist_groups": ["g2"] }),
            &["是"],
        )
        .await;

        let event = harness.group_message("u7", vec![Segment::text("限时特价")]);
        harness.pipeline.process(event).await;

        assert!(harness.text.requests().is_empty());
        assert!(harness.platform.sent().is_empty());
        assert_eq!(harness.plugin.history().user_count(), 0);
    }

    #[tokio::test]
    async fn test_images_are_described_by_vision_provider() {
        let harness = Harness::new(json!({ "vision_provider_id": "vision" }), &["否"]).await;
        let vision = Arc::new(ScriptedProvider::new("vision", &["一张价格表"]));
        harness.providers.register_provider(vision.clone());

        let event = harness.group_message(
            "u7",
            vec![
                Segment::text("看看"),
                Segment::image("https://example.com/ad.png"),
            ],
        );
        harness.pipeline.process(event).await;

        let vision_requests = vision.requests();
        assert_eq!(vision_requests.len(), 1);
        assert_eq!(vision_requests[0].image_urls.len(), 1);

        let text_requests = harness.text.requests();
        assert_eq!(text_requests.len(), 1);
        assert!(text_requests[0].prompt.contains("图片内容：一张价格表"));
    }

    #[tokio::test]
    async fn test_whitelist_commands_require_admin() {
        let harness = Harness::new(json!({}), &[]).await;

        let reply_to = |user: &str, text: &str| harness.private_message(user, text);

        harness
            .pipeline
            .process(reply_to("admin", "/spam_whitelist add 10001"))
            .await;
        assert_eq!(harness.plugin.config().whitelist_users, vec!["10001"]);

        harness
            .pipeline
            .process(reply_to("admin", "/推销白名单 add 10001"))
            .await;
        harness
            .pipeline
            .process(reply_to("admin", "/spam_whitelist list"))
            .await;
        harness
            .pipeline
            .process(reply_to("admin", "/spam_whitelist remove 10001"))
            .await;
        harness
            .pipeline
            .process(reply_to("admin", "/spam_whitelist frobnicate"))
            .await;

        let replies: Vec<String> = harness
            .platform
            .sent()
            .into_iter()
            .map(|(_, text)| text)
            .collect();
        assert_eq!(replies.len(), 5);
        assert!(replies[0].contains("已添加到推销检测白名单"));
        assert!(replies[1].contains("已在白名单中"));
        assert!(replies[2].contains("- 10001"));
        assert!(replies[3].contains("已从推销检测白名单移除"));
        assert_eq!(replies[4], WHITELIST_USAGE);
        assert!(harness.plugin.config().whitelist_users.is_empty());

        harness
            .pipeline
            .process(reply_to("u1", "/spam_whitelist add u1"))
            .await;
        assert!(harness.plugin.config().whitelist_users.is_empty());
        assert_eq!(harness.platform.sent().len(), 5);
    }

    #[tokio::test]
    async fn test_spam_test_command() {
        let harness = Harness::new(json!({}), &["yes"]).await;

        harness
            .pipeline
            .process(harness.private_message("admin", "/spam_test 全场五折 快来"))
            .await;
        harness
            .pipeline
            .process(harness.private_message("admin", "/推销测试"))
            .await;

        let sent = harness.platform.sent();
        assert_eq!(sent[0].0, "test:FriendMessage:admin");
        assert_eq!(
            sent[0].1,
            "🔍 推销检测结果: ✅ 是推销信息\n测试消息: 全场五折 快来"
        );
        assert_eq!(sent[1].1, TEST_USAGE);
        assert_eq!(harness.platform.recalled.lock().len(), 0);
    }

    #[tokio::test]
    async fn test_terminate_clears_history() {
        let harness = Harness::new(json!({}), &["否"]).await;
        let event = harness.group_message("u7", vec![Segment::text("hi")]);
        harness.pipeline.process(event).await;
        assert_eq!(harness.plugin.history().user_count(), 1);

        harness.manager.stop_all().await;
        assert_eq!(harness.plugin.history().user_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_section_fails_initialization() {
        let harness = Harness::new(json!({ "last_time": "five" }), &[]).await;
        assert_eq!(
            harness.manager.plugin_state(PLUGIN_NAME).await,
            Some(PluginLoadState::Failed)
        );

        let event = harness.group_message("u7", vec![Segment::text("限时特价")]);
        harness.pipeline.process(event).await;
        assert!(harness.text.requests().is_empty());
    }

    #[test]
    fn test_report_lists_recent_messages() {
        let harness_event = {
            let message = InboundMessage::new(MessageType::Group, "g1")
                .with_group_id("g1")
                .with_sender(MessageMember::new("u7", "Mallory"))
                .with_segments(vec![Segment::text("x")]);
            MessageEvent::new(
                message,
                PlatformMeta::new("test"),
                Arc::new(nova_core::NullSender),
            )
        };
        let report = spam_report(
            &harness_event,
            &["a".to_string(), "b".to_string()],
            "2026-01-01 00:00:00",
        );
        assert!(report.contains("群组: g1"));
        assert!(report.contains("时间: 2026-01-01 00:00:00"));
        assert!(report.ends_with("最近 2 条消息:\n1. a\n2. b\n"));
    }
}
