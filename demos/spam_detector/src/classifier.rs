//! LLM-backed spam classification.
//!
//! Providers are called directly rather than through the orchestrator: the
//! verdict is internal and must not become the event's result or enter any
//! conversation history.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use nova_core::{ImageRef, LlmRequest, Provider, ProviderRegistry};
use tracing::{debug, warn};

use crate::config::SpamDetectorConfig;

const IMAGE_PROMPT: &str = "请描述这张图片的主要内容，特别是如果有文字请提取出来。";
const IMAGE_SYSTEM_PROMPT: &str = "你是一个图片内容识别助手，请客观描述图片内容。";

/// Whether a model answer means "promotional".
pub fn is_spam_verdict(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    answer.contains('是') || answer.contains("yes") || answer.contains("spam")
}

/// Builds the classification prompt.
pub fn build_prompt(content: &str, context: &[String], image_content: &str) -> String {
    let mut prompt = format!("请判断以下消息是否为推销信息：\n\n{content}");
    if !image_content.is_empty() {
        prompt.push_str(&format!("\n\n图片内容：{image_content}"));
    }
    if !context.is_empty() {
        prompt.push_str("\n\n最近的对话上下文：\n");
        prompt.push_str(&context.join("\n"));
    }
    prompt
}

pub struct SpamClassifier<'a> {
    providers: &'a ProviderRegistry,
    config: &'a SpamDetectorConfig,
}

impl<'a> SpamClassifier<'a> {
    pub fn new(providers: &'a ProviderRegistry, config: &'a SpamDetectorConfig) -> Self {
        Self { providers, config }
    }

    fn provider(&self, id: Option<&str>) -> Option<Arc<dyn Provider>> {
        if let Some(id) = id {
            match self.providers.get_provider_by_id(id) {
                Some(provider) => return Some(provider),
                None => warn!(provider = %id, "Configured provider not found, using default"),
            }
        }
        self.providers.get_using_provider()
    }

    async fn ask(
        &self,
        provider_id: Option<&str>,
        request: LlmRequest,
    ) -> anyhow::Result<String> {
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| anyhow!("no chat provider available"))?;
        let timeout = Duration::from_secs(self.config.model_timeout_secs);
        let response = tokio::time::timeout(timeout, provider.text_chat(request))
            .await
            .with_context(|| format!("model timed out after {}s", timeout.as_secs()))?
            .with_context(|| format!("provider '{}' failed", provider.meta().id))?;
        Ok(response.completion_text)
    }

    /// Describes images with the vision provider. Empty on failure.
    pub async fn describe_images(&self, images: Vec<ImageRef>) -> String {
        if images.is_empty() {
            return String::new();
        }
        let request = LlmRequest::new(IMAGE_PROMPT)
            .image_urls(images)
            .system_prompt(IMAGE_SYSTEM_PROMPT);
        match self
            .ask(self.config.vision_provider_id.as_deref(), request)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Image description failed");
                String::new()
            }
        }
    }

    /// Asks the text provider for a verdict. `false` on failure.
    pub async fn is_spam(&self, content: &str, context: &[String], image_content: &str) -> bool {
        let request = LlmRequest::new(build_prompt(content, context, image_content))
            .system_prompt(self.config.llm_system_prompt.clone());
        match self
            .ask(self.config.text_provider_id.as_deref(), request)
            .await
        {
            Ok(answer) => {
                let verdict = is_spam_verdict(&answer);
                debug!(answer = %answer.trim(), verdict, "Spam verdict");
                verdict
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Spam classification failed");
                false
            }
        }
    }
}
