//! LLM request orchestration.
//!
//! The [`LlmOrchestrator`] takes an [`LlmRequest`] and an event and:
//!
//! 1. resolves the provider: the bound conversation's provider, else the
//!    registry's using provider,
//! 2. resolves context: explicit `contexts`, else the bound conversation's
//!    stored history, else nothing,
//! 3. calls the provider, running requested tools between rounds,
//! 4. folds the answer into the event with `set_result`,
//! 5. asks the conversation store to append the exchange.
//!
//! Image references are passed through untouched.

use std::sync::Arc;

use nova_core::{
    ContextMessage, ConversationStore, EventResult, LlmRequest, LlmResponse, MessageEvent,
    Provider, ProviderRegistry, ToolCall,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::registry::HandlerRegistry;

fn default_true() -> bool {
    true
}

fn default_max_tool_rounds() -> usize {
    5
}

/// LLM settings of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Run the default-LLM stage for awake, unsuppressed events.
    #[serde(default = "default_true")]
    pub enable_default: bool,

    /// Maximum provider round trips spent on tool calls per request.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enable_default: true,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Builds provider calls from requests and folds responses into events.
pub struct LlmOrchestrator {
    providers: Arc<ProviderRegistry>,
    conversations: Arc<dyn ConversationStore>,
    registry: Arc<HandlerRegistry>,
    max_tool_rounds: usize,
}

impl LlmOrchestrator {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        conversations: Arc<dyn ConversationStore>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            providers,
            conversations,
            registry,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    /// Picks the provider for a request.
    pub fn resolve_provider(&self, request: &LlmRequest) -> OrchestrationResult<Arc<dyn Provider>> {
        let bound = request
            .conversation
            .as_ref()
            .and_then(|conversation| conversation.provider_id.as_deref());
        match bound {
            Some(id) => self
                .providers
                .get_provider_by_id(id)
                .ok_or_else(|| OrchestrationError::ProviderNotFound(id.to_string())),
            None => self
                .providers
                .get_using_provider()
                .ok_or(OrchestrationError::NoProvider),
        }
    }

    /// Resolves the context sent with a request.
    pub async fn resolve_contexts(
        &self,
        request: &LlmRequest,
    ) -> OrchestrationResult<Vec<ContextMessage>> {
        if let Some(contexts) = &request.contexts {
            return Ok(contexts.clone());
        }
        match &request.conversation {
            Some(conversation) => Ok(self.conversations.history(&conversation.cid).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Builds the implicit request of the default-LLM stage, or `None` when
    /// the event carries neither text nor images.
    pub async fn default_request(
        &self,
        event: &MessageEvent,
    ) -> OrchestrationResult<Option<LlmRequest>> {
        let prompt = event.message_str();
        let images: Vec<_> = event.message_obj().segments().images().cloned().collect();
        if prompt.trim().is_empty() && images.is_empty() {
            return Ok(None);
        }

        let conversation = self
            .conversations
            .get_or_create_conversation(event.session())
            .await?;

        let mut request = event
            .request_llm(prompt)
            .image_urls(images)
            .conversation(conversation);
        let tools = self.registry.tool_set();
        if !tools.is_empty() {
            request = request.func_tool(tools);
        }
        Ok(Some(request))
    }

    /// Runs a request for an event and sets the answer as the event's result.
    pub async fn request(
        &self,
        request: LlmRequest,
        event: &Arc<MessageEvent>,
    ) -> OrchestrationResult<LlmResponse> {
        let provider = self.resolve_provider(&request)?;
        let provider_id = provider.meta().id;
        let contexts = self.resolve_contexts(&request).await?;

        let mut outbound = LlmRequest {
            contexts: Some(contexts),
            ..request.clone()
        };
        let mut rounds = 0;

        let response = loop {
            debug!(
                provider = %provider_id,
                contexts = outbound.contexts.as_ref().map_or(0, Vec::len),
                images = outbound.image_urls.len(),
                "Calling provider"
            );
            let response = provider
                .text_chat(outbound.clone())
                .await
                .map_err(|source| OrchestrationError::Provider {
                    provider: provider_id.clone(),
                    source,
                })?;

            if response.tool_calls.is_empty() || outbound.func_tool.is_none() {
                break response;
            }
            if rounds >= self.max_tool_rounds {
                return Err(OrchestrationError::ToolRoundsExceeded(self.max_tool_rounds));
            }
            rounds += 1;

            let mut follow_up = outbound.contexts.take().unwrap_or_default();
            if !outbound.prompt.is_empty() {
                follow_up.push(ContextMessage::user(std::mem::take(&mut outbound.prompt)));
            }
            follow_up.push(ContextMessage::assistant_tool_calls(
                response.completion_text.clone(),
                response.tool_calls.clone(),
            ));
            follow_up.extend(self.run_tool_calls(event, &response.tool_calls).await);
            outbound.contexts = Some(follow_up);
        };

        if response.completion_text.trim().is_empty() {
            return Err(OrchestrationError::MalformedResponse(provider_id));
        }

        event.set_result(EventResult::llm(response.completion_text.clone()));

        if let Some(conversation) = &request.conversation {
            if let Err(e) = self
                .conversations
                .append_exchange(
                    &conversation.cid,
                    ContextMessage::user(request.prompt.clone()),
                    ContextMessage::assistant(response.completion_text.clone()),
                )
                .await
            {
                warn!(conversation = %conversation.cid, error = %e, "Failed to record exchange");
            }
        }

        Ok(response)
    }

    async fn run_tool_calls(
        &self,
        event: &Arc<MessageEvent>,
        calls: &[ToolCall],
    ) -> Vec<ContextMessage> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let output = match self.registry.get_tool(&call.name) {
                Some(tool) => match tool.call(Arc::clone(event), call.arguments.clone()).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool call failed");
                        format!("error: {e}")
                    }
                },
                None => {
                    debug!(tool = %call.name, "Model requested an unavailable tool");
                    format!("error: tool '{}' is not available", call.name)
                }
            };
            outputs.push(ContextMessage::tool(call.id.clone(), output));
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FunctionTool;
    use crate::test_support::{ScriptedProvider, private_event};
    use nova_core::{
        BoxError, ChatRole, ImageRef, MemoryConversationStore, ProviderError, ResultKind,
    };
    use serde_json::json;
    use tokio_test::assert_ok;

    struct Fixture {
        store: Arc<MemoryConversationStore>,
        registry: Arc<HandlerRegistry>,
        providers: Arc<ProviderRegistry>,
        orchestrator: LlmOrchestrator,
    }

    fn fixture(providers: Vec<Arc<ScriptedProvider>>) -> Fixture {
        let store = Arc::new(MemoryConversationStore::new());
        let registry = Arc::new(HandlerRegistry::new());
        let registry_providers = Arc::new(ProviderRegistry::new());
        for provider in providers {
            registry_providers.register_provider(provider);
        }
        let orchestrator = LlmOrchestrator::new(
            Arc::clone(&registry_providers),
            store.clone(),
            Arc::clone(&registry),
        );
        Fixture {
            store,
            registry,
            providers: registry_providers,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_explicit_empty_contexts_override_history() {
        let provider = Arc::new(ScriptedProvider::new("main").reply("answer"));
        let fx = fixture(vec![provider.clone()]);
        let event = private_event("question");

        let conversation = fx.store.new_conversation(event.session()).await.unwrap();
        fx.store
            .set_history(
                &conversation.cid,
                vec![ContextMessage::user("old"), ContextMessage::assistant("older")],
            )
            .unwrap();

        let request = event
            .request_llm("question")
            .conversation(conversation)
            .contexts(Vec::new());
        assert_ok!(fx.orchestrator.request(request, &event).await);

        let sent = provider.requests();
        assert_eq!(sent[0].contexts, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_history_used_without_override_and_exchange_appended() {
        let provider = Arc::new(ScriptedProvider::new("main").reply("42"));
        let fx = fixture(vec![provider.clone()]);
        let event = private_event("question");

        let conversation = fx.store.new_conversation(event.session()).await.unwrap();
        fx.store
            .set_history(&conversation.cid, vec![ContextMessage::user("earlier")])
            .unwrap();

        let request = event.request_llm("meaning?").conversation(conversation.clone());
        let response = fx.orchestrator.request(request, &event).await.unwrap();
        assert_eq!(response.completion_text, "42");

        let sent = provider.requests();
        assert_eq!(sent[0].contexts.as_ref().unwrap()[0].content, "earlier");

        let result = event.get_result().unwrap();
        assert_eq!(result.kind(), ResultKind::Llm);
        assert_eq!(result.message_chain().plain_text(), "42");

        let history = fx.store.history(&conversation.cid).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].content, "meaning?");
        assert_eq!(history[2].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_no_binding_means_empty_context() {
        let provider = Arc::new(ScriptedProvider::new("main").reply("ok"));
        let fx = fixture(vec![provider.clone()]);
        let event = private_event("q");

        assert_ok!(fx.orchestrator.request(event.request_llm("q"), &event).await);
        assert_eq!(provider.requests()[0].contexts, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_conversation_binding_overrides_default_provider() {
        let default = Arc::new(ScriptedProvider::new("default").reply("from default"));
        let bound = Arc::new(ScriptedProvider::new("bound").reply("from bound"));
        let fx = fixture(vec![default.clone(), bound.clone()]);
        let event = private_event("q");

        let conversation = fx.store.new_conversation(event.session()).await.unwrap();
        fx.store
            .set_provider(&conversation.cid, Some("bound".into()))
            .unwrap();
        let conversation = fx.store.current_conversation(event.session()).await.unwrap();

        let response = fx
            .orchestrator
            .request(event.request_llm("q").conversation(conversation), &event)
            .await
            .unwrap();
        assert_eq!(response.completion_text, "from bound");
        assert!(default.requests().is_empty());
        assert_eq!(fx.providers.get_using_provider().unwrap().meta().id, "default");
    }

    #[tokio::test]
    async fn test_typed_errors() {
        let fx = fixture(vec![]);
        let event = private_event("q");
        assert!(matches!(
            fx.orchestrator.request(event.request_llm("q"), &event).await,
            Err(OrchestrationError::NoProvider)
        ));

        let failing = Arc::new(
            ScriptedProvider::new("down").fail(ProviderError::Unreachable("refused".into())),
        );
        let fx = fixture(vec![failing]);
        assert!(matches!(
            fx.orchestrator.request(event.request_llm("q"), &event).await,
            Err(OrchestrationError::Provider { .. })
        ));

        let empty = Arc::new(ScriptedProvider::new("empty").reply("   "));
        let fx = fixture(vec![empty]);
        assert!(matches!(
            fx.orchestrator.request(event.request_llm("q"), &event).await,
            Err(OrchestrationError::MalformedResponse(_))
        ));
        assert!(event.get_result().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_default_requests_share_conversation() {
        let fx = fixture(vec![]);
        let first = private_event("hello");
        let second = private_event("again");
        assert_eq!(first.session(), second.session());

        let (a, b) = tokio::join!(
            fx.orchestrator.default_request(&first),
            fx.orchestrator.default_request(&second),
        );
        let a = a.unwrap().unwrap().conversation.unwrap();
        let b = b.unwrap().unwrap().conversation.unwrap();
        assert_eq!(a.cid, b.cid);

        let current = fx.store.current_conversation(first.session()).await.unwrap();
        assert_eq!(current.cid, a.cid);
    }

    #[tokio::test]
    async fn test_images_pass_through() {
        let provider = Arc::new(ScriptedProvider::new("main").reply("a cat"));
        let fx = fixture(vec![provider.clone()]);
        let event = private_event("what is this");
        let image = ImageRef::File("/definitely/missing.png".into());

        let request = event.request_llm("describe").image_urls([image.clone()]);
        assert_ok!(fx.orchestrator.request(request, &event).await);
        assert_eq!(provider.requests()[0].image_urls, vec![image]);
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let provider = Arc::new(
            ScriptedProvider::new("main")
                .respond(LlmResponse::with_tool_calls(vec![ToolCall {
                    id: "call-1".into(),
                    name: "weather".into(),
                    arguments: json!({"city": "Hefei"}),
                }]))
                .reply("It is sunny in Hefei"),
        );
        let fx = fixture(vec![provider.clone()]);
        fx.registry.register_tool(
            FunctionTool::new("weather", "Weather lookup", json!({}), |_event, args| async move {
                Ok::<_, BoxError>(format!("sunny in {}", args["city"].as_str().unwrap_or("?")))
            }),
            "weather-plugin",
        );

        let event = private_event("weather?");
        let request = event
            .request_llm("weather?")
            .func_tool(fx.registry.tool_set());
        let response = fx.orchestrator.request(request, &event).await.unwrap();
        assert_eq!(response.completion_text, "It is sunny in Hefei");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let follow_up = requests[1].contexts.as_ref().unwrap();
        assert_eq!(follow_up[0].role, ChatRole::User);
        assert_eq!(follow_up[1].tool_calls.len(), 1);
        assert_eq!(follow_up[2].role, ChatRole::Tool);
        assert_eq!(follow_up[2].content, "sunny in Hefei");
        assert!(requests[1].prompt.is_empty());
    }

    #[tokio::test]
    async fn test_tool_rounds_are_bounded() {
        let call = LlmResponse::with_tool_calls(vec![ToolCall {
            id: "c".into(),
            name: "missing".into(),
            arguments: json!({}),
        }]);
        let provider = Arc::new(
            ScriptedProvider::new("main")
                .respond(call.clone())
                .respond(call.clone())
                .respond(call),
        );
        let fx = fixture(vec![provider]);
        let orchestrator = fx.orchestrator.with_max_tool_rounds(1);
        let event = private_event("loop");

        let request = event
            .request_llm("loop")
            .func_tool(nova_core::ToolSet::default());
        assert!(matches!(
            orchestrator.request(request, &event).await,
            Err(OrchestrationError::ToolRoundsExceeded(1))
        ));
    }

    #[tokio::test]
    async fn test_default_request() {
        let fx = fixture(vec![]);
        let event = private_event("hello there");
        let request = fx.orchestrator.default_request(&event).await.unwrap().unwrap();
        assert_eq!(request.prompt, "hello there");
        assert!(request.conversation.is_some());
        assert!(request.contexts.is_none());
        assert!(request.func_tool.is_none());

        let blank = private_event("   ");
        assert!(fx.orchestrator.default_request(&blank).await.unwrap().is_none());
    }
}
