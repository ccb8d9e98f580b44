//! Handler model.
//!
//! A handler is either:
//!
//! - [`Handler::SingleShot`]: an async body that runs once. Any result is set
//!   on the event with `set_result` or sent directly with `send`.
//! - [`Handler::Incremental`]: a producer of delivery actions. The pipeline
//!   drains it, delivering each yielded [`Action`] before asking for the next.
//!
//! The pipeline matches on the variant; there is no runtime introspection.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_stream::stream;
//! use nova_framework::Handler;
//!
//! let hello = Handler::single_shot(|event: Arc<MessageEvent>| async move {
//!     event.set_result("hello");
//! });
//!
//! let countdown = Handler::incremental(|event: Arc<MessageEvent>| {
//!     stream! {
//!         for n in (1..=3).rev() {
//!             yield event.plain_result(n.to_string());
//!         }
//!     }
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use nova_core::{BoxError, EventResult, LlmRequest, MessageEvent, ToolSpec};
use serde_json::Value;

// ============================================================================
// Actions
// ============================================================================

/// One item yielded by an incremental handler.
#[derive(Debug, Clone)]
pub enum Action {
    /// Deliver this result now.
    Result(EventResult),
    /// Run this request through the orchestrator, then deliver its result.
    Llm(LlmRequest),
}

/// Conversion of yielded values into [`Action`]s.
pub trait IntoAction: Send {
    fn into_action(self) -> Result<Action, BoxError>;
}

impl IntoAction for Action {
    fn into_action(self) -> Result<Action, BoxError> {
        Ok(self)
    }
}

impl IntoAction for EventResult {
    fn into_action(self) -> Result<Action, BoxError> {
        Ok(Action::Result(self))
    }
}

impl IntoAction for LlmRequest {
    fn into_action(self) -> Result<Action, BoxError> {
        Ok(Action::Llm(self))
    }
}

/// `Err` ends the handler as a failure.
impl<T, E> IntoAction for Result<T, E>
where
    T: IntoAction,
    E: Into<BoxError> + Send,
{
    fn into_action(self) -> Result<Action, BoxError> {
        self.map_err(Into::into)?.into_action()
    }
}

impl From<EventResult> for Action {
    fn from(result: EventResult) -> Self {
        Action::Result(result)
    }
}

impl From<LlmRequest> for Action {
    fn from(request: LlmRequest) -> Self {
        Action::Llm(request)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Return values accepted from single-shot handler bodies.
pub trait HandlerOutcome: Send {
    fn into_outcome(self) -> Result<(), BoxError>;
}

impl HandlerOutcome for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> HandlerOutcome for Result<(), E>
where
    E: Into<BoxError> + Send,
{
    fn into_outcome(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Boxed single-shot body.
pub type SingleShotFn =
    Arc<dyn Fn(Arc<MessageEvent>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// The lazy, finite, non-restartable sequence an incremental handler yields.
pub type ActionStream = BoxStream<'static, Result<Action, BoxError>>;

/// Boxed incremental producer.
pub type IncrementalFn = Arc<dyn Fn(Arc<MessageEvent>) -> ActionStream + Send + Sync>;

/// A registered handler body.
#[derive(Clone)]
pub enum Handler {
    SingleShot(SingleShotFn),
    Incremental(IncrementalFn),
}

impl Handler {
    /// Wraps an async function as a single-shot handler.
    pub fn single_shot<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Arc<MessageEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerOutcome,
    {
        Handler::SingleShot(Arc::new(move |event| {
            let fut = f(event);
            Box::pin(async move { fut.await.into_outcome() })
        }))
    }

    /// Wraps a stream-returning function as an incremental handler.
    pub fn incremental<F, S>(f: F) -> Self
    where
        F: Fn(Arc<MessageEvent>) -> S + Send + Sync + 'static,
        S: Stream + Send + 'static,
        S::Item: IntoAction,
    {
        Handler::Incremental(Arc::new(move |event| {
            f(event).map(IntoAction::into_action).boxed()
        }))
    }

    /// `"single_shot"` or `"incremental"`, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Handler::SingleShot(_) => "single_shot",
            Handler::Incremental(_) => "incremental",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.kind()).finish()
    }
}

// ============================================================================
// Function tools
// ============================================================================

/// Boxed tool callable: receives the event and the JSON arguments, returns
/// the text handed back to the model.
pub type ToolFn = Arc<
    dyn Fn(Arc<MessageEvent>, Value) -> BoxFuture<'static, Result<String, BoxError>>
        + Send
        + Sync,
>;

/// A function the LLM can call by name.
#[derive(Clone)]
pub struct FunctionTool {
    spec: ToolSpec,
    func: ToolFn,
}

impl FunctionTool {
    /// Creates a tool from its declaration and an async callable.
    pub fn new<F, Fut, T, E>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Arc<MessageEvent>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<String>,
        E: Into<BoxError>,
    {
        Self {
            spec: ToolSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            func: Arc::new(move |event, args| {
                let fut = f(event, args);
                Box::pin(async move { fut.await.map(Into::into).map_err(Into::into) })
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    /// Runs the tool.
    pub async fn call(&self, event: Arc<MessageEvent>, args: Value) -> Result<String, BoxError> {
        (self.func)(event, args).await
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.spec.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::private_event;
    use async_stream::stream;

    #[tokio::test]
    async fn test_single_shot_accepts_unit_and_result() {
        let unit = Handler::single_shot(|event: Arc<MessageEvent>| async move {
            event.set_result("done");
        });
        let failing = Handler::single_shot(|_event: Arc<MessageEvent>| async move {
            Err::<(), _>("boom")
        });

        let event = private_event("x");
        let Handler::SingleShot(f) = unit else {
            panic!("expected single shot");
        };
        assert!(f(event.clone()).await.is_ok());
        assert!(event.get_result().is_some());

        let Handler::SingleShot(f) = failing else {
            panic!("expected single shot");
        };
        assert_eq!(f(event).await.unwrap_err().to_string(), "boom");
    }

    #[tokio::test]
    async fn test_incremental_maps_items_to_actions() {
        let handler = Handler::incremental(|event: Arc<MessageEvent>| {
            stream! {
                yield Action::from(event.plain_result("a"));
                yield Action::from(event.request_llm("b"));
            }
        });
        let Handler::Incremental(f) = handler else {
            panic!("expected incremental");
        };

        let actions: Vec<_> = f(private_event("x")).collect().await;
        assert!(matches!(actions[0], Ok(Action::Result(_))));
        assert!(matches!(actions[1], Ok(Action::Llm(_))));
    }

    #[test]
    fn test_result_item_error_becomes_failure() {
        let item: Result<EventResult, &str> = Err("bad");
        assert!(item.into_action().is_err());
    }

    #[tokio::test]
    async fn test_function_tool_call() {
        let tool = FunctionTool::new(
            "echo",
            "Echo the input",
            serde_json::json!({"type": "object"}),
            |_event, args: Value| async move {
                Ok::<_, BoxError>(args["text"].as_str().unwrap_or_default().to_string())
            },
        );

        let output = tool
            .call(private_event("x"), serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(output, "hi");
        assert_eq!(tool.spec().name, "echo");
    }
}
