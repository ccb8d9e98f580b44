//! The pipeline dispatcher.
//!
//! Drives one [`MessageEvent`] through four strictly ordered stages:
//!
//! ```text
//! ┌──────┐   ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │ Wake │──▶│ Dispatch │──▶│ Default LLM │──▶│ Delivery │
//! └──────┘   └──────────┘   └─────────────┘   └──────────┘
//! ```
//!
//! 1. **Wake**: an event that was not addressed ends here, untouched.
//! 2. **Dispatch**: matching handlers run in registration order. Incremental
//!    handlers are drained one action at a time; each action is delivered
//!    before the next one is requested. The stop flag is checked after every
//!    handler.
//! 3. **Default LLM**: runs when the event addressed the bot, is not stopped
//!    and not suppressed. Events woken only by a passive listener are never
//!    answered here. Producing a result does not suppress it.
//! 4. **Delivery**: a pending result that no yield delivered is sent once.
//!    This also happens for stopped events.
//!
//! Handler errors, handler panics and orchestration errors are logged and
//! counted; none of them stops the event or affects other events.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use nova_core::{BoxError, MessageEvent};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::delivery::{DecorateConfig, Delivery};
use crate::handler::{Action, Handler};
use crate::llm::{LlmConfig, LlmOrchestrator};
use crate::registry::{HandlerEntry, HandlerRegistry, MatchedHandler};
use crate::trigger::TriggerMatch;
use crate::wake::{WakeConfig, WakeStage};

/// Configuration of all pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub decorate: DecorateConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// What happened to one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// The wake stage let the event through.
    pub woken: bool,
    /// Handlers started, failed ones included.
    pub handlers_invoked: usize,
    /// Handlers that returned an error or panicked.
    pub handler_failures: usize,
    /// Chains the send collaborator accepted.
    pub deliveries: usize,
    /// At least one request reached the orchestrator.
    pub llm_invoked: bool,
    /// Dispatch was halted by the stop flag.
    pub stopped: bool,
}

/// Runs events through the stages.
pub struct Pipeline {
    registry: Arc<HandlerRegistry>,
    orchestrator: Arc<LlmOrchestrator>,
    wake: WakeStage,
    delivery: Delivery,
    llm: LlmConfig,
}

impl Pipeline {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        orchestrator: Arc<LlmOrchestrator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            wake: WakeStage::new(config.wake),
            delivery: Delivery::new(config.decorate),
            llm: config.llm,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<LlmOrchestrator> {
        &self.orchestrator
    }

    /// Processes one event to completion.
    pub async fn process(&self, event: Arc<MessageEvent>) -> PipelineReport {
        let span = info_span!(
            "event",
            session = %event.session(),
            message_id = %event.message_obj().message_id()
        );
        self.run(event).instrument(span).await
    }

    async fn run(&self, event: Arc<MessageEvent>) -> PipelineReport {
        let mut report = PipelineReport::default();

        // Wake
        if !self.wake.apply(&event, &self.registry) {
            debug!("Event not addressed, dropping");
            return report;
        }
        report.woken = true;

        // Dispatch
        for MatchedHandler { entry, matched } in self.registry.matching(&event) {
            if event.is_stopped() {
                report.stopped = true;
                break;
            }
            if let TriggerMatch::Command(args) = matched {
                event.set_command_args(args);
            }

            report.handlers_invoked += 1;
            debug!(handler = %entry.name(), kind = entry.handler().kind(), "Invoking handler");
            if let Err(e) = self.invoke(&entry, &event, &mut report).await {
                report.handler_failures += 1;
                error!(handler = %entry.name(), error = %e, "Handler failed");
            }

            if event.is_stopped() {
                debug!(handler = %entry.name(), "Event stopped, skipping remaining handlers");
                report.stopped = true;
                break;
            }
        }

        // Default LLM
        if !report.stopped
            && !event.is_stopped()
            && self.llm.enable_default
            && event.is_wake_up()
            && event.is_at_or_wake_command()
            && !event.is_default_llm_suppressed()
        {
            self.default_llm(&event, &mut report).await;
        }

        // Delivery
        if let Some(result) = event.claim_undelivered_result() {
            if self.delivery.deliver(&event, result).await {
                report.deliveries += 1;
            }
        }

        report.stopped |= event.is_stopped();
        debug!(?report, "Event processed");
        report
    }

    async fn invoke(
        &self,
        entry: &HandlerEntry,
        event: &Arc<MessageEvent>,
        report: &mut PipelineReport,
    ) -> Result<(), BoxError> {
        match entry.handler() {
            Handler::SingleShot(body) => {
                let fut = std::panic::catch_unwind(AssertUnwindSafe(|| body(Arc::clone(event))))
                    .map_err(panic_error)?;
                AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .map_err(panic_error)?
            }
            Handler::Incremental(producer) => {
                let mut actions =
                    std::panic::catch_unwind(AssertUnwindSafe(|| producer(Arc::clone(event))))
                        .map_err(panic_error)?;

                while let Some(action) = AssertUnwindSafe(actions.next())
                    .catch_unwind()
                    .await
                    .map_err(panic_error)?
                {
                    match action? {
                        Action::Result(result) => {
                            event.set_result(result);
                            self.deliver_pending(event, report).await;
                        }
                        Action::Llm(request) => {
                            report.llm_invoked = true;
                            self.orchestrator.request(request, event).await?;
                            self.deliver_pending(event, report).await;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Delivers the event's current result at once if it is still pending.
    async fn deliver_pending(&self, event: &MessageEvent, report: &mut PipelineReport) {
        if let Some(result) = event.claim_undelivered_result() {
            if self.delivery.deliver(event, result).await {
                report.deliveries += 1;
            }
        }
    }

    async fn default_llm(&self, event: &Arc<MessageEvent>, report: &mut PipelineReport) {
        let request = match self.orchestrator.default_request(event).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("Nothing to ask the default LLM");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to prepare default LLM request");
                return;
            }
        };

        report.llm_invoked = true;
        if let Err(e) = self.orchestrator.request(request, event).await {
            warn!(error = %e, "Default LLM request failed");
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> BoxError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("handler panicked: {message}").into()
}
