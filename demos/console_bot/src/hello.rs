//! A few built-in commands to poke the pipeline with.

use std::time::Duration;

use async_trait::async_trait;
use nova::prelude::*;

const HELP: &str = "╭──────────────────────────────╮
│     Console Bot - Commands   │
├──────────────────────────────┤
│ /helloworld   - Say hello    │
│ /echo <text>  - Echo text    │
│ /count <n>    - Count down   │
│ /help         - This help    │
╰──────────────────────────────╯";

/// Longest countdown `/count` accepts.
const MAX_COUNT: u32 = 10;

pub struct Hello;

#[async_trait]
impl Plugin for Hello {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("hello", env!("CARGO_PKG_VERSION"))
            .desc("Greeting, echo and countdown commands")
            .author("XeF2")
    }

    fn register(self: Arc<Self>, registrar: &mut Registrar<'_>) {
        registrar.on(
            Trigger::command("helloworld"),
            Handler::single_shot(|event: Arc<MessageEvent>| async move {
                let name = match event.get_sender_name() {
                    "" => event.get_sender_id().to_string(),
                    name => name.to_string(),
                };
                event.set_result(format!("Hello, {name}!"));
                event.should_call_llm(true);
            }),
        );

        registrar.on(
            Trigger::command("echo"),
            Handler::single_shot(|event: Arc<MessageEvent>| async move {
                let text = event.command_args().join(" ");
                if !text.is_empty() {
                    event.set_result(text);
                }
                event.should_call_llm(true);
            }),
        );

        // Every yielded number is delivered before the next one is produced.
        registrar.on(
            Trigger::command("count"),
            Handler::incremental(|event: Arc<MessageEvent>| {
                async_stream::stream! {
                    event.should_call_llm(true);
                    let from = event
                        .command_args()
                        .first()
                        .and_then(|n| n.parse::<u32>().ok())
                        .unwrap_or(3)
                        .min(MAX_COUNT);
                    for n in (1..=from).rev() {
                        yield EventResult::plain(n.to_string());
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    }
                    yield EventResult::plain("🚀");
                }
            }),
        );

        registrar.on(
            Trigger::command("help"),
            Handler::single_shot(|event: Arc<MessageEvent>| async move {
                event.set_result(HELP.to_string());
                event.stop_event();
            }),
        );
    }
}
