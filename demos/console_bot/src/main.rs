//! Console Bot
//!
//! Chats with the Nova pipeline over stdin/stdout. Every line typed becomes
//! one message from the console user; replies, recalls and mutes are printed.
//!
//! # Usage
//!
//! ```bash
//! # private chat, config from ./nova.toml if present
//! cargo run --package console-bot
//!
//! # pretend to be a group member, to exercise the spam detector
//! cargo run --package console-bot -- --config demos/console_bot/nova.toml --group g1
//! ```
//!
//! Type `/help` for the built-in commands. Logs go to stderr unless the
//! config says otherwise.

mod console;
mod hello;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nova::prelude::*;
use nova_plugin_spam_detector::SpamDetector;
use tracing::info;

use crate::console::{ConsoleIdentity, ConsolePlatform};
use crate::hello::Hello;

#[derive(Parser, Debug)]
#[command(name = "console-bot", version, about = "Chat with a Nova bot from the terminal")]
struct Args {
    /// Config file; searched for as nova.{toml,yaml,yml} when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Config profile (development, production, test, or a custom name)
    #[arg(short, long)]
    profile: Option<String>,

    /// User id of the console user
    #[arg(long, default_value = "console")]
    user: String,

    /// Nickname of the console user
    #[arg(long, default_value = "Console User")]
    name: String,

    /// Send messages to this group instead of a private chat
    #[arg(long, value_name = "GROUP_ID")]
    group: Option<String>,

    /// Leave out the spam detector plugin
    #[arg(long)]
    no_spam_detector: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let platform = ConsolePlatform::new(ConsoleIdentity {
        user_id: args.user,
        nickname: args.name,
        group_id: args.group,
    });

    let mut builder = NovaRuntime::builder()
        .platform(Arc::new(platform))
        .plugin(Arc::new(Hello));
    if let Some(path) = args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = args.profile {
        builder = builder.profile(profile);
    }
    if !args.no_spam_detector {
        builder = builder.plugin(Arc::new(SpamDetector::new()));
    }

    let runtime = builder.build().await.context("failed to build runtime")?;
    info!(
        prefixes = ?runtime.config().pipeline.wake.prefixes,
        "Console bot configured"
    );

    runtime.run().await?;
    Ok(())
}
