//! Echo Bot Example
//!
//! A small bot showing the pieces of the Skiff SDK working together:
//!
//! - `/help` and `/start` command handlers
//! - a logging handler that sees every message and lets others run
//! - an echo handler for plain text
//! - a fallback for unknown commands
//! - `/feedback <text>`, forwarded to an admin chat when one is configured
//!
//! # Usage
//!
//! ```bash
//! SKIFF_BOT__TOKEN=001.234:567 cargo run --package echo-bot
//! cargo run --package echo-bot -- --config ./skiff.toml --profile production
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use skiff::prelude::*;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "Echoes text messages back to the sender")]
struct Args {
    /// Configuration file (TOML). Searched for in the usual places if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// Bot token, overriding the configuration.
    #[arg(long, env = "ECHO_BOT_TOKEN")]
    token: Option<String>,

    /// Chat that receives `/feedback` messages.
    #[arg(long)]
    feedback_chat: Option<String>,
}

const HELP_TEXT: &str = "\
Echo Bot - Commands
/help            - This help
/start           - Say hello
/feedback <text> - Send feedback to the admins
Anything else is echoed back.";

fn load(args: &Args) -> Result<SkiffConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }

    if let Some(token) = &args.token {
        loader = loader.set("bot.token", token);
    }
    let mut config = loader.load()?;
    config.bot.name.get_or_insert_with(|| "echo-bot".to_string());
    config
        .bot
        .version
        .get_or_insert_with(|| env!("CARGO_PKG_VERSION").to_string());
    Ok(config)
}

fn register_handlers(bot: &Bot, feedback_chat: Option<String>) {
    // Sees every message; never stops dispatch.
    bot.register(on_message().name("log").handler(|ctx| async move {
        let event = ctx.event();
        info!(
            chat = event.chat_id().unwrap_or("?"),
            from = event.sender_id().unwrap_or("?"),
            text = event.text().unwrap_or(""),
            "Message received"
        );
    }));

    bot.register(on_help().handler(|ctx| async move { ctx.reply(HELP_TEXT).await }));
    bot.register(on_start().handler(|ctx| async move { ctx.reply("Hello! Try /help.").await }));

    if let Some(target) = feedback_chat {
        bot.register(feedback_command(target));
    }

    bot.register(
        on_message()
            .name("echo")
            .filter(Filter::text() & !Filter::command())
            .handler(|ctx| async move {
                let text = ctx.event().text()?.to_owned();
                ctx.reply(&text).await?;
                Ok::<_, HandlerError>(Outcome::Stop)
            }),
    );

    bot.register(
        on_unknown_command()
            .handler(|ctx| async move { ctx.reply("Unknown command. Try /help.").await }),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load(&args)?;
    logging::init_from_config(&config.logging)?;

    let bot = Bot::from_config(&config)?;
    register_handlers(&bot, args.feedback_chat);

    info!(api_url = %config.bot.api_url, "Starting echo bot");
    bot.run_until_signal().await?;
    Ok(())
}
