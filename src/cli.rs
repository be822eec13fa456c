//! Command-line interface definitions for the news bot.
//!
//! Most settings live in the config file (see [`crate::config`]); the flags
//! here choose that file and override the few values operators commonly
//! inject from the environment.

use clap::Parser;
use std::path::PathBuf;

/// Relay new Sea of Thieves news articles to a Discord webhook.
///
/// # Examples
///
/// ```sh
/// # Config from ./bot.env
/// sot_news_bot
///
/// # Explicit config file, webhook from the environment
/// DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/... sot_news_bot -c /etc/sot-news-bot/bot.json
///
/// # One poll then exit
/// sot_news_bot --once
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the config file (.env, .json or .yaml)
    #[arg(short, long, env = "SOT_BOT_CONFIG", default_value = "bot.env")]
    pub config: PathBuf,

    /// Webhook URL; overrides DISCORD_WEBHOOK_URL from the config file
    #[arg(long, env = "DISCORD_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Log level; overrides LOG_LEVEL from the config file
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,
}
