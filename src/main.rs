use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use notion_relay::chat::{ChatSurface, TelegramChat};
use notion_relay::config;
use notion_relay::handlers::{self, Relay};
use notion_relay::model::Checkpoint;
use notion_relay::notion::{NotionClient, NotionService};
use notion_relay::poller::Poller;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.app.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let notion: Arc<dyn NotionService> = Arc::new(NotionClient::from_config(&cfg));
    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let chat: Arc<dyn ChatSurface> = Arc::new(TelegramChat::new(bot.clone()));

    let poller = Arc::new(Poller::new(
        notion.clone(),
        chat.clone(),
        cfg.app.max_items_per_check,
        Checkpoint::lookback(cfg.app.lookback_days),
    ));
    tokio::spawn(poller.clone().run(
        cfg.telegram.chat_id,
        Duration::from_secs(cfg.app.first_poll_delay_secs),
        Duration::from_secs(cfg.app.poll_interval_secs),
    ));

    let relay = Arc::new(Relay::new(
        notion,
        chat,
        poller,
        cfg.notion.fields.clone(),
        cfg.app.max_items_per_check,
    ));

    info!("starting telegram bot");
    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![relay])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("bot stopped");
    Ok(())
}
