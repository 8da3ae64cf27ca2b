//! Bot initialization
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation

use anyhow::Context;
use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use shopcore::config::Config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Я умею:")]
pub enum Command {
    #[command(description = "показывает главное меню")]
    Start,
    #[command(description = "показывает корзину")]
    Cart,
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Token missing, invalid `BOT_API_URL` or HTTP client failure
pub fn create_bot(config: &Config) -> anyhow::Result<Bot> {
    let token = config.bot_token().context("BOT_TOKEN is not set")?;
    let client = ClientBuilder::new()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let bot = Bot::with_client(token.expose_secret(), client);

    let bot = match &config.bot_api_url {
        Some(bot_api_url) => {
            tracing::info!("Using custom Bot API URL: {}", bot_api_url);
            let url = url::Url::parse(bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            bot.set_api_url(url)
        }
        None => bot,
    };

    Ok(bot)
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(Command::bot_commands()).await?;
    Ok(())
}
