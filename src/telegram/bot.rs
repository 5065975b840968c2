//! Bot initialization and command definitions
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Telegram command menu setup

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Comandos disponíveis:")]
pub enum Command {
    #[command(description = "cria sua conta e mostra as boas-vindas")]
    Start,
    #[command(description = "mostra seu saldo")]
    Saldo,
    #[command(description = "mostra um anúncio para ganhar DOGE")]
    Ganhar,
    #[command(description = "confirma que você viu o anúncio")]
    Confirmar,
    #[command(description = "saca DOGE para sua carteira")]
    Sacar,
    #[command(description = "cancela o saque em andamento")]
    Cancelar,
    #[command(description = "últimos saques")]
    Historico,
    #[command(description = "mostra esta ajuda")]
    Ajuda,
}

impl Command {
    /// Label used in the commands metric.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Saldo => "saldo",
            Command::Ganhar => "ganhar",
            Command::Confirmar => "confirmar",
            Command::Sacar => "sacar",
            Command::Cancelar => "cancelar",
            Command::Historico => "historico",
            Command::Ajuda => "ajuda",
        }
    }
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Missing token, invalid `BOT_API_URL` or HTTP client failure
pub fn create_bot() -> anyhow::Result<Bot> {
    if config::BOT_TOKEN.is_empty() {
        anyhow::bail!("BOT_TOKEN is not set");
    }
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    let bot = Bot::with_client(config::BOT_TOKEN.as_str(), client);

    // Local Bot API server
    let bot = if let Ok(bot_api_url) = std::env::var("BOT_API_URL") {
        log::info!("Using custom Bot API URL: {}", bot_api_url);
        let url = url::Url::parse(&bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
        bot.set_api_url(url)
    } else {
        bot
    };

    Ok(bot)
}

/// Sets up bot commands in Telegram UI
///
/// Admin commands stay hidden from the menu.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    let commands: Vec<BotCommand> = Command::bot_commands();
    bot.set_my_commands(commands).await?;
    Ok(())
}
