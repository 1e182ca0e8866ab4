//! Bot construction and the command enum

use std::time::Duration;

use anyhow::anyhow;
use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use vidcore::config::{self, BotConfig};

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "start the bot and show the menu")]
    Start,
    #[command(description = "show the menu")]
    Menu,
    #[command(description = "show the user guide")]
    Help,
    #[command(description = "recent downloads, optionally for one platform")]
    History(String),
    #[command(description = "delete your download history")]
    ClearHistory,
    #[command(description = "export your history as txt or csv")]
    ExportHistory(String),
    #[command(description = "your usage statistics")]
    Stats,
    #[command(description = "send feedback to the admin")]
    Feedback(String),
    #[command(description = "bot status")]
    Info,
}

/// Creates the bot, pointed at a self-hosted Bot API server when one is configured
///
/// # Errors
/// Fails when the token is missing, `BOT_API_URL` is not a URL or the HTTP
/// client can't be built.
pub fn create_bot(config: &BotConfig) -> anyhow::Result<Bot> {
    let token = config.bot_token()?;
    let client = ClientBuilder::new()
        .timeout(Duration::from_secs(config::telegram::REQUEST_TIMEOUT_SECS))
        .build()?;
    let bot = Bot::with_client(token.expose_secret(), client);

    match &config.bot_api_url {
        Some(raw) => {
            log::info!("Using custom Bot API URL: {}", raw);
            let url = url::Url::parse(raw).map_err(|e| anyhow!("Invalid BOT_API_URL: {}", e))?;
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

/// Publishes the command list shown in Telegram's UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(Command::bot_commands()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_descriptions() {
        let descriptions = Command::descriptions().to_string();
        for name in ["/start", "/history", "/clearhistory", "/exporthistory", "/feedback"] {
            assert!(descriptions.contains(name), "{name} missing");
        }
    }

    #[test]
    fn test_parse_commands_with_arguments() {
        assert_eq!(
            Command::parse("/history youtube", "vidbot").unwrap(),
            Command::History("youtube".into())
        );
        assert_eq!(
            Command::parse("/feedback Great bot!", "vidbot").unwrap(),
            Command::Feedback("Great bot!".into())
        );
        assert_eq!(Command::parse("/clearhistory", "vidbot").unwrap(), Command::ClearHistory);
    }

    #[test]
    fn test_optional_argument_may_be_empty() {
        assert_eq!(
            Command::parse("/exporthistory", "vidbot").unwrap(),
            Command::ExportHistory(String::new())
        );
    }
}
