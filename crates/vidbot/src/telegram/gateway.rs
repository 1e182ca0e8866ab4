//! Telegram side of the delivery resolver

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::payloads::setters::*;
use teloxide::requests::Requester as _;
use teloxide::types::{ChatId, InputFile};
use teloxide::{Bot, RequestError};
use vidcore::config;
use vidcore::delivery::{
    ChoicePrompt, DeliveryChoice, DirectLink, GatewayError, MediaKind, MessagingGateway, OutgoingFile, Requester,
};

use super::menu::delivery_choice_keyboard;
use super::sessions::PendingChoices;

/// Maps a Bot API failure onto the resolver's retry taxonomy
pub fn gateway_error(err: RequestError) -> GatewayError {
    match err {
        RequestError::RetryAfter(secs) => GatewayError::RetryAfter(secs.duration()),
        RequestError::Network(e) => GatewayError::Transport(e.to_string()),
        RequestError::Io(e) => GatewayError::Transport(e.to_string()),
        other => GatewayError::Rejected(other.to_string()),
    }
}

/// Streams the file from disk on every attempt
fn input_file(file: &OutgoingFile) -> InputFile {
    InputFile::file(file.path.clone()).file_name(file.file_name.clone())
}

pub struct TelegramGateway {
    bot: Bot,
    pending: Arc<PendingChoices>,
    /// How long a delivery prompt stays answerable
    choice_timeout: Duration,
}

impl TelegramGateway {
    pub fn new(bot: Bot, pending: Arc<PendingChoices>) -> Self {
        Self {
            bot,
            pending,
            choice_timeout: config::session::ttl(),
        }
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_file(&self, to: &Requester, file: &OutgoingFile) -> Result<(), GatewayError> {
        let chat_id = ChatId(to.chat_id);
        let input = input_file(file);
        let caption = file.caption.clone().unwrap_or_default();

        // Parts are not playable on their own
        let sent = if file.part.is_some() {
            self.bot.send_document(chat_id, input).caption(caption).await
        } else {
            match file.kind {
                MediaKind::Video => {
                    self.bot
                        .send_video(chat_id, input)
                        .caption(caption)
                        .supports_streaming(true)
                        .await
                }
                MediaKind::Audio => self.bot.send_audio(chat_id, input).caption(caption).await,
                MediaKind::Image => self.bot.send_photo(chat_id, input).caption(caption).await,
            }
        };

        sent.map(|_| ()).map_err(gateway_error)
    }

    async fn send_link(&self, to: &Requester, link: &DirectLink) -> Result<(), GatewayError> {
        self.bot
            .send_message(ChatId(to.chat_id), link.message())
            .await
            .map(|_| ())
            .map_err(gateway_error)
    }

    async fn prompt_choice(&self, to: &Requester, prompt: &ChoicePrompt) -> Result<DeliveryChoice, GatewayError> {
        let answer = self.pending.register(&prompt.request_id);

        let sent = self
            .bot
            .send_message(ChatId(to.chat_id), prompt.text())
            .reply_markup(delivery_choice_keyboard(&prompt.request_id, &prompt.options))
            .await;
        if let Err(e) = sent {
            self.pending.abandon(&prompt.request_id);
            return Err(gateway_error(e));
        }

        match tokio::time::timeout(self.choice_timeout, answer).await {
            Ok(Ok(choice)) => Ok(choice),
            Ok(Err(_)) => Err(GatewayError::PromptAbandoned),
            Err(_) => {
                log::info!("Delivery prompt for request {} timed out", prompt.request_id);
                self.pending.abandon(&prompt.request_id);
                Err(GatewayError::PromptAbandoned)
            }
        }
    }

    async fn notify(&self, to: &Requester, text: &str) -> Result<(), GatewayError> {
        self.bot
            .send_message(ChatId(to.chat_id), text)
            .await
            .map(|_| ())
            .map_err(gateway_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use teloxide::types::Seconds;
    use teloxide::ApiError;

    #[test]
    fn test_flood_control_keeps_delay() {
        let err = gateway_error(RequestError::RetryAfter(Seconds::from_seconds(7)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_api_errors_are_not_retried() {
        let err = gateway_error(RequestError::Api(ApiError::BotBlocked));
        assert!(matches!(err, GatewayError::Rejected(_)));
        assert!(!err.is_retryable());
    }
}
