use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use vidcore::delivery::{AdminAlert, AlertSink};

/// Sends admin alerts to `ADMIN_CHAT_ID`
///
/// Alerts are plain text; URLs and error messages would need escaping
/// for any parse mode.
#[derive(Clone)]
pub struct TelegramAlerts {
    bot: Bot,
    admin_chat: ChatId,
}

impl TelegramAlerts {
    pub fn new(bot: Bot, admin_chat: ChatId) -> Self {
        Self { bot, admin_chat }
    }
}

#[async_trait]
impl AlertSink for TelegramAlerts {
    async fn alert(&self, alert: &AdminAlert) {
        match self.bot.send_message(self.admin_chat, alert.render()).await {
            Ok(_) => log::info!("Admin notification sent to chat {}", self.admin_chat),
            Err(e) => log::error!("Failed to send admin notification: {}", e),
        }
    }
}
