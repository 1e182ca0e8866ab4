//! Handler types and dependencies

use std::sync::Arc;
use std::time::Instant;

use teloxide::types::{CallbackQuery, Message};
use vidcore::core::RateLimiter;
use vidcore::delivery::{AlertSink, MessagingGateway};
use vidcore::extraction::YtDlpExtractor;
use vidcore::storage::PgStore;
use vidcore::{DeliveryResolver, Requester};

use crate::telegram::sessions::{PendingChoices, SessionRegistry};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub store: Arc<PgStore>,
    pub extractor: Arc<YtDlpExtractor>,
    pub resolver: Arc<DeliveryResolver>,
    /// Same gateway the resolver sends through
    pub gateway: Arc<dyn MessagingGateway>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: SessionRegistry,
    pub pending: Arc<PendingChoices>,
    pub alerts: Option<Arc<dyn AlertSink>>,
    pub started_at: Instant,
}

/// Who sent an update, as the core sees it
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub requester: Requester,
    pub username: Option<String>,
}

impl UserInfo {
    /// `None` for messages without a sender, e.g. channel posts
    pub fn from_message(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        Some(Self {
            requester: Requester::new(i64::try_from(user.id.0).ok()?, msg.chat.id.0),
            username: user.username.clone(),
        })
    }

    /// `None` when the query's message is gone
    pub fn from_callback(query: &CallbackQuery) -> Option<Self> {
        let chat_id = query.message.as_ref()?.chat().id;
        Some(Self {
            requester: Requester::new(i64::try_from(query.from.id.0).ok()?, chat_id.0),
            username: query.from.username.clone(),
        })
    }

    pub fn user_id(&self) -> i64 {
        self.requester.user_id
    }
}
