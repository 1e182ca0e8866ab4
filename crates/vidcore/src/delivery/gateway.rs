//! Collaborators of the delivery resolver
//!
//! The resolver only talks to the outside world through these traits. The bot
//! crate implements them on top of Telegram, tests implement them with
//! recording mocks.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::model::{ChoicePrompt, DeliveryChoice, DirectLink, DownloadRequest, OutgoingFile, Requester};
use crate::extraction::ExtractionError;

/// Failure reported by a [`MessagingGateway`]
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Network or server trouble, worth retrying
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform asked us to slow down
    #[error("rate limited, retry after {0:?}")]
    RetryAfter(Duration),

    /// The platform refused the request; retrying won't help
    #[error("rejected: {0}")]
    Rejected(String),

    /// The prompt can no longer be answered (expired, chat gone)
    #[error("prompt abandoned")]
    PromptAbandoned,
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::RetryAfter(_))
    }

    /// Server-mandated delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RetryAfter(delay) => Some(*delay),
            _ => None,
        }
    }
}

/// Outbound channel to the requester
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Sends a whole artifact or one part of it
    async fn send_file(&self, to: &Requester, file: &OutgoingFile) -> Result<(), GatewayError>;

    async fn send_link(&self, to: &Requester, link: &DirectLink) -> Result<(), GatewayError>;

    /// Asks the requester how an oversized artifact should be delivered and
    /// waits for the answer
    async fn prompt_choice(&self, to: &Requester, prompt: &ChoicePrompt) -> Result<DeliveryChoice, GatewayError>;

    /// Plain text message
    async fn notify(&self, to: &Requester, text: &str) -> Result<(), GatewayError>;
}

/// Source of external references for [`DeliveryChoice::DirectLink`]
#[async_trait]
pub trait LinkProvider: Send + Sync {
    async fn direct_link(&self, request: &DownloadRequest) -> Result<DirectLink, ExtractionError>;
}

/// Event worth an operator's attention
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAlert {
    PartialDelivery {
        request_id: String,
        user_id: i64,
        url: String,
        delivered: Vec<usize>,
        failed_index: usize,
        total: usize,
        error: String,
    },
    RequestFailed {
        user_id: i64,
        url: String,
        error: String,
    },
    Feedback {
        user_id: i64,
        username: Option<String>,
        text: String,
    },
}

impl AdminAlert {
    pub fn render(&self) -> String {
        match self {
            AdminAlert::PartialDelivery {
                request_id,
                user_id,
                url,
                delivered,
                failed_index,
                total,
                error,
            } => {
                let sent = if delivered.is_empty() {
                    "none".to_string()
                } else {
                    delivered.iter().map(|i| (i + 1).to_string()).collect::<Vec<_>>().join(", ")
                };
                format!(
                    "⚠️ Partial delivery failure\n\nRequest: {}\nUser: {}\nURL: {}\nParts sent: {} of {}\nFailed at part: {}\nError: {}",
                    request_id,
                    user_id,
                    url,
                    sent,
                    total,
                    failed_index + 1,
                    error
                )
            }
            AdminAlert::RequestFailed { user_id, url, error } => {
                format!("❌ Request failed\n\nUser: {}\nURL: {}\nError: {}", user_id, url, error)
            }
            AdminAlert::Feedback { user_id, username, text } => {
                let who = username
                    .as_deref()
                    .map(|u| format!("@{} ({})", u, user_id))
                    .unwrap_or_else(|| user_id.to_string());
                format!("💬 Feedback from {}\n\n{}", who, text)
            }
        }
    }
}

/// Admin channel
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, alert: &AdminAlert);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(GatewayError::Transport("timeout".into()).is_retryable());
        assert!(GatewayError::RetryAfter(Duration::from_secs(3)).is_retryable());
        assert!(!GatewayError::Rejected("file too big".into()).is_retryable());
        assert!(!GatewayError::PromptAbandoned.is_retryable());
        assert_eq!(
            GatewayError::RetryAfter(Duration::from_secs(3)).retry_after(),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_partial_delivery_alert_lists_sent_parts() {
        let alert = AdminAlert::PartialDelivery {
            request_id: "abc".into(),
            user_id: 7,
            url: "https://youtu.be/x".into(),
            delivered: vec![0, 1],
            failed_index: 2,
            total: 3,
            error: "rejected: Request Entity Too Large".into(),
        };
        let text = alert.render();
        assert!(text.contains("Parts sent: 1, 2 of 3"));
        assert!(text.contains("Failed at part: 3"));
    }

    #[test]
    fn test_feedback_alert() {
        let alert = AdminAlert::Feedback {
            user_id: 5,
            username: Some("neo".into()),
            text: "great bot".into(),
        };
        assert_eq!(alert.render(), "💬 Feedback from @neo (5)\n\ngreat bot");
    }
}
