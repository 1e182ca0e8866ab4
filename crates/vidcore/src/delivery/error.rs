//! Delivery failures and how they are reported to the requester

use thiserror::Error;

use super::context::{DeliveryState, FailureReason};
use super::gateway::GatewayError;
use crate::extraction::ExtractionError;

/// Errors raised while delivering an artifact
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Size or kind of the artifact is unknown
    #[error("incomplete artifact: missing {missing}")]
    IncompleteArtifact { missing: &'static str },

    #[error("unsupported media kind: {0}")]
    UnsupportedKind(String),

    /// A split delivery stopped half-way; `delivered` holds the 0-based
    /// indices of parts that did reach the requester
    #[error("part {} of {total} failed after {} delivered: {source}", .failed_index + 1, .delivered.len())]
    PartialDeliveryFailure {
        delivered: Vec<usize>,
        failed_index: usize,
        total: usize,
        #[source]
        source: GatewayError,
    },

    #[error("cancelled by user")]
    UserCancelled,

    /// Direct link could not be obtained
    #[error("direct link unavailable: {0}")]
    Link(#[source] ExtractionError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("illegal state transition {from} -> {to}")]
    IllegalTransition { from: DeliveryState, to: DeliveryState },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    /// Reason recorded in [`DeliveryState::Failed`]
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            DeliveryError::IncompleteArtifact { .. } => FailureReason::IncompleteArtifact,
            DeliveryError::UnsupportedKind(_) => FailureReason::UnsupportedKind,
            DeliveryError::PartialDeliveryFailure { .. } => FailureReason::PartialDeliveryFailure,
            DeliveryError::UserCancelled => FailureReason::UserCancelled,
            DeliveryError::Link(_) => FailureReason::LinkUnavailable,
            DeliveryError::Gateway(_) => FailureReason::SendFailed,
            DeliveryError::IllegalTransition { .. } | DeliveryError::Io(_) => FailureReason::Internal,
        }
    }

    /// Text shown to the requester
    pub fn user_message(&self) -> String {
        match self {
            DeliveryError::IncompleteArtifact { .. } => {
                "❌ The download finished but the file could not be read. Please try again.".to_string()
            }
            DeliveryError::UnsupportedKind(kind) => format!("❌ Sending {} files is not supported.", kind),
            DeliveryError::PartialDeliveryFailure {
                delivered, total, ..
            } => format!(
                "❌ Sending stopped after {} of {} parts. Please try again or choose a direct link.",
                delivered.len(),
                total
            ),
            DeliveryError::UserCancelled => "Download cancelled.".to_string(),
            DeliveryError::Link(_) => "❌ Could not get a direct link for this media.".to_string(),
            DeliveryError::Gateway(GatewayError::PromptAbandoned) => {
                "Session expired. Please send the URL again.".to_string()
            }
            DeliveryError::Gateway(_) | DeliveryError::IllegalTransition { .. } | DeliveryError::Io(_) => {
                "❌ Failed to send the file. Please try again later.".to_string()
            }
        }
    }
}
