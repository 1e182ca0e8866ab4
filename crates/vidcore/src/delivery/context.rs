//! Per-request delivery state

use std::fmt;

use strum::{AsRefStr, Display};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::error::DeliveryError;
use super::model::{DownloadRequest, Requester};

/// Why a delivery ended in [`DeliveryState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    IncompleteArtifact,
    UnsupportedKind,
    PartialDeliveryFailure,
    UserCancelled,
    LinkUnavailable,
    SendFailed,
    Internal,
}

/// Delivery state machine.
///
/// ```text
/// Pending -> DirectSend -> Delivered
///         -> AwaitChoice -> SplitParts -> Delivered | Failed
///                        -> DirectLink -> Delivered | Failed
/// ```
///
/// Every non-terminal state may also move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryState {
    #[default]
    Pending,
    DirectSend,
    AwaitChoice,
    SplitParts,
    DirectLink,
    Delivered,
    Failed(FailureReason),
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::Failed(_))
    }

    pub fn can_transition_to(&self, next: &DeliveryState) -> bool {
        use DeliveryState::*;
        match (self, next) {
            (Delivered | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Pending, DirectSend | AwaitChoice) => true,
            (DirectSend, Delivered) => true,
            (AwaitChoice, SplitParts | DirectLink) => true,
            (SplitParts | DirectLink, Delivered) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Pending => f.write_str("pending"),
            DeliveryState::DirectSend => f.write_str("direct_send"),
            DeliveryState::AwaitChoice => f.write_str("await_choice"),
            DeliveryState::SplitParts => f.write_str("split_parts"),
            DeliveryState::DirectLink => f.write_str("direct_link"),
            DeliveryState::Delivered => f.write_str("delivered"),
            DeliveryState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Everything the resolver needs to know about one request.
///
/// Owned by the task handling the request. The cancellation token is shared
/// with whoever may cancel it (the bot's Cancel button), and state changes can
/// be observed through [`DeliveryContext::subscribe`].
#[derive(Debug)]
pub struct DeliveryContext {
    request: DownloadRequest,
    cancel: CancellationToken,
    state: watch::Sender<DeliveryState>,
}

impl DeliveryContext {
    pub fn new(request: DownloadRequest) -> Self {
        Self::with_cancellation(request, CancellationToken::new())
    }

    pub fn with_cancellation(request: DownloadRequest, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(DeliveryState::Pending);
        Self { request, cancel, state }
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    pub fn requester(&self) -> &Requester {
        &self.request.requester
    }

    pub fn state(&self) -> DeliveryState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeliveryState> {
        self.state.subscribe()
    }

    /// Moves to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::IllegalTransition`] if the move is not allowed; the
    /// state is left untouched in that case.
    pub fn transition(&self, next: DeliveryState) -> Result<DeliveryState, DeliveryError> {
        let mut outcome = Err(DeliveryError::IllegalTransition {
            from: self.state(),
            to: next,
        });
        self.state.send_if_modified(|current| {
            if current.can_transition_to(&next) {
                outcome = Ok(std::mem::replace(current, next));
                true
            } else {
                outcome = Err(DeliveryError::IllegalTransition { from: *current, to: next });
                false
            }
        });
        if let Ok(from) = &outcome {
            log::debug!("delivery {}: {} -> {}", self.request.id, from, next);
        }
        outcome
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the request is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
