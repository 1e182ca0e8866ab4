//! Callback data codec
//!
//! Every inline button carries one [`CallbackAction`], encoded as
//! `tag:field[:field]`. Telegram rejects callback data above 64 bytes, so
//! encoding fails instead of producing a button that can't be sent.

use std::str::FromStr;

use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use vidcore::config::telegram::CALLBACK_DATA_MAX_BYTES;
use vidcore::extraction::ytdlp::is_safe_format_id;
use vidcore::{DeliveryChoice, MediaKind};

/// Entries of the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum MenuEntry {
    Start,
    Help,
    History,
    ClearHistory,
    Stats,
    Feedback,
    Info,
}

impl MenuEntry {
    pub fn label(self) -> &'static str {
        match self {
            MenuEntry::Start => "🏠 Start",
            MenuEntry::Help => "❓ Help",
            MenuEntry::History => "📜 History",
            MenuEntry::ClearHistory => "🗑 Clear History",
            MenuEntry::Stats => "📊 Stats",
            MenuEntry::Feedback => "💬 Feedback",
            MenuEntry::Info => "ℹ️ Info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Menu(MenuEntry),
    /// Media type picked for a pending request
    Media { request_id: String, kind: MediaKind },
    /// Video format picked for a pending request
    Quality { request_id: String, format_id: String },
    /// Answer to an oversized-artifact prompt
    Deliver { request_id: String, choice: DeliveryChoice },
    Cancel { request_id: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback data is {0} bytes, limit is {max}", max = CALLBACK_DATA_MAX_BYTES)]
    TooLong(usize),

    #[error("malformed callback data: {0}")]
    Malformed(String),
}

impl CallbackAction {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            CallbackAction::Menu(_) => None,
            CallbackAction::Media { request_id, .. }
            | CallbackAction::Quality { request_id, .. }
            | CallbackAction::Deliver { request_id, .. }
            | CallbackAction::Cancel { request_id } => Some(request_id),
        }
    }

    /// Serializes into callback data
    pub fn encode(&self) -> Result<String, CallbackError> {
        let data = match self {
            CallbackAction::Menu(entry) => format!("menu:{}", entry),
            CallbackAction::Media { request_id, kind } => format!("media:{}:{}", request_id, kind),
            CallbackAction::Quality { request_id, format_id } => format!("quality:{}:{}", request_id, format_id),
            CallbackAction::Deliver { request_id, choice } => format!("deliver:{}:{}", request_id, choice),
            CallbackAction::Cancel { request_id } => format!("cancel:{}", request_id),
        };
        if data.len() > CALLBACK_DATA_MAX_BYTES {
            return Err(CallbackError::TooLong(data.len()));
        }
        Ok(data)
    }

    pub fn parse(data: &str) -> Result<Self, CallbackError> {
        if data.len() > CALLBACK_DATA_MAX_BYTES {
            return Err(CallbackError::TooLong(data.len()));
        }
        let malformed = || CallbackError::Malformed(data.to_string());

        let mut fields = data.splitn(3, ':');
        let tag = fields.next().ok_or_else(malformed)?;
        let first = fields.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        let second = fields.next();

        let request_id = || {
            if first.chars().all(|c| c.is_ascii_alphanumeric()) {
                Ok(first.to_string())
            } else {
                Err(malformed())
            }
        };

        match (tag, second) {
            ("menu", None) => MenuEntry::from_str(first).map(CallbackAction::Menu).map_err(|_| malformed()),
            ("media", Some(kind)) => Ok(CallbackAction::Media {
                request_id: request_id()?,
                kind: MediaKind::from_str(kind).map_err(|_| malformed())?,
            }),
            ("quality", Some(format_id)) if is_safe_format_id(format_id) => Ok(CallbackAction::Quality {
                request_id: request_id()?,
                format_id: format_id.to_string(),
            }),
            ("deliver", Some(choice)) => Ok(CallbackAction::Deliver {
                request_id: request_id()?,
                choice: DeliveryChoice::from_str(choice).map_err(|_| malformed())?,
            }),
            ("cancel", None) => Ok(CallbackAction::Cancel {
                request_id: request_id()?,
            }),
            _ => Err(malformed()),
        }
    }
}

impl FromStr for CallbackAction {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
