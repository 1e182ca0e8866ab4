use thiserror::Error;

use crate::core::config::ConfigError;
use crate::delivery::DeliveryError;
use crate::extraction::ExtractionError;
use crate::storage::StoreError;

/// Centralized error type for the application
///
/// Every concern keeps its own error enum; this one wraps them so handlers and
/// jobs can use `?` across module boundaries.
///
/// # Example
///
/// ```no_run
/// use vidcore::AppError;
///
/// fn handle_error(err: AppError) {
///     log::error!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// History store errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// yt-dlp errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Text that may be shown to the requester
    pub fn user_message(&self) -> String {
        match self {
            AppError::Delivery(e) => e.user_message(),
            AppError::Extraction(e) => e.user_message(),
            AppError::Url(_) => "That doesn't look like a valid URL.".to_string(),
            AppError::Validation(msg) => msg.clone(),
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(StoreError::Database(err))
    }
}
