pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod platform;
pub mod rate_limiter;

pub use config::{BotConfig, ConfigError};
pub use error::{AppError, AppResult};
pub use platform::Platform;
pub use rate_limiter::{RateDecision, RateLimiter};
