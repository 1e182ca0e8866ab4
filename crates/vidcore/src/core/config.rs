use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;

use crate::delivery::PlatformLimits;

/// Name of the optional configuration file read from the working directory
pub const CONFIG_FILE: &str = "vidrelay.toml";

/// Prefix for namespaced environment variables (`VIDRELAY_YTDL_BIN`, ...)
pub const ENV_PREFIX: &str = "VIDRELAY_";

/// Bare environment variables honoured without the prefix
pub const BARE_ENV_KEYS: &[&str] = &[
    "TELEGRAM_BOT_TOKEN",
    "DATABASE_URL",
    "ADMIN_CHAT_ID",
    "BOT_API_URL",
    "WEBHOOK_URL",
];

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration of the bot
///
/// Sources, later ones winning:
/// 1. built-in defaults
/// 2. `vidrelay.toml`
/// 3. `VIDRELAY_*` environment variables
/// 4. `TELEGRAM_BOT_TOKEN`, `DATABASE_URL`, `ADMIN_CHAT_ID`, `BOT_API_URL`, `WEBHOOK_URL`
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub telegram_bot_token: Option<SecretString>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub database_url: Option<SecretString>,

    /// Chat that receives admin alerts; alerts are disabled when unset
    #[serde(default)]
    pub admin_chat_id: Option<i64>,

    /// Self-hosted Bot API server; raises the upload limits
    #[serde(default)]
    pub bot_api_url: Option<String>,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_addr")]
    pub webhook_addr: String,

    #[serde(default = "default_ytdl_bin")]
    pub ytdl_bin: String,

    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    #[serde(default = "default_ytdlp_timeout_secs")]
    pub ytdlp_timeout_secs: u64,

    /// Per-kind overrides in MiB
    #[serde(default)]
    pub video_limit_mb: Option<u64>,
    #[serde(default)]
    pub audio_limit_mb: Option<u64>,
    #[serde(default)]
    pub image_limit_mb: Option<u64>,

    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: usize,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_send_retries")]
    pub send_retries: usize,

    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()).map(SecretString::from))
}

fn default_webhook_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ytdl_bin() -> String {
    ytdlp::DEFAULT_BIN.to_string()
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("vidrelay")
}

fn default_ytdlp_timeout_secs() -> u64 {
    ytdlp::TIMEOUT_SECS
}

fn default_rate_limit_max() -> usize {
    rate_limit::MAX_REQUESTS
}

fn default_rate_limit_window_secs() -> u64 {
    rate_limit::WINDOW_SECS
}

fn default_send_retries() -> usize {
    delivery::SEND_RETRIES
}

impl BotConfig {
    /// Layered provider chain used by [`BotConfig::load`]
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Env::raw().only(BARE_ENV_KEYS))
    }

    /// Loads configuration from the file and the environment.
    ///
    /// `.env` is expected to be loaded by the caller beforehand.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// Extracts and validates configuration from an arbitrary figment
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::Figment(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(api) = &self.bot_api_url {
            Url::parse(api).map_err(|e| ConfigError::Invalid {
                key: "bot_api_url",
                reason: e.to_string(),
            })?;
        }
        if let Some(hook) = &self.webhook_url {
            Url::parse(hook).map_err(|e| ConfigError::Invalid {
                key: "webhook_url",
                reason: e.to_string(),
            })?;
        }
        if self.rate_limit_max == 0 {
            return Err(ConfigError::Invalid {
                key: "rate_limit_max",
                reason: "must be at least 1".to_string(),
            });
        }
        for (key, value) in [
            ("video_limit_mb", self.video_limit_mb),
            ("audio_limit_mb", self.audio_limit_mb),
            ("image_limit_mb", self.image_limit_mb),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "limit must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Bot token, required to run the bot
    pub fn bot_token(&self) -> Result<&SecretString, ConfigError> {
        self.telegram_bot_token
            .as_ref()
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
    }

    /// PostgreSQL connection string, required by `run` and `migrate`
    pub fn database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url.as_ref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    /// Parsed webhook URL, required in webhook mode
    pub fn webhook_url(&self) -> Result<Url, ConfigError> {
        let raw = self.webhook_url.as_deref().ok_or(ConfigError::Missing("WEBHOOK_URL"))?;
        Url::parse(raw).map_err(|e| ConfigError::Invalid {
            key: "webhook_url",
            reason: e.to_string(),
        })
    }

    /// True when requests go to a self-hosted Bot API server
    pub fn uses_local_bot_api(&self) -> bool {
        self.bot_api_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .and_then(|url| url.host_str().map(|h| h != limits::OFFICIAL_API_HOST))
            .unwrap_or(false)
    }

    /// Effective inline-delivery limits in bytes
    pub fn platform_limits(&self) -> PlatformLimits {
        let base = if self.uses_local_bot_api() {
            PlatformLimits::local_bot_api()
        } else {
            PlatformLimits::default()
        };
        PlatformLimits {
            video: self.video_limit_mb.map(limits::mib).unwrap_or(base.video),
            audio: self.audio_limit_mb.map(limits::mib).unwrap_or(base.audio),
            image: self.image_limit_mb.map(limits::mib).unwrap_or(base.image),
        }
    }

    pub fn ytdlp_timeout(&self) -> Duration {
        Duration::from_secs(self.ytdlp_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// Inline-delivery limits
pub mod limits {
    /// Bytes in one mebibyte
    pub const MIB: u64 = 1024 * 1024;

    /// Cloud Bot API upload limit for video and audio (MiB)
    pub const VIDEO_MB: u64 = 50;
    pub const AUDIO_MB: u64 = 50;

    /// Photo upload limit (MiB)
    pub const IMAGE_MB: u64 = 10;

    /// Upload limit of a self-hosted Bot API server (MiB)
    pub const LOCAL_API_MB: u64 = 2000;

    pub const OFFICIAL_API_HOST: &str = "api.telegram.org";

    pub fn mib(mb: u64) -> u64 {
        mb.saturating_mul(MIB)
    }
}

/// Rate limiting configuration
pub mod rate_limit {
    use super::Duration;

    /// Accepted URLs per user inside one window
    pub const MAX_REQUESTS: usize = 10;

    /// Rolling window length (in seconds)
    pub const WINDOW_SECS: u64 = 3600;

    pub fn window() -> Duration {
        Duration::from_secs(WINDOW_SECS)
    }
}

/// Pending session configuration
pub mod session {
    use super::Duration;

    /// Idle lifetime of a pending session (30 minutes)
    pub const TTL_SECS: u64 = 1800;

    /// Upper bound on sessions held in memory
    pub const MAX_SESSIONS: u64 = 10_000;

    pub fn ttl() -> Duration {
        Duration::from_secs(TTL_SECS)
    }
}

/// yt-dlp invocation
pub mod ytdlp {
    use super::Duration;

    pub const DEFAULT_BIN: &str = "yt-dlp";

    /// Timeout for a single yt-dlp run (in seconds)
    pub const TIMEOUT_SECS: u64 = 600;

    /// Passed as both `--retries` and `--extractor-retries`
    pub const RETRIES: u32 = 3;

    /// Timeout for metadata-only runs (probe, --get-url)
    pub const PROBE_TIMEOUT_SECS: u64 = 120;

    pub fn probe_timeout() -> Duration {
        Duration::from_secs(PROBE_TIMEOUT_SECS)
    }
}

/// History retention
pub mod history {
    /// Records kept per user; older ones are trimmed on append
    pub const MAX_RECORDS_PER_USER: i64 = 100;

    /// Records shown by /history
    pub const PAGE_SIZE: i64 = 10;
}

/// Delivery tuning
pub mod delivery {
    use super::Duration;

    /// Extra attempts for a send that failed transiently
    pub const SEND_RETRIES: usize = 2;

    /// First backoff delay (milliseconds)
    pub const RETRY_MIN_DELAY_MS: u64 = 500;

    pub fn retry_min_delay() -> Duration {
        Duration::from_millis(RETRY_MIN_DELAY_MS)
    }
}

/// Telegram API constants
pub mod telegram {
    /// Callback data is limited to 64 bytes by the Bot API
    pub const CALLBACK_DATA_MAX_BYTES: usize = 64;

    /// HTTP timeout for uploads (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 900;
}
