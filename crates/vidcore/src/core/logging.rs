//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + optional file) on top of `tracing-subscriber`
//! - A `log` → `tracing` bridge so the `log::` macros used across the code end up in the same sinks
//! - Startup configuration banner

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use secrecy::ExposeSecret;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::BotConfig;

const BANNER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Initialize logger for console and, optionally, file output
///
/// The level comes from `RUST_LOG` and defaults to `info`.
///
/// # Arguments
/// * `log_file_path` - File to append plain-text logs to, if any
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Log file could not be opened or a logger is already installed
pub fn init_logger(log_file_path: Option<&Path>) -> Result<()> {
    LogTracer::init().map_err(|e| anyhow!("Failed to install log bridge: {}", e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs_err::create_dir_all(parent)?;
            }
            let file = fs_err::OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective configuration at startup, secrets redacted
pub fn log_configuration(config: &BotConfig) {
    log::info!("{}", BANNER);
    log::info!("🚀 vidrelay {} configuration", env!("CARGO_PKG_VERSION"));
    log::info!("{}", BANNER);

    match &config.telegram_bot_token {
        Some(token) if !token.expose_secret().is_empty() => log::info!("✅ Bot token: set"),
        _ => log::warn!("⚠️  Bot token: not set (TELEGRAM_BOT_TOKEN)"),
    }
    match &config.database_url {
        Some(_) => log::info!("✅ Database: configured"),
        None => log::warn!("⚠️  Database: not configured (DATABASE_URL)"),
    }
    match config.admin_chat_id {
        Some(id) => log::info!("✅ Admin alerts: chat {}", id),
        None => log::warn!("⚠️  Admin alerts: disabled (ADMIN_CHAT_ID not set)"),
    }

    if config.uses_local_bot_api() {
        log::info!(
            "🏠 Local Bot API: {}",
            config.bot_api_url.as_deref().unwrap_or_default()
        );
    } else {
        log::info!("☁️  Bot API: api.telegram.org");
    }

    let limits = config.platform_limits();
    log::info!(
        "📦 Inline limits: video {} MiB, audio {} MiB, image {} MiB",
        limits.video / super::config::limits::MIB,
        limits.audio / super::config::limits::MIB,
        limits.image / super::config::limits::MIB
    );
    log::info!("🎬 yt-dlp: {} (timeout {}s)", config.ytdl_bin, config.ytdlp_timeout_secs);
    log::info!("📁 Temp dir: {}", config.temp_dir.display());
    log::info!(
        "⏱️  Rate limit: {} requests / {}s",
        config.rate_limit_max,
        config.rate_limit_window_secs
    );
    log::info!("{}", BANNER);
}
