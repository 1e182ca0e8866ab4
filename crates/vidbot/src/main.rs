use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::update_listeners::{webhooks, Polling};
use tokio::time::interval;
use url::Url;
use vidcore::config::BotConfig;
use vidcore::core::logging::{init_logger, log_configuration};
use vidcore::core::RateLimiter;
use vidcore::delivery::{AlertSink, MessagingGateway};
use vidcore::extraction::{ExtractionService, MediaProbe, YtDlpExtractor};
use vidcore::storage::PgStore;
use vidcore::DeliveryResolver;

mod cli;
mod telegram;

use cli::{Cli, Commands};
use telegram::{
    create_bot, schema, setup_bot_commands, HandlerDeps, PendingChoices, SessionRegistry, TelegramAlerts,
    TelegramGateway,
};

/// How often stale rate-limit entries are dropped
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to the subcommand.
///
/// # Errors
/// Returns an error if initialization fails (configuration, logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Before the config is read, so .env values take part in it
    let _ = dotenv();

    let cli = Cli::parse_args();
    let config = BotConfig::load().context("Failed to load configuration")?;
    init_logger(config.log_file.as_deref())?;

    match cli.command {
        Some(Commands::Run { webhook }) => {
            log::info!("Running bot (webhook: {})", webhook);
            run_bot(config, webhook).await
        }
        Some(Commands::Migrate) => run_migrate(config).await,
        Some(Commands::Probe { url, json }) => run_probe(config, &url, json).await,
        None => {
            log::info!("No command specified, running bot in default mode");
            run_bot(config, false).await
        }
    }
}

async fn connect_store(config: &BotConfig) -> Result<PgStore> {
    let store = PgStore::connect(config.database_url()?)
        .await
        .context("Failed to connect to PostgreSQL")?;
    store.init_schema().await.context("Failed to initialize schema")?;
    Ok(store)
}

async fn run_migrate(config: BotConfig) -> Result<()> {
    connect_store(&config).await?;
    log::info!("✅ Database schema is up to date");
    Ok(())
}

async fn run_probe(config: BotConfig, raw_url: &str, json: bool) -> Result<()> {
    let url = Url::parse(raw_url).with_context(|| format!("Invalid URL: {}", raw_url))?;
    let extractor = YtDlpExtractor::from_config(&config);
    let probe = extractor.probe(&url).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&probe_json(&url, &probe))?);
    } else {
        println!("{}", probe.details_text());
        for format in &probe.formats {
            println!("  {:>8}  {}", format.format_id, format.label());
        }
    }
    Ok(())
}

fn probe_json(url: &Url, probe: &MediaProbe) -> serde_json::Value {
    serde_json::json!({
        "url": url.as_str(),
        "title": probe.title,
        "duration": probe.duration_secs,
        "estimated_size": probe.estimated_size,
        "thumbnail": probe.thumbnail,
        "formats": probe.formats.iter().map(|f| serde_json::json!({
            "format_id": f.format_id,
            "resolution": f.resolution,
            "height": f.height,
            "filesize": f.filesize,
        })).collect::<Vec<_>>(),
    })
}

async fn run_bot(config: BotConfig, use_webhook: bool) -> Result<()> {
    let started_at = Instant::now();
    log_configuration(&config);

    let store = Arc::new(connect_store(&config).await?);
    log::info!("✅ Database ready");

    let extractor = Arc::new(YtDlpExtractor::from_config(&config));
    extractor
        .ensure_work_dir()
        .await
        .with_context(|| format!("Failed to create {}", extractor.work_dir().display()))?;
    match extractor.version().await {
        Ok(version) => log::info!("✅ yt-dlp {}", version),
        Err(e) => log::warn!("⚠️  yt-dlp not usable yet: {}", e),
    }

    let bot = create_bot(&config)?;
    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let pending = Arc::new(PendingChoices::default());
    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(bot.clone(), Arc::clone(&pending)));
    let alerts: Option<Arc<dyn AlertSink>> = config
        .admin_chat_id
        .map(|id| Arc::new(TelegramAlerts::new(bot.clone(), ChatId(id))) as Arc<dyn AlertSink>);

    let resolver = DeliveryResolver::builder()
        .gateway(Arc::clone(&gateway))
        .history(store.clone())
        .links(extractor.clone())
        .maybe_alerts(alerts.clone())
        .limits(config.platform_limits())
        .send_retries(config.send_retries)
        .build();
    log::info!(
        "📦 Inline limits: video {} B, audio {} B, image {} B",
        resolver.limits().video,
        resolver.limits().audio,
        resolver.limits().image
    );

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_max, config.rate_limit_window()));
    let limiter_cleanup = Arc::clone(&rate_limiter);
    tokio::spawn(async move {
        let mut ticker = interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            limiter_cleanup.cleanup();
        }
    });

    let deps = HandlerDeps {
        store,
        extractor,
        resolver: Arc::new(resolver),
        gateway,
        rate_limiter,
        sessions: SessionRegistry::default(),
        pending,
        alerts,
        started_at,
    };

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema(deps))
        .enable_ctrlc_handler()
        .error_handler(LoggingErrorHandler::with_custom_text("An error has occurred in the dispatcher"))
        .build();
    let listener_errors = LoggingErrorHandler::with_custom_text("An error from the update listener");

    log::info!(
        "🎉 Bot initialization complete in {:.2}s",
        started_at.elapsed().as_secs_f64()
    );

    if use_webhook {
        let url = config.webhook_url()?;
        let addr: SocketAddr = config
            .webhook_addr
            .parse()
            .with_context(|| format!("Invalid webhook address: {}", config.webhook_addr))?;
        log::info!("📡 Starting webhook at {} (listening on {})", url, addr);

        let listener = webhooks::axum(bot.clone(), webhooks::Options::new(addr, url)).await?;
        dispatcher.dispatch_with_listener(listener, listener_errors).await;
    } else {
        log::info!("📡 Starting long polling");
        let listener = Polling::builder(bot.clone()).drop_pending_updates().build();
        dispatcher.dispatch_with_listener(listener, listener_errors).await;
    }

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}
