//! URL intake and download jobs
//!
//! A message with URLs opens one [`Session`] per supported URL. The session
//! lives until the user picks what to download; then a job task runs
//! extraction and hands the artifact to the delivery resolver.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use vidcore::core::platform::{looks_like_url, parse_supported_url, split_urls};
use vidcore::core::RateDecision;
use vidcore::delivery::{AdminAlert, MessagingGateway};
use vidcore::{DeliveryContext, DownloadRequest, ExtractionError, ExtractionService, MediaKind};

use super::handlers::types::{HandlerDeps, HandlerError, UserInfo};
use super::menu::{cancel_keyboard, media_type_keyboard, quality_keyboard, MEDIA_TYPE_PROMPT, QUALITY_PROMPT};
use super::sessions::Session;

const UNSUPPORTED_HINT: &str = "Please use URLs from YouTube, Instagram, Twitter, TikTok, or Vimeo.";

/// Handles a plain text message: every URL in it becomes a pending request
pub async fn handle_text(bot: Bot, deps: HandlerDeps, msg: Message) -> Result<(), HandlerError> {
    let (Some(user), Some(text)) = (UserInfo::from_message(&msg), msg.text()) else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    if !looks_like_url(text) {
        bot.send_message(chat_id, format!("Send me a media URL. {}", UNSUPPORTED_HINT))
            .await?;
        return Ok(());
    }

    for raw in split_urls(text) {
        let Some((url, platform)) = parse_supported_url(&raw) else {
            log::warn!("Unsupported URL from user {}: {}", user.user_id(), raw);
            bot.send_message(chat_id, format!("Unsupported URL: {}. {}", raw, UNSUPPORTED_HINT))
                .await?;
            continue;
        };

        if let RateDecision::Limited { retry_after } = deps.rate_limiter.try_acquire(user.user_id()) {
            log::info!("Rate limit hit for user {}", user.user_id());
            let minutes = retry_after.as_secs().div_ceil(60).max(1);
            bot.send_message(
                chat_id,
                format!(
                    "Rate limit exceeded. Please wait {} minute(s) before downloading more.",
                    minutes
                ),
            )
            .await?;
            break;
        }

        let interaction_id = match deps
            .store
            .log_interaction(user.user_id(), user.username.as_deref(), url.as_str(), platform)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("Error logging interaction: {}", e);
                None
            }
        };

        let probe = match deps.extractor.probe(&url).await {
            Ok(probe) => probe,
            Err(e) => {
                log::error!("Error processing URL {}: {}", url, e);
                report_failure(&deps, &user, url.as_str(), &e).await;
                bot.send_message(chat_id, e.user_message()).await?;
                continue;
            }
        };

        bot.send_message(chat_id, probe.details_text()).await?;

        let session = deps
            .sessions
            .insert(Session::new(
                DownloadRequest::new_id(),
                user.requester,
                url,
                platform,
                probe,
                interaction_id,
            ))
            .await;

        bot.send_message(chat_id, MEDIA_TYPE_PROMPT)
            .reply_markup(media_type_keyboard(&session.request_id))
            .await?;
        log::info!(
            "Media type selection for user {}, request {}, URL: {}",
            user.user_id(),
            session.request_id,
            session.url
        );
    }

    Ok(())
}

/// Media type button: video asks for a quality, audio and image start right away
pub async fn on_media_selected(
    bot: &Bot,
    deps: &HandlerDeps,
    session: Arc<Session>,
    kind: MediaKind,
) -> Result<(), HandlerError> {
    let chat_id = ChatId(session.requester.chat_id);
    match kind {
        MediaKind::Video if session.probe.formats.is_empty() => {
            bot.send_message(chat_id, ExtractionError::NoFormats.user_message())
                .await?;
        }
        MediaKind::Video => {
            bot.send_message(chat_id, QUALITY_PROMPT)
                .reply_markup(quality_keyboard(&session.request_id, &session.probe))
                .await?;
        }
        MediaKind::Audio | MediaKind::Image => {
            start_download(bot, deps, session, kind, kind.to_string()).await?;
        }
    }
    Ok(())
}

/// Quality button
pub async fn on_quality_selected(
    bot: &Bot,
    deps: &HandlerDeps,
    session: Arc<Session>,
    format_id: String,
) -> Result<(), HandlerError> {
    if session.probe.format(&format_id).is_none() {
        bot.send_message(
            ChatId(session.requester.chat_id),
            "That quality is no longer available. Please pick another one.",
        )
        .await?;
        return Ok(());
    }
    start_download(bot, deps, session, MediaKind::Video, format_id).await
}

async fn start_download(
    bot: &Bot,
    deps: &HandlerDeps,
    session: Arc<Session>,
    kind: MediaKind,
    quality: String,
) -> Result<(), HandlerError> {
    let chat_id = ChatId(session.requester.chat_id);
    if !deps.sessions.start(&session).await {
        bot.send_message(chat_id, "This request is already being downloaded.")
            .await?;
        return Ok(());
    }

    let max_height = session.probe.format(&quality).and_then(|format| format.height);
    let request = DownloadRequest::builder()
        .id(session.request_id.clone())
        .requester(session.requester)
        .url(session.url.clone())
        .quality(quality)
        .kind(kind)
        .platform(session.platform)
        .maybe_max_height(max_height)
        .build();

    if let Some(interaction_id) = session.interaction_id {
        if let Err(e) = deps
            .store
            .set_interaction_choice(interaction_id, &request.quality, kind)
            .await
        {
            log::warn!("Failed to store choice for interaction {}: {}", interaction_id, e);
        }
    }

    bot.send_message(chat_id, format!("⏳ Downloading {}...", kind))
        .reply_markup(cancel_keyboard(&request.id))
        .await?;

    let deps = deps.clone();
    tokio::spawn(async move {
        run_download(deps, session, request).await;
    });
    Ok(())
}

/// Download job: extraction, then delivery. Every outcome reaches the user.
async fn run_download(deps: HandlerDeps, session: Arc<Session>, request: DownloadRequest) {
    log::info!(
        "📥 Request {}: {} {} for user {} ({})",
        request.id,
        request.kind,
        request.quality,
        request.requester.user_id,
        request.url
    );
    let ctx = DeliveryContext::with_cancellation(request, session.cancel.clone());

    match deps.extractor.extract(ctx.request(), &session.cancel).await {
        Ok(artifact) => {
            if let Err(e) = deps.resolver.deliver(&ctx, artifact).await {
                log::warn!("Request {} ended in {}: {}", ctx.request().id, ctx.state(), e);
                log_error(&deps, &ctx, &e.to_string()).await;
            }
        }
        Err(ExtractionError::Cancelled) => {
            log::info!("Request {} cancelled during extraction", ctx.request().id);
            notify(&deps, &ctx, "Download cancelled.").await;
        }
        Err(e) => {
            log::error!("Request {} extraction failed: {}", ctx.request().id, e);
            let user = UserInfo {
                requester: *ctx.requester(),
                username: None,
            };
            report_failure(&deps, &user, ctx.request().url.as_str(), &e).await;
            notify(&deps, &ctx, &e.user_message()).await;
        }
    }

    deps.pending.abandon(&session.request_id);
    deps.sessions.remove(&session.request_id).await;
}

/// Records an extraction failure and tells the admin
async fn report_failure(deps: &HandlerDeps, user: &UserInfo, url: &str, err: &ExtractionError) {
    if let Err(e) = deps
        .store
        .log_error(Some(user.user_id()), Some(url), &err.to_string())
        .await
    {
        log::error!("Error logging error to database: {}", e);
    }
    if let Some(alerts) = &deps.alerts {
        alerts
            .alert(&AdminAlert::RequestFailed {
                user_id: user.user_id(),
                url: url.to_string(),
                error: err.to_string(),
            })
            .await;
    }
}

async fn log_error(deps: &HandlerDeps, ctx: &DeliveryContext, message: &str) {
    let request = ctx.request();
    if let Err(e) = deps
        .store
        .log_error(Some(request.requester.user_id), Some(request.url.as_str()), message)
        .await
    {
        log::error!("Error logging error to database: {}", e);
    }
}

async fn notify(deps: &HandlerDeps, ctx: &DeliveryContext, text: &str) {
    if let Err(e) = deps.gateway.notify(ctx.requester(), text).await {
        log::error!("Failed to notify user {}: {}", ctx.requester().user_id, e);
    }
}
