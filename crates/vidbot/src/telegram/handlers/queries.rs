//! Inline button presses

use teloxide::prelude::*;
use teloxide::types::ChatId;

use super::types::{HandlerDeps, HandlerError, UserInfo};
use crate::telegram::callbacks::CallbackAction;
use crate::telegram::commands::{execute, CommandAction};
use crate::telegram::downloads::{on_media_selected, on_quality_selected};
use crate::telegram::menu::SESSION_EXPIRED;
use crate::telegram::sessions::Access;

pub async fn handle_callback_query(bot: Bot, deps: HandlerDeps, query: CallbackQuery) -> Result<(), HandlerError> {
    // Stops the button's loading spinner whatever happens next
    if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
        log::warn!("Failed to answer callback query: {}", e);
    }

    let Some(user) = UserInfo::from_callback(&query) else {
        return Ok(());
    };
    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let chat_id = ChatId(user.requester.chat_id);

    let action = match CallbackAction::parse(data) {
        Ok(action) => action,
        Err(e) => {
            log::warn!("Ignoring callback from user {}: {}", user.user_id(), e);
            return Ok(());
        }
    };
    log::debug!("Received callback from user {}: {:?}", user.user_id(), action);

    // Request buttons only work for the requester, and only while the request is known
    let session = match action.request_id() {
        None => None,
        Some(request_id) => match deps.sessions.authorize(request_id, user.user_id()).await {
            Access::Granted(session) => Some(session),
            Access::Denied => {
                log::warn!("User {} pressed a button of request {}", user.user_id(), request_id);
                return Ok(());
            }
            Access::Expired => {
                bot.send_message(chat_id, SESSION_EXPIRED).await?;
                return Ok(());
            }
        },
    };

    match (action, session) {
        (CallbackAction::Menu(entry), _) => execute(&bot, &deps, &user, CommandAction::from(entry)).await?,

        (CallbackAction::Deliver { request_id, choice }, Some(_)) => {
            if deps.pending.resolve(&request_id, choice) {
                log::info!("Request {}: user {} chose {}", request_id, user.user_id(), choice);
            } else {
                bot.send_message(chat_id, SESSION_EXPIRED).await?;
            }
        }

        (CallbackAction::Cancel { request_id }, Some(session)) => {
            deps.pending.abandon(&request_id);
            if deps.sessions.cancel(&session).await {
                // The running job reports the cancellation itself
                log::info!("Request {} cancelled by user {}", request_id, user.user_id());
            } else {
                bot.send_message(chat_id, "Operation cancelled.").await?;
            }
        }

        (CallbackAction::Media { kind, .. }, Some(session)) => on_media_selected(&bot, &deps, session, kind).await?,

        (CallbackAction::Quality { format_id, .. }, Some(session)) => {
            on_quality_selected(&bot, &deps, session, format_id).await?
        }

        // Request-scoped actions always carry their session past the check above
        (_, None) => {}
    }

    Ok(())
}
