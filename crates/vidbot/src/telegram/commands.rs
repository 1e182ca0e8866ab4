//! Command routing
//!
//! [`dispatch`] turns a parsed [`Command`] into a [`CommandAction`] without
//! touching Telegram or the database; [`execute`] carries the action out.
//! Menu buttons go through the same actions.

use std::str::FromStr;

use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile};
use vidcore::core::export::{self, ExportFormat};
use vidcore::core::{AppError, Platform};
use vidcore::delivery::AdminAlert;
use vidcore::extraction::format_duration;
use vidcore::storage::HistoryFilter;
use vidcore::{HistoryStore, MediaKind};

use super::bot::Command;
use super::callbacks::MenuEntry;
use super::handlers::types::{HandlerDeps, HandlerError, UserInfo};
use super::menu::{main_menu_keyboard, FEEDBACK_USAGE, HELP_TEXT, MENU_PROMPT, WELCOME_TEXT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Welcome,
    ShowMenu,
    Help,
    Info,
    History(Option<Platform>),
    ClearHistory,
    Export(ExportFormat),
    Stats,
    Feedback(String),
    FeedbackUsage,
    UnknownPlatform(String),
    UnknownExportFormat(String),
}

fn parse_platform(arg: &str) -> Result<Option<Platform>, CommandAction> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(None);
    }
    match Platform::from_str(arg) {
        Ok(platform) if platform.is_supported() => Ok(Some(platform)),
        _ if arg.eq_ignore_ascii_case("x") => Ok(Some(Platform::Twitter)),
        _ => Err(CommandAction::UnknownPlatform(arg.to_string())),
    }
}

fn parse_export_format(arg: &str) -> Result<ExportFormat, CommandAction> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(ExportFormat::default());
    }
    ExportFormat::from_str(arg).map_err(|_| CommandAction::UnknownExportFormat(arg.to_string()))
}

/// Decides what a command does
pub fn dispatch(command: &Command) -> CommandAction {
    match command {
        Command::Start => CommandAction::Welcome,
        Command::Menu => CommandAction::ShowMenu,
        Command::Help => CommandAction::Help,
        Command::Info => CommandAction::Info,
        Command::History(arg) => parse_platform(arg).map_or_else(|e| e, CommandAction::History),
        Command::ClearHistory => CommandAction::ClearHistory,
        Command::ExportHistory(arg) => parse_export_format(arg).map_or_else(|e| e, CommandAction::Export),
        Command::Stats => CommandAction::Stats,
        Command::Feedback(text) => {
            let text = text.trim();
            if text.is_empty() {
                CommandAction::FeedbackUsage
            } else {
                CommandAction::Feedback(text.to_string())
            }
        }
    }
}

impl From<MenuEntry> for CommandAction {
    fn from(entry: MenuEntry) -> Self {
        match entry {
            MenuEntry::Start => CommandAction::Welcome,
            MenuEntry::Help => CommandAction::Help,
            MenuEntry::History => CommandAction::History(None),
            MenuEntry::ClearHistory => CommandAction::ClearHistory,
            MenuEntry::Stats => CommandAction::Stats,
            MenuEntry::Feedback => CommandAction::FeedbackUsage,
            MenuEntry::Info => CommandAction::Info,
        }
    }
}

/// Runs `action` for `user`, replying in their chat
pub async fn execute(bot: &Bot, deps: &HandlerDeps, user: &UserInfo, action: CommandAction) -> Result<(), HandlerError> {
    let chat_id = ChatId(user.requester.chat_id);
    let user_id = user.user_id();

    match action {
        CommandAction::Welcome => {
            bot.send_message(chat_id, WELCOME_TEXT).await?;
            send_menu(bot, chat_id).await?;
        }
        CommandAction::ShowMenu => send_menu(bot, chat_id).await?,
        CommandAction::Help => {
            bot.send_message(chat_id, HELP_TEXT).await?;
        }
        CommandAction::Info => {
            bot.send_message(chat_id, info_text(deps)).await?;
        }
        CommandAction::History(platform) => {
            let filter = match platform {
                Some(p) => HistoryFilter::default().platform(p),
                None => HistoryFilter::default(),
            };
            let text = match deps.store.query(user_id, filter).await {
                Ok(records) => export::format_history_list(&records),
                Err(e) => {
                    log::error!("Failed to fetch history for user {}: {}", user_id, e);
                    "Error fetching history. Please try again.".to_string()
                }
            };
            bot.send_message(chat_id, text).await?;
        }
        CommandAction::ClearHistory => {
            let text = match deps.store.delete_all(user_id).await {
                Ok(removed) => {
                    log::info!("Cleared {} history records for user {}", removed, user_id);
                    "Your history has been cleared.".to_string()
                }
                Err(e) => {
                    log::error!("Failed to clear history for user {}: {}", user_id, e);
                    "Failed to clear history. Please try again.".to_string()
                }
            };
            bot.send_message(chat_id, text).await?;
        }
        CommandAction::Export(format) => match deps.store.query(user_id, HistoryFilter::all()).await {
            Ok(records) if records.is_empty() => {
                bot.send_message(chat_id, "Your history is empty.").await?;
            }
            Ok(records) => {
                let content = export::render_history(&records, format);
                let file = InputFile::memory(content.into_bytes()).file_name(export::export_file_name(user_id, format));
                bot.send_document(chat_id, file)
                    .caption(format!("📄 {} downloads", records.len()))
                    .await?;
                log::info!("Exported {} history records as {} for user {}", records.len(), format, user_id);
            }
            Err(e) => {
                log::error!("Failed to export history for user {}: {}", user_id, e);
                bot.send_message(chat_id, "Error exporting history. Please try again.").await?;
            }
        },
        CommandAction::Stats => {
            let stats = async {
                let total = deps.store.total_downloads(user_id).await?;
                let per_platform = deps.store.platform_counts(user_id).await?;
                Ok::<_, AppError>(export::format_stats(total, &per_platform))
            };
            let text = match stats.await {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to compute stats for user {}: {}", user_id, e);
                    e.user_message()
                }
            };
            bot.send_message(chat_id, text).await?;
        }
        CommandAction::Feedback(text) => {
            if let Err(e) = deps.store.save_feedback(user_id, user.username.as_deref(), &text).await {
                log::error!("Failed to save feedback from user {}: {}", user_id, e);
            }
            if let Some(alerts) = &deps.alerts {
                alerts
                    .alert(&AdminAlert::Feedback {
                        user_id,
                        username: user.username.clone(),
                        text: text.clone(),
                    })
                    .await;
            }
            log::info!("Feedback from user {}: {}", user_id, text);
            bot.send_message(chat_id, "Thank you for your feedback!").await?;
        }
        CommandAction::FeedbackUsage => {
            bot.send_message(chat_id, FEEDBACK_USAGE).await?;
        }
        CommandAction::UnknownPlatform(name) => {
            bot.send_message(
                chat_id,
                format!(
                    "Unknown platform '{}'. Use one of: youtube, instagram, twitter, tiktok, vimeo.",
                    name
                ),
            )
            .await?;
        }
        CommandAction::UnknownExportFormat(name) => {
            bot.send_message(chat_id, format!("Unknown export format '{}'. Use txt or csv.", name))
                .await?;
        }
    }

    Ok(())
}

async fn send_menu(bot: &Bot, chat_id: ChatId) -> Result<(), HandlerError> {
    bot.send_message(chat_id, MENU_PROMPT)
        .reply_markup(main_menu_keyboard())
        .await?;
    Ok(())
}

fn info_text(deps: &HandlerDeps) -> String {
    let limits = deps.resolver.limits();
    let mb = |bytes: u64| bytes / vidcore::config::limits::MIB;
    format!(
        "ℹ️ Bot info\n\nVersion: {}\nUptime: {}\nStatus: running\nActive requests: {}\nLimits: video {} MB, audio {} MB, image {} MB",
        env!("CARGO_PKG_VERSION"),
        format_duration(deps.started_at.elapsed().as_secs_f64()),
        deps.sessions.active_count(),
        mb(limits.limit_for(MediaKind::Video)),
        mb(limits.limit_for(MediaKind::Audio)),
        mb(limits.limit_for(MediaKind::Image)),
    )
}

/// Handles `/command` messages
pub async fn handle_command(bot: Bot, deps: HandlerDeps, msg: Message, command: Command) -> Result<(), HandlerError> {
    let Some(user) = UserInfo::from_message(&msg) else {
        return Ok(());
    };
    log::info!("Command {:?} from user {}", command, user.user_id());
    execute(&bot, &deps, &user, dispatch(&command)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_commands() {
        assert_eq!(dispatch(&Command::Start), CommandAction::Welcome);
        assert_eq!(dispatch(&Command::Menu), CommandAction::ShowMenu);
        assert_eq!(dispatch(&Command::Help), CommandAction::Help);
        assert_eq!(dispatch(&Command::ClearHistory), CommandAction::ClearHistory);
        assert_eq!(dispatch(&Command::Stats), CommandAction::Stats);
        assert_eq!(dispatch(&Command::Info), CommandAction::Info);
    }

    #[test]
    fn test_history_platform_filter() {
        assert_eq!(dispatch(&Command::History(String::new())), CommandAction::History(None));
        assert_eq!(
            dispatch(&Command::History(" Instagram ".into())),
            CommandAction::History(Some(Platform::Instagram))
        );
        assert_eq!(
            dispatch(&Command::History("x".into())),
            CommandAction::History(Some(Platform::Twitter))
        );
        assert_eq!(
            dispatch(&Command::History("myspace".into())),
            CommandAction::UnknownPlatform("myspace".into())
        );
        assert_eq!(
            dispatch(&Command::History("unknown".into())),
            CommandAction::UnknownPlatform("unknown".into())
        );
    }

    #[test]
    fn test_export_formats() {
        assert_eq!(
            dispatch(&Command::ExportHistory(String::new())),
            CommandAction::Export(ExportFormat::Txt)
        );
        assert_eq!(
            dispatch(&Command::ExportHistory("CSV".into())),
            CommandAction::Export(ExportFormat::Csv)
        );
        assert_eq!(
            dispatch(&Command::ExportHistory("pdf".into())),
            CommandAction::UnknownExportFormat("pdf".into())
        );
    }

    #[test]
    fn test_feedback_needs_text() {
        assert_eq!(dispatch(&Command::Feedback("  ".into())), CommandAction::FeedbackUsage);
        assert_eq!(
            dispatch(&Command::Feedback(" Great bot! ".into())),
            CommandAction::Feedback("Great bot!".into())
        );
    }

    #[test]
    fn test_menu_entries_share_command_actions() {
        assert_eq!(CommandAction::from(MenuEntry::Start), dispatch(&Command::Start));
        assert_eq!(CommandAction::from(MenuEntry::Help), dispatch(&Command::Help));
        assert_eq!(
            CommandAction::from(MenuEntry::History),
            dispatch(&Command::History(String::new()))
        );
        assert_eq!(CommandAction::from(MenuEntry::Feedback), CommandAction::FeedbackUsage);
    }
}
