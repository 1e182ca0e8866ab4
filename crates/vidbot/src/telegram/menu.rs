//! Inline keyboards and fixed texts

use indoc::indoc;
use strum::IntoEnumIterator;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use vidcore::extraction::MediaProbe;
use vidcore::{DeliveryChoice, MediaKind};

use super::callbacks::{CallbackAction, MenuEntry};

pub const WELCOME_TEXT: &str = "👋 Welcome! Send a video, audio or image URL from YouTube, Instagram, Twitter, TikTok or Vimeo, or use the menu below.";

pub const MENU_PROMPT: &str = "Choose an action:";

pub const MEDIA_TYPE_PROMPT: &str = "Select media type to download:";

pub const QUALITY_PROMPT: &str = "Select video quality:";

pub const SESSION_EXPIRED: &str = "Session expired. Please send the URL again.";

pub const FEEDBACK_USAGE: &str = "Please provide feedback. Example: /feedback Great bot!";

pub const HELP_TEXT: &str = indoc! {"
    📖 User guide

    Send a URL to download videos, audio or images from YouTube, Instagram, Twitter, TikTok or Vimeo. \
    Several URLs can be sent at once, separated by commas or new lines.

    Commands:
    /start - start the bot and show the menu
    /menu - show the menu
    /help - show this guide
    /history [platform] - recent downloads, e.g. /history youtube
    /clearhistory - delete your download history
    /exporthistory [txt|csv] - download your history as a file
    /stats - your usage statistics
    /feedback <text> - send feedback to the admin
    /info - bot status

    Files above Telegram's limit (50 MB for video and audio, 10 MB for images) \
    can be split into parts or fetched through a direct link.
"};

/// Turns actions into buttons; an action that can't be encoded is logged and skipped
fn button(label: impl Into<String>, action: CallbackAction) -> Option<InlineKeyboardButton> {
    match action.encode() {
        Ok(data) => Some(InlineKeyboardButton::callback(label.into(), data)),
        Err(e) => {
            log::warn!("Skipping button {:?}: {}", action, e);
            None
        }
    }
}

fn cancel_row(request_id: &str) -> Vec<InlineKeyboardButton> {
    button(
        "❌ Cancel",
        CallbackAction::Cancel {
            request_id: request_id.to_string(),
        },
    )
    .into_iter()
    .collect()
}

pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = MenuEntry::iter()
        .filter_map(|entry| button(entry.label(), CallbackAction::Menu(entry)))
        .map(|b| vec![b])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

pub fn media_type_keyboard(request_id: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = MediaKind::iter()
        .filter_map(|kind| {
            button(
                kind.label(),
                CallbackAction::Media {
                    request_id: request_id.to_string(),
                    kind,
                },
            )
        })
        .map(|b| vec![b])
        .collect();
    rows.push(cancel_row(request_id));
    InlineKeyboardMarkup::new(rows)
}

/// One button per probed resolution, best first
pub fn quality_keyboard(request_id: &str, probe: &MediaProbe) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = probe
        .formats
        .iter()
        .filter_map(|format| {
            button(
                format.label(),
                CallbackAction::Quality {
                    request_id: request_id.to_string(),
                    format_id: format.format_id.clone(),
                },
            )
        })
        .map(|b| vec![b])
        .collect();
    rows.push(cancel_row(request_id));
    InlineKeyboardMarkup::new(rows)
}

pub fn delivery_choice_keyboard(request_id: &str, options: &[DeliveryChoice]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = options
        .iter()
        .filter_map(|&choice| {
            button(
                choice.label(),
                CallbackAction::Deliver {
                    request_id: request_id.to_string(),
                    choice,
                },
            )
        })
        .map(|b| vec![b])
        .collect();
    rows.push(cancel_row(request_id));
    InlineKeyboardMarkup::new(rows)
}

/// Attached to the "downloading" notice so a running request can be stopped
pub fn cancel_keyboard(request_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![cancel_row(request_id)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use teloxide::types::InlineKeyboardButtonKind;
    use vidcore::extraction::VideoFormat;

    fn callback_data(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_main_menu_has_every_entry() {
        let data = callback_data(&main_menu_keyboard());
        assert_eq!(
            data,
            vec![
                "menu:start",
                "menu:help",
                "menu:history",
                "menu:clearhistory",
                "menu:stats",
                "menu:feedback",
                "menu:info"
            ]
        );
    }

    #[test]
    fn test_media_type_keyboard() {
        let data = callback_data(&media_type_keyboard("abc"));
        assert_eq!(
            data,
            vec!["media:abc:video", "media:abc:audio", "media:abc:image", "cancel:abc"]
        );
    }

    #[test]
    fn test_quality_keyboard_follows_probe_order() {
        let probe = MediaProbe {
            title: "Clip".into(),
            duration_secs: None,
            estimated_size: None,
            thumbnail: None,
            formats: vec![
                VideoFormat {
                    format_id: "137".into(),
                    resolution: "1920x1080".into(),
                    height: Some(1080),
                    filesize: None,
                },
                VideoFormat {
                    format_id: "22".into(),
                    resolution: "1280x720".into(),
                    height: Some(720),
                    filesize: None,
                },
            ],
        };
        let markup = quality_keyboard("abc", &probe);
        assert_eq!(callback_data(&markup), vec!["quality:abc:137", "quality:abc:22", "cancel:abc"]);
        assert_eq!(markup.inline_keyboard[0][0].text, "1080p");
    }

    #[test]
    fn test_delivery_choice_keyboard() {
        let data = callback_data(&delivery_choice_keyboard(
            "abc",
            &[DeliveryChoice::SplitParts, DeliveryChoice::DirectLink],
        ));
        assert_eq!(data, vec!["deliver:abc:split", "deliver:abc:link", "cancel:abc"]);
    }

    #[test]
    fn test_help_lists_commands() {
        for command in ["/history", "/clearhistory", "/exporthistory", "/stats", "/feedback", "/info"] {
            assert!(HELP_TEXT.contains(command), "{command} missing from help");
        }
    }
}
