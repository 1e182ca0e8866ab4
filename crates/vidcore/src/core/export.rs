//! Rendering of history for `/history`, `/exporthistory` and `/stats`

use std::fmt::Write as _;

use strum::{Display, EnumString};

use crate::storage::{HistoryRecord, PlatformCount};

/// File format of a history export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Txt,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Exports download history to TXT format
fn export_to_txt(records: &[HistoryRecord]) -> String {
    let mut content = "Download History\n".to_string();
    content.push_str("=".repeat(50).as_str());
    content.push_str("\n\n");

    for (idx, record) in records.iter().enumerate() {
        let _ = writeln!(content, "{}. {}", idx + 1, record.url);
        let _ = writeln!(content, "   Platform: {}", record.platform.label());
        let _ = writeln!(content, "   Type: {}", record.media_kind);
        let _ = writeln!(content, "   Quality: {}", record.quality);
        let _ = writeln!(content, "   Date: {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        content.push('\n');
    }

    content
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\"").replace('\n', " "))
}

/// Exports download history to CSV format
fn export_to_csv(records: &[HistoryRecord]) -> String {
    let mut content = "URL,Platform,Type,Quality,Date\n".to_string();

    for record in records {
        let _ = writeln!(
            content,
            "{},{},{},{},{}",
            csv_field(&record.url),
            record.platform,
            record.media_kind,
            csv_field(&record.quality),
            record.created_at.to_rfc3339()
        );
    }

    content
}

/// Renders `records` in the given format
pub fn render_history(records: &[HistoryRecord], format: ExportFormat) -> String {
    match format {
        ExportFormat::Txt => export_to_txt(records),
        ExportFormat::Csv => export_to_csv(records),
    }
}

/// Name of the exported file, e.g. `history_42.csv`
pub fn export_file_name(user_id: i64, format: ExportFormat) -> String {
    format!("history_{}.{}", user_id, format.extension())
}

/// Short list for the `/history` reply
pub fn format_history_list(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "Your history is empty.".to_string();
    }
    let mut text = "Your recent downloads:\n\n".to_string();
    for (idx, record) in records.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. [{}] {} ({}, {}) - {}",
            idx + 1,
            record.platform.label(),
            record.url,
            record.media_kind,
            record.quality,
            record.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    text
}

/// `/stats` reply
pub fn format_stats(total: i64, per_platform: &[PlatformCount]) -> String {
    if total == 0 {
        return "No downloads yet.".to_string();
    }
    let mut text = format!("📊 Your statistics\n\nTotal downloads: {}\n", total);
    for entry in per_platform {
        let _ = writeln!(text, "• {}: {}", entry.platform, entry.count);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Platform;
    use crate::delivery::{MediaKind, Requester};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn record(url: &str, quality: &str) -> HistoryRecord {
        HistoryRecord {
            requester: Requester::new(42, 42),
            url: url.to_string(),
            quality: quality.to_string(),
            media_kind: MediaKind::Video,
            platform: Platform::Youtube,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_txt_export() {
        let text = render_history(&[record("https://youtu.be/a", "22")], ExportFormat::Txt);
        assert!(text.starts_with("Download History\n"));
        assert!(text.contains("1. https://youtu.be/a\n"));
        assert!(text.contains("   Platform: YouTube\n"));
        assert!(text.contains("   Quality: 22\n"));
        assert!(text.contains("   Date: 2024-03-01 12:30:00 UTC\n"));
    }

    #[test]
    fn test_csv_export_escapes_quotes() {
        let csv = render_history(&[record("https://youtu.be/a", "best \"hd\"")], ExportFormat::Csv);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "URL,Platform,Type,Quality,Date");
        assert_eq!(
            lines[1],
            "\"https://youtu.be/a\",youtube,video,\"best \"\"hd\"\"\",2024-03-01T12:30:00+00:00"
        );
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!(ExportFormat::from_str("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_str("txt").unwrap(), ExportFormat::Txt);
        assert!(ExportFormat::from_str("json").is_err());
        assert_eq!(export_file_name(9, ExportFormat::Csv), "history_9.csv");
    }

    #[test]
    fn test_history_list() {
        assert_eq!(format_history_list(&[]), "Your history is empty.");
        let text = format_history_list(&[record("https://youtu.be/a", "audio")]);
        assert!(text.contains("1. [YouTube] https://youtu.be/a (video, audio) - 2024-03-01 12:30"));
    }

    #[test]
    fn test_stats() {
        assert_eq!(format_stats(0, &[]), "No downloads yet.");
        let text = format_stats(
            3,
            &[
                PlatformCount {
                    platform: "youtube".into(),
                    count: 2,
                },
                PlatformCount {
                    platform: "vimeo".into(),
                    count: 1,
                },
            ],
        );
        assert!(text.contains("Total downloads: 3"));
        assert!(text.contains("• youtube: 2"));
        assert!(text.contains("• vimeo: 1"));
    }
}
