//! Requests, artifacts and the messages the resolver hands to the gateway

use std::path::{Path, PathBuf};

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use url::Url;

use crate::core::config::limits;
use crate::core::Platform;

/// Who asked for the media and where replies go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: i64,
    pub chat_id: i64,
}

impl Requester {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self { user_id, chat_id }
    }
}

/// Kind of media the user asked for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "Video",
            MediaKind::Audio => "Audio",
            MediaKind::Image => "Image",
        }
    }
}

/// A single download, fixed once the user has picked kind and quality
#[derive(Debug, Clone, Builder)]
pub struct DownloadRequest {
    #[builder(default = DownloadRequest::new_id())]
    pub id: String,
    pub requester: Requester,
    pub url: Url,
    /// yt-dlp format id, or `audio` / `image`
    #[builder(into)]
    pub quality: String,
    pub kind: MediaKind,
    #[builder(default)]
    pub platform: Platform,
    /// Height of the chosen video format, when the probe knew it
    pub max_height: Option<u32>,
}

impl DownloadRequest {
    /// Short random id; fits comfortably into callback data
    pub fn new_id() -> String {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(12);
        id
    }
}

/// A file produced by extraction.
///
/// Size and kind stay optional so an incomplete artifact can be represented
/// and rejected by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    pub kind: Option<String>,
}

impl MediaArtifact {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            size_bytes: Some(size_bytes),
            kind: Some(kind.to_string()),
        }
    }

    /// Builds an artifact from a file on disk, reading its size
    pub async fn from_file(path: impl AsRef<Path>, kind: MediaKind) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs_err::tokio::metadata(path).await?;
        Ok(Self::new(path, metadata.len(), kind))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string())
    }
}

/// Inline-delivery limits in bytes, per media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLimits {
    pub video: u64,
    pub audio: u64,
    pub image: u64,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            video: limits::mib(limits::VIDEO_MB),
            audio: limits::mib(limits::AUDIO_MB),
            image: limits::mib(limits::IMAGE_MB),
        }
    }
}

impl PlatformLimits {
    /// Limits of a self-hosted Bot API server
    pub fn local_bot_api() -> Self {
        Self {
            video: limits::mib(limits::LOCAL_API_MB),
            audio: limits::mib(limits::LOCAL_API_MB),
            image: limits::mib(limits::IMAGE_MB),
        }
    }

    pub fn limit_for(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Video => self.video,
            MediaKind::Audio => self.audio,
            MediaKind::Image => self.image,
        }
    }
}

/// How the requester wants an oversized artifact delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryChoice {
    #[strum(serialize = "split")]
    SplitParts,
    #[strum(serialize = "link")]
    DirectLink,
}

impl DeliveryChoice {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryChoice::SplitParts => "✂️ Split into parts",
            DeliveryChoice::DirectLink => "🔗 Direct link",
        }
    }
}

/// Decision taken for an artifact before anything is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPlan {
    /// Fits the inline limit, send as is
    DirectSend { kind: MediaKind, size: u64 },
    /// Too big, the requester has to choose first
    AwaitChoice {
        kind: MediaKind,
        size: u64,
        limit: u64,
        parts: usize,
    },
}

/// Question put to the requester for an oversized artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoicePrompt {
    pub request_id: String,
    pub kind: MediaKind,
    pub size_bytes: u64,
    pub limit_bytes: u64,
    /// Number of parts a split would produce
    pub parts: usize,
    pub options: Vec<DeliveryChoice>,
}

impl ChoicePrompt {
    pub fn text(&self) -> String {
        format!(
            "⚠️ This {} is {}, above Telegram's {} limit.\n\nSplit it into {} parts or get a direct link?",
            self.kind,
            format_size(self.size_bytes),
            format_size(self.limit_bytes),
            self.parts
        )
    }
}

/// Position of a part inside a split delivery, 1-based for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartInfo {
    pub index: usize,
    pub total: usize,
}

impl PartInfo {
    pub fn caption(&self) -> String {
        format!("Part {} of {}", self.index + 1, self.total)
    }
}

/// A file handed to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub kind: MediaKind,
    pub file_name: String,
    pub caption: Option<String>,
    /// File on disk; split parts are staged next to the artifact
    pub path: PathBuf,
    /// Set for split deliveries
    pub part: Option<PartInfo>,
}

/// External reference to an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectLink {
    pub url: Url,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DirectLink {
    /// Wraps a CDN URL, reading the expiry from its `expire` query parameter when present
    pub fn from_url(url: Url) -> Self {
        let expires_at = url
            .query_pairs()
            .find(|(key, _)| key == "expire")
            .and_then(|(_, value)| value.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        Self { url, expires_at }
    }

    pub fn message(&self) -> String {
        let mut text = format!("🔗 Direct link:\n{}", self.url);
        if let Some(expires) = self.expires_at {
            text.push_str(&format!("\n\n⏳ Valid until {}", expires.format("%Y-%m-%d %H:%M UTC")));
        }
        text
    }
}

/// How a finished delivery reached the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Inline,
    Parts { count: usize },
    Link { url: Url },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub request_id: String,
    pub completion: Completion,
}

/// Formats a byte count as MB with one decimal
pub fn format_size(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / limits::MIB as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn test_limits_per_kind() {
        let limits = PlatformLimits::default();
        assert_eq!(limits.limit_for(MediaKind::Video), 50 * 1024 * 1024);
        assert_eq!(limits.limit_for(MediaKind::Audio), 50 * 1024 * 1024);
        assert_eq!(limits.limit_for(MediaKind::Image), 10 * 1024 * 1024);
    }

    #[test]
    fn test_delivery_choice_strings() {
        assert_eq!(DeliveryChoice::SplitParts.to_string(), "split");
        assert_eq!(DeliveryChoice::from_str("link").unwrap(), DeliveryChoice::DirectLink);
        assert!(DeliveryChoice::from_str("email").is_err());
    }

    #[test]
    fn test_media_kind_parsing() {
        assert_eq!(MediaKind::from_str("Audio").unwrap(), MediaKind::Audio);
        assert!(MediaKind::from_str("document").is_err());
    }

    #[test]
    fn test_request_builder_defaults() {
        let request = DownloadRequest::builder()
            .requester(Requester::new(1, 2))
            .url(Url::parse("https://youtu.be/x").unwrap())
            .quality("audio")
            .kind(MediaKind::Audio)
            .build();
        assert_eq!(request.id.len(), 12);
        assert_eq!(request.platform, Platform::Unknown);
        assert_ne!(request.id, DownloadRequest::new_id());
    }

    #[test]
    fn test_direct_link_expiry() {
        let url = Url::parse("https://rr1.googlevideo.com/videoplayback?expire=1700000000&id=o").unwrap();
        let link = DirectLink::from_url(url);
        assert_eq!(link.expires_at.unwrap().timestamp(), 1_700_000_000);
        assert!(link.message().contains("Valid until 2023-11-14"));

        let plain = DirectLink::from_url(Url::parse("https://cdn.example.com/v.mp4").unwrap());
        assert!(plain.expires_at.is_none());
        assert!(!plain.message().contains("Valid until"));
    }

    #[test]
    fn test_prompt_text_and_part_caption() {
        let prompt = ChoicePrompt {
            request_id: "r".into(),
            kind: MediaKind::Video,
            size_bytes: 120 * 1024 * 1024,
            limit_bytes: 50 * 1024 * 1024,
            parts: 3,
            options: vec![DeliveryChoice::SplitParts, DeliveryChoice::DirectLink],
        };
        assert!(prompt.text().contains("120.0 MB"));
        assert!(prompt.text().contains("50.0 MB"));
        assert!(prompt.text().contains("3 parts"));
        assert_eq!(PartInfo { index: 0, total: 3 }.caption(), "Part 1 of 3");
    }

    #[tokio::test]
    async fn test_artifact_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();
        let artifact = MediaArtifact::from_file(&path, MediaKind::Video).await.unwrap();
        assert_eq!(artifact.size_bytes, Some(1234));
        assert_eq!(artifact.kind.as_deref(), Some("video"));
        assert_eq!(artifact.file_name(), "clip.mp4");
    }
}
