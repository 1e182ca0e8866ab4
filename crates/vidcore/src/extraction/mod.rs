//! Media extraction
//!
//! The [`ExtractionService`] trait hides the downloader backend; the only
//! backend is [`ytdlp::YtDlpExtractor`], which shells out to `yt-dlp`.

pub mod ytdlp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::delivery::{DownloadRequest, MediaArtifact};

pub use ytdlp::YtDlpExtractor;

/// A downloadable video format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFormat {
    pub format_id: String,
    /// e.g. `1920x1080`
    pub resolution: String,
    pub height: Option<u32>,
    pub filesize: Option<u64>,
}

impl VideoFormat {
    /// Button label, e.g. `1080p (45.2 MB)`
    pub fn label(&self) -> String {
        let name = match self.height {
            Some(h) => format!("{}p", h),
            None => self.resolution.clone(),
        };
        match self.filesize {
            Some(size) => format!("{} ({})", name, crate::delivery::model::format_size(size)),
            None => name,
        }
    }
}

/// Metadata gathered before the user picks what to download
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub title: String,
    pub duration_secs: Option<f64>,
    pub estimated_size: Option<u64>,
    pub thumbnail: Option<String>,
    /// Video formats, best first, one per resolution
    pub formats: Vec<VideoFormat>,
}

impl MediaProbe {
    pub fn format(&self, format_id: &str) -> Option<&VideoFormat> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }

    /// Summary shown after a URL is accepted
    pub fn details_text(&self) -> String {
        let duration = self
            .duration_secs
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string());
        let size = self
            .estimated_size
            .map(crate::delivery::model::format_size)
            .unwrap_or_else(|| "unknown".to_string());
        format!("🎬 {}\n⏱ Duration: {}\n📦 Estimated size: {}", self.title, duration, size)
    }
}

/// Formats seconds as `m:ss` or `h:mm:ss`
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("yt-dlp timed out after {0:?}")]
    Timeout(Duration),

    #[error("yt-dlp exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unexpected yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("yt-dlp produced no output file")]
    NoOutput,

    #[error("no downloadable formats found")]
    NoFormats,

    #[error("extraction cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad category of a yt-dlp failure, read from its stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unavailable,
    Restricted,
    RateLimited,
    Network,
    Unsupported,
    Unknown,
}

/// Classifies yt-dlp stderr
pub fn analyze_stderr(stderr: &str) -> FailureKind {
    let lower = stderr.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if any(&[
        "private video",
        "video unavailable",
        "this video is not available",
        "has been removed",
        "does not exist",
        "404",
    ]) {
        FailureKind::Unavailable
    } else if any(&["http error 429", "too many requests"]) {
        FailureKind::RateLimited
    } else if any(&[
        "sign in to confirm",
        "login required",
        "age-restricted",
        "not available in your country",
        "geo restricted",
        "http error 403",
    ]) {
        FailureKind::Restricted
    } else if any(&["unsupported url", "no video formats found"]) {
        FailureKind::Unsupported
    } else if any(&["timed out", "timeout", "connection", "network", "failed to resolve"]) {
        FailureKind::Network
    } else {
        FailureKind::Unknown
    }
}

impl ExtractionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExtractionError::Failed { stderr, .. } => analyze_stderr(stderr),
            ExtractionError::Timeout(_) => FailureKind::Network,
            ExtractionError::NoFormats => FailureKind::Unsupported,
            _ => FailureKind::Unknown,
        }
    }

    /// Text shown to the requester
    pub fn user_message(&self) -> String {
        if matches!(self, ExtractionError::Cancelled) {
            return "Download cancelled.".to_string();
        }
        match self.failure_kind() {
            FailureKind::Unavailable => "❌ This media is private, removed or unavailable.",
            FailureKind::Restricted => "❌ This media is restricted (login, age or region) and can't be downloaded.",
            FailureKind::RateLimited => "⏳ The platform is rate limiting us. Please try again in a few minutes.",
            FailureKind::Network => "❌ Network problem while downloading. Please try again.",
            FailureKind::Unsupported => "❌ No downloadable media found at this URL.",
            FailureKind::Unknown => "❌ Download failed. Please try again later.",
        }
        .to_string()
    }
}

/// Backend that turns URLs into files
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Reads metadata without downloading
    async fn probe(&self, url: &Url) -> Result<MediaProbe, ExtractionError>;

    /// Downloads the media described by `request`
    async fn extract(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaArtifact, ExtractionError>;
}
