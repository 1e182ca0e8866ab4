//! yt-dlp backend

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ExtractionError, ExtractionService, MediaProbe, VideoFormat};
use crate::core::config::{self, BotConfig};
use crate::delivery::{DirectLink, DownloadRequest, LinkProvider, MediaArtifact, MediaKind};

/// Longest format id offered as a quality button; keeps callback data under 64 bytes
const MAX_FORMAT_ID_LEN: usize = 24;

/// Suffixes of files yt-dlp leaves behind while working
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    duration: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    vcodec: Option<String>,
    resolution: Option<String>,
    height: Option<u32>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    url: Option<String>,
}

impl RawFormat {
    fn is_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
            && self.resolution.as_deref().is_some_and(|r| r != "audio only")
            && self.url.is_some()
    }

    fn size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx).map(|s| s.max(0.0) as u64)
    }
}

/// Parses `yt-dlp --dump-single-json` output into a [`MediaProbe`].
///
/// Keeps video formats with a resolution and a URL, best first, one per
/// resolution.
pub fn parse_probe(json: &str) -> Result<MediaProbe, ExtractionError> {
    let info: RawInfo = serde_json::from_str(json)?;

    let formats: Vec<VideoFormat> = info
        .formats
        .iter()
        .filter(|f| f.is_video() && is_safe_format_id(&f.format_id) && f.format_id.len() <= MAX_FORMAT_ID_LEN)
        .sorted_by(|a, b| b.height.cmp(&a.height).then_with(|| b.size().cmp(&a.size())))
        .unique_by(|f| f.resolution.clone())
        .map(|f| VideoFormat {
            format_id: f.format_id.clone(),
            resolution: f.resolution.clone().unwrap_or_default(),
            height: f.height,
            filesize: f.size(),
        })
        .collect();

    let estimated_size = info
        .filesize
        .or(info.filesize_approx)
        .map(|s| s.max(0.0) as u64)
        .or_else(|| formats.first().and_then(|f| f.filesize));

    Ok(MediaProbe {
        title: info.title.unwrap_or_else(|| "Untitled".to_string()),
        duration_secs: info.duration,
        estimated_size,
        thumbnail: info.thumbnail,
        formats,
    })
}

/// Format ids are passed to yt-dlp verbatim; accept only what yt-dlp itself produces
pub fn is_safe_format_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}

/// Extraction backend running the `yt-dlp` binary
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    bin: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(bin: impl Into<String>, work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            work_dir: work_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(&config.ytdl_bin, &config.temp_dir, config.ytdlp_timeout())
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Creates the working directory
    pub async fn ensure_work_dir(&self) -> std::io::Result<()> {
        fs_err::tokio::create_dir_all(&self.work_dir).await
    }

    /// `yt-dlp --version`
    pub async fn version(&self) -> Result<String, ExtractionError> {
        let stdout = self
            .run(&["--version".to_string()], config::ytdlp::probe_timeout(), None)
            .await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn base_args() -> Vec<String> {
        let retries = config::ytdlp::RETRIES.to_string();
        vec![
            "--no-playlist".into(),
            "--geo-bypass".into(),
            "--no-warnings".into(),
            "--no-progress".into(),
            "--retries".into(),
            retries.clone(),
            "--extractor-retries".into(),
            retries,
        ]
    }

    fn output_template(&self, request_id: &str) -> String {
        self.work_dir
            .join(format!("{}.%(ext)s", request_id))
            .to_string_lossy()
            .into_owned()
    }

    /// Arguments for downloading `request`, URL last
    fn download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let template = self.output_template(&request.id);
        let mut args: Vec<String> = vec!["-o".into(), template.clone()];

        match request.kind {
            MediaKind::Video => {
                let selector = if is_safe_format_id(&request.quality) {
                    format!("{q}+bestaudio/{q}/best", q = request.quality)
                } else {
                    "bestvideo+bestaudio/best".to_string()
                };
                args.extend(["-f".into(), selector, "--merge-output-format".into(), "mp4".into()]);
            }
            MediaKind::Audio => {
                args.extend([
                    "-f".into(),
                    "bestaudio/best".into(),
                    "--extract-audio".into(),
                    "--audio-format".into(),
                    "mp3".into(),
                ]);
            }
            MediaKind::Image => {
                args.extend([
                    "--skip-download".into(),
                    "--write-thumbnail".into(),
                    "--convert-thumbnails".into(),
                    "jpg".into(),
                    "-o".into(),
                    format!("thumbnail:{}", template),
                ]);
            }
        }

        args.push(request.url.to_string());
        args
    }

    /// Arguments for `--get-url` lookups.
    ///
    /// Video links must carry audio too, so they come from a single combined
    /// format capped at the chosen height rather than from the DASH video
    /// stream that was downloaded.
    fn link_args(request: &DownloadRequest) -> Vec<String> {
        let mut args: Vec<String> = match request.kind {
            MediaKind::Video => {
                let selector = match request.max_height {
                    Some(height) => format!("best[height<={}]/best", height),
                    None => "best".to_string(),
                };
                vec!["-f".into(), selector, "--get-url".into()]
            }
            MediaKind::Audio => vec!["-f".into(), "bestaudio/best".into(), "--get-url".into()],
            MediaKind::Image => vec!["--get-thumbnail".into()],
        };
        args.push(request.url.to_string());
        args
    }

    /// Runs yt-dlp and returns its stdout.
    ///
    /// The child is killed when the timeout fires or `cancel` is triggered.
    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<u8>, ExtractionError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(Self::base_args())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!("Running {} {}", self.bin, args.join(" "));
        let child = cmd.spawn().map_err(ExtractionError::Spawn)?;

        let output = tokio::select! {
            biased;
            _ = wait_cancelled(cancel) => return Err(ExtractionError::Cancelled),
            result = tokio::time::timeout(timeout, child.wait_with_output()) => {
                result.map_err(|_| ExtractionError::Timeout(timeout))??
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = last_error_lines(&stderr);
            log::warn!("yt-dlp failed ({}): {}", output.status, stderr);
            return Err(ExtractionError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(output.stdout)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaArtifact, ExtractionError> {
        self.run(&self.download_args(request), self.timeout, Some(cancel)).await?;
        let path = self.find_output(&request.id).await?;
        Ok(MediaArtifact::from_file(&path, request.kind).await?)
    }

    /// Locates the file yt-dlp wrote for `request_id`
    pub async fn find_output(&self, request_id: &str) -> Result<PathBuf, ExtractionError> {
        let prefix = format!("{}.", request_id);
        let mut entries = fs_err::tokio::read_dir(&self.work_dir).await?;
        let mut best: Option<(u64, PathBuf)> = None;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }
            let size = entry.metadata().await?.len();
            if best.as_ref().is_none_or(|(best_size, _)| size > *best_size) {
                best = Some((size, entry.path()));
            }
        }

        best.map(|(_, path)| path).ok_or(ExtractionError::NoOutput)
    }

    /// Removes every file belonging to `request_id`, partial downloads included
    pub async fn cleanup_request_files(&self, request_id: &str) {
        let prefix = format!("{}.", request_id);
        let Ok(mut entries) = fs_err::tokio::read_dir(&self.work_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                if let Err(e) = fs_err::tokio::remove_file(entry.path()).await {
                    log::warn!("Failed to remove leftover file: {}", e);
                }
            }
        }
    }
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Keeps the `ERROR:` lines of stderr, or its tail when there are none
fn last_error_lines(stderr: &str) -> String {
    let errors: Vec<&str> = stderr.lines().filter(|l| l.starts_with("ERROR")).collect();
    let lines = if errors.is_empty() {
        stderr.lines().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect()
    } else {
        errors
    };
    lines.join("\n").trim().to_string()
}

#[async_trait]
impl ExtractionService for YtDlpExtractor {
    async fn probe(&self, url: &Url) -> Result<MediaProbe, ExtractionError> {
        let args = vec![
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            url.to_string(),
        ];
        let stdout = self.run(&args, config::ytdlp::probe_timeout(), None).await?;
        let probe = parse_probe(&String::from_utf8_lossy(&stdout))?;
        log::info!("🔎 Probed {}: \"{}\", {} video formats", url, probe.title, probe.formats.len());
        Ok(probe)
    }

    async fn extract(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaArtifact, ExtractionError> {
        self.ensure_work_dir().await?;
        log::info!(
            "⬇️ Request {}: downloading {} ({}) from {}",
            request.id,
            request.kind,
            request.quality,
            request.url
        );

        let result = self.download(request, cancel).await;
        if result.is_err() {
            self.cleanup_request_files(&request.id).await;
        }
        result
    }
}

/// Picks the link out of `--get-url` output.
///
/// A combined format prints one URL. Several lines mean separate video and
/// audio streams, which no single link can play, so the output is refused.
fn parse_link_output(stdout: &str) -> Result<Url, ExtractionError> {
    let lines: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    match lines.as_slice() {
        [single] => Url::parse(single).map_err(|_| ExtractionError::NoOutput),
        [] => Err(ExtractionError::NoOutput),
        many => {
            log::warn!("yt-dlp returned {} stream URLs for a direct link", many.len());
            Err(ExtractionError::NoOutput)
        }
    }
}

#[async_trait]
impl LinkProvider for YtDlpExtractor {
    async fn direct_link(&self, request: &DownloadRequest) -> Result<DirectLink, ExtractionError> {
        let stdout = self
            .run(&Self::link_args(request), config::ytdlp::probe_timeout(), None)
            .await?;
        let url = parse_link_output(&String::from_utf8_lossy(&stdout))?;
        Ok(DirectLink::from_url(url))
    }
}
