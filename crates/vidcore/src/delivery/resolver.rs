//! Large-file delivery resolver

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use bon::Builder;
use chrono::Utc;

use super::chunking::{chunk_ranges, part_count, stage_chunk, Chunk};
use super::context::{DeliveryContext, DeliveryState};
use super::error::DeliveryError;
use super::gateway::{AdminAlert, AlertSink, GatewayError, LinkProvider, MessagingGateway};
use super::model::{
    ChoicePrompt, Completion, DeliveryChoice, DeliveryPlan, DeliveryReport, DirectLink, MediaArtifact, MediaKind,
    OutgoingFile, PartInfo, PlatformLimits, Requester,
};
use crate::core::config;
use crate::storage::{HistoryRecord, HistoryStore};

/// Decides how `artifact` is delivered without sending anything.
///
/// # Errors
///
/// - [`DeliveryError::IncompleteArtifact`] when size or kind is unknown, or the file is empty
/// - [`DeliveryError::UnsupportedKind`] when the kind is not video, audio or image
pub fn plan_delivery(artifact: &MediaArtifact, limits: &PlatformLimits) -> Result<DeliveryPlan, DeliveryError> {
    let size = artifact
        .size_bytes
        .ok_or(DeliveryError::IncompleteArtifact { missing: "size" })?;
    let raw_kind = artifact
        .kind
        .as_deref()
        .ok_or(DeliveryError::IncompleteArtifact { missing: "kind" })?;
    let kind = MediaKind::from_str(raw_kind).map_err(|_| DeliveryError::UnsupportedKind(raw_kind.to_string()))?;
    if size == 0 {
        return Err(DeliveryError::IncompleteArtifact { missing: "content" });
    }

    let limit = limits.limit_for(kind);
    if size <= limit {
        Ok(DeliveryPlan::DirectSend { kind, size })
    } else {
        Ok(DeliveryPlan::AwaitChoice {
            kind,
            size,
            limit,
            parts: part_count(size, limit),
        })
    }
}

/// Drives a [`MediaArtifact`] to the requester.
///
/// One resolver is shared by all requests; per-request state lives in the
/// [`DeliveryContext`] passed to [`DeliveryResolver::deliver`].
#[derive(Builder)]
pub struct DeliveryResolver {
    gateway: Arc<dyn MessagingGateway>,
    history: Arc<dyn HistoryStore>,
    links: Arc<dyn LinkProvider>,
    alerts: Option<Arc<dyn AlertSink>>,
    #[builder(default)]
    limits: PlatformLimits,
    /// Extra attempts for transient send failures
    #[builder(default = config::delivery::SEND_RETRIES)]
    send_retries: usize,
    #[builder(default = config::delivery::retry_min_delay())]
    retry_min_delay: Duration,
    /// Remove the artifact file once delivery ends
    #[builder(default = true)]
    cleanup: bool,
}

impl DeliveryResolver {
    pub fn limits(&self) -> &PlatformLimits {
        &self.limits
    }

    /// Delivers `artifact` for the request in `ctx`.
    ///
    /// On success the context ends in [`DeliveryState::Delivered`] and one
    /// history record is appended. On failure it ends in
    /// [`DeliveryState::Failed`], the requester is told why, and a partial
    /// split delivery is reported to the admin channel. Either way the
    /// artifact file is removed.
    pub async fn deliver(
        &self,
        ctx: &DeliveryContext,
        artifact: MediaArtifact,
    ) -> Result<DeliveryReport, DeliveryError> {
        let result = self.run(ctx, &artifact).await;

        match &result {
            Ok(report) => {
                log::info!(
                    "✅ Delivered request {} to user {} ({:?})",
                    report.request_id,
                    ctx.requester().user_id,
                    report.completion
                );
                self.record_history(ctx).await;
            }
            Err(err) => self.handle_failure(ctx, err).await,
        }

        if self.cleanup {
            remove_artifact(&artifact).await;
        }

        result
    }

    async fn run(&self, ctx: &DeliveryContext, artifact: &MediaArtifact) -> Result<DeliveryReport, DeliveryError> {
        let completion = match plan_delivery(artifact, &self.limits)? {
            DeliveryPlan::DirectSend { kind, size } => {
                ctx.transition(DeliveryState::DirectSend)?;
                ensure_active(ctx)?;
                log::info!("📤 Request {}: sending {} inline ({} bytes)", ctx.request().id, kind, size);

                let file = OutgoingFile {
                    kind,
                    file_name: artifact.file_name(),
                    caption: None,
                    path: artifact.path.clone(),
                    part: None,
                };
                until_cancelled(ctx, self.send_file(ctx.requester(), &file)).await??;
                Completion::Inline
            }
            DeliveryPlan::AwaitChoice {
                kind,
                size,
                limit,
                parts,
            } => {
                ctx.transition(DeliveryState::AwaitChoice)?;
                let prompt = ChoicePrompt {
                    request_id: ctx.request().id.clone(),
                    kind,
                    size_bytes: size,
                    limit_bytes: limit,
                    parts,
                    options: vec![DeliveryChoice::SplitParts, DeliveryChoice::DirectLink],
                };
                log::info!(
                    "❓ Request {}: {} bytes over {} byte limit, asking user",
                    ctx.request().id,
                    size,
                    limit
                );

                let choice = until_cancelled(ctx, self.gateway.prompt_choice(ctx.requester(), &prompt)).await??;
                ensure_active(ctx)?;

                match choice {
                    DeliveryChoice::SplitParts => {
                        ctx.transition(DeliveryState::SplitParts)?;
                        let count = self.send_parts(ctx, artifact, kind, size, limit).await?;
                        Completion::Parts { count }
                    }
                    DeliveryChoice::DirectLink => {
                        ctx.transition(DeliveryState::DirectLink)?;
                        let link = self.fetch_link(ctx).await?;
                        ensure_active(ctx)?;
                        until_cancelled(ctx, self.send_link(ctx.requester(), &link)).await??;
                        Completion::Link { url: link.url }
                    }
                }
            }
        };

        // A cancel that lands while the last send is acknowledged still wins
        ensure_active(ctx)?;
        ctx.transition(DeliveryState::Delivered)?;
        Ok(DeliveryReport {
            request_id: ctx.request().id.clone(),
            completion,
        })
    }

    /// Sends the artifact as ordered byte-range parts, one message each
    async fn send_parts(
        &self,
        ctx: &DeliveryContext,
        artifact: &MediaArtifact,
        kind: MediaKind,
        size: u64,
        limit: u64,
    ) -> Result<usize, DeliveryError> {
        let ranges = chunk_ranges(size, limit);
        let total = ranges.len();
        let base_name = artifact.file_name();
        log::info!("✂️ Request {}: sending {} parts", ctx.request().id, total);

        if let Err(e) = self
            .gateway
            .notify(
                ctx.requester(),
                &format!(
                    "📦 Sending {} in {} parts. Join them in order to restore the original file.",
                    base_name, total
                ),
            )
            .await
        {
            log::warn!("Failed to announce split delivery: {}", e);
        }

        let mut input = fs_err::tokio::File::open(&artifact.path).await?;
        let mut delivered = Vec::with_capacity(total);

        for (index, range) in ranges.into_iter().enumerate() {
            ensure_active(ctx)?;

            let chunk = stage_chunk(&mut input, &artifact.path, index, total, range).await?;
            let outgoing = part_file(kind, &base_name, &chunk);
            let sent = until_cancelled(ctx, self.send_file(ctx.requester(), &outgoing)).await;
            chunk.remove().await;

            if let Err(source) = sent? {
                log::error!(
                    "Request {}: part {}/{} failed: {}",
                    ctx.request().id,
                    index + 1,
                    total,
                    source
                );
                return Err(DeliveryError::PartialDeliveryFailure {
                    delivered,
                    failed_index: index,
                    total,
                    source,
                });
            }
            delivered.push(index);
        }

        Ok(total)
    }

    async fn fetch_link(&self, ctx: &DeliveryContext) -> Result<DirectLink, DeliveryError> {
        until_cancelled(ctx, self.links.direct_link(ctx.request()))
            .await?
            .map_err(DeliveryError::Link)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.retry_min_delay)
            .with_max_times(self.send_retries)
    }

    async fn send_file(&self, to: &Requester, file: &OutgoingFile) -> Result<(), GatewayError> {
        (|| async { self.gateway.send_file(to, file).await })
            .retry(self.backoff())
            .when(GatewayError::is_retryable)
            .adjust(|e: &GatewayError, delay| e.retry_after().or(delay))
            .notify(|e, delay| log::warn!("Send of {} failed ({}), retrying in {:?}", file.file_name, e, delay))
            .await
    }

    async fn send_link(&self, to: &Requester, link: &DirectLink) -> Result<(), GatewayError> {
        (|| async { self.gateway.send_link(to, link).await })
            .retry(self.backoff())
            .when(GatewayError::is_retryable)
            .adjust(|e: &GatewayError, delay| e.retry_after().or(delay))
            .await
    }

    async fn record_history(&self, ctx: &DeliveryContext) {
        let request = ctx.request();
        let record = HistoryRecord {
            requester: request.requester,
            url: request.url.to_string(),
            quality: request.quality.clone(),
            media_kind: request.kind,
            platform: request.platform,
            created_at: Utc::now(),
        };
        if let Err(e) = self.history.append(&record).await {
            log::warn!("Failed to save history for request {}: {}", request.id, e);
        }
    }

    async fn handle_failure(&self, ctx: &DeliveryContext, err: &DeliveryError) {
        let request = ctx.request();
        let reason = err.failure_reason();
        if let Err(e) = ctx.transition(DeliveryState::Failed(reason)) {
            log::warn!("Request {}: could not record failure: {}", request.id, e);
        }

        match err {
            DeliveryError::UserCancelled => log::info!("🛑 Request {} cancelled by user", request.id),
            _ => log::error!("❌ Request {} failed: {}", request.id, err),
        }

        if let Err(e) = self.gateway.notify(ctx.requester(), &err.user_message()).await {
            log::warn!("Failed to notify user {} about failure: {}", ctx.requester().user_id, e);
        }

        if let DeliveryError::PartialDeliveryFailure {
            delivered,
            failed_index,
            total,
            source,
        } = err
        {
            if let Some(alerts) = &self.alerts {
                alerts
                    .alert(&AdminAlert::PartialDelivery {
                        request_id: request.id.clone(),
                        user_id: request.requester.user_id,
                        url: request.url.to_string(),
                        delivered: delivered.clone(),
                        failed_index: *failed_index,
                        total: *total,
                        error: source.to_string(),
                    })
                    .await;
            }
        }
    }
}

/// Runs `fut` unless the request is cancelled first.
///
/// Dropping `fut` on cancellation also stops any retry sleep inside it.
async fn until_cancelled<F: Future>(ctx: &DeliveryContext, fut: F) -> Result<F::Output, DeliveryError> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(DeliveryError::UserCancelled),
        out = fut => Ok(out),
    }
}

fn ensure_active(ctx: &DeliveryContext) -> Result<(), DeliveryError> {
    if ctx.is_cancelled() {
        Err(DeliveryError::UserCancelled)
    } else {
        Ok(())
    }
}

/// Wraps a staged chunk as a document named `<file>.001`, `<file>.002`, ...
fn part_file(kind: MediaKind, base_name: &str, chunk: &Chunk) -> OutgoingFile {
    let part = PartInfo {
        index: chunk.index,
        total: chunk.total,
    };
    OutgoingFile {
        kind,
        file_name: format!("{}.{:03}", base_name, chunk.index + 1),
        caption: Some(part.caption()),
        path: chunk.path.clone(),
        part: Some(part),
    }
}

async fn remove_artifact(artifact: &MediaArtifact) {
    match fs_err::tokio::remove_file(&artifact.path).await {
        Ok(()) => log::debug!("Removed {}", artifact.path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", artifact.path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::chunking::ByteRange;
    use std::path::PathBuf;
    use pretty_assertions::assert_eq;

    const MIB: u64 = 1024 * 1024;

    fn artifact(size: u64, kind: &str) -> MediaArtifact {
        MediaArtifact {
            path: "/tmp/none".into(),
            size_bytes: Some(size),
            kind: Some(kind.to_string()),
        }
    }

    #[test]
    fn test_small_image_is_sent_directly() {
        let plan = plan_delivery(&artifact(8 * MIB, "image"), &PlatformLimits::default()).unwrap();
        assert_eq!(
            plan,
            DeliveryPlan::DirectSend {
                kind: MediaKind::Image,
                size: 8 * MIB
            }
        );
    }

    #[test]
    fn test_large_video_awaits_choice() {
        let plan = plan_delivery(&artifact(120 * MIB, "video"), &PlatformLimits::default()).unwrap();
        assert_eq!(
            plan,
            DeliveryPlan::AwaitChoice {
                kind: MediaKind::Video,
                size: 120 * MIB,
                limit: 50 * MIB,
                parts: 3
            }
        );
    }

    #[test]
    fn test_limit_is_inclusive() {
        let limits = PlatformLimits::default();
        for kind in ["video", "audio", "image"] {
            let limit = limits.limit_for(MediaKind::from_str(kind).unwrap());
            assert!(matches!(
                plan_delivery(&artifact(limit, kind), &limits).unwrap(),
                DeliveryPlan::DirectSend { .. }
            ));
            assert!(matches!(
                plan_delivery(&artifact(limit + 1, kind), &limits).unwrap(),
                DeliveryPlan::AwaitChoice { parts: 2, .. }
            ));
        }
    }

    #[test]
    fn test_image_limit_differs_from_video() {
        let limits = PlatformLimits::default();
        assert!(matches!(
            plan_delivery(&artifact(20 * MIB, "image"), &limits).unwrap(),
            DeliveryPlan::AwaitChoice { .. }
        ));
        assert!(matches!(
            plan_delivery(&artifact(20 * MIB, "video"), &limits).unwrap(),
            DeliveryPlan::DirectSend { .. }
        ));
    }

    #[test]
    fn test_incomplete_artifacts_rejected() {
        let limits = PlatformLimits::default();
        let mut no_size = artifact(1, "video");
        no_size.size_bytes = None;
        assert!(matches!(
            plan_delivery(&no_size, &limits),
            Err(DeliveryError::IncompleteArtifact { missing: "size" })
        ));

        let mut no_kind = artifact(1, "video");
        no_kind.kind = None;
        assert!(matches!(
            plan_delivery(&no_kind, &limits),
            Err(DeliveryError::IncompleteArtifact { missing: "kind" })
        ));

        assert!(matches!(
            plan_delivery(&artifact(0, "audio"), &limits),
            Err(DeliveryError::IncompleteArtifact { missing: "content" })
        ));
    }

    #[test]
    fn test_unsupported_kind() {
        let err = plan_delivery(&artifact(10, "document"), &PlatformLimits::default()).unwrap_err();
        assert!(matches!(err, DeliveryError::UnsupportedKind(ref k) if k == "document"));
    }

    #[test]
    fn test_part_file_naming() {
        let chunk = Chunk {
            index: 1,
            total: 3,
            range: ByteRange { start: 50, end: 100 },
            path: PathBuf::from("/tmp/abc123.mp4.002"),
        };
        let file = part_file(MediaKind::Video, "clip.mp4", &chunk);
        assert_eq!(file.file_name, "clip.mp4.002");
        assert_eq!(file.caption.as_deref(), Some("Part 2 of 3"));
        assert_eq!(file.part, Some(PartInfo { index: 1, total: 3 }));
        assert_eq!(file.path, chunk.path);
    }
}
