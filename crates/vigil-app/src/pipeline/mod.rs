//! End-to-end orchestration: upload intake, artifact moderation, video
//! callbacks, and the effects coordinator.
//!
//! Every entry point takes the shared [`PipelineContext`] and is driven by
//! one object event. Failures propagate out so the trigger redelivers the
//! event; nothing in here converts an error into a clean verdict.

pub mod coordinator;
pub mod event;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::extract::{self, ExtractError, PdfImageFilters, SourceFormat};
use crate::keys;
use crate::moderate::{
    ImageModerator, ModerateError, Outcome, TextModerator, Verdict, VideoCallbackPayload,
    VideoModerator,
};
use crate::services::{
    ArtifactStore, FsArtifactStore, HttpClassifierClient, HttpNotifier, JsonlResultLog,
    ResultLog, StoreError,
};

pub use coordinator::{
    CoordinatorError, ModerationCoordinator, ModerationState, QuarantineOutcome,
};
pub use event::ObjectEvent;

/// The three (optionally four) buckets the pipeline moves content between.
#[derive(Debug, Clone)]
pub struct Buckets {
    /// Where uploads land and live while clean.
    pub library: String,
    /// Scratch area for derived artifacts.
    pub processing: String,
    /// Where flagged sources are moved.
    pub quarantine: String,
    /// Optional mirror for artifacts that passed moderation.
    pub clean: Option<String>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Moderate(#[from] ModerateError),

    #[error(transparent)]
    Coordinate(#[from] CoordinatorError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Shared collaborators for one pipeline deployment.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn ArtifactStore>,
    pub images: ImageModerator,
    pub videos: VideoModerator,
    pub texts: TextModerator,
    pub coordinator: ModerationCoordinator,
    pub buckets: Buckets,
    pub pdf_filters: PdfImageFilters,
}

/// Wire the real collaborators from configuration.
pub fn build_pipeline_context(config: &AppConfig) -> Result<PipelineContext, PipelineError> {
    let classifier_endpoint = config
        .services
        .classifier_endpoint
        .parse()
        .map_err(|e| PipelineError::InvalidConfig(format!("classifier endpoint: {e}")))?;
    let notify_endpoint = config
        .services
        .notify_endpoint
        .parse()
        .map_err(|e| PipelineError::InvalidConfig(format!("notify endpoint: {e}")))?;

    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&config.storage.root));
    let classifier = Arc::new(HttpClassifierClient::new(classifier_endpoint));
    let notifier = Arc::new(HttpNotifier::new(notify_endpoint));
    let result_log: Option<Arc<dyn ResultLog>> = config
        .services
        .result_log_path
        .as_ref()
        .map(|path| Arc::new(JsonlResultLog::new(path)) as Arc<dyn ResultLog>);

    let buckets = Buckets {
        library: config.buckets.library.clone(),
        processing: config.buckets.processing.clone(),
        quarantine: config.buckets.quarantine.clone(),
        clean: config.buckets.clean.clone(),
    };
    let coordinator = ModerationCoordinator::new(
        store.clone(),
        notifier,
        result_log,
        buckets.clone(),
        &config.moderation.alert_topic,
    );

    Ok(PipelineContext {
        images: ImageModerator::new(classifier.clone(), store.clone(), &buckets.processing),
        videos: VideoModerator::new(
            classifier.clone(),
            classifier.clone(),
            &config.moderation.callback_topic,
            config.moderation.video_page_size,
        ),
        texts: TextModerator::new(classifier, config.moderation.text_threshold),
        coordinator,
        store,
        buckets,
        pdf_filters: PdfImageFilters {
            min_side: config.pdf.min_side,
            min_rel_size: config.pdf.min_rel_size,
            min_abs_size: config.pdf.min_abs_size,
        },
    })
}

/// Handle an upload into the library bucket.
///
/// Documents are split into artifacts which land in the processing bucket
/// and are moderated immediately. Images, videos, and plain text need no
/// splitting; the source itself is copied over and moderated.
pub async fn handle_upload(ctx: &PipelineContext, event: &ObjectEvent) -> Result<(), PipelineError> {
    let key = event.decoded_key();
    let Some(format) = SourceFormat::from_key(&key) else {
        warn!(key, "unsupported upload format, ignoring");
        return Ok(());
    };
    info!(key, ?format, "handling upload");

    match format {
        SourceFormat::Pdf | SourceFormat::Docx | SourceFormat::Pptx => {
            // Intake copy: the source travels with its artifacts.
            match ctx
                .store
                .copy(&ctx.buckets.library, &key, &ctx.buckets.processing, &key)
                .await
            {
                Ok(()) => {}
                Err(StoreError::NotFound { .. }) => {
                    warn!(key, "upload vanished before intake, ending cleanly");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
            let Some(bytes) = fetch_if_present(ctx, &ctx.buckets.processing, &key).await? else {
                return Ok(());
            };
            let extractor = extract::extractor_for(format, ctx.pdf_filters)
                .ok_or_else(|| PipelineError::Task("no extractor for document format".to_owned()))?;

            let task_key = key.clone();
            let extraction = task::spawn_blocking(move || extractor.extract(&task_key, &bytes))
                .await
                .map_err(|e| PipelineError::Task(e.to_string()))??;

            // Stage every artifact before moderating any, so a failure mid
            // extraction never leaves a half-published document behind.
            let mut artifact_keys = Vec::new();
            for artifact in extraction.text {
                ctx.store
                    .put(&ctx.buckets.processing, &artifact.key, artifact.body)
                    .await?;
                artifact_keys.push(artifact.key);
            }
            for artifact in extraction.media {
                ctx.store
                    .put(&ctx.buckets.processing, &artifact.key, artifact.body)
                    .await?;
                artifact_keys.push(artifact.key);
            }
            for artifact_key in &artifact_keys {
                handle_processing_object(ctx, artifact_key).await?;
            }
        }
        SourceFormat::Image | SourceFormat::Video | SourceFormat::Text => {
            match ctx
                .store
                .copy(&ctx.buckets.library, &key, &ctx.buckets.processing, &key)
                .await
            {
                Ok(()) => {}
                Err(StoreError::NotFound { .. }) => {
                    warn!(key, "upload vanished before intake, ending cleanly");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
            handle_processing_object(ctx, &key).await?;
        }
    }
    Ok(())
}

/// Moderate one object in the processing bucket, dispatched on extension.
pub async fn handle_processing_object(
    ctx: &PipelineContext,
    key: &str,
) -> Result<(), PipelineError> {
    let extension = keys::extension(key).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp") => {
            let result = ctx.images.moderate(key).await?;
            // On-image text gets its own pass through the text path before
            // the image verdict is applied.
            if let Some(sidecar) = &result.text_sidecar {
                moderate_text_object(ctx, sidecar).await?;
            }
            apply_outcome(ctx, key, &result.outcome).await?;
        }
        Some("mp4" | "mov" | "avi" | "mkv" | "webm") => {
            ctx.videos.submit(&ctx.buckets.processing, key).await?;
        }
        Some("txt") => {
            moderate_text_object(ctx, key).await?;
        }
        Some("json") => {
            let Some(body) = fetch_if_present(ctx, &ctx.buckets.processing, key).await? else {
                return Ok(());
            };
            let flags = ctx.texts.moderate_segments(&body).await?;
            if flags.is_empty() {
                ctx.coordinator.on_pass(key).await?;
            } else {
                for flag in &flags {
                    ctx.coordinator.on_flag(key, flag).await?;
                }
            }
        }
        _ => {
            debug!(key, "no moderation path for object, skipping");
        }
    }
    Ok(())
}

/// Handle the completion callback of a video moderation job.
pub async fn handle_video_callback(
    ctx: &PipelineContext,
    payload: &VideoCallbackPayload,
) -> Result<(), PipelineError> {
    info!(job_id = payload.job_id, key = payload.key, "handling video callback");
    let outcome = ctx.videos.on_callback(payload).await?;
    apply_outcome(ctx, &payload.key, &outcome).await?;
    Ok(())
}

async fn moderate_text_object(ctx: &PipelineContext, key: &str) -> Result<(), PipelineError> {
    let Some(body) = fetch_if_present(ctx, &ctx.buckets.processing, key).await? else {
        return Ok(());
    };
    let text = String::from_utf8_lossy(&body);
    let outcome = ctx.texts.moderate_lines(&text).await?;
    apply_outcome(ctx, key, &outcome).await
}

/// Fetch an object, treating a missing one as "vanished": logged, no retry,
/// the invocation ends cleanly. Redelivering the event cannot bring the
/// object back.
async fn fetch_if_present(
    ctx: &PipelineContext,
    bucket: &str,
    key: &str,
) -> Result<Option<Bytes>, PipelineError> {
    match ctx.store.get(bucket, key).await {
        Ok(body) => Ok(Some(body)),
        Err(StoreError::NotFound { .. }) => {
            warn!(key, "object vanished before moderation, ending cleanly");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

async fn apply_outcome(
    ctx: &PipelineContext,
    key: &str,
    outcome: &Outcome,
) -> Result<(), PipelineError> {
    let verdict = Verdict::now(key, keys::decode_artifact(key).source_key, outcome.clone());
    info!(
        artifact = %verdict.artifact_key,
        source = %verdict.source_key,
        flagged = verdict.outcome.flag().is_some(),
        "moderation verdict"
    );
    match &verdict.outcome {
        Outcome::Flagged(flag) => {
            ctx.coordinator.on_flag(&verdict.artifact_key, flag).await?;
        }
        Outcome::Clean => {
            ctx.coordinator.on_pass(&verdict.artifact_key).await?;
        }
    }
    Ok(())
}
