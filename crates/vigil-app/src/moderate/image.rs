//! Image moderation: unsafe-content labels plus on-image text recovery.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::{Flag, FlagReason, ModerateError, Outcome};
use crate::keys;
use crate::services::{ArtifactStore, ImageClassifier, TextDetectionKind};

/// Result of moderating one image artifact. On-image text is not judged
/// here; it is written back as a text sidecar and moderated through the text
/// path like any other text artifact.
#[derive(Debug, Clone)]
pub struct ImageModeration {
    pub outcome: Outcome,
    /// Key of the text sidecar written for recovered on-image text, if any.
    pub text_sidecar: Option<String>,
}

#[derive(Clone)]
pub struct ImageModerator {
    classifier: Arc<dyn ImageClassifier>,
    store: Arc<dyn ArtifactStore>,
    bucket: String,
}

impl ImageModerator {
    pub fn new(
        classifier: Arc<dyn ImageClassifier>,
        store: Arc<dyn ArtifactStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            store,
            bucket: bucket.into(),
        }
    }

    pub async fn moderate(&self, key: &str) -> Result<ImageModeration, ModerateError> {
        let text_sidecar = self.recover_text(key).await?;

        let labels = self.classifier.detect_unsafe_labels(&self.bucket, key).await?;
        let outcome = if labels.is_empty() {
            Outcome::Clean
        } else {
            Outcome::Flagged(Flag {
                reason: FlagReason::UnsafeImage,
                evidence: json!({ "labels": labels }),
            })
        };
        Ok(ImageModeration {
            outcome,
            text_sidecar,
        })
    }

    /// Pull readable text off the image and stage it next to the source,
    /// line detections first, word detections after.
    async fn recover_text(&self, key: &str) -> Result<Option<String>, ModerateError> {
        let detections = self.classifier.detect_text(&self.bucket, key).await?;
        let mut lines: Vec<&str> = Vec::new();
        for kind in [TextDetectionKind::Line, TextDetectionKind::Word] {
            lines.extend(
                detections
                    .iter()
                    .filter(|d| d.kind == kind)
                    .map(|d| d.text.as_str()),
            );
        }
        let text = lines.join("\n");
        if text.trim().is_empty() {
            return Ok(None);
        }

        let sidecar = keys::moderated_content_key(key, "txt");
        debug!(key, sidecar, "staging recovered on-image text");
        self.store
            .put(&self.bucket, &sidecar, text.into_bytes().into())
            .await?;
        Ok(Some(sidecar))
    }
}
