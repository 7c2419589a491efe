//! The coordinator turns moderator flags into durable effects: quarantine,
//! alerting, and the result log.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::Buckets;
use crate::keys;
use crate::moderate::Flag;
use crate::services::{ArtifactStore, Notifier, NotifyError, ResultLog, StoreError};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// What quarantining did for this delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineOutcome {
    /// The source was moved out of the library.
    Quarantined,
    /// The source was already gone; an earlier delivery moved it.
    AlreadyAbsent,
}

/// Where a source document currently sits, as reported by the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ModerationState {
    Quarantined,
    InLibrary,
    Unknown,
}

#[derive(Clone)]
pub struct ModerationCoordinator {
    store: Arc<dyn ArtifactStore>,
    notifier: Arc<dyn Notifier>,
    result_log: Option<Arc<dyn ResultLog>>,
    buckets: Buckets,
    alert_topic: String,
}

impl ModerationCoordinator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn Notifier>,
        result_log: Option<Arc<dyn ResultLog>>,
        buckets: Buckets,
        alert_topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            result_log,
            buckets,
            alert_topic: alert_topic.into(),
        }
    }

    /// React to a flagged artifact: quarantine its source document, append
    /// the result record, and raise an alert.
    ///
    /// The quarantine step is idempotent under duplicate delivery. The move
    /// happens only when the source still exists in the library; a repeated
    /// flag for the same source finds it absent and changes nothing. The
    /// result log deliberately stays append-only, so duplicates may log
    /// twice.
    pub async fn on_flag(
        &self,
        artifact_key: &str,
        flag: &Flag,
    ) -> Result<QuarantineOutcome, CoordinatorError> {
        let decoded = keys::decode_artifact(artifact_key);
        let source_key = &decoded.source_key;

        let outcome = if self
            .store
            .exists_prefix(&self.buckets.library, source_key)
            .await?
        {
            self.store
                .copy(&self.buckets.library, source_key, &self.buckets.quarantine, source_key)
                .await?;
            self.store.delete(&self.buckets.library, source_key).await?;
            info!(source_key, reason = %flag.reason, "source quarantined");
            QuarantineOutcome::Quarantined
        } else {
            warn!(source_key, "source already quarantined, skipping move");
            QuarantineOutcome::AlreadyAbsent
        };

        if let Some(log) = &self.result_log {
            log.record(source_key, &flag.reason.to_string(), &flag.evidence)
                .await?;
        }

        let url = self.store.object_url(&self.buckets.quarantine, source_key);
        self.notifier
            .publish(
                &self.alert_topic,
                &json!({
                    "source": source_key,
                    "moderate_content": artifact_key,
                    "problem": flag.reason,
                    "details": flag.evidence,
                    "url": url,
                }),
            )
            .await?;
        Ok(outcome)
    }

    /// React to a clean artifact. When a clean bucket is configured the
    /// artifact is mirrored there; otherwise passing is a no-op.
    pub async fn on_pass(&self, artifact_key: &str) -> Result<(), CoordinatorError> {
        if let Some(clean) = &self.buckets.clean {
            self.store
                .copy(&self.buckets.processing, artifact_key, clean, artifact_key)
                .await?;
        }
        Ok(())
    }

    /// Current location of a source document.
    pub async fn state_of(&self, source_key: &str) -> Result<ModerationState, CoordinatorError> {
        if self
            .store
            .exists_prefix(&self.buckets.quarantine, source_key)
            .await?
        {
            return Ok(ModerationState::Quarantined);
        }
        if self
            .store
            .exists_prefix(&self.buckets.library, source_key)
            .await?
        {
            return Ok(ModerationState::InLibrary);
        }
        Ok(ModerationState::Unknown)
    }
}
