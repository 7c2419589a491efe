//! Moderation verdicts and the per-medium moderators that produce them.

pub mod image;
pub mod text;
pub mod video;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::services::{ClassifierError, StoreError};

pub use image::ImageModerator;
pub use text::TextModerator;
pub use video::{VideoCallbackPayload, VideoModerator};

/// Why a piece of content was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FlagReason {
    Profanity,
    OffensiveLanguage,
    UnsafeImage,
    UnsafeVideo,
}

/// One violation found by a moderator, with the evidence backing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    pub reason: FlagReason,
    pub evidence: JsonValue,
}

/// What a moderator concluded about one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    Clean,
    Flagged(Flag),
}

impl Outcome {
    pub fn flag(&self) -> Option<&Flag> {
        match self {
            Outcome::Clean => None,
            Outcome::Flagged(flag) => Some(flag),
        }
    }
}

/// A moderation decision bound to the artifact it was made on.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub artifact_key: String,
    pub source_key: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
}

impl Verdict {
    pub fn now(artifact_key: impl Into<String>, source_key: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            artifact_key: artifact_key.into(),
            source_key: source_key.into(),
            outcome,
            at: Utc::now(),
        }
    }
}

/// Errors raised while moderating an artifact. A classifier failure aborts
/// the invocation so the trigger redelivers it; it never decays into a clean
/// verdict.
#[derive(Debug, Error)]
pub enum ModerateError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unrecognized moderation payload: {0}")]
    InvalidPayload(String),
}
