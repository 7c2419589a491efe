//! Application-level error type shared across the CLI entry points.

use std::path::PathBuf;

use thiserror::Error;

use crate::config;
use crate::extract::ExtractError;
use crate::moderate::ModerateError;
use crate::pipeline::{CoordinatorError, PipelineError};
use crate::services::{NotifyError, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Moderate(#[from] ModerateError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Coordinate(#[from] CoordinatorError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
