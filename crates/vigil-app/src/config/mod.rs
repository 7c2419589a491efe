//! Configuration loading and XDG path helpers.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE: &str = "config/settings";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub buckets: BucketsConfig,
    pub moderation: ModerationConfig,
    pub pdf: PdfConfig,
    pub services: ServicesConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BucketsConfig {
    pub library: String,
    pub processing: String,
    pub quarantine: String,
    pub clean: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModerationConfig {
    /// Violation threshold for both text classifiers.
    pub text_threshold: f32,
    /// Page size when walking video moderation results.
    pub video_page_size: u32,
    pub callback_topic: String,
    pub alert_topic: String,
}

/// Thresholds gating embedded image extraction; all zero means keep
/// everything.
#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    pub min_side: u32,
    pub min_rel_size: f64,
    pub min_abs_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub classifier_endpoint: String,
    pub notify_endpoint: String,
    pub result_log_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory the bucket tree lives under.
    pub root: PathBuf,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_storage = default_storage_path()?;
    let default_log = default_result_log_path()?;
    let builder = Config::builder()
        .set_default("buckets.library", "library")?
        .set_default("buckets.processing", "processing")?
        .set_default("buckets.quarantine", "quarantine")?
        .set_default("buckets.clean", None::<String>)?
        .set_default("moderation.text_threshold", 0.6)?
        .set_default("moderation.video_page_size", 10)?
        .set_default("moderation.callback_topic", "moderation-callbacks")?
        .set_default("moderation.alert_topic", "moderation-alerts")?
        .set_default("pdf.min_side", 0)?
        .set_default("pdf.min_rel_size", 0.0)?
        .set_default("pdf.min_abs_size", 0)?
        .set_default("services.classifier_endpoint", "http://127.0.0.1:8090/")?
        .set_default("services.notify_endpoint", "http://127.0.0.1:8091/")?
        .set_default(
            "services.result_log_path",
            default_log.to_string_lossy().to_string(),
        )?
        .set_default(
            "storage.root",
            default_storage.to_string_lossy().to_string(),
        )?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix("VIGIL").separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "vigil", "vigil").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_storage_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().join("buckets"))
}

fn default_result_log_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().join("results.jsonl"))
}
