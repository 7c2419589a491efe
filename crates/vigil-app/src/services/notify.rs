//! Notification delivery and the durable moderation result log.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to publish to `{topic}`: {source}")]
    Publish {
        topic: String,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("failed to append result record: {0}")]
    RecordIo(String),
}

/// Publishes structured messages to named topics.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, message: &JsonValue) -> Result<(), NotifyError>;
}

/// Durable log of flagged verdicts. Appending the same record twice is
/// allowed; duplicate delivery tolerance lives in the storage side effects,
/// not here.
#[async_trait]
pub trait ResultLog: Send + Sync {
    async fn record(
        &self,
        key: &str,
        sub_key: &str,
        evidence: &JsonValue,
    ) -> Result<(), NotifyError>;
}

/// Webhook-style notifier: POSTs `{topic, message}` to one endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    endpoint: Url,
    http: Client,
}

impl HttpNotifier {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            http: Client::new(),
        }
    }
}

#[derive(Serialize)]
struct PublishEnvelope<'a> {
    topic: &'a str,
    message: &'a JsonValue,
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(&self, topic: &str, message: &JsonValue) -> Result<(), NotifyError> {
        debug!(topic, "publishing notification");
        self.http
            .post(self.endpoint.clone())
            .json(&PublishEnvelope { topic, message })
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| NotifyError::Publish {
                topic: topic.to_owned(),
                source: Arc::new(e),
            })?;
        Ok(())
    }
}

/// Append-only JSONL result log, one record per line.
#[derive(Debug, Clone)]
pub struct JsonlResultLog {
    path: PathBuf,
}

impl JsonlResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    key: &'a str,
    sub_key: &'a str,
    evidence: &'a JsonValue,
    at: chrono::DateTime<Utc>,
}

#[async_trait]
impl ResultLog for JsonlResultLog {
    async fn record(
        &self,
        key: &str,
        sub_key: &str,
        evidence: &JsonValue,
    ) -> Result<(), NotifyError> {
        let record = ResultRecord {
            key,
            sub_key,
            evidence,
            at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| NotifyError::RecordIo(e.to_string()))?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| NotifyError::RecordIo(e.to_string()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| NotifyError::RecordIo(e.to_string()))?;
        file.write_all(&line)
            .await
            .map_err(|e| NotifyError::RecordIo(e.to_string()))?;
        // The buffered writer drops its contents unless flushed; a record is
        // only durable once this returns.
        file.flush()
            .await
            .map_err(|e| NotifyError::RecordIo(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn result_log_appends_one_line_per_record() {
        let temp = TempDir::new().expect("temp dir");
        let log = JsonlResultLog::new(temp.path().join("results.jsonl"));

        log.record("reports/q1.pptx", "profanity", &serde_json::json!({"score": 0.9}))
            .await
            .expect("first record");
        log.record("reports/q1.pptx", "profanity", &serde_json::json!({"score": 0.9}))
            .await
            .expect("duplicate record is allowed");

        let contents = std::fs::read_to_string(temp.path().join("results.jsonl")).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        // Both records must be fully on disk by the time `record` returns,
        // the trailing one included.
        for line in lines {
            let parsed: JsonValue = serde_json::from_str(line).expect("valid json");
            assert_eq!(parsed["key"], "reports/q1.pptx");
            assert_eq!(parsed["sub_key"], "profanity");
        }
    }
}
