//! External classifier collaborators: vision, video, transcription, text.
//!
//! The pipeline never runs inference itself; each trait wraps one managed
//! capability. The HTTP implementation speaks a small JSON protocol so tests
//! can stand the services up with wiremock.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

type GenericRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const DEFAULT_REQUESTS_PER_SECOND: u32 = 20;

/// Errors emitted by classifier collaborators.
///
/// `Unavailable` is transient: the invocation fails and the surrounding
/// at-least-once delivery retries it. It is never treated as a clean verdict.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable during `{stage}`: {source}")]
    Unavailable {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("classifier protocol error during `{stage}`: {reason}")]
    Protocol { stage: &'static str, reason: String },
}

/// One moderation label returned by the vision or video classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationLabel {
    pub name: String,
    pub confidence: f32,
}

/// Granularity of a text detection on an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDetectionKind {
    Line,
    Word,
}

/// A piece of text the vision classifier read off an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDetection {
    pub kind: TextDetectionKind,
    pub text: String,
}

/// One page of an asynchronous video moderation job's results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationResultsPage {
    pub labels: Vec<ModerationLabel>,
    pub next_token: Option<String>,
}

/// Parameters for an asynchronous transcription job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionJob {
    pub job_name: String,
    pub source_bucket: String,
    pub source_key: String,
    pub media_format: String,
    pub language_code: String,
    pub output_bucket: String,
    /// Already sentinel-escaped; the transcriber treats it as opaque.
    pub output_key: String,
}

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn detect_unsafe_labels(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Vec<ModerationLabel>, ClassifierError>;

    async fn detect_text(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Vec<TextDetection>, ClassifierError>;
}

#[async_trait]
pub trait VideoClassifier: Send + Sync {
    /// Start an asynchronous moderation job; completion arrives later on the
    /// callback topic with this job id.
    async fn start_job(
        &self,
        bucket: &str,
        key: &str,
        callback_topic: &str,
    ) -> Result<String, ClassifierError>;

    async fn results_page(
        &self,
        job_id: &str,
        page_size: u32,
        continuation_token: Option<&str>,
    ) -> Result<ModerationResultsPage, ClassifierError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn start_job(&self, job: &TranscriptionJob) -> Result<(), ClassifierError>;
}

#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Offensive-language score in `[0, 1]`.
    async fn offensive_score(&self, text: &str) -> Result<f32, ClassifierError>;

    /// Profanity score in `[0, 1]`.
    async fn profanity_score(&self, text: &str) -> Result<f32, ClassifierError>;
}

/// HTTP client implementing every classifier trait against a single base URL.
#[derive(Debug, Clone)]
pub struct HttpClassifierClient {
    base_url: Url,
    http: Client,
    rate_limiter: Arc<GenericRateLimiter>,
    backoff: ExponentialBuilder,
}

impl HttpClassifierClient {
    pub fn new(base_url: Url) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND).expect("non-zero quota"),
        );
        Self {
            base_url,
            http: Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            backoff: ExponentialBuilder::default().with_max_times(3),
        }
    }

    fn endpoint(&self, path: &'static str) -> Result<Url, ClassifierError> {
        self.base_url.join(path).map_err(|e| ClassifierError::Protocol {
            stage: path,
            reason: e.to_string(),
        })
    }

    async fn post_json<Req, Resp>(
        &self,
        stage: &'static str,
        path: &'static str,
        body: &Req,
    ) -> Result<Resp, ClassifierError>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path)?;
        let fetch = || async {
            self.rate_limiter.until_ready().await;
            self.http
                .post(url.clone())
                .json(body)
                .send()
                .await?
                .error_for_status()?
                .json::<Resp>()
                .await
        };
        fetch
            .retry(self.backoff)
            .when(|e: &reqwest::Error| e.is_timeout() || e.is_connect() || is_server_error(e))
            .await
            .map_err(|e| ClassifierError::Unavailable {
                stage,
                source: Arc::new(e),
            })
    }
}

fn is_server_error(e: &reqwest::Error) -> bool {
    e.status().is_some_and(|s| s.is_server_error())
}

#[derive(Serialize)]
struct ObjectRef<'a> {
    bucket: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
struct LabelsResponse {
    labels: Vec<ModerationLabel>,
}

#[derive(Deserialize)]
struct DetectionsResponse {
    detections: Vec<TextDetection>,
}

#[derive(Serialize)]
struct StartVideoJobRequest<'a> {
    bucket: &'a str,
    key: &'a str,
    callback_topic: &'a str,
}

#[derive(Deserialize)]
struct StartVideoJobResponse {
    job_id: String,
}

#[derive(Serialize)]
struct ResultsPageRequest<'a> {
    job_id: &'a str,
    page_size: u32,
    next_token: Option<&'a str>,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: f32,
}

#[async_trait]
impl ImageClassifier for HttpClassifierClient {
    async fn detect_unsafe_labels(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Vec<ModerationLabel>, ClassifierError> {
        debug!(bucket, key, "detecting unsafe image labels");
        let resp: LabelsResponse = self
            .post_json("image-labels", "image/labels", &ObjectRef { bucket, key })
            .await?;
        Ok(resp.labels)
    }

    async fn detect_text(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Vec<TextDetection>, ClassifierError> {
        debug!(bucket, key, "detecting on-image text");
        let resp: DetectionsResponse = self
            .post_json("image-text", "image/text", &ObjectRef { bucket, key })
            .await?;
        Ok(resp.detections)
    }
}

#[async_trait]
impl VideoClassifier for HttpClassifierClient {
    async fn start_job(
        &self,
        bucket: &str,
        key: &str,
        callback_topic: &str,
    ) -> Result<String, ClassifierError> {
        debug!(bucket, key, "starting video moderation job");
        let resp: StartVideoJobResponse = self
            .post_json(
                "video-start",
                "video/start",
                &StartVideoJobRequest {
                    bucket,
                    key,
                    callback_topic,
                },
            )
            .await?;
        Ok(resp.job_id)
    }

    async fn results_page(
        &self,
        job_id: &str,
        page_size: u32,
        continuation_token: Option<&str>,
    ) -> Result<ModerationResultsPage, ClassifierError> {
        self.post_json(
            "video-results",
            "video/results",
            &ResultsPageRequest {
                job_id,
                page_size,
                next_token: continuation_token,
            },
        )
        .await
    }
}

#[async_trait]
impl Transcriber for HttpClassifierClient {
    async fn start_job(&self, job: &TranscriptionJob) -> Result<(), ClassifierError> {
        debug!(job_name = %job.job_name, "starting transcription job");
        let _: serde_json::Value = self
            .post_json("transcribe-start", "transcribe/start", job)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TextClassifier for HttpClassifierClient {
    async fn offensive_score(&self, text: &str) -> Result<f32, ClassifierError> {
        let resp: ScoreResponse = self
            .post_json("text-offensive", "text/offensive", &ScoreRequest { text })
            .await?;
        Ok(resp.score)
    }

    async fn profanity_score(&self, text: &str) -> Result<f32, ClassifierError> {
        let resp: ScoreResponse = self
            .post_json("text-profanity", "text/profanity", &ScoreRequest { text })
            .await?;
        Ok(resp.score)
    }
}
