//! Video moderation: asynchronous label jobs plus audio transcription.
//!
//! Submitting a video starts two jobs at once. The moderation job reports
//! back through the callback topic; the transcription job writes its
//! transcript into the processing area, where it is moderated as text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Flag, FlagReason, ModerateError, Outcome};
use crate::keys;
use crate::services::{Transcriber, TranscriptionJob, VideoClassifier};

const TRANSCRIPTION_LANGUAGE: &str = "en-US";

/// Completion notice for a video moderation job. The payload carries the
/// full correlation state; nothing is kept in memory between submission and
/// callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCallbackPayload {
    pub job_id: String,
    pub bucket: String,
    pub key: String,
}

#[derive(Clone)]
pub struct VideoModerator {
    video: Arc<dyn VideoClassifier>,
    transcriber: Arc<dyn Transcriber>,
    callback_topic: String,
    page_size: u32,
}

impl VideoModerator {
    pub fn new(
        video: Arc<dyn VideoClassifier>,
        transcriber: Arc<dyn Transcriber>,
        callback_topic: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            video,
            transcriber,
            callback_topic: callback_topic.into(),
            page_size,
        }
    }

    /// Start the moderation and transcription jobs for one video. The
    /// transcript lands next to the video under an escaped artifact key so
    /// the text path can trace it back to this source.
    pub async fn submit(&self, bucket: &str, key: &str) -> Result<String, ModerateError> {
        let job_id = self
            .video
            .start_job(bucket, key, &self.callback_topic)
            .await?;
        info!(bucket, key, job_id, "video moderation job started");

        let media_format = keys::extension(key)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let job = TranscriptionJob {
            job_name: Uuid::new_v4().to_string(),
            source_bucket: bucket.to_owned(),
            source_key: key.to_owned(),
            media_format,
            language_code: TRANSCRIPTION_LANGUAGE.to_owned(),
            output_bucket: bucket.to_owned(),
            output_key: keys::escape(&keys::moderated_content_key(key, "json")),
        };
        self.transcriber.start_job(&job).await?;
        Ok(job_id)
    }

    /// Fetch the finished job's results page by page, stopping at the first
    /// page that carries any label.
    pub async fn on_callback(
        &self,
        payload: &VideoCallbackPayload,
    ) -> Result<Outcome, ModerateError> {
        let mut token: Option<String> = None;
        loop {
            let page = self
                .video
                .results_page(&payload.job_id, self.page_size, token.as_deref())
                .await?;
            debug!(
                job_id = payload.job_id,
                labels = page.labels.len(),
                "fetched video results page"
            );
            if !page.labels.is_empty() {
                return Ok(Outcome::Flagged(Flag {
                    reason: FlagReason::UnsafeVideo,
                    evidence: json!({ "labels": page.labels }),
                }));
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(Outcome::Clean),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::services::{ClassifierError, ModerationLabel, ModerationResultsPage};

    struct PagedVideo {
        pages: Vec<ModerationResultsPage>,
        calls: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl VideoClassifier for PagedVideo {
        async fn start_job(
            &self,
            _bucket: &str,
            _key: &str,
            _callback_topic: &str,
        ) -> Result<String, ClassifierError> {
            Ok("job-1".to_owned())
        }

        async fn results_page(
            &self,
            _job_id: &str,
            _page_size: u32,
            continuation_token: Option<&str>,
        ) -> Result<ModerationResultsPage, ClassifierError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(continuation_token.map(str::to_owned));
            Ok(self.pages[calls.len() - 1].clone())
        }
    }

    #[derive(Default)]
    struct RecordingTranscriber {
        jobs: Mutex<Vec<TranscriptionJob>>,
    }

    #[async_trait]
    impl Transcriber for RecordingTranscriber {
        async fn start_job(&self, job: &TranscriptionJob) -> Result<(), ClassifierError> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    fn page(labels: Vec<ModerationLabel>, next: Option<&str>) -> ModerationResultsPage {
        ModerationResultsPage {
            labels,
            next_token: next.map(str::to_owned),
        }
    }

    fn label(name: &str) -> ModerationLabel {
        ModerationLabel {
            name: name.to_owned(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn submit_starts_both_jobs_with_escaped_transcript_key() {
        let video = Arc::new(PagedVideo {
            pages: vec![],
            calls: Mutex::new(vec![]),
        });
        let transcriber = Arc::new(RecordingTranscriber::default());
        let moderator =
            VideoModerator::new(video, transcriber.clone(), "moderation-callbacks", 10);

        let job_id = moderator
            .submit("processing", "clips/town hall.mp4")
            .await
            .expect("submit");
        assert_eq!(job_id, "job-1");

        let jobs = transcriber.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].media_format, "mp4");
        assert_eq!(jobs[0].language_code, "en-US");
        assert_eq!(jobs[0].output_bucket, "processing");
        assert_eq!(
            jobs[0].output_key,
            "clips/town(_!SPACE!_)hall.mp4/subType/clips/town(_!SPACE!_)hall.json"
        );
    }

    #[tokio::test]
    async fn callback_walks_pages_until_first_label() {
        let video = Arc::new(PagedVideo {
            pages: vec![
                page(vec![], Some("t1")),
                page(vec![], Some("t2")),
                page(vec![label("Violence")], Some("t3")),
            ],
            calls: Mutex::new(vec![]),
        });
        let moderator = VideoModerator::new(
            video.clone(),
            Arc::new(RecordingTranscriber::default()),
            "moderation-callbacks",
            10,
        );

        let payload = VideoCallbackPayload {
            job_id: "job-1".to_owned(),
            bucket: "processing".to_owned(),
            key: "clips/a.mp4".to_owned(),
        };
        let outcome = moderator.on_callback(&payload).await.expect("callback");

        let flag = outcome.flag().expect("flagged");
        assert_eq!(flag.reason, FlagReason::UnsafeVideo);
        assert_eq!(flag.evidence["labels"][0]["name"], "Violence");
        // Pagination stops on the labeled page even though a token remains.
        assert_eq!(
            *video.calls.lock().unwrap(),
            vec![None, Some("t1".to_owned()), Some("t2".to_owned())]
        );
    }

    #[tokio::test]
    async fn callback_with_no_labels_is_clean() {
        let video = Arc::new(PagedVideo {
            pages: vec![page(vec![], Some("t1")), page(vec![], None)],
            calls: Mutex::new(vec![]),
        });
        let moderator = VideoModerator::new(
            video.clone(),
            Arc::new(RecordingTranscriber::default()),
            "moderation-callbacks",
            10,
        );

        let payload = VideoCallbackPayload {
            job_id: "job-1".to_owned(),
            bucket: "processing".to_owned(),
            key: "clips/a.mp4".to_owned(),
        };
        let outcome = moderator.on_callback(&payload).await.expect("callback");
        assert!(outcome.flag().is_none());
        assert_eq!(video.calls.lock().unwrap().len(), 2);
    }
}
