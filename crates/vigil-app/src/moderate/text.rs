//! Text moderation against the offensive-language and profanity classifiers.
//!
//! Two payload shapes exist. Plain text is scored line by line and stops at
//! the first violation. Segmented JSON (slide maps, transcripts) is scored
//! exhaustively and reports every offending segment at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Flag, FlagReason, ModerateError, Outcome};
use crate::services::TextClassifier;

/// Default violation threshold for both text classifiers.
pub const DEFAULT_TEXT_THRESHOLD: f32 = 0.6;

#[derive(Clone)]
pub struct TextModerator {
    classifier: Arc<dyn TextClassifier>,
    threshold: f32,
}

/// Transcription output shape: the transcript text sits a few levels deep.
#[derive(Deserialize)]
struct TranscriptDocument {
    results: TranscriptResults,
}

#[derive(Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptEntry>,
}

#[derive(Deserialize)]
struct TranscriptEntry {
    transcript: String,
}

impl TextModerator {
    pub fn new(classifier: Arc<dyn TextClassifier>, threshold: f32) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    /// Score plain text line by line, short-circuiting on the first
    /// violation. Within a line the offensive-language check runs before the
    /// profanity check; later lines are never evaluated once a line trips.
    pub async fn moderate_lines(&self, text: &str) -> Result<Outcome, ModerateError> {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let offensive = self.classifier.offensive_score(line).await?;
            if offensive > self.threshold {
                return Ok(Outcome::Flagged(Flag {
                    reason: FlagReason::OffensiveLanguage,
                    evidence: json!({ "line": line, "score": offensive }),
                }));
            }
            let profanity = self.classifier.profanity_score(line).await?;
            if profanity > self.threshold {
                return Ok(Outcome::Flagged(Flag {
                    reason: FlagReason::Profanity,
                    evidence: json!({ "line": line, "score": profanity }),
                }));
            }
        }
        Ok(Outcome::Clean)
    }

    /// Score a JSON payload. Transcription output is scored once as a whole;
    /// a segment map (slide number to slide text) is scored segment by
    /// segment with no short-circuit, and each classifier that found any
    /// violation yields one flag carrying every offending segment.
    pub async fn moderate_segments(&self, body: &[u8]) -> Result<Vec<Flag>, ModerateError> {
        if let Ok(doc) = serde_json::from_slice::<TranscriptDocument>(body) {
            return self.moderate_transcript(&doc).await;
        }
        let segments: BTreeMap<String, String> = serde_json::from_slice(body)
            .map_err(|e| ModerateError::InvalidPayload(e.to_string()))?;

        let mut offensive_hits: BTreeMap<&str, f32> = BTreeMap::new();
        let mut profanity_hits: BTreeMap<&str, f32> = BTreeMap::new();
        for (label, text) in &segments {
            if text.trim().is_empty() {
                continue;
            }
            let offensive = self.classifier.offensive_score(text).await?;
            if offensive > self.threshold {
                offensive_hits.insert(label, offensive);
            }
            let profanity = self.classifier.profanity_score(text).await?;
            if profanity > self.threshold {
                profanity_hits.insert(label, profanity);
            }
        }

        let mut flags = Vec::new();
        if !offensive_hits.is_empty() {
            flags.push(Flag {
                reason: FlagReason::OffensiveLanguage,
                evidence: json!({ "segments": offensive_hits }),
            });
        }
        if !profanity_hits.is_empty() {
            flags.push(Flag {
                reason: FlagReason::Profanity,
                evidence: json!({ "segments": profanity_hits }),
            });
        }
        debug!(flags = flags.len(), segments = segments.len(), "segment moderation done");
        Ok(flags)
    }

    async fn moderate_transcript(
        &self,
        doc: &TranscriptDocument,
    ) -> Result<Vec<Flag>, ModerateError> {
        let transcript = doc
            .results
            .transcripts
            .first()
            .map(|t| t.transcript.as_str())
            .unwrap_or_default();
        if transcript.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut flags = Vec::new();
        let offensive = self.classifier.offensive_score(transcript).await?;
        if offensive > self.threshold {
            flags.push(Flag {
                reason: FlagReason::OffensiveLanguage,
                evidence: json!({ "transcript": transcript, "score": offensive }),
            });
        }
        let profanity = self.classifier.profanity_score(transcript).await?;
        if profanity > self.threshold {
            flags.push(Flag {
                reason: FlagReason::Profanity,
                evidence: json!({ "transcript": transcript, "score": profanity }),
            });
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::services::ClassifierError;

    /// Records every call and answers from fixed score tables.
    #[derive(Default)]
    struct ScriptedClassifier {
        offensive: BTreeMap<String, f32>,
        profanity: BTreeMap<String, f32>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClassifier {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextClassifier for ScriptedClassifier {
        async fn offensive_score(&self, text: &str) -> Result<f32, ClassifierError> {
            self.calls.lock().unwrap().push(format!("offensive:{text}"));
            Ok(self.offensive.get(text).copied().unwrap_or(0.0))
        }

        async fn profanity_score(&self, text: &str) -> Result<f32, ClassifierError> {
            self.calls.lock().unwrap().push(format!("profanity:{text}"));
            Ok(self.profanity.get(text).copied().unwrap_or(0.0))
        }
    }

    fn moderator(classifier: ScriptedClassifier) -> (Arc<ScriptedClassifier>, TextModerator) {
        let classifier = Arc::new(classifier);
        let moderator = TextModerator::new(classifier.clone(), DEFAULT_TEXT_THRESHOLD);
        (classifier, moderator)
    }

    #[tokio::test]
    async fn lines_stop_at_first_violation() {
        let (classifier, moderator) = moderator(ScriptedClassifier {
            offensive: BTreeMap::from([("second line".to_owned(), 0.9)]),
            ..Default::default()
        });

        let outcome = moderator
            .moderate_lines("first line\nsecond line\nthird line")
            .await
            .expect("moderate");

        let flag = outcome.flag().expect("flagged");
        assert_eq!(flag.reason, FlagReason::OffensiveLanguage);
        assert_eq!(flag.evidence["line"], "second line");
        // The offending line skips its profanity check and the third line is
        // never evaluated at all.
        assert_eq!(
            classifier.calls(),
            vec![
                "offensive:first line",
                "profanity:first line",
                "offensive:second line",
            ]
        );
    }

    #[tokio::test]
    async fn offensive_outranks_profanity_within_a_line() {
        let (classifier, moderator) = moderator(ScriptedClassifier {
            offensive: BTreeMap::from([("bad line".to_owned(), 0.7)]),
            profanity: BTreeMap::from([("bad line".to_owned(), 0.99)]),
            ..Default::default()
        });

        let outcome = moderator.moderate_lines("bad line").await.expect("moderate");
        assert_eq!(outcome.flag().unwrap().reason, FlagReason::OffensiveLanguage);
        assert_eq!(classifier.calls(), vec!["offensive:bad line"]);
    }

    #[tokio::test]
    async fn clean_lines_evaluate_everything() {
        let (classifier, moderator) = moderator(ScriptedClassifier::default());
        let outcome = moderator.moderate_lines("one\ntwo").await.expect("moderate");
        assert!(outcome.flag().is_none());
        assert_eq!(classifier.calls().len(), 4);
    }

    #[tokio::test]
    async fn segments_aggregate_without_short_circuit() {
        // Dyadic scores survive the f32 -> json round trip exactly.
        let (classifier, moderator) = moderator(ScriptedClassifier {
            offensive: BTreeMap::from([("slide one".to_owned(), 0.75)]),
            profanity: BTreeMap::from([
                ("slide one".to_owned(), 0.6875),
                ("slide three".to_owned(), 0.9375),
            ]),
            ..Default::default()
        });

        let body = serde_json::to_vec(&serde_json::json!({
            "1": "slide one",
            "2": "slide two",
            "3": "slide three",
        }))
        .unwrap();
        let flags = moderator.moderate_segments(&body).await.expect("moderate");

        // Every segment was scored by both classifiers despite the early hit.
        assert_eq!(classifier.calls().len(), 6);

        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].reason, FlagReason::OffensiveLanguage);
        assert_eq!(flags[0].evidence["segments"]["1"], 0.75);
        assert_eq!(flags[1].reason, FlagReason::Profanity);
        assert_eq!(flags[1].evidence["segments"]["1"], 0.6875);
        assert_eq!(flags[1].evidence["segments"]["3"], 0.9375);
    }

    #[tokio::test]
    async fn transcript_is_scored_once_as_a_whole() {
        let transcript = "the whole spoken text";
        let (classifier, moderator) = moderator(ScriptedClassifier {
            profanity: BTreeMap::from([(transcript.to_owned(), 0.95)]),
            ..Default::default()
        });

        let body = serde_json::to_vec(&serde_json::json!({
            "results": { "transcripts": [ { "transcript": transcript } ] }
        }))
        .unwrap();
        let flags = moderator.moderate_segments(&body).await.expect("moderate");

        assert_eq!(
            classifier.calls(),
            vec![
                format!("offensive:{transcript}"),
                format!("profanity:{transcript}"),
            ]
        );
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].reason, FlagReason::Profanity);
        assert_eq!(flags[0].evidence["transcript"], transcript);
    }

    #[tokio::test]
    async fn non_segment_payload_is_invalid() {
        let (_classifier, moderator) = moderator(ScriptedClassifier::default());
        let err = moderator
            .moderate_segments(b"[1, 2, 3]")
            .await
            .expect_err("invalid");
        assert!(matches!(err, ModerateError::InvalidPayload(_)));
    }
}
