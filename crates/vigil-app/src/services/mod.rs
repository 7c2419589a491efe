//! IO-bound collaborator layer: storage, classifiers, notification.
//!
//! Everything here talks to an external system behind a trait so the pipeline
//! can be exercised with stubs. Pure transforms belong in `crate::keys`,
//! `crate::extract`, and `crate::moderate`.

pub mod classifiers;
pub mod notify;
pub mod store;

pub use classifiers::{
    ClassifierError, HttpClassifierClient, ImageClassifier, ModerationLabel,
    ModerationResultsPage, TextClassifier, TextDetection, TextDetectionKind, Transcriber,
    TranscriptionJob, VideoClassifier,
};
pub use notify::{HttpNotifier, JsonlResultLog, Notifier, NotifyError, ResultLog};
pub use store::{ArtifactStore, FsArtifactStore, StoreError};
