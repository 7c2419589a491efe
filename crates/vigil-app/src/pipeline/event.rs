//! Object-store trigger events as the pipeline receives them.

use serde::{Deserialize, Serialize};

use crate::keys;

/// A bucket notification: an object appeared under `key` in `bucket`. The
/// key arrives transport-encoded and must be decoded exactly once, here at
/// the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEvent {
    pub bucket: String,
    pub key: String,
}

impl ObjectEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// The real object key: `+` restored to space, percent sequences expanded.
    pub fn decoded_key(&self) -> String {
        keys::decode_event_key(&self.key)
    }
}
