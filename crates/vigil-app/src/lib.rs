//! Vigil: an event-driven content moderation pipeline.
//!
//! Uploads land in a library bucket, get split into text and media
//! artifacts, and every artifact is moderated by an external classifier.
//! Flagged sources are quarantined and alerted on; everything is keyed so a
//! verdict on any derived artifact traces back to the original upload.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod keys;
pub mod moderate;
pub mod pipeline;
pub mod services;
