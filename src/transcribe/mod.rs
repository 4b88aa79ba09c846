//! Speech-to-text adapters.
//!
//! Two interchangeable backends behind one trait: a hosted
//! Whisper-compatible endpoint and a self-hosted recognizer reachable over
//! HTTP. Selection is configuration, not code.

pub mod cloud;
pub mod local;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{TranscriptionBackend, TranscriptionConfig};
use crate::error::Result;

pub use cloud::CloudTranscriber;
pub use local::LocalTranscriber;

/// Speech-to-text contract. `hint` is free-text context (the live category
/// and account names) that backends may use to bias recognition.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Bytes, hint: &str) -> Result<String>;
}

/// Build the configured backend.
pub fn from_config(config: &TranscriptionConfig) -> Result<Box<dyn Transcriber>> {
    Ok(match config.backend {
        TranscriptionBackend::Cloud => Box::new(CloudTranscriber::new(config)?),
        TranscriptionBackend::Local => Box::new(LocalTranscriber::new(config)?),
    })
}
