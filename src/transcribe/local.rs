//! Self-hosted recognizer backend.
//!
//! Posts the raw voice payload to a local HTTP recognizer (a vosk-server
//! style endpoint) and reads back `{"text": "..."}`. The hint is ignored:
//! offline models take no prompt.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::TranscriptionConfig;
use crate::error::{LedgerError, Result};

use super::Transcriber;

pub struct LocalTranscriber {
    endpoint: String,
    client: reqwest::Client,
}

impl LocalTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Transcription(format!("http client: {e}")))?;
        Ok(Self {
            endpoint: config.local_endpoint.clone(),
            client,
        })
    }
}

#[async_trait]
impl Transcriber for LocalTranscriber {
    async fn transcribe(&self, audio: Bytes, _hint: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(|e| LedgerError::Transcription(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transcription(format!(
                "local recognizer failed ({status}): {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Transcription(format!("malformed response: {e}")))?;
        payload
            .get("text")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| LedgerError::Transcription("response without text".to_owned()))
    }
}
