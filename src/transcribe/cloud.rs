//! Hosted Whisper-compatible transcription backend.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::TranscriptionConfig;
use crate::error::{LedgerError, Result};

use super::Transcriber;

pub struct CloudTranscriber {
    api_base: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl CloudTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Transcription(format!("http client: {e}")))?;
        Ok(Self {
            api_base: config.cloud_api_base.clone(),
            model: config.cloud_model.clone(),
            api_key: config.cloud_api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl Transcriber for CloudTranscriber {
    async fn transcribe(&self, audio: Bytes, hint: &str) -> Result<String> {
        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("voice.ogg")
            .mime_str("audio/ogg")
            .map_err(|e| LedgerError::Transcription(format!("multipart: {e}")))?;
        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", file);
        if !hint.is_empty() {
            form = form.text("prompt", hint.to_owned());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LedgerError::Transcription(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transcription(format!(
                "transcription failed ({status}): {body}"
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
