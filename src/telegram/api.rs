//! Telegram Bot API adapter: long-poll inbound loop + outbound sends.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::TelegramConfig;
use crate::error::{LedgerError, Result};

use super::{ChatTransport, InboundEvent, MessageCache, MessageSummary};

const CONFIRM_DATA: &str = "confirm";
const REJECT_DATA: &str = "reject";

pub struct TelegramApi {
    config: TelegramConfig,
    client: reqwest::Client,
    cache: Mutex<MessageCache>,
}

impl TelegramApi {
    pub fn new(config: TelegramConfig, max_reply_hops: usize) -> Result<Self> {
        // The long poll holds the connection open for poll_timeout_secs,
        // so the client timeout must exceed it.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 30))
            .build()
            .map_err(|e| LedgerError::Transport(format!("http client: {e}")))?;
        Ok(Self {
            config,
            client,
            cache: Mutex::new(MessageCache::new(500, max_reply_hops)),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base, self.config.bot_token
        )
    }

    fn chat_allowed(&self, chat_id: i64) -> bool {
        if self.config.allowed_chat_ids.is_empty() {
            return false;
        }
        self.config
            .allowed_chat_ids
            .iter()
            .any(|&id| id == 0 || id == chat_id)
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!(
                "{method} failed ({status}): {body}"
            )));
        }
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method}: malformed response: {e}")))?;
        if !payload
            .get("ok")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
        {
            return Err(LedgerError::Transport(format!("{method}: ok=false: {payload}")));
        }
        Ok(payload.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Turn one wire update into an inbound event, recording everything
    /// seen into the message cache along the way.
    fn event_from_update(&self, update: &serde_json::Value) -> Option<InboundEvent> {
        if let Some(message) = update.get("message") {
            let chat_id = message.get("chat")?.get("id")?.as_i64()?;
            if !self.chat_allowed(chat_id) {
                return None;
            }
            let message_id = message.get("message_id")?.as_i64()?;
            let is_bot = message
                .get("from")
                .and_then(|f| f.get("is_bot"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            let text = message
                .get("text")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned();

            // The wire exposes one reply level; the cache already holds
            // the rest of the chain if this process saw it.
            let parent_id = message
                .get("reply_to_message")
                .and_then(|parent| parent.get("message_id"))
                .and_then(serde_json::Value::as_i64);
            if let Some(parent) = message.get("reply_to_message") {
                if let (Some(pid), ptext) = (
                    parent.get("message_id").and_then(serde_json::Value::as_i64),
                    parent
                        .get("text")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default(),
                ) {
                    let parent_is_bot = parent
                        .get("from")
                        .and_then(|f| f.get("is_bot"))
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false);
                    let mut cache = self.cache.lock().ok()?;
                    cache.record(
                        chat_id,
                        MessageSummary {
                            id: pid,
                            is_bot: parent_is_bot,
                            text: ptext.to_owned(),
                        },
                        None,
                    );
                }
            }

            {
                let mut cache = self.cache.lock().ok()?;
                cache.record(
                    chat_id,
                    MessageSummary {
                        id: message_id,
                        is_bot,
                        text: text.clone(),
                    },
                    parent_id,
                );
            }

            if let Some(voice) = message.get("voice") {
                let file_id = voice.get("file_id")?.as_str()?.to_owned();
                return Some(InboundEvent::Voice {
                    chat_id,
                    message_id,
                    file_id,
                });
            }

            if let Some(parent_id) = parent_id {
                if !text.is_empty() {
                    let ancestors = self
                        .cache
                        .lock()
                        .ok()
                        .map(|cache| cache.ancestors(chat_id, parent_id))
                        .unwrap_or_default();
                    return Some(InboundEvent::Reply {
                        chat_id,
                        message_id,
                        text,
                        ancestors,
                    });
                }
            }
            return None;
        }

        if let Some(callback) = update.get("callback_query") {
            let callback_id = callback.get("id")?.as_str()?.to_owned();
            let message = callback.get("message")?;
            let chat_id = message.get("chat")?.get("id")?.as_i64()?;
            if !self.chat_allowed(chat_id) {
                return None;
            }
            let message_id = message.get("message_id")?.as_i64()?;
            return match callback.get("data").and_then(serde_json::Value::as_str) {
                Some(CONFIRM_DATA) => Some(InboundEvent::Confirm {
                    chat_id,
                    message_id,
                    callback_id,
                }),
                Some(REJECT_DATA) => Some(InboundEvent::Reject {
                    chat_id,
                    message_id,
                    callback_id,
                }),
                _ => None,
            };
        }

        None
    }

    /// Long-poll loop: fetch updates, forward recognized events.
    pub async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        if self.config.bot_token.trim().is_empty() {
            return Err(LedgerError::Transport("bot token is empty".to_owned()));
        }
        let mut offset: i64 = 0;
        loop {
            let result = self
                .call(
                    "getUpdates",
                    json!({
                        "timeout": self.config.poll_timeout_secs,
                        "offset": offset,
                        "allowed_updates": ["message", "callback_query"]
                    }),
                )
                .await;
            let updates = match result {
                Ok(value) => value.as_array().cloned().unwrap_or_default(),
                Err(err) => {
                    tracing::warn!(%err, "getUpdates failed, backing off");
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };

            for update in &updates {
                if let Some(id) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = offset.max(id + 1);
                }
                if let Some(event) = self.event_from_update(update) {
                    if inbound_tx.send(event).await.is_err() {
                        return Err(LedgerError::Transport(
                            "inbound channel closed".to_owned(),
                        ));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramApi {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
        with_buttons: bool,
    ) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(reply_to) = reply_to {
            body["reply_to_message_id"] = json!(reply_to);
        }
        if with_buttons {
            body["reply_markup"] = json!({
                "inline_keyboard": [[
                    { "text": "✅ Подтвердить", "callback_data": CONFIRM_DATA },
                    { "text": "❌ Отменить", "callback_data": REJECT_DATA }
                ]]
            });
        }
        let result = self.call("sendMessage", body).await?;
        let message_id = result
            .get("message_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| LedgerError::Transport("sendMessage: no message_id".to_owned()))?;

        // Outbound messages join the cache so later replies can walk
        // through them.
        if let Ok(mut cache) = self.cache.lock() {
            cache.record(
                chat_id,
                MessageSummary {
                    id: message_id,
                    is_bot: true,
                    text: text.to_owned(),
                },
                reply_to,
            );
        }
        Ok(message_id)
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.call(
            "editMessageText",
            json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
            }),
        )
        .await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.record(
                chat_id,
                MessageSummary {
                    id: message_id,
                    is_bot: true,
                    text: text.to_owned(),
                },
                None,
            );
        }
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.call(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn download_voice(&self, file_id: &str) -> Result<Bytes> {
        let result = self.call("getFile", json!({ "file_id": file_id })).await?;
        let file_path = result
            .get("file_path")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| LedgerError::Transport("getFile: no file_path".to_owned()))?;
        let url = format!(
            "{}/file/bot{}/{file_path}",
            self.config.api_base, self.config.bot_token
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("file download: {e}")))?;
        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "file download failed ({})",
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| LedgerError::Transport(format!("file download: {e}")))
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }
}
