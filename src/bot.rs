//! Event runtime.
//!
//! Consumes inbound transport events and drives the pipeline: voice notes
//! through transcription and the orchestrator into staged confirmations,
//! button presses into commits or cancellations, text replies into the
//! edit flow. Every failure is translated into a user-facing message; the
//! loop itself never dies on a single bad event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agents::{AgentReply, Orchestrator, ReplyAgent};
use crate::catalog::{Catalog, CatalogSnapshot};
use crate::config::AppConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::LedgerStore;
use crate::pending::{PendingWrite, PendingWrites};
use crate::telegram::{ChatTransport, InboundEvent, MessageSummary};
use crate::transcribe::Transcriber;

const PROGRESS_TEXT: &str = "1/3 Определяю тип операции. Ожидайте...";

pub struct Bot {
    config: AppConfig,
    transport: Arc<dyn ChatTransport>,
    transcriber: Arc<dyn Transcriber>,
    store: Arc<dyn LedgerStore>,
    catalog: Arc<Catalog>,
    orchestrator: Orchestrator,
    reply_agent: ReplyAgent,
    pending: PendingWrites,
}

impl Bot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn ChatTransport>,
        transcriber: Arc<dyn Transcriber>,
        store: Arc<dyn LedgerStore>,
        catalog: Arc<Catalog>,
        orchestrator: Orchestrator,
        reply_agent: ReplyAgent,
    ) -> Self {
        Self {
            config,
            transport,
            transcriber,
            store,
            catalog,
            orchestrator,
            reply_agent,
            pending: PendingWrites::new(),
        }
    }

    /// Drain inbound events until the channel closes.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = inbound.recv().await {
            self.handle_event(event).await;
        }
        tracing::info!("inbound channel closed, runtime stopping");
    }

    pub async fn handle_event(&self, event: InboundEvent) {
        let result = match event {
            InboundEvent::Voice {
                chat_id,
                message_id,
                file_id,
            } => self.handle_voice(chat_id, message_id, &file_id).await,
            InboundEvent::Reply {
                chat_id,
                message_id,
                text,
                ancestors,
            } => {
                self.handle_reply(chat_id, message_id, &text, &ancestors)
                    .await
            }
            InboundEvent::Confirm {
                chat_id,
                message_id,
                callback_id,
            } => self.handle_confirm(chat_id, message_id, &callback_id).await,
            InboundEvent::Reject {
                chat_id,
                message_id,
                callback_id,
            } => self.handle_reject(chat_id, message_id, &callback_id).await,
        };
        if let Err(err) = result {
            tracing::error!(%err, "event handling failed");
        }
    }

    async fn handle_voice(&self, chat_id: i64, message_id: i64, file_id: &str) -> Result<()> {
        let progress_id = self
            .transport
            .send_message(chat_id, PROGRESS_TEXT, Some(message_id), false)
            .await?;

        let outcome = self.process_voice(chat_id, message_id, file_id).await;
        // Progress cleanup happens regardless of the pipeline outcome.
        if let Err(err) = self.transport.delete_message(chat_id, progress_id).await {
            tracing::warn!(%err, "progress message cleanup failed");
        }

        if let Err(err) = outcome {
            tracing::warn!(%err, chat_id, "voice pipeline failed");
            self.transport
                .send_message(chat_id, &user_message(&err), Some(message_id), false)
                .await?;
        }
        Ok(())
    }

    async fn process_voice(&self, chat_id: i64, message_id: i64, file_id: &str) -> Result<()> {
        let audio = self.transport.download_voice(file_id).await?;
        let snapshot = self.catalog.snapshot().await?;
        let transcript = self
            .transcriber
            .transcribe(audio, &transcription_hint(&snapshot))
            .await?;
        tracing::debug!(chat_id, transcript = %transcript, "voice transcribed");

        let outcomes = self.orchestrator.process(&transcript, &snapshot).await?;
        let total = outcomes.len();
        let mut recorded = 0usize;
        for outcome in outcomes {
            match outcome.reply {
                AgentReply::Recorded { mut record, message } => {
                    recorded += 1;
                    if self.config.behavior.auto_commit {
                        let sent_id = self
                            .transport
                            .send_message(chat_id, &message, Some(message_id), false)
                            .await?;
                        record.tag = sent_id;
                        self.commit(record.to_ops(&self.config.sheets)?).await?;
                    } else {
                        let sent_id = self
                            .transport
                            .send_message(chat_id, &message, Some(message_id), true)
                            .await?;
                        record.tag = sent_id;
                        self.pending
                            .stage(
                                sent_id,
                                PendingWrite {
                                    chat_id,
                                    record,
                                    span: outcome.span.clone(),
                                    text: message,
                                    auto_committed: false,
                                },
                            )
                            .await;
                    }
                }
                AgentReply::Clarify { message } | AgentReply::Failed { message } => {
                    self.transport
                        .send_message(chat_id, &message, Some(message_id), false)
                        .await?;
                }
            }
        }
        // A multi-operation note closes with an aggregate count.
        if total > 1 {
            self.transport
                .send_message(
                    chat_id,
                    &format!("Успешно обработано операций: {recorded}/{total}"),
                    Some(message_id),
                    false,
                )
                .await?;
        }
        Ok(())
    }

    async fn handle_confirm(
        &self,
        chat_id: i64,
        message_id: i64,
        callback_id: &str,
    ) -> Result<()> {
        if let Err(err) = self.transport.answer_callback(callback_id).await {
            tracing::warn!(%err, "callback acknowledgement failed");
        }
        let Some(pending) = self.pending.take(message_id).await else {
            self.transport
                .send_message(
                    chat_id,
                    "⚠️ Эта операция уже обработана или устарела.",
                    Some(message_id),
                    false,
                )
                .await?;
            return Ok(());
        };

        match self.commit(pending.record.to_ops(&self.config.sheets)?).await {
            Ok(()) => {
                // Re-sending the same text without buttons freezes the
                // confirmation in its final state.
                self.transport
                    .edit_message(chat_id, message_id, &pending.text)
                    .await?;
            }
            Err(err) => {
                tracing::error!(%err, chat_id, "commit failed");
                self.transport
                    .send_message(chat_id, &user_message(&err), Some(message_id), false)
                    .await?;
                // The write is lost; a fresh stage would need a new voice
                // note anyway, so the entry is not restored.
            }
        }
        Ok(())
    }

    async fn handle_reject(
        &self,
        chat_id: i64,
        message_id: i64,
        callback_id: &str,
    ) -> Result<()> {
        if let Err(err) = self.transport.answer_callback(callback_id).await {
            tracing::warn!(%err, "callback acknowledgement failed");
        }
        let taken = self.pending.take(message_id).await;
        if taken.is_none() {
            tracing::debug!(message_id, "reject for an already-resolved confirmation");
        }
        self.transport
            .edit_message(chat_id, message_id, "❌ Операция отменена")
            .await?;
        Ok(())
    }

    async fn handle_reply(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        ancestors: &[MessageSummary],
    ) -> Result<()> {
        match self.reply_agent.handle(ancestors, text).await {
            Ok(message) => {
                self.transport
                    .send_message(chat_id, &message, Some(message_id), false)
                    .await?;
            }
            Err(err) => {
                tracing::warn!(%err, chat_id, "reply handling failed");
                self.transport
                    .send_message(chat_id, &user_message(&err), Some(message_id), false)
                    .await?;
            }
        }
        Ok(())
    }

    async fn commit(&self, ops: Vec<crate::ledger::BatchOp>) -> Result<()> {
        let timeout = Duration::from_secs(self.config.behavior.store_timeout_secs);
        match tokio::time::timeout(timeout, self.store.batch(ops)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Store("ledger write timed out".to_owned())),
        }
    }
}

/// Recognition hint fed to the transcriber: the valid names bias the
/// model toward the household's own vocabulary.
fn transcription_hint(snapshot: &CatalogSnapshot) -> String {
    let mut parts = Vec::new();
    if !snapshot.expense_categories.is_empty() || !snapshot.income_categories.is_empty() {
        let categories: Vec<&str> = snapshot
            .expense_categories
            .iter()
            .chain(snapshot.income_categories.iter())
            .map(String::as_str)
            .collect();
        parts.push(format!("Категории: {}.", categories.join(", ")));
    }
    if !snapshot.accounts.is_empty() {
        parts.push(format!("Счета: {}.", snapshot.accounts.join(", ")));
    }
    parts.join(" ")
}

/// Translate an internal error into the message shown in chat.
fn user_message(err: &LedgerError) -> String {
    match err {
        LedgerError::Transcription(_) => {
            "⚠️ Не удалось распознать голосовое сообщение. Попробуйте ещё раз.".to_owned()
        }
        LedgerError::Oracle(_) => {
            "⚠️ Сервис распознавания временно недоступен. Попробуйте позже.".to_owned()
        }
        LedgerError::Store(_) => {
            "⚠️ Не удалось записать операцию в таблицу. Попробуйте позже.".to_owned()
        }
        LedgerError::Resolution(_) => {
            "⚠️ Не нашёл операцию, к которой относится это сообщение.".to_owned()
        }
        LedgerError::Validation(message) => format!("⚠️ {message}"),
        _ => "⚠️ Что-то пошло не так. Попробуйте ещё раз.".to_owned(),
    }
}
