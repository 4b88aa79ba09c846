//! Reply agent: edit and delete instructions against committed rows.
//!
//! A text reply under a confirmation message is a free-text instruction.
//! The chain of ancestor messages is walked nearest-first to find which
//! committed row the user means: an invisible back-reference embedded in a
//! bot message wins over the message's own id, and update/delete
//! confirmations never resolve by their own id (their back-reference
//! points at the original row instead).

use std::sync::Arc;

use crate::config::{SheetLayout, SheetsConfig};
use crate::error::{LedgerError, Result};
use crate::ledger::{find_by_tag, BatchOp, CellValue, LedgerStore, LocatedRow};
use crate::oracle::{EditCommand, EditField, EditValue, ExtractionOracle};
use crate::telegram::MessageSummary;

/// Zero-width-space marker embedded in bot messages. Invisible in chat
/// clients but survives copy/forward, so follow-up edits keep resolving
/// the same row.
const BACKREF_PREFIX: &str = "\u{200B}[op:";

/// Messages that must not resolve by their own id.
const NON_ANCHOR_PREFIXES: [&str; 2] = ["✅ Операция обновлена", "✅ Операция удалена"];

/// Render a back-reference for the given tag.
pub fn backref(tag: i64) -> String {
    format!("{BACKREF_PREFIX}{tag}]")
}

/// Extract a back-reference from message text, if present.
pub fn parse_backref(text: &str) -> Option<i64> {
    let start = text.find(BACKREF_PREFIX)? + BACKREF_PREFIX.len();
    let rest = &text[start..];
    let end = rest.find(']')?;
    rest[..end].parse().ok()
}

pub struct ReplyAgent {
    oracle: Arc<dyn ExtractionOracle>,
    store: Arc<dyn LedgerStore>,
    sheets: SheetsConfig,
    /// How many trailing chain messages accompany the instruction.
    context_messages: usize,
}

impl ReplyAgent {
    pub fn new(
        oracle: Arc<dyn ExtractionOracle>,
        store: Arc<dyn LedgerStore>,
        sheets: SheetsConfig,
        context_messages: usize,
    ) -> Self {
        Self {
            oracle,
            store,
            sheets,
            context_messages,
        }
    }

    /// Candidate tags in resolution priority order, deduplicated.
    fn candidate_tags(ancestors: &[MessageSummary]) -> Vec<i64> {
        let mut tags = Vec::new();
        for message in ancestors.iter().filter(|m| m.is_bot) {
            let candidate = match parse_backref(&message.text) {
                Some(tag) => Some(tag),
                None if NON_ANCHOR_PREFIXES
                    .iter()
                    .any(|prefix| message.text.starts_with(prefix)) =>
                {
                    None
                }
                None => Some(message.id),
            };
            if let Some(tag) = candidate {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags
    }

    async fn locate(&self, ancestors: &[MessageSummary]) -> Result<(i64, LocatedRow)> {
        for tag in Self::candidate_tags(ancestors) {
            if let Some(row) = find_by_tag(self.store.as_ref(), &self.sheets, tag).await? {
                return Ok((tag, row));
            }
        }
        Err(LedgerError::Resolution(
            "no committed operation found in the reply chain".to_owned(),
        ))
    }

    /// Handle one edit/delete instruction. Returns the message to show
    /// the user.
    pub async fn handle(&self, ancestors: &[MessageSummary], instruction: &str) -> Result<String> {
        let (tag, row) = self.locate(ancestors).await?;
        tracing::debug!(tag, sheet = ?row.sheet, row = row.row_number, "edit target located");

        // Ancestors arrive nearest-first; the oracle reads the history in
        // chronological order.
        let mut chain_tail: Vec<String> = ancestors
            .iter()
            .take(self.context_messages)
            .map(|m| m.text.clone())
            .collect();
        chain_tail.reverse();
        let command = self
            .oracle
            .interpret_edit(&row, &chain_tail, instruction)
            .await?;

        match command {
            EditCommand::Delete => {
                self.store
                    .batch(vec![BatchOp::DeleteRow {
                        sheet: row.sheet,
                        row: row.row_number,
                    }])
                    .await?;
                Ok(format!("✅ Операция удалена\n📝 Ваш запрос: {instruction}"))
            }
            EditCommand::Edit { changes } => {
                let layout = row.sheet.layout(&self.sheets);
                let mut ops = Vec::new();
                let mut lines = Vec::new();
                for change in &changes {
                    let Some(column) = column_for(change.field, layout) else {
                        tracing::warn!(field = ?change.field, sheet = ?row.sheet,
                            "edit change has no column on this sheet");
                        continue;
                    };
                    let value = match &change.value {
                        EditValue::Number(n) => CellValue::Number(*n),
                        EditValue::Text(s) => CellValue::Text(s.clone()),
                    };
                    ops.push(BatchOp::UpdateCells {
                        sheet: row.sheet,
                        row: row.row_number - 1,
                        column,
                        values: vec![value],
                    });
                    lines.push(format!("{}: {}", change.field.label(), change.value));
                }
                if ops.is_empty() {
                    return Ok(
                        "🤔 Не понял, что нужно изменить. Уточните, пожалуйста.".to_owned()
                    );
                }
                self.store.batch(ops).await?;
                Ok(format!(
                    "✅ Операция обновлена:\n{}\n📝 Ваш запрос: {instruction}\n{}",
                    lines.join("\n"),
                    backref(tag)
                ))
            }
        }
    }
}

fn column_for(field: EditField, layout: &SheetLayout) -> Option<u32> {
    match field {
        EditField::Amount => Some(layout.amount_column),
        EditField::Category => Some(layout.category_column),
        EditField::Account => Some(layout.account_column),
        EditField::Comment => Some(layout.comment_column),
        EditField::Status => Some(layout.status_column),
        EditField::ReplenishmentAmount => layout.replenishment_amount_column,
        EditField::ReplenishmentAccount => layout.replenishment_account_column,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::catalog::CatalogSnapshot;
    use crate::oracle::{
        EditChange, ExtractionOracle, Extraction, OperationKind, TransactionIntent,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedEditOracle {
        command: EditCommand,
    }

    #[async_trait]
    impl ExtractionOracle for ScriptedEditOracle {
        async fn split_intents(
            &self,
            _transcript: &str,
            _catalog: &CatalogSnapshot,
        ) -> Result<Vec<TransactionIntent>> {
            Err(LedgerError::Oracle("not used".to_owned()))
        }

        async fn extract_fields(
            &self,
            _kind: OperationKind,
            _span: &str,
            _catalog: &CatalogSnapshot,
        ) -> Result<Extraction> {
            Err(LedgerError::Oracle("not used".to_owned()))
        }

        async fn interpret_edit(
            &self,
            _row: &LocatedRow,
            _chain_tail: &[String],
            _instruction: &str,
        ) -> Result<EditCommand> {
            Ok(self.command.clone())
        }
    }

    struct RecordingStore {
        ranges: HashMap<String, Vec<Vec<String>>>,
        batches: Mutex<Vec<Vec<BatchOp>>>,
    }

    impl RecordingStore {
        fn with_expense_row(tag: i64, row_number: u32) -> Self {
            let mut ranges = HashMap::new();
            let offset = row_number - 7;
            let mut scan = vec![vec![String::new()]; offset as usize];
            scan.push(vec![format!("{tag}.0")]);
            ranges.insert("↙️Расходы!L7:L2000".to_owned(), scan);
            ranges.insert(
                format!("↙️Расходы!A{row_number}:L{row_number}"),
                vec![vec![
                    "45000".to_owned(),
                    String::new(),
                    "Продукты".to_owned(),
                    "Наличные".to_owned(),
                    "500".to_owned(),
                ]],
            );
            Self {
                ranges,
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for RecordingStore {
        async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
            Ok(self.ranges.get(range).cloned().unwrap_or_default())
        }

        async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
            self.batches.lock().unwrap().push(ops);
            Ok(())
        }
    }

    fn bot_msg(id: i64, text: &str) -> MessageSummary {
        MessageSummary {
            id,
            is_bot: true,
            text: text.to_owned(),
        }
    }

    fn agent(
        command: EditCommand,
        store: Arc<RecordingStore>,
    ) -> ReplyAgent {
        ReplyAgent::new(
            Arc::new(ScriptedEditOracle { command }),
            store,
            SheetsConfig::default(),
            5,
        )
    }

    #[test]
    fn backref_round_trips_and_survives_surrounding_text() {
        let text = format!("✅ Операция обновлена:\n💰 Сумма: 600\n{}", backref(345));
        assert_eq!(parse_backref(&text), Some(345));
        assert_eq!(parse_backref("обычный текст"), None);
    }

    #[test]
    fn candidate_priority_backref_then_message_id() {
        let ancestors = vec![
            bot_msg(500, &format!("✅ Операция обновлена:\n{}", backref(345))),
            bot_msg(345, "✅ Расход добавлен:"),
            MessageSummary {
                id: 344,
                is_bot: false,
                text: "голосовое".to_owned(),
            },
        ];
        assert_eq!(ReplyAgent::candidate_tags(&ancestors), vec![345]);
    }

    #[test]
    fn update_confirmations_never_resolve_by_their_own_id() {
        let ancestors = vec![bot_msg(500, "✅ Операция удалена\n📝 Ваш запрос: удали")];
        assert!(ReplyAgent::candidate_tags(&ancestors).is_empty());
    }

    #[tokio::test]
    async fn amount_edit_updates_the_located_cell() {
        let store = Arc::new(RecordingStore::with_expense_row(345, 9));
        let agent = agent(
            EditCommand::Edit {
                changes: vec![EditChange {
                    field: EditField::Amount,
                    value: EditValue::Number(600.0),
                }],
            },
            Arc::clone(&store),
        );
        let ancestors = vec![bot_msg(345, "✅ Расход добавлен:")];
        let message = agent.handle(&ancestors, "замени сумму на 600").await.unwrap();

        assert!(message.contains("✅ Операция обновлена:"));
        assert!(message.contains("💰 Сумма: 600"));
        assert!(message.contains(&backref(345)));

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![BatchOp::UpdateCells {
                sheet: crate::ledger::SheetKind::Expenses,
                row: 8,
                column: 4,
                values: vec![CellValue::Number(600.0)],
            }]
        );
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let store = Arc::new(RecordingStore::with_expense_row(345, 9));
        let agent = agent(EditCommand::Delete, Arc::clone(&store));
        let ancestors = vec![bot_msg(345, "✅ Расход добавлен:")];
        let message = agent.handle(&ancestors, "удали эту операцию").await.unwrap();

        assert!(message.starts_with("✅ Операция удалена"));
        let batches = store.batches.lock().unwrap();
        assert_eq!(
            batches[0],
            vec![BatchOp::DeleteRow {
                sheet: crate::ledger::SheetKind::Expenses,
                row: 9,
            }]
        );
    }

    struct ContextCapturingOracle {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExtractionOracle for ContextCapturingOracle {
        async fn split_intents(
            &self,
            _transcript: &str,
            _catalog: &CatalogSnapshot,
        ) -> Result<Vec<TransactionIntent>> {
            Err(LedgerError::Oracle("not used".to_owned()))
        }

        async fn extract_fields(
            &self,
            _kind: OperationKind,
            _span: &str,
            _catalog: &CatalogSnapshot,
        ) -> Result<Extraction> {
            Err(LedgerError::Oracle("not used".to_owned()))
        }

        async fn interpret_edit(
            &self,
            _row: &LocatedRow,
            chain_tail: &[String],
            _instruction: &str,
        ) -> Result<EditCommand> {
            *self.seen.lock().unwrap() = chain_tail.to_vec();
            Ok(EditCommand::Delete)
        }
    }

    #[tokio::test]
    async fn edit_context_is_passed_in_chronological_order() {
        let store = Arc::new(RecordingStore::with_expense_row(345, 9));
        let oracle = Arc::new(ContextCapturingOracle {
            seen: Mutex::new(Vec::new()),
        });
        let agent = ReplyAgent::new(
            Arc::clone(&oracle) as Arc<dyn ExtractionOracle>,
            store,
            SheetsConfig::default(),
            5,
        );
        // Nearest parent first, as the transport materializes them.
        let ancestors = vec![
            bot_msg(400, "✅ Операция обновлена:\n💰 Сумма: 600"),
            bot_msg(345, "✅ Расход добавлен:"),
            MessageSummary {
                id: 344,
                is_bot: false,
                text: "голосовое".to_owned(),
            },
        ];
        agent.handle(&ancestors, "удали").await.unwrap();

        let seen = oracle.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], "голосовое");
        assert!(seen[2].starts_with("✅ Операция обновлена"));
    }

    #[tokio::test]
    async fn unresolvable_chain_is_a_resolution_error() {
        let store = Arc::new(RecordingStore::with_expense_row(345, 9));
        let agent = agent(EditCommand::Delete, store);
        // The only bot message's id has no matching tag anywhere.
        let ancestors = vec![bot_msg(999, "✅ Расход добавлен:")];
        let err = agent.handle(&ancestors, "удали").await.unwrap_err();
        assert!(matches!(err, LedgerError::Resolution(_)));
    }

    #[tokio::test]
    async fn empty_change_set_asks_for_clarification_without_writing() {
        let store = Arc::new(RecordingStore::with_expense_row(345, 9));
        let agent = agent(EditCommand::Edit { changes: vec![] }, Arc::clone(&store));
        let ancestors = vec![bot_msg(345, "✅ Расход добавлен:")];
        let message = agent.handle(&ancestors, "ну поменяй там").await.unwrap();
        assert!(message.starts_with("🤔"));
        assert!(store.batches.lock().unwrap().is_empty());
    }
}
