//! Intent orchestrator.
//!
//! Splits one transcript into transaction intents and routes each to its
//! kind's agent. Intents fail independently: a bad kind label or a failed
//! extraction produces a failure message for that intent only and never
//! aborts its siblings. When an utterance carries several operations, each
//! outgoing message is numbered `i/n`.

use std::sync::Arc;

use crate::catalog::CatalogSnapshot;
use crate::error::Result;
use crate::oracle::{ExtractionOracle, OperationKind};

use super::expense::ExpenseAgent;
use super::income::IncomeAgent;
use super::transfer::{AdjustmentAgent, TransferAgent};
use super::{AgentReply, OperationAgent};

/// One processed intent: the transcript span it came from and what the
/// agent made of it.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentOutcome {
    pub span: String,
    pub reply: AgentReply,
}

pub struct Orchestrator {
    oracle: Arc<dyn ExtractionOracle>,
    agents: Vec<Box<dyn OperationAgent>>,
}

impl Orchestrator {
    pub fn new(oracle: Arc<dyn ExtractionOracle>) -> Self {
        let agents: Vec<Box<dyn OperationAgent>> = vec![
            Box::new(ExpenseAgent::new(Arc::clone(&oracle))),
            Box::new(IncomeAgent::new(Arc::clone(&oracle))),
            Box::new(TransferAgent::new(Arc::clone(&oracle))),
            Box::new(AdjustmentAgent::new(Arc::clone(&oracle))),
        ];
        Self { oracle, agents }
    }

    fn agent_for(&self, kind: OperationKind) -> Option<&dyn OperationAgent> {
        self.agents
            .iter()
            .map(|agent| agent.as_ref())
            .find(|agent| agent.kind() == kind)
    }

    /// Process one transcript into per-intent outcomes, in utterance order.
    pub async fn process(
        &self,
        transcript: &str,
        catalog: &CatalogSnapshot,
    ) -> Result<Vec<IntentOutcome>> {
        let intents = self.oracle.split_intents(transcript, catalog).await?;
        let (relevant, irrelevant): (Vec<_>, Vec<_>) =
            intents.into_iter().partition(|intent| intent.relevant);

        if relevant.is_empty() {
            let note = irrelevant
                .iter()
                .map(|intent| intent.note.trim())
                .find(|note| !note.is_empty())
                .unwrap_or("Не удалось распознать финансовую операцию. Попробуйте ещё раз.");
            return Ok(vec![IntentOutcome {
                span: transcript.to_owned(),
                reply: AgentReply::Failed {
                    message: note.to_owned(),
                },
            }]);
        }

        let total = relevant.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, intent) in relevant.into_iter().enumerate() {
            let mut reply = match OperationKind::parse(&intent.kind_label) {
                Ok(kind) => match self.agent_for(kind) {
                    Some(agent) => match agent.handle(&intent.span, catalog).await {
                        Ok(reply) => reply,
                        Err(err) => {
                            tracing::warn!(%err, span = %intent.span, "intent processing failed");
                            AgentReply::Failed {
                                message: format!("⚠️ Не удалось обработать: {}", intent.span),
                            }
                        }
                    },
                    None => AgentReply::Failed {
                        message: format!("⚠️ Не удалось обработать: {}", intent.span),
                    },
                },
                Err(err) => {
                    tracing::warn!(%err, span = %intent.span, "unroutable intent");
                    AgentReply::Failed {
                        message: format!(
                            "⚠️ Не удалось определить тип операции: {}",
                            intent.span
                        ),
                    }
                }
            };
            if total > 1 {
                prefix_position(&mut reply, index + 1, total);
            }
            outcomes.push(IntentOutcome {
                span: intent.span,
                reply,
            });
        }
        Ok(outcomes)
    }
}

fn prefix_position(reply: &mut AgentReply, position: usize, total: usize) {
    let message = match reply {
        AgentReply::Recorded { message, .. }
        | AgentReply::Clarify { message }
        | AgentReply::Failed { message } => message,
    };
    *message = format!("{position}/{total} {message}");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::agents::tests_support::catalog;
    use crate::error::{LedgerError, Result};
    use crate::ledger::{LocatedRow, SheetKind};
    use crate::oracle::{
        EditCommand, ExtractedFields, Extraction, OperationKind, TransactionIntent, TxStatus,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct ScriptedOracle {
        intents: Vec<TransactionIntent>,
        fields: HashMap<&'static str, ExtractedFields>,
    }

    #[async_trait]
    impl ExtractionOracle for ScriptedOracle {
        async fn split_intents(
            &self,
            _transcript: &str,
            _catalog: &crate::catalog::CatalogSnapshot,
        ) -> Result<Vec<TransactionIntent>> {
            Ok(self.intents.clone())
        }

        async fn extract_fields(
            &self,
            _kind: OperationKind,
            span: &str,
            _catalog: &crate::catalog::CatalogSnapshot,
        ) -> Result<Extraction> {
            self.fields
                .get(span)
                .cloned()
                .map(|fields| Extraction {
                    fields,
                    note: String::new(),
                })
                .ok_or_else(|| LedgerError::Oracle("no script for span".to_owned()))
        }

        async fn interpret_edit(
            &self,
            _row: &LocatedRow,
            _chain_tail: &[String],
            _instruction: &str,
        ) -> Result<EditCommand> {
            Err(LedgerError::Oracle("not used".to_owned()))
        }
    }

    fn intent(relevant: bool, kind: &str, span: &str, note: &str) -> TransactionIntent {
        TransactionIntent {
            relevant,
            kind_label: kind.to_owned(),
            span: span.to_owned(),
            note: note.to_owned(),
        }
    }

    fn expense(amount: f64) -> ExtractedFields {
        ExtractedFields::Expense {
            category: "Продукты".to_owned(),
            account: "Наличные".to_owned(),
            amount,
            status: TxStatus::Committed,
            comment: String::new(),
        }
    }

    #[tokio::test]
    async fn single_intent_gets_no_position_prefix() {
        let oracle = Arc::new(ScriptedOracle {
            intents: vec![intent(true, "Расходы", "500 на продукты", "")],
            fields: HashMap::from([("500 на продукты", expense(500.0))]),
        });
        let outcomes = Orchestrator::new(oracle)
            .process("потратил 500 на продукты", &catalog())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        let AgentReply::Recorded { ref message, ref record } = outcomes[0].reply else {
            panic!("expected recorded");
        };
        assert!(message.starts_with("✅ Расход добавлен:"));
        assert_eq!(record.sheet, SheetKind::Expenses);
    }

    #[tokio::test]
    async fn multiple_intents_are_numbered_in_order() {
        let oracle = Arc::new(ScriptedOracle {
            intents: vec![
                intent(true, "Переводы", "перевёл 1000 на карту", ""),
                intent(true, "Расходы", "500 на продукты", ""),
            ],
            fields: HashMap::from([
                (
                    "перевёл 1000 на карту",
                    ExtractedFields::Transfer {
                        write_off_account: "Наличные".to_owned(),
                        replenishment_account: "Карта".to_owned(),
                        write_off_amount: 1000.0,
                        replenishment_amount: 0.0,
                        status: TxStatus::Committed,
                        comment: String::new(),
                    },
                ),
                ("500 на продукты", expense(500.0)),
            ]),
        });
        let outcomes = Orchestrator::new(oracle)
            .process("перевёл 1000 на карту и купил продуктов на 500", &catalog())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        let AgentReply::Recorded { ref message, .. } = outcomes[0].reply else {
            panic!("expected recorded");
        };
        assert!(message.starts_with("1/2 ✅ Перевод добавлен:"));
        let AgentReply::Recorded { ref message, .. } = outcomes[1].reply else {
            panic!("expected recorded");
        };
        assert!(message.starts_with("2/2 ✅ Расход добавлен:"));
    }

    #[tokio::test]
    async fn irrelevant_utterance_echoes_the_oracle_note() {
        let oracle = Arc::new(ScriptedOracle {
            intents: vec![intent(false, "None", "какая сегодня погода", "Я записываю только финансовые операции.")],
            fields: HashMap::new(),
        });
        let outcomes = Orchestrator::new(oracle)
            .process("какая сегодня погода", &catalog())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        let AgentReply::Failed { ref message } = outcomes[0].reply else {
            panic!("expected failure");
        };
        assert_eq!(message, "Я записываю только финансовые операции.");
    }

    #[tokio::test]
    async fn bad_kind_label_fails_only_its_own_intent() {
        let oracle = Arc::new(ScriptedOracle {
            intents: vec![
                intent(true, "Кредиты", "взял кредит", ""),
                intent(true, "Расходы", "500 на продукты", ""),
            ],
            fields: HashMap::from([("500 на продукты", expense(500.0))]),
        });
        let outcomes = Orchestrator::new(oracle)
            .process("взял кредит и купил продуктов", &catalog())
            .await
            .unwrap();
        assert!(matches!(outcomes[0].reply, AgentReply::Failed { .. }));
        assert!(matches!(outcomes[1].reply, AgentReply::Recorded { .. }));
    }
}
