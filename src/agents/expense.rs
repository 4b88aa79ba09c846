//! Expense agent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::CatalogSnapshot;
use crate::error::{LedgerError, Result};
use crate::ledger::rows::today_serial;
use crate::ledger::{LedgerRecord, SheetKind};
use crate::oracle::{ExtractedFields, ExtractionOracle, OperationKind};

use super::{clarify_message, format_amount, AgentReply, OperationAgent};

pub struct ExpenseAgent {
    oracle: Arc<dyn ExtractionOracle>,
}

impl ExpenseAgent {
    pub fn new(oracle: Arc<dyn ExtractionOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl OperationAgent for ExpenseAgent {
    fn kind(&self) -> OperationKind {
        OperationKind::Expense
    }

    async fn handle(&self, span: &str, catalog: &CatalogSnapshot) -> Result<AgentReply> {
        let extraction = self
            .oracle
            .extract_fields(OperationKind::Expense, span, catalog)
            .await?;
        let ExtractedFields::Expense {
            category,
            account,
            amount,
            status,
            comment,
        } = extraction.fields
        else {
            return Err(LedgerError::Oracle(
                "expense extraction returned another kind".to_owned(),
            ));
        };

        let mut problems = Vec::new();
        if amount <= 0.0 {
            problems.push("сумма операции".to_owned());
        }
        let category = match catalog.canonical_expense_category(&category) {
            Some(canonical) => canonical,
            None => {
                problems.push(format!("категория расхода (распознано: {category:?})"));
                category
            }
        };
        let account = match catalog.canonical_account(&account) {
            Some(canonical) => canonical,
            None => {
                problems.push(format!("счёт (распознано: {account:?})"));
                account
            }
        };
        if !problems.is_empty() {
            return Ok(AgentReply::Clarify {
                message: clarify_message(&problems),
            });
        }

        let message = format!(
            "✅ Расход добавлен:\n💰 Сумма: {}\n📂 Категория: {}\n💳 Счёт: {}\n📝 Комментарий: {}\n📊 Статус: {}",
            format_amount(amount),
            category,
            account,
            comment,
            status.as_str()
        );
        let record = LedgerRecord {
            sheet: SheetKind::Expenses,
            date_serial: today_serial(),
            category: Some(category),
            transfer_marker: None,
            account,
            replenishment_account: None,
            amount,
            replenishment_amount: None,
            status: status.as_str().to_owned(),
            comment,
            tag: 0,
        };
        Ok(AgentReply::Recorded { record, message })
    }
}
