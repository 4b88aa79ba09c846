//! Income agent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::CatalogSnapshot;
use crate::error::{LedgerError, Result};
use crate::ledger::rows::today_serial;
use crate::ledger::{LedgerRecord, SheetKind};
use crate::oracle::{ExtractedFields, ExtractionOracle, OperationKind};

use super::{clarify_message, format_amount, AgentReply, OperationAgent};

pub struct IncomeAgent {
    oracle: Arc<dyn ExtractionOracle>,
}

impl IncomeAgent {
    pub fn new(oracle: Arc<dyn ExtractionOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl OperationAgent for IncomeAgent {
    fn kind(&self) -> OperationKind {
        OperationKind::Income
    }

    async fn handle(&self, span: &str, catalog: &CatalogSnapshot) -> Result<AgentReply> {
        let extraction = self
            .oracle
            .extract_fields(OperationKind::Income, span, catalog)
            .await?;
        let ExtractedFields::Income {
            category,
            account,
            amount,
            status,
            comment,
        } = extraction.fields
        else {
            return Err(LedgerError::Oracle(
                "income extraction returned another kind".to_owned(),
            ));
        };

        let mut problems = Vec::new();
        if amount <= 0.0 {
            problems.push("сумма операции".to_owned());
        }
        let category = match catalog.canonical_income_category(&category) {
            Some(canonical) => canonical,
            None => {
                problems.push(format!("категория дохода (распознано: {category:?})"));
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
            "✅ Доход добавлен:\n💰 Сумма: {}\n📂 Категория: {}\n💳 Счёт: {}\n📝 Комментарий: {}\n📊 Статус: {}",
            format_amount(amount),
            category,
            account,
            comment,
            status.as_str()
        );
        let record = LedgerRecord {
            sheet: SheetKind::Incomes,
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
