//! Transfer and adjustment agents.
//!
//! Both write to the transfers sheet. A transfer moves money between two
//! different accounts; an adjustment corrects one account's balance and is
//! stored as a marker row with a zero write-off amount.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::CatalogSnapshot;
use crate::error::{LedgerError, Result};
use crate::ledger::rows::{today_serial, TransferMarker};
use crate::ledger::{LedgerRecord, SheetKind};
use crate::oracle::{ExtractedFields, ExtractionOracle, OperationKind};

use super::{clarify_message, format_amount, AgentReply, OperationAgent};

pub struct TransferAgent {
    oracle: Arc<dyn ExtractionOracle>,
}

impl TransferAgent {
    pub fn new(oracle: Arc<dyn ExtractionOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl OperationAgent for TransferAgent {
    fn kind(&self) -> OperationKind {
        OperationKind::Transfer
    }

    async fn handle(&self, span: &str, catalog: &CatalogSnapshot) -> Result<AgentReply> {
        let extraction = self
            .oracle
            .extract_fields(OperationKind::Transfer, span, catalog)
            .await?;
        let ExtractedFields::Transfer {
            write_off_account,
            replenishment_account,
            write_off_amount,
            replenishment_amount,
            status,
            comment,
        } = extraction.fields
        else {
            return Err(LedgerError::Oracle(
                "transfer extraction returned another kind".to_owned(),
            ));
        };

        let mut problems = Vec::new();
        if write_off_amount <= 0.0 {
            problems.push("сумма списания".to_owned());
        }
        let write_off_account = match catalog.canonical_account(&write_off_account) {
            Some(canonical) => canonical,
            None => {
                problems.push(format!(
                    "счёт списания (распознано: {write_off_account:?})"
                ));
                write_off_account
            }
        };
        let replenishment_account = match catalog.canonical_account(&replenishment_account) {
            Some(canonical) => canonical,
            None => {
                problems.push(format!(
                    "счёт зачисления (распознано: {replenishment_account:?})"
                ));
                replenishment_account
            }
        };
        if problems.is_empty() && write_off_account == replenishment_account {
            problems.push("счета списания и зачисления должны различаться".to_owned());
        }
        if !problems.is_empty() {
            return Ok(AgentReply::Clarify {
                message: clarify_message(&problems),
            });
        }

        // A missing replenishment amount means same-currency transfer.
        let replenishment_amount = if replenishment_amount > 0.0 {
            replenishment_amount
        } else {
            write_off_amount
        };

        let message = format!(
            "✅ Перевод добавлен:\n💰 Сумма списания: {}\n💳 Счёт списания: {}\n💰 Сумма зачисления: {}\n💳 Счёт зачисления: {}\n📝 Комментарий: {}\n📊 Статус: {}",
            format_amount(write_off_amount),
            write_off_account,
            format_amount(replenishment_amount),
            replenishment_account,
            comment,
            status.as_str()
        );
        let record = LedgerRecord {
            sheet: SheetKind::Transfers,
            date_serial: today_serial(),
            category: None,
            transfer_marker: Some(TransferMarker::Transfer),
            account: write_off_account,
            replenishment_account: Some(replenishment_account),
            amount: write_off_amount,
            replenishment_amount: Some(replenishment_amount),
            status: status.as_str().to_owned(),
            comment,
            tag: 0,
        };
        Ok(AgentReply::Recorded { record, message })
    }
}

pub struct AdjustmentAgent {
    oracle: Arc<dyn ExtractionOracle>,
}

impl AdjustmentAgent {
    pub fn new(oracle: Arc<dyn ExtractionOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl OperationAgent for AdjustmentAgent {
    fn kind(&self) -> OperationKind {
        OperationKind::Adjustment
    }

    async fn handle(&self, span: &str, catalog: &CatalogSnapshot) -> Result<AgentReply> {
        let extraction = self
            .oracle
            .extract_fields(OperationKind::Adjustment, span, catalog)
            .await?;
        let ExtractedFields::Adjustment {
            account,
            amount,
            status,
            comment,
        } = extraction.fields
        else {
            return Err(LedgerError::Oracle(
                "adjustment extraction returned another kind".to_owned(),
            ));
        };

        let mut problems = Vec::new();
        if amount == 0.0 {
            problems.push("сумма корректировки".to_owned());
        }
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
            "✅ Корректировка добавлена:\n💰 Сумма: {}\n💳 Счёт: {}\n📝 Комментарий: {}\n📊 Статус: {}",
            format_amount(amount),
            account,
            comment,
            status.as_str()
        );
        // Adjustments are one-sided: the write-off side stays zero and the
        // signed correction lands in the replenishment amount.
        let record = LedgerRecord {
            sheet: SheetKind::Transfers,
            date_serial: today_serial(),
            category: None,
            transfer_marker: Some(TransferMarker::Adjustment),
            account: account.clone(),
            replenishment_account: Some(account),
            amount: 0.0,
            replenishment_amount: Some(amount),
            status: status.as_str().to_owned(),
            comment,
            tag: 0,
        };
        Ok(AgentReply::Recorded { record, message })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::agents::tests_support::{catalog, oracle_returning};
    use crate::oracle::TxStatus;

    fn transfer_fields(from: &str, to: &str, amount: f64, replenishment: f64) -> ExtractedFields {
        ExtractedFields::Transfer {
            write_off_account: from.to_owned(),
            replenishment_account: to.to_owned(),
            write_off_amount: amount,
            replenishment_amount: replenishment,
            status: TxStatus::Committed,
            comment: String::new(),
        }
    }

    #[tokio::test]
    async fn transfer_between_known_accounts_is_recorded() {
        let agent = TransferAgent::new(oracle_returning(transfer_fields(
            "наличные",
            "карта",
            1000.0,
            0.0,
        )));
        let reply = agent
            .handle("перевёл 1000 с наличных на карту", &catalog())
            .await
            .unwrap();
        let AgentReply::Recorded { record, message } = reply else {
            panic!("expected recorded");
        };
        assert_eq!(record.sheet, SheetKind::Transfers);
        assert_eq!(record.transfer_marker, Some(TransferMarker::Transfer));
        assert_eq!(record.account, "Наличные");
        assert_eq!(record.replenishment_account.as_deref(), Some("Карта"));
        // Same-currency transfer mirrors the write-off amount.
        assert_eq!(record.replenishment_amount, Some(1000.0));
        assert!(message.contains("💰 Сумма зачисления: 1000"));
    }

    #[tokio::test]
    async fn transfer_to_the_same_account_is_rejected() {
        let agent = TransferAgent::new(oracle_returning(transfer_fields(
            "Карта", "карта", 1000.0, 0.0,
        )));
        let reply = agent.handle("перевод", &catalog()).await.unwrap();
        let AgentReply::Clarify { message } = reply else {
            panic!("expected clarification");
        };
        assert!(message.contains("должны различаться"));
    }

    #[tokio::test]
    async fn adjustment_is_one_sided_with_signed_amount() {
        let agent = AdjustmentAgent::new(oracle_returning(ExtractedFields::Adjustment {
            account: "Карта".to_owned(),
            amount: -250.0,
            status: TxStatus::Committed,
            comment: "комиссия".to_owned(),
        }));
        let reply = agent
            .handle("спиши с карты 250 комиссии", &catalog())
            .await
            .unwrap();
        let AgentReply::Recorded { record, .. } = reply else {
            panic!("expected recorded");
        };
        assert_eq!(record.transfer_marker, Some(TransferMarker::Adjustment));
        assert_eq!(record.amount, 0.0);
        assert_eq!(record.replenishment_amount, Some(-250.0));
        assert_eq!(record.replenishment_account.as_deref(), Some("Карта"));
    }

    #[tokio::test]
    async fn zero_adjustment_asks_for_clarification() {
        let agent = AdjustmentAgent::new(oracle_returning(ExtractedFields::Adjustment {
            account: "Карта".to_owned(),
            amount: 0.0,
            status: TxStatus::Committed,
            comment: String::new(),
        }));
        let reply = agent.handle("поправь карту", &catalog()).await.unwrap();
        assert!(matches!(reply, AgentReply::Clarify { .. }));
    }
}
