//! Pending write staging.
//!
//! A validated operation is staged here when its confirmation message goes
//! out, keyed by that message's identifier, and consumed when the user
//! confirms or rejects (or immediately, in auto-commit mode). Entries that
//! are never resolved live for the process lifetime; there is no reaper.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::ledger::LedgerRecord;

/// A staged, not-yet-persisted transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub chat_id: i64,
    /// Fully built row, tag already set to the confirmation message id.
    pub record: LedgerRecord,
    /// Transcript span the operation came from.
    pub span: String,
    /// Confirmation message text, re-sent when the buttons are resolved.
    pub text: String,
    /// Whether the write was committed without waiting for the button.
    pub auto_committed: bool,
}

/// Process-wide staging area, passed explicitly to whoever needs it.
#[derive(Default)]
pub struct PendingWrites {
    inner: Mutex<HashMap<i64, PendingWrite>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write under a confirmation message id. Racing stages on the
    /// same key are last-write-wins; the displaced entry is returned so
    /// the caller can log it.
    pub async fn stage(&self, message_id: i64, write: PendingWrite) -> Option<PendingWrite> {
        let displaced = self.inner.lock().await.insert(message_id, write);
        if displaced.is_some() {
            tracing::warn!(message_id, "pending write displaced by a newer stage");
        }
        displaced
    }

    /// Remove and return the staged write for a confirmation message.
    pub async fn take(&self, message_id: i64) -> Option<PendingWrite> {
        self.inner.lock().await.remove(&message_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::ledger::rows::LedgerRecord;
    use crate::ledger::SheetKind;

    fn write(amount: f64) -> PendingWrite {
        PendingWrite {
            chat_id: 1,
            record: LedgerRecord {
                sheet: SheetKind::Expenses,
                date_serial: 46_000,
                category: Some("Продукты".to_owned()),
                transfer_marker: None,
                account: "Наличные".to_owned(),
                replenishment_account: None,
                amount,
                replenishment_amount: None,
                status: "Committed".to_owned(),
                comment: String::new(),
                tag: 10,
            },
            span: "500 на продукты".to_owned(),
            text: "✅ Расход добавлен:".to_owned(),
            auto_committed: false,
        }
    }

    #[tokio::test]
    async fn stage_then_take_consumes_the_entry() {
        let pending = PendingWrites::new();
        pending.stage(10, write(500.0)).await;
        assert_eq!(pending.len().await, 1);

        let taken = pending.take(10).await.unwrap();
        assert!((taken.record.amount - 500.0).abs() < f64::EPSILON);
        assert!(pending.is_empty().await);
        assert!(pending.take(10).await.is_none());
    }

    #[tokio::test]
    async fn racing_stages_are_last_write_wins() {
        let pending = PendingWrites::new();
        assert!(pending.stage(10, write(500.0)).await.is_none());
        let displaced = pending.stage(10, write(600.0)).await.unwrap();
        assert!((displaced.record.amount - 500.0).abs() < f64::EPSILON);
        let current = pending.take(10).await.unwrap();
        assert!((current.record.amount - 600.0).abs() < f64::EPSILON);
    }
}
