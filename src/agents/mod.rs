//! Operation agents.
//!
//! One agent per operation kind turns an intent span into a validated
//! ledger record plus the confirmation text shown to the user. The
//! orchestrator routes intents to agents; the reply agent handles
//! edit/delete instructions against already-committed rows.

pub mod expense;
pub mod income;
pub mod orchestrator;
pub mod reply;
pub mod transfer;

use async_trait::async_trait;

use crate::catalog::CatalogSnapshot;
use crate::error::Result;
use crate::ledger::LedgerRecord;
use crate::oracle::OperationKind;

pub use orchestrator::{IntentOutcome, Orchestrator};
pub use reply::ReplyAgent;

/// What an agent produced for one intent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// Fields validated; the record is ready to stage. Its tag is still
    /// zero and is set once the confirmation message id is known.
    Recorded {
        record: LedgerRecord,
        message: String,
    },
    /// Some fields failed validation; the user is asked to re-record.
    Clarify { message: String },
    /// The intent could not be processed at all.
    Failed { message: String },
}

/// Agent contract: one operation kind, span in, reply out.
#[async_trait]
pub trait OperationAgent: Send + Sync {
    fn kind(&self) -> OperationKind;

    async fn handle(&self, span: &str, catalog: &CatalogSnapshot) -> Result<AgentReply>;
}

/// Amounts render without a trailing `.0`.
pub(crate) fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{amount}")
    }
}

/// Clarification message listing the fields that need another take.
pub(crate) fn clarify_message(problems: &[String]) -> String {
    let mut message = String::from("Пожалуйста, уточните следующие данные:");
    for problem in problems {
        message.push_str("\n• ");
        message.push_str(problem);
    }
    message
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn amounts_render_without_trailing_zero() {
        assert_eq!(format_amount(500.0), "500");
        assert_eq!(format_amount(99.9), "99.9");
    }

    #[test]
    fn clarify_message_lists_each_problem() {
        let message = clarify_message(&[
            "сумма операции".to_owned(),
            "категория расхода".to_owned(),
        ]);
        assert!(message.starts_with("Пожалуйста, уточните"));
        assert_eq!(message.matches("\n• ").count(), 2);
    }
}
