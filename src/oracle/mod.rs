//! Structured extraction oracle.
//!
//! The language model is treated as an opaque structured-extraction service:
//! every call declares an output schema, and the response is validated into
//! closed types right here at the boundary. Downstream code never touches
//! loose JSON.

pub mod openai;
pub mod schema;

use async_trait::async_trait;

use crate::catalog::CatalogSnapshot;
use crate::error::{LedgerError, Result};
use crate::ledger::LocatedRow;

pub use openai::OpenAiOracle;

/// Operation kinds the ledger understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Expense,
    Income,
    Transfer,
    Adjustment,
}

impl OperationKind {
    /// Label the oracle uses in the intent-split schema.
    pub fn oracle_label(&self) -> &'static str {
        match self {
            OperationKind::Expense => "Расходы",
            OperationKind::Income => "Доходы",
            OperationKind::Transfer => "Переводы",
            OperationKind::Adjustment => "Корректировка",
        }
    }

    /// Fallible parse from an oracle label. No exceptions as control flow:
    /// an unknown label is a routing error for that intent only.
    pub fn parse(label: &str) -> Result<Self> {
        match label.trim() {
            "Расходы" => Ok(OperationKind::Expense),
            "Доходы" => Ok(OperationKind::Income),
            "Переводы" => Ok(OperationKind::Transfer),
            "Корректировка" => Ok(OperationKind::Adjustment),
            other => Err(LedgerError::Routing(format!(
                "unknown operation kind: {other:?}"
            ))),
        }
    }
}

/// Committed vs planned transaction status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxStatus {
    #[default]
    Committed,
    Planned,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Committed => "Committed",
            TxStatus::Planned => "Planned",
        }
    }

    /// Lenient parse; anything that is not explicitly planned is committed.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("planned") {
            TxStatus::Planned
        } else {
            TxStatus::Committed
        }
    }
}

/// One transaction intent recognized inside a spoken utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionIntent {
    /// Whether this utterance segment is finance-related at all.
    pub relevant: bool,
    /// Raw kind label as returned by the oracle; parsed per-intent so an
    /// unknown kind fails only its own intent.
    pub kind_label: String,
    /// The transcript substring this intent was derived from.
    pub span: String,
    /// The oracle's own natural-language note to the user.
    pub note: String,
}

/// Typed per-kind field payload, validated at the oracle boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedFields {
    Expense {
        category: String,
        account: String,
        amount: f64,
        status: TxStatus,
        comment: String,
    },
    Income {
        category: String,
        account: String,
        amount: f64,
        status: TxStatus,
        comment: String,
    },
    Transfer {
        write_off_account: String,
        replenishment_account: String,
        write_off_amount: f64,
        replenishment_amount: f64,
        status: TxStatus,
        comment: String,
    },
    Adjustment {
        account: String,
        amount: f64,
        status: TxStatus,
        comment: String,
    },
}

impl ExtractedFields {
    pub fn kind(&self) -> OperationKind {
        match self {
            ExtractedFields::Expense { .. } => OperationKind::Expense,
            ExtractedFields::Income { .. } => OperationKind::Income,
            ExtractedFields::Transfer { .. } => OperationKind::Transfer,
            ExtractedFields::Adjustment { .. } => OperationKind::Adjustment,
        }
    }
}

/// Field extraction result: the typed fields plus the oracle's note.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub fields: ExtractedFields,
    pub note: String,
}

/// Editable fields of a committed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Amount,
    Category,
    Account,
    Comment,
    Status,
    ReplenishmentAmount,
    ReplenishmentAccount,
}

impl EditField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "amount" => Some(EditField::Amount),
            "category" => Some(EditField::Category),
            "account" => Some(EditField::Account),
            "comment" => Some(EditField::Comment),
            "status" => Some(EditField::Status),
            "replenishment_amount" => Some(EditField::ReplenishmentAmount),
            "replenishment_account" => Some(EditField::ReplenishmentAccount),
            _ => None,
        }
    }

    /// Numeric fields become number cells; everything else string cells.
    pub fn is_numeric(&self) -> bool {
        matches!(self, EditField::Amount | EditField::ReplenishmentAmount)
    }

    /// User-facing label used in edit confirmations.
    pub fn label(&self) -> &'static str {
        match self {
            EditField::Amount => "💰 Сумма",
            EditField::Category => "📂 Категория",
            EditField::Account => "💳 Счёт",
            EditField::Comment => "📝 Комментарий",
            EditField::Status => "📊 Статус",
            EditField::ReplenishmentAmount => "💰 Сумма зачисления",
            EditField::ReplenishmentAccount => "💳 Счёт зачисления",
        }
    }
}

/// New value for one edited field.
#[derive(Debug, Clone, PartialEq)]
pub enum EditValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for EditValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditValue::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            EditValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One field change requested by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct EditChange {
    pub field: EditField,
    pub value: EditValue,
}

/// Interpreted outcome of a free-text edit instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    Delete,
    Edit { changes: Vec<EditChange> },
}

/// The three structured-extraction operations the system needs.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Split one transcript into zero or more transaction intents.
    async fn split_intents(
        &self,
        transcript: &str,
        catalog: &CatalogSnapshot,
    ) -> Result<Vec<TransactionIntent>>;

    /// Extract the typed fields for one intent's span. Category/account
    /// enums are constrained to the live catalog at call time.
    async fn extract_fields(
        &self,
        kind: OperationKind,
        span: &str,
        catalog: &CatalogSnapshot,
    ) -> Result<Extraction>;

    /// Interpret a free-text edit instruction against an existing row.
    async fn interpret_edit(
        &self,
        row: &LocatedRow,
        chain_tail: &[String],
        instruction: &str,
    ) -> Result<EditCommand>;
}

// Response-boundary parsing, shared by provider implementations.

fn str_field(value: &serde_json::Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| LedgerError::Oracle(format!("missing string field {key:?}")))
}

fn num_field(value: &serde_json::Value, key: &str) -> Result<f64> {
    value
        .get(key)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| LedgerError::Oracle(format!("missing numeric field {key:?}")))
}

/// Parse the intent-split response (`{"operations": [...]}`).
pub(crate) fn parse_intents(payload: &serde_json::Value) -> Result<Vec<TransactionIntent>> {
    let operations = payload
        .get("operations")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| LedgerError::Oracle("intent split: no operations array".to_owned()))?;

    let mut intents = Vec::with_capacity(operations.len());
    for op in operations {
        intents.push(TransactionIntent {
            relevant: op
                .get("user_request_is_relevant")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            kind_label: str_field(op, "operation_type").unwrap_or_default(),
            span: str_field(op, "source_inputted_text").unwrap_or_default(),
            note: str_field(op, "message_to_user").unwrap_or_default(),
        });
    }
    Ok(intents)
}

/// Parse a per-kind field extraction response into typed fields.
pub(crate) fn parse_extraction(
    kind: OperationKind,
    payload: &serde_json::Value,
) -> Result<Extraction> {
    let status = TxStatus::parse(&str_field(payload, "status").unwrap_or_default());
    let comment = str_field(payload, "comment").unwrap_or_default();
    let note = str_field(payload, "final_answer").unwrap_or_default();

    let fields = match kind {
        OperationKind::Expense => ExtractedFields::Expense {
            category: str_field(payload, "expenses_category")?,
            account: str_field(payload, "account")?,
            amount: num_field(payload, "amount")?,
            status,
            comment,
        },
        OperationKind::Income => ExtractedFields::Income {
            category: str_field(payload, "incomes_category")?,
            account: str_field(payload, "account")?,
            amount: num_field(payload, "amount")?,
            status,
            comment,
        },
        OperationKind::Transfer => ExtractedFields::Transfer {
            write_off_account: str_field(payload, "write_off_account")?,
            replenishment_account: str_field(payload, "replenishment_account")?,
            write_off_amount: num_field(payload, "write_off_amount")?,
            replenishment_amount: num_field(payload, "replenishment_amount")?,
            status,
            comment,
        },
        OperationKind::Adjustment => ExtractedFields::Adjustment {
            account: str_field(payload, "adjustment_account")?,
            amount: num_field(payload, "adjustment_amount")?,
            status,
            comment,
        },
    };
    Ok(Extraction { fields, note })
}

/// Parse an edit-interpretation response. Null and empty change values are
/// dropped here; unknown field names are skipped with a warning.
pub(crate) fn parse_edit_command(payload: &serde_json::Value) -> Result<EditCommand> {
    let action = str_field(payload, "action")?;
    match action.as_str() {
        "delete" => Ok(EditCommand::Delete),
        "edit" => {
            let mut changes = Vec::new();
            let raw = payload
                .get("changes")
                .and_then(serde_json::Value::as_object)
                .cloned()
                .unwrap_or_default();
            for (name, value) in raw {
                let Some(field) = EditField::from_name(&name) else {
                    tracing::warn!(field = %name, "edit change for unknown field skipped");
                    continue;
                };
                let value = match value {
                    serde_json::Value::Null => continue,
                    serde_json::Value::Number(n) => {
                        EditValue::Number(n.as_f64().unwrap_or_default())
                    }
                    serde_json::Value::String(s) if s.trim().is_empty() => continue,
                    serde_json::Value::String(s) => {
                        if field.is_numeric() {
                            match s.trim().parse::<f64>() {
                                Ok(n) => EditValue::Number(n),
                                Err(_) => continue,
                            }
                        } else {
                            EditValue::Text(s)
                        }
                    }
                    other => EditValue::Text(other.to_string()),
                };
                changes.push(EditChange { field, value });
            }
            Ok(EditCommand::Edit { changes })
        }
        other => Err(LedgerError::Oracle(format!(
            "edit interpretation: unknown action {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn kind_labels_round_trip() {
        for kind in [
            OperationKind::Expense,
            OperationKind::Income,
            OperationKind::Transfer,
            OperationKind::Adjustment,
        ] {
            assert_eq!(OperationKind::parse(kind.oracle_label()).unwrap(), kind);
        }
        assert!(matches!(
            OperationKind::parse("None"),
            Err(LedgerError::Routing(_))
        ));
    }

    #[test]
    fn status_parse_defaults_to_committed() {
        assert_eq!(TxStatus::parse("Planned"), TxStatus::Planned);
        assert_eq!(TxStatus::parse("planned"), TxStatus::Planned);
        assert_eq!(TxStatus::parse("Committed"), TxStatus::Committed);
        assert_eq!(TxStatus::parse("whatever"), TxStatus::Committed);
    }

    #[test]
    fn intents_parse_with_defaults_for_missing_fields() {
        let payload = json!({
            "operations": [
                {
                    "user_request_is_relevant": true,
                    "operation_type": "Расходы",
                    "source_inputted_text": "500 на продукты",
                    "message_to_user": "ок"
                },
                { "operation_type": "Доходы" }
            ]
        });
        let intents = parse_intents(&payload).unwrap();
        assert_eq!(intents.len(), 2);
        assert!(intents[0].relevant);
        assert_eq!(intents[0].kind_label, "Расходы");
        assert!(!intents[1].relevant);
    }

    #[test]
    fn extraction_parse_is_typed_per_kind() {
        let payload = json!({
            "expenses_category": "Продукты",
            "account": "Наличные",
            "amount": 500,
            "status": "Committed",
            "comment": "",
            "final_answer": "Понял"
        });
        let extraction = parse_extraction(OperationKind::Expense, &payload).unwrap();
        assert_eq!(extraction.fields.kind(), OperationKind::Expense);
        let ExtractedFields::Expense { amount, .. } = extraction.fields else {
            panic!("wrong variant");
        };
        assert!((amount - 500.0).abs() < f64::EPSILON);

        // A transfer payload is rejected for the expense schema.
        let payload = json!({"write_off_account": "Наличные"});
        assert!(parse_extraction(OperationKind::Expense, &payload).is_err());
    }

    #[test]
    fn edit_command_drops_null_and_empty_changes() {
        let payload = json!({
            "action": "edit",
            "changes": {
                "amount": 600,
                "comment": null,
                "category": "",
                "nonsense": "x"
            }
        });
        let EditCommand::Edit { changes } = parse_edit_command(&payload).unwrap() else {
            panic!("expected edit");
        };
        assert_eq!(
            changes,
            vec![EditChange {
                field: EditField::Amount,
                value: EditValue::Number(600.0)
            }]
        );
    }

    #[test]
    fn edit_command_parses_delete_and_rejects_garbage() {
        assert_eq!(
            parse_edit_command(&json!({"action": "delete"})).unwrap(),
            EditCommand::Delete
        );
        assert!(parse_edit_command(&json!({"action": "explode"})).is_err());
        assert!(parse_edit_command(&json!({})).is_err());
    }

    #[test]
    fn numeric_edit_value_accepts_string_numbers() {
        let payload = json!({"action": "edit", "changes": {"amount": "750"}});
        let EditCommand::Edit { changes } = parse_edit_command(&payload).unwrap() else {
            panic!("expected edit");
        };
        assert_eq!(changes[0].value, EditValue::Number(750.0));
    }

    #[test]
    fn edit_value_display_trims_integral_floats() {
        assert_eq!(EditValue::Number(600.0).to_string(), "600");
        assert_eq!(EditValue::Number(12.5).to_string(), "12.5");
        assert_eq!(EditValue::Text("Карта".to_owned()).to_string(), "Карта");
    }
}
