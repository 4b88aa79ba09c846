//! Ledger row construction.
//!
//! Builds the batch that commits one transaction: an insert above the
//! sheet's anchor row plus the cell writes for the new row. Formula cells
//! reproduce the spreadsheet's own month/currency/main-sum formulas so
//! inserted rows compute like hand-entered ones.

use chrono::NaiveDate;

use crate::config::SheetsConfig;
use crate::error::{LedgerError, Result};

use super::{BatchOp, CellValue, SheetKind};

/// `=MONTH` helper column, expenses/incomes B and transfers B.
const MONTH_FORMULA: &str = r#"=LET(
  _date,
  INDEX($A:$A, ROW()),
  DATE(VALUE(TEXT(_date, "YYYY")), VALUE(TEXT(_date, "M")), 1)
  )
"#;

/// Currency of the amount, looked up from the account register.
const SUM_CURRENCY_FORMULA: &str = r#"=IFERROR(
  VLOOKUP(
    INDEX($D:$D, ROW()),
    {_account_fullnames, _account_currency_codes},
    2,
    FALSE
    ),
  "?"
  )"#;

/// Currency of the replenishment amount (transfers only).
const REPLENISHMENT_CURRENCY_FORMULA: &str = r#"=IFERROR(
  VLOOKUP(
    INDEX($E:$E, ROW()),
    {_account_fullnames, _account_currency_codes},
    2,
    FALSE
    ),
  "?"
  )"#;

/// Amount converted into the main currency.
const MAIN_SUM_FORMULA: &str = r#"=IF(
  INDEX($D:$D, ROW())<>"",
  IFERROR(
    ROUND(
      INDEX($E:$E, ROW()) * VLOOKUP(VLOOKUP(INDEX($D:$D, ROW()), {_account_fullnames, _account_currency_codes}, 2, FALSE), _currencies, 3, FALSE), _userconfig_round_to),
    "ERROR"
  ),
  ""
)
"#;

/// Currency label for the main-currency column.
const MAIN_SUM_CURRENCY_FORMULA: &str = r#"=IF(
    INDEX($D:$D, ROW())<>"",
    main_currency,
    "?"
    )"#;

/// Transfer rows distinguish real transfers from balance corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMarker {
    Transfer,
    Adjustment,
}

impl TransferMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMarker::Transfer => "Transfer",
            TransferMarker::Adjustment => "Adjustment",
        }
    }
}

/// Everything needed to commit one ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub sheet: SheetKind,
    /// Date as a spreadsheet serial number.
    pub date_serial: i64,
    /// Category name; expenses/incomes only.
    pub category: Option<String>,
    /// Transfer/adjustment marker; transfers sheet only.
    pub transfer_marker: Option<TransferMarker>,
    /// Account, or write-off account on the transfers sheet.
    pub account: String,
    pub replenishment_account: Option<String>,
    /// Amount, or write-off amount on the transfers sheet.
    pub amount: f64,
    pub replenishment_amount: Option<f64>,
    /// Status cell text ("Committed" / "Planned").
    pub status: String,
    pub comment: String,
    /// Confirmation-message identifier written to the tag column.
    pub tag: i64,
}

/// Days between the spreadsheet epoch (1899-12-30) and the given date.
pub fn date_serial(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    (date - epoch).num_days()
}

/// Today's date as a spreadsheet serial number.
pub fn today_serial() -> i64 {
    date_serial(chrono::Local::now().date_naive())
}

impl LedgerRecord {
    /// Build the atomic commit batch: insert an empty row above the anchor,
    /// fill its leading cells, and write the tag into its own column.
    pub fn to_ops(&self, config: &SheetsConfig) -> Result<Vec<BatchOp>> {
        let layout = self.sheet.layout(config);
        let values = self.cell_values()?;
        // The inserted row lands at the anchor position; batch ops address
        // it zero-based.
        let new_row_index = layout.anchor_row - 1;

        Ok(vec![
            BatchOp::InsertRowAbove {
                sheet: self.sheet,
                row: layout.anchor_row,
            },
            BatchOp::UpdateCells {
                sheet: self.sheet,
                row: new_row_index,
                column: 0,
                values,
            },
            BatchOp::UpdateCells {
                sheet: self.sheet,
                row: new_row_index,
                column: layout.tag_column,
                values: vec![CellValue::Number(self.tag as f64)],
            },
        ])
    }

    fn cell_values(&self) -> Result<Vec<CellValue>> {
        match self.sheet {
            SheetKind::Expenses | SheetKind::Incomes => {
                let category = self.category.clone().ok_or_else(|| {
                    LedgerError::Validation("category is required for this sheet".to_owned())
                })?;
                Ok(vec![
                    CellValue::Number(self.date_serial as f64),
                    CellValue::Formula(MONTH_FORMULA.to_owned()),
                    CellValue::Text(category),
                    CellValue::Text(self.account.clone()),
                    CellValue::Number(self.amount),
                    CellValue::Formula(SUM_CURRENCY_FORMULA.to_owned()),
                    CellValue::Text(self.status.clone()),
                    CellValue::Formula(MAIN_SUM_FORMULA.to_owned()),
                    CellValue::Formula(MAIN_SUM_CURRENCY_FORMULA.to_owned()),
                    CellValue::Text(self.comment.clone()),
                ])
            }
            SheetKind::Transfers => {
                let marker = self.transfer_marker.ok_or_else(|| {
                    LedgerError::Validation("transfer marker is required".to_owned())
                })?;
                let replenishment_account =
                    self.replenishment_account.clone().ok_or_else(|| {
                        LedgerError::Validation(
                            "replenishment account is required for transfers".to_owned(),
                        )
                    })?;
                let replenishment_amount = self.replenishment_amount.unwrap_or(self.amount);
                Ok(vec![
                    CellValue::Number(self.date_serial as f64),
                    CellValue::Formula(MONTH_FORMULA.to_owned()),
                    CellValue::Text(marker.as_str().to_owned()),
                    CellValue::Text(self.account.clone()),
                    CellValue::Text(replenishment_account),
                    CellValue::Number(self.amount),
                    CellValue::Formula(SUM_CURRENCY_FORMULA.to_owned()),
                    CellValue::Number(replenishment_amount),
                    CellValue::Formula(REPLENISHMENT_CURRENCY_FORMULA.to_owned()),
                    CellValue::Text(self.status.clone()),
                    CellValue::Text(self.comment.clone()),
                ])
            }
        }
    }
}
