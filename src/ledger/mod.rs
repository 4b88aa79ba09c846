//! Spreadsheet-backed ledger store.
//!
//! The store is an opaque row-store with insert/update/delete-by-position
//! operations; one `batch` call is atomic on the remote side. Everything
//! positional (sheet titles, anchor rows, column indexes) comes from
//! [`SheetsConfig`](crate::config::SheetsConfig).

pub mod rows;
pub mod sheets;

use async_trait::async_trait;

use crate::config::{SheetLayout, SheetsConfig};
use crate::error::Result;

pub use rows::LedgerRecord;
pub use sheets::SheetsStore;

/// Which ledger sheet a row lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetKind {
    Expenses,
    Incomes,
    Transfers,
}

impl SheetKind {
    pub const ALL: [SheetKind; 3] = [
        SheetKind::Expenses,
        SheetKind::Incomes,
        SheetKind::Transfers,
    ];

    pub fn layout<'a>(&self, config: &'a SheetsConfig) -> &'a SheetLayout {
        match self {
            SheetKind::Expenses => &config.expenses,
            SheetKind::Incomes => &config.incomes,
            SheetKind::Transfers => &config.transfers,
        }
    }
}

/// A single cell value in the store's type system.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Formula(String),
}

/// One mutation in a batch request. The remote store applies a whole batch
/// atomically, which the edit flow relies on instead of rolling back.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Insert an empty row above the given 1-based row.
    InsertRowAbove { sheet: SheetKind, row: u32 },
    /// Overwrite a contiguous run of cells starting at (row, column),
    /// both zero-based.
    UpdateCells {
        sheet: SheetKind,
        row: u32,
        column: u32,
        values: Vec<CellValue>,
    },
    /// Delete the given 1-based row.
    DeleteRow { sheet: SheetKind, row: u32 },
}

/// A ledger row located by its tag.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedRow {
    pub sheet: SheetKind,
    /// 1-based row number in the sheet.
    pub row_number: u32,
    /// Raw cell values of the row, column A onward.
    pub values: Vec<String>,
}

/// Row-store contract consumed by the rest of the system.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read a rectangular A1 range. Missing trailing cells are absent, not
    /// empty strings.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Apply a batch of mutations atomically.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Read a single column range, flattening non-empty leading cells.
    async fn read_column(&self, range: &str) -> Result<Vec<String>> {
        let rows = self.read_range(range).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter(|cell| !cell.is_empty())
            .collect())
    }
}

/// Zero-based column index → A1 letter(s).
pub fn column_letter(index: u32) -> String {
    let mut n = index;
    let mut letters = String::new();
    loop {
        letters.insert(0, char::from(b'A' + (n % 26) as u8));
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters
}

/// Look a tag up across all three sheets with a linear column scan.
///
/// At most one row per tag is assumed; the first match on the scan wins.
/// Tags are stored as spreadsheet numbers, so cells are compared after a
/// lossy numeric parse.
pub async fn find_by_tag(
    store: &dyn LedgerStore,
    config: &SheetsConfig,
    tag: i64,
) -> Result<Option<LocatedRow>> {
    for sheet in SheetKind::ALL {
        let layout = sheet.layout(config);
        let col = column_letter(layout.tag_column);
        let scan_range = format!(
            "{}!{}{}:{}{}",
            layout.title, col, layout.anchor_row, col, layout.tag_scan_limit
        );
        let cells = store.read_range(&scan_range).await?;

        for (idx, row) in cells.iter().enumerate() {
            let Some(cell) = row.first() else { continue };
            // Number cells may render as "12345.0".
            let matches = cell
                .parse::<f64>()
                .ok()
                .is_some_and(|v| v as i64 == tag);
            if !matches {
                continue;
            }

            let row_number = layout.anchor_row + idx as u32;
            let data_range = format!(
                "{}!A{}:{}{}",
                layout.title,
                row_number,
                column_letter(layout.tag_column),
                row_number
            );
            let mut data = store.read_range(&data_range).await?;
            let values = if data.is_empty() {
                Vec::new()
            } else {
                data.remove(0)
            };
            return Ok(Some(LocatedRow {
                sheet,
                row_number,
                values,
            }));
        }
    }
    Ok(None)
}
