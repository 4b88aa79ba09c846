//! Google Sheets REST implementation of [`LedgerStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::SheetsConfig;
use crate::error::{LedgerError, Result};

use super::{BatchOp, CellValue, LedgerStore, SheetKind};

/// Sheets v4 client with bearer auth and a bounded per-request timeout.
pub struct SheetsStore {
    config: SheetsConfig,
    client: reqwest::Client,
    /// Sheet title → sheetId, resolved once from spreadsheet metadata.
    sheet_ids: Mutex<HashMap<String, i64>>,
}

impl SheetsStore {
    pub fn new(config: SheetsConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Store(format!("http client: {e}")))?;
        Ok(Self {
            config,
            client,
            sheet_ids: Mutex::new(HashMap::new()),
        })
    }

    fn spreadsheet_url(&self, suffix: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}{suffix}",
            self.config.api_base, self.config.spreadsheet_id
        )
    }

    /// Numeric sheet id for a batch target, fetching the metadata once.
    async fn sheet_id(&self, sheet: SheetKind) -> Result<i64> {
        let title = sheet.layout(&self.config).title.clone();
        let mut ids = self.sheet_ids.lock().await;
        if ids.is_empty() {
            let url = self.spreadsheet_url("?fields=sheets.properties");
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.config.api_token)
                .send()
                .await
                .map_err(|e| LedgerError::Store(format!("spreadsheet metadata: {e}")))?;
            let payload = check_status(response, "spreadsheet metadata").await?;
            for sheet in payload
                .get("sheets")
                .and_then(serde_json::Value::as_array)
                .into_iter()
                .flatten()
            {
                let Some(props) = sheet.get("properties") else {
                    continue;
                };
                let (Some(title), Some(id)) = (
                    props.get("title").and_then(serde_json::Value::as_str),
                    props.get("sheetId").and_then(serde_json::Value::as_i64),
                ) else {
                    continue;
                };
                ids.insert(title.to_owned(), id);
            }
        }
        ids.get(&title).copied().ok_or_else(|| {
            LedgerError::Store(format!(
                "sheet '{title}' not found in spreadsheet (known: {:?})",
                ids.keys().collect::<Vec<_>>()
            ))
        })
    }

    async fn op_to_request(&self, op: &BatchOp) -> Result<serde_json::Value> {
        Ok(match op {
            BatchOp::InsertRowAbove { sheet, row } => json!({
                "insertDimension": {
                    "range": {
                        "sheetId": self.sheet_id(*sheet).await?,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row
                    },
                    "inheritFromBefore": false
                }
            }),
            BatchOp::UpdateCells {
                sheet,
                row,
                column,
                values,
            } => json!({
                "updateCells": {
                    "start": {
                        "sheetId": self.sheet_id(*sheet).await?,
                        "rowIndex": row,
                        "columnIndex": column
                    },
                    "rows": [{
                        "values": values.iter().map(cell_to_json).collect::<Vec<_>>()
                    }],
                    "fields": "userEnteredValue"
                }
            }),
            BatchOp::DeleteRow { sheet, row } => json!({
                "deleteDimension": {
                    "range": {
                        "sheetId": self.sheet_id(*sheet).await?,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row
                    }
                }
            }),
        })
    }
}

fn cell_to_json(cell: &CellValue) -> serde_json::Value {
    match cell {
        CellValue::Number(n) => json!({"userEnteredValue": {"numberValue": n}}),
        CellValue::Text(s) => json!({"userEnteredValue": {"stringValue": s}}),
        CellValue::Formula(f) => json!({"userEnteredValue": {"formulaValue": f}}),
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LedgerError::Store(format!("{what} failed ({status}): {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| LedgerError::Store(format!("{what}: malformed response: {e}")))
}

#[async_trait]
impl LedgerStore for SheetsStore {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.spreadsheet_url(&format!("/values/{}", urlencoding::encode(range)));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| LedgerError::Store(format!("read {range}: {e}")))?;
        let payload = check_status(response, "range read").await?;

        let rows = payload
            .get("values")
            .and_then(serde_json::Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .into_iter()
                            .flatten()
                            .map(cell_to_string)
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut requests = Vec::with_capacity(ops.len());
        for op in &ops {
            requests.push(self.op_to_request(op).await?);
        }
        let url = self.spreadsheet_url(":batchUpdate");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| LedgerError::Store(format!("batch update: {e}")))?;
        check_status(response, "batch update").await?;
        tracing::debug!(ops = ops.len(), "ledger batch applied");
        Ok(())
    }
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
