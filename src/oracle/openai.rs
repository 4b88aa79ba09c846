//! OpenAI chat-completions implementation of [`ExtractionOracle`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::catalog::CatalogSnapshot;
use crate::config::OracleConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::{LocatedRow, SheetKind};

use super::{
    parse_edit_command, parse_extraction, parse_intents, schema, EditCommand, Extraction,
    ExtractionOracle, OperationKind, TransactionIntent,
};

/// Chat-completions client with declared-schema responses and a bounded
/// per-request timeout.
pub struct OpenAiOracle {
    config: OracleConfig,
    client: reqwest::Client,
}

impl OpenAiOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Oracle(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    /// One structured call: send messages + response format, return the
    /// parsed JSON content of the first choice.
    async fn call(
        &self,
        model: &str,
        messages: serde_json::Value,
        response_format: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let body = json!({
            "model": model,
            "messages": messages,
            "response_format": response_format,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "top_p": 0.25,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Oracle(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Oracle(format!(
                "oracle call failed ({status}): {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Oracle(format!("malformed response: {e}")))?;
        let content = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| LedgerError::Oracle("response without content".to_owned()))?;

        serde_json::from_str(content)
            .map_err(|e| LedgerError::Oracle(format!("content is not valid JSON: {e}")))
    }
}

fn describe_row(row: &LocatedRow) -> String {
    let kind = match row.sheet {
        SheetKind::Expenses => "Расходы",
        SheetKind::Incomes => "Доходы",
        SheetKind::Transfers => "Переводы",
    };
    format!("Тип: {kind}\nДанные: {:?}", row.values)
}

#[async_trait]
impl ExtractionOracle for OpenAiOracle {
    async fn split_intents(
        &self,
        transcript: &str,
        catalog: &CatalogSnapshot,
    ) -> Result<Vec<TransactionIntent>> {
        let payload = self
            .call(
                &self.config.model,
                schema::intent_split_messages(transcript),
                schema::intent_split_format(catalog),
            )
            .await?;
        parse_intents(&payload)
    }

    async fn extract_fields(
        &self,
        kind: OperationKind,
        span: &str,
        catalog: &CatalogSnapshot,
    ) -> Result<Extraction> {
        let payload = self
            .call(
                &self.config.model,
                schema::fields_messages(span),
                schema::fields_format(kind, catalog),
            )
            .await?;
        parse_extraction(kind, &payload)
    }

    async fn interpret_edit(
        &self,
        row: &LocatedRow,
        chain_tail: &[String],
        instruction: &str,
    ) -> Result<EditCommand> {
        let payload = self
            .call(
                &self.config.edit_model,
                schema::edit_messages(&describe_row(row), chain_tail, instruction),
                schema::edit_format(),
            )
            .await?;
        parse_edit_command(&payload)
    }
}
