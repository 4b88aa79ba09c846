//! Configuration types for the voice-to-ledger pipeline.
//!
//! Everything positional about the spreadsheet (sheet titles, anchor rows,
//! column indexes, tag columns) is configuration, not code: families run
//! differently shaped sheets.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LedgerError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat transport (Telegram Bot API) settings.
    pub telegram: TelegramConfig,
    /// Spreadsheet-backed ledger store settings.
    pub sheets: SheetsConfig,
    /// Structured-extraction oracle settings.
    pub oracle: OracleConfig,
    /// Speech-to-text settings.
    pub transcription: TranscriptionConfig,
    /// Runtime behavior knobs.
    pub behavior: BehaviorConfig,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token. Overridable via `TELEGRAM_BOT_TOKEN`.
    pub bot_token: String,
    /// Chat ids allowed to talk to the bot. Empty list denies everyone;
    /// `[0]` is treated as a wildcard.
    pub allowed_chat_ids: Vec<i64>,
    /// Long-poll timeout in seconds.
    pub poll_timeout_secs: u64,
    /// Bot API base URL (overridable for tests).
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_chat_ids: Vec::new(),
            poll_timeout_secs: 30,
            api_base: "https://api.telegram.org".to_owned(),
        }
    }
}

/// Google Sheets settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Spreadsheet identifier. Overridable via `GOOGLE_SPREADSHEET_ID`.
    pub spreadsheet_id: String,
    /// OAuth bearer token. Overridable via `GOOGLE_SHEETS_TOKEN`.
    pub api_token: String,
    /// Sheets REST base URL (overridable for tests).
    pub api_base: String,
    /// Per-sheet row/column layout.
    pub expenses: SheetLayout,
    pub incomes: SheetLayout,
    pub transfers: SheetLayout,
    /// Ranges on the configuration sheet holding valid names.
    pub catalog: CatalogRanges,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            api_token: String::new(),
            api_base: "https://sheets.googleapis.com".to_owned(),
            expenses: SheetLayout::expenses_default(),
            incomes: SheetLayout::incomes_default(),
            transfers: SheetLayout::transfers_default(),
            catalog: CatalogRanges::default(),
        }
    }
}

/// Row/column layout of one ledger sheet. Column indexes are zero-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// Sheet title as shown in the spreadsheet tab.
    pub title: String,
    /// New rows are always inserted above this 1-based row.
    pub anchor_row: u32,
    /// Last row scanned when looking a tag up.
    pub tag_scan_limit: u32,
    /// Column holding the confirmation-message tag.
    pub tag_column: u32,
    /// Field name → column index mapping used by the edit flow.
    pub amount_column: u32,
    pub category_column: u32,
    pub account_column: u32,
    pub status_column: u32,
    pub comment_column: u32,
    /// Transfer sheets carry a second account/amount pair.
    pub replenishment_account_column: Option<u32>,
    pub replenishment_amount_column: Option<u32>,
}

impl SheetLayout {
    pub fn expenses_default() -> Self {
        Self {
            title: "↙️Расходы".to_owned(),
            anchor_row: 7,
            tag_scan_limit: 2000,
            tag_column: 11,
            amount_column: 4,
            category_column: 2,
            account_column: 3,
            status_column: 6,
            comment_column: 9,
            replenishment_account_column: None,
            replenishment_amount_column: None,
        }
    }

    pub fn incomes_default() -> Self {
        Self {
            title: "↗️Доходы".to_owned(),
            tag_column: 10,
            ..Self::expenses_default()
        }
    }

    pub fn transfers_default() -> Self {
        Self {
            title: "🔄Переводы".to_owned(),
            anchor_row: 7,
            tag_scan_limit: 2000,
            tag_column: 12,
            amount_column: 5,
            category_column: 2,
            account_column: 3,
            status_column: 9,
            comment_column: 10,
            replenishment_account_column: Some(4),
            replenishment_amount_column: Some(7),
        }
    }
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self::expenses_default()
    }
}

/// A1 ranges on the hidden configuration sheet listing valid names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRanges {
    pub expense_categories: String,
    pub income_categories: String,
    pub accounts: String,
}

impl Default for CatalogRanges {
    fn default() -> Self {
        Self {
            expense_categories: "*data!AJ7:AJ199".to_owned(),
            income_categories: "*data!AK7:AK199".to_owned(),
            accounts: "*data!M7:M199".to_owned(),
        }
    }
}

/// Extraction oracle (chat-completions) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// API base including `/v1`. Overridable for tests.
    pub api_base: String,
    /// Bearer token. Overridable via `OPENAI_API_KEY`.
    pub api_key: String,
    /// Model for intent split and field extraction.
    pub model: String,
    /// Cheaper model for free-text edit interpretation.
    pub edit_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard timeout on every oracle call, seconds.
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_owned(),
            api_key: String::new(),
            model: "gpt-4.1".to_owned(),
            edit_model: "gpt-4o-mini".to_owned(),
            temperature: 0.05,
            max_tokens: 2048,
            timeout_secs: 30,
        }
    }
}

/// Which speech-to-text backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionBackend {
    /// Hosted transcription endpoint (Whisper-compatible).
    Cloud,
    /// Self-hosted recognizer reachable over HTTP.
    Local,
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub backend: TranscriptionBackend,
    /// Whisper-compatible API base including `/v1`.
    pub cloud_api_base: String,
    /// Bearer token for the hosted backend. Overridable via
    /// `OPENAI_API_KEY`.
    pub cloud_api_key: String,
    pub cloud_model: String,
    /// Local recognizer endpoint accepting raw WAV bytes.
    pub local_endpoint: String,
    /// Hard timeout on every transcription call, seconds.
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: TranscriptionBackend::Cloud,
            cloud_api_base: "https://api.openai.com/v1".to_owned(),
            cloud_api_key: String::new(),
            cloud_model: "whisper-1".to_owned(),
            local_endpoint: "http://127.0.0.1:2700/transcribe".to_owned(),
            timeout_secs: 60,
        }
    }
}

/// Runtime behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Commit a validated operation right after its confirmation message is
    /// sent, without waiting for the confirm button.
    pub auto_commit: bool,
    /// Reference-data cache TTL, seconds.
    pub catalog_ttl_secs: u64,
    /// Safety bound on reply-chain traversal depth.
    pub max_reply_hops: usize,
    /// How many trailing chain messages accompany an edit instruction.
    pub edit_context_messages: usize,
    /// Hard timeout on ledger store calls, seconds.
    pub store_timeout_secs: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            auto_commit: false,
            catalog_ttl_secs: 300,
            max_reply_hops: 32,
            edit_context_messages: 5,
            store_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment
    /// overrides for secrets. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)
                .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        // Hosted transcription shares the oracle's key unless one is set
        // explicitly.
        if config.transcription.cloud_api_key.trim().is_empty() {
            config.transcription.cloud_api_key = config.oracle.api_key.clone();
        }
        Ok(config)
    }

    /// Environment variables always win over file contents for secrets.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Ok(id) = std::env::var("GOOGLE_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = id;
        }
        if let Ok(token) = std::env::var("GOOGLE_SHEETS_TOKEN") {
            self.sheets.api_token = token;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.oracle.api_key = key;
        }
    }

    /// Startup validation: fail fast with a clear message instead of
    /// erroring deep inside the first request.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(LedgerError::Config(
                "telegram.bot_token is empty (set TELEGRAM_BOT_TOKEN)".to_owned(),
            ));
        }
        if self.sheets.spreadsheet_id.trim().is_empty() {
            return Err(LedgerError::Config(
                "sheets.spreadsheet_id is empty (set GOOGLE_SPREADSHEET_ID)".to_owned(),
            ));
        }
        if self.oracle.api_key.trim().is_empty() {
            return Err(LedgerError::Config(
                "oracle.api_key is empty (set OPENAI_API_KEY)".to_owned(),
            ));
        }
        // Rows are 1-based; an anchor of 0 has no row above it.
        for (name, layout) in [
            ("expenses", &self.sheets.expenses),
            ("incomes", &self.sheets.incomes),
            ("transfers", &self.sheets.transfers),
        ] {
            if layout.anchor_row == 0 {
                return Err(LedgerError::Config(format!(
                    "sheets.{name}.anchor_row must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.behavior.catalog_ttl_secs, 300);
        assert_eq!(config.sheets.expenses.anchor_row, 7);
        assert_eq!(config.sheets.expenses.tag_column, 11);
        assert_eq!(config.sheets.incomes.tag_column, 10);
        assert_eq!(config.sheets.transfers.tag_column, 12);
        assert!(config.sheets.transfers.replenishment_amount_column.is_some());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let raw = r#"
            [telegram]
            poll_timeout_secs = 5

            [sheets.expenses]
            title = "Expenses"
            tag_column = 9
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.telegram.poll_timeout_secs, 5);
        assert_eq!(config.sheets.expenses.title, "Expenses");
        assert_eq!(config.sheets.expenses.tag_column, 9);
        // Untouched sections keep their defaults.
        assert_eq!(config.sheets.incomes.tag_column, 10);
        assert_eq!(config.oracle.model, "gpt-4.1");
    }

    #[test]
    fn cloud_transcription_falls_back_to_the_oracle_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledgervoice.toml");
        std::fs::write(&path, "[oracle]\napi_key = \"shared-key\"\n").unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert!(!config.transcription.cloud_api_key.is_empty());
        assert_eq!(config.transcription.cloud_api_key, config.oracle.api_key);

        let raw = "[oracle]\napi_key = \"shared-key\"\n\n\
                   [transcription]\ncloud_api_key = \"own-key\"\n";
        std::fs::write(&path, raw).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.transcription.cloud_api_key, "own-key");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.transcription.cloud_model, "whisper-1");
    }

    #[test]
    fn validate_rejects_empty_secrets() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_anchor_row() {
        let mut config = AppConfig::default();
        config.telegram.bot_token = "tok".to_owned();
        config.sheets.spreadsheet_id = "sid".to_owned();
        config.oracle.api_key = "key".to_owned();
        assert!(config.validate().is_ok());

        config.sheets.incomes.anchor_row = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("incomes.anchor_row"));
    }
}
