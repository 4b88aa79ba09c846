//! Ledgervoice: voice-driven family finance ledger over chat.
//!
//! A voice note in the family chat flows through a cascaded pipeline:
//! transcription → intent split → per-kind field extraction → validation
//! against the live reference catalog → a confirmation message with
//! buttons → a tagged row in the spreadsheet ledger. Replying to a
//! confirmation edits or deletes the committed row.
//!
//! # Architecture
//!
//! Each stage sits behind a trait so providers can be swapped and tests
//! can script them:
//! - **Transport**: Telegram Bot API long poll ([`telegram`])
//! - **Transcription**: hosted Whisper-compatible or local recognizer
//!   ([`transcribe`])
//! - **Extraction**: schema-constrained chat-completions calls
//!   ([`oracle`])
//! - **Agents**: per-kind validation and row construction ([`agents`])
//! - **Store**: Google Sheets batch mutations ([`ledger`])

pub mod agents;
pub mod bot;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod pending;
pub mod telegram;
pub mod transcribe;

pub use bot::Bot;
pub use config::AppConfig;
pub use error::{LedgerError, Result};
