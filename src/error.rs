//! Error types for the ledger pipeline.

/// Top-level error type for the voice-to-ledger system.
///
/// Each variant corresponds to the component boundary that detected the
/// failure; the runtime translates every one of them into a user-facing
/// message instead of letting it reach the transport's poll loop.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// User input or extracted fields failed validation. Recovered locally
    /// as a clarification prompt; nothing is written.
    #[error("validation error: {0}")]
    Validation(String),

    /// Extraction oracle call failed or returned unparsable output.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Ledger store read/write/delete failure.
    #[error("store error: {0}")]
    Store(String),

    /// Unrecognized operation kind, or no agent registered for a kind.
    #[error("routing error: {0}")]
    Routing(String),

    /// Reply chain exhausted without finding an editable operation.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Speech-to-text transcription error.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Chat transport send/edit/delete/download error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Whether the error should surface as a clarification prompt rather
    /// than a failure notice.
    pub fn is_clarification(&self) -> bool {
        matches!(self, LedgerError::Validation(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LedgerError>;
