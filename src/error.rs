//! Error types for the selkie animation core.
//!
//! The animation hot path is deliberately infallible: malformed spectra and
//! unmatched text degrade to the neutral/silence case instead of erroring.
//! `LipSyncError` only covers the edges where I/O is involved.

/// Top-level error type for the lip-sync engine.
#[derive(Debug, thiserror::Error)]
pub enum LipSyncError {
    /// Configuration error (parse or serialize failure).
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LipSyncError>;
