//! Failure taxonomy for the trading core.
//!
//! Rejections are recoverable (skip the signal), external failures leave
//! state untouched and let the cycle continue, state corruption is a hard
//! stop, and invariant violations flag upstream bookkeeping bugs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Risk manager or engine declined the trade; the signal is skipped.
    #[error("trade rejected: {0}")]
    Rejected(String),

    /// Market-data or order API call failed; no state was changed.
    #[error("external call failed: {0}")]
    External(String),

    /// Session file unreadable after bounded retries. Resuming with unknown
    /// state is unsafe, so this is fatal.
    #[error("session state unreadable: {0}")]
    StateCorruption(String),

    /// Bookkeeping produced an impossible state (e.g. one exit matching
    /// several open positions).
    #[error("bookkeeping invariant violated: {0}")]
    Invariant(String),

    #[error("no active session")]
    NoSession,
}

impl EngineError {
    pub fn external(err: impl std::fmt::Display) -> Self {
        EngineError::External(err.to_string())
    }
}
