//! Error taxonomy for acquisition, reconciliation and storage.
//!
//! Acquisition errors ([`ScrapeError::NotFound`], [`ScrapeError::UnexpectedEmpty`],
//! [`ScrapeError::Session`], [`ScrapeError::Timeout`]) are retryable and are
//! absorbed by the retry layer. Everything else is surfaced to the caller as-is.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Target content never appeared within the page's load window.
    #[error("no element matching '{selector}' appeared within {waited:?}")]
    NotFound { selector: String, waited: Duration },

    /// Zero results where some were expected.
    #[error("unexpectedly found no {what}")]
    UnexpectedEmpty { what: String },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<ScrapeError>,
    },

    /// The browser session crashed or could not be started.
    #[error("browser session error: {0}")]
    Session(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("import error on line {line}: {message}")]
    Import { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub fn not_found(selector: &str, waited: Duration) -> Self {
        ScrapeError::NotFound {
            selector: selector.to_string(),
            waited,
        }
    }

    pub fn unexpected_empty(what: &str) -> Self {
        ScrapeError::UnexpectedEmpty {
            what: what.to_string(),
        }
    }

    /// Whether the retry layer should try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::NotFound { .. }
                | ScrapeError::UnexpectedEmpty { .. }
                | ScrapeError::Session(_)
                | ScrapeError::Timeout(_)
        )
    }

    /// Whether a later pass might succeed where this one failed. Exhausted
    /// retries are judged by the error that ended the last attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::RetriesExhausted { last, .. } => last.is_transient(),
            other => other.is_retryable(),
        }
    }
}

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        ScrapeError::Session(format!("{err:#}"))
    }
}
