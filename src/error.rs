//! Error taxonomy for the acquisition pipeline.
//!
//! Item-level variants (`SelectorTimeout`, `ToggleNotFound`) are caught inside
//! the acquirers and never reach the scheduler. Job-level variants are retried
//! when [`ScrapeError::is_transient`] says so.

use std::path::PathBuf;
use std::time::Duration;

/// Failures raised while acquiring or persisting racing data.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Target page or its primary container never became ready.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Page was ready but yielded no rows.
    #[error("no rows found: {0}")]
    EmptyResult(String),

    /// An explicit wait for a selector ran out of time.
    #[error("timed out after {timeout:?} waiting for `{selector}`")]
    SelectorTimeout { selector: String, timeout: Duration },

    /// The secondary bet-variant toggle is missing from the page.
    #[error("toggle `{0}` not found")]
    ToggleNotFound(String),

    /// Writing an export or ledger file failed.
    #[error("failed to persist {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// The browser adapter itself failed (protocol error, crashed page, ...).
    #[error("browser error: {0}")]
    Browser(String),
}

impl ScrapeError {
    /// Whether the scheduler should spend another attempt on this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScrapeError::SourceUnavailable(_)
                | ScrapeError::SelectorTimeout { .. }
                | ScrapeError::Browser(_)
        )
    }

    pub fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ScrapeError::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
