//! Error types for APOD download operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Errors that can occur while resolving, fetching or persisting APOD entries.
#[derive(Error, Debug)]
pub enum ApodError {
    /// The requested date selection cannot be resolved (whole-run, terminal).
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// The service has no record for the requested date.
    #[error("No record published for {0}")]
    NotFound(String),

    /// The service signalled quota exhaustion (HTTP 429).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Timeout, connection reset, 5xx or truncated body.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The service answered with something we cannot interpret.
    #[error("Malformed response: {0}")]
    Parse(String),

    /// The record has no directly downloadable media file.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// I/O error while writing to the output directory.
    #[error(transparent)]
    Storage(#[from] io::Error),

    /// The run was cancelled before this task reached a terminal state.
    #[error("Cancelled")]
    Cancelled,

    /// The task processing this target panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Coarse classification of an [`ApodError`], recorded in outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSelection,
    NotFound,
    RateLimited,
    TransientNetwork,
    Parse,
    UnsupportedMediaType,
    Storage,
    Cancelled,
    Panicked,
}

impl ErrorKind {
    /// Whether an attempt failing with this kind may be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::TransientNetwork)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidSelection => "invalid selection",
            ErrorKind::NotFound => "not found",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::TransientNetwork => "network error",
            ErrorKind::Parse => "parse error",
            ErrorKind::UnsupportedMediaType => "unsupported media type",
            ErrorKind::Storage => "storage error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Panicked => "internal error",
        };
        f.write_str(s)
    }
}

impl ApodError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApodError::InvalidSelection(_) => ErrorKind::InvalidSelection,
            ApodError::NotFound(_) => ErrorKind::NotFound,
            ApodError::RateLimited(_) => ErrorKind::RateLimited,
            ApodError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            ApodError::Parse(_) => ErrorKind::Parse,
            ApodError::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            ApodError::Storage(_) => ErrorKind::Storage,
            ApodError::Cancelled => ErrorKind::Cancelled,
            ApodError::Panicked(_) => ErrorKind::Panicked,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<reqwest::Error> for ApodError {
    fn from(e: reqwest::Error) -> Self {
        // undecodable bodies, unusable URLs and redirect loops never heal
        if e.is_decode() || e.is_builder() || e.is_redirect() {
            return ApodError::Parse(e.to_string());
        }
        if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                return ApodError::RateLimited(e.to_string());
            }
            if status.is_client_error() {
                return ApodError::Parse(e.to_string());
            }
        }
        // timeouts, connect failures, resets, 5xx and broken bodies
        ApodError::TransientNetwork(e.to_string())
    }
}

impl From<serde_json::Error> for ApodError {
    fn from(e: serde_json::Error) -> Self {
        ApodError::Parse(e.to_string())
    }
}
