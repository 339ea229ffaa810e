use std::time::Duration;
use thiserror::Error;

/// Failure of a single price read against one upstream provider.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider rejected request: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unsupported symbol: {0}")]
    UnsupportedSymbol(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Malformed(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Errors that abort a whole fetch operation, as opposed to one provider attempt.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FetchError {
    #[error("no enabled providers match the request")]
    NoProviders,

    #[error("{0}")]
    Symbol(ProviderError),
}

/// Failures reported by a [`MarketBackend`](crate::backend::MarketBackend).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend returned HTTP {0}")]
    Status(u16),

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid backend url: {0}")]
    Url(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Request(error.to_string())
        }
    }
}

impl From<url::ParseError> for BackendError {
    fn from(error: url::ParseError) -> Self {
        Self::Url(error.to_string())
    }
}

/// Errors surfaced by [`SyncController`](crate::sync::SyncController) control operations.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SyncError {
    #[error("failed to start stream for {symbol}: {source}")]
    StartStream {
        symbol: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to stop stream for {symbol}: {source}")]
    StopStream {
        symbol: String,
        #[source]
        source: BackendError,
    },

    #[error("controller has been shut down")]
    Shutdown,
}

/// Configuration loading errors.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {error}")]
    Read { path: String, error: String },

    #[error("failed to parse {path}: {error}")]
    Parse { path: String, error: String },

    #[error("invalid provider configuration: {0}")]
    Invalid(String),
}
