//! Error types for the aggregation pipeline
//!
//! The pipeline distinguishes transient fetch failures, which are retried at
//! a fixed interval, from parse and configuration failures, which terminate
//! the attempt immediately. `SourceError::is_retryable` encodes that split.

use thiserror::Error;

/// Errors produced by the fetch collaborators and the pipeline steps built
/// on top of them.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network connection timeout
    #[error("connection timeout: {url}")]
    Timeout { url: String },

    /// Other network-level failures (DNS, connect, interrupted body)
    #[error("network error: {message}")]
    Network { message: String },

    /// Non-success HTTP status from the remote source
    #[error("HTTP error: {status} from {url}")]
    Http { status: u16, url: String },

    /// Fetched data could not be parsed; retrying will not help
    #[error("parse error: {source_kind} - {message}")]
    Parse {
        source_kind: String,
        message: String,
    },

    /// Malformed source descriptor or other bad configuration
    #[error("invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    /// Local I/O failure (cache directory, table files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Create a parse error for a given source kind
    pub fn parse<S: Into<String>, M: Into<String>>(source_kind: S, message: M) -> Self {
        Self::Parse {
            source_kind: source_kind.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Whether another attempt at the same operation can reasonably succeed.
    /// Parse and configuration failures are deterministic; local I/O errors
    /// will not be fixed by hitting the network again either.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network { .. } | Self::Http { .. }
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        if err.is_timeout() {
            Self::Timeout { url }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                url,
            }
        } else if err.is_builder() {
            Self::invalid_config("url", err.to_string())
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}
