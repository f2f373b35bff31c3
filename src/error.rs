//! Error handling for the argus reconnaissance engine
//!
//! Probe-level errors never abort a report. They are carried as data in the
//! slot of the probe that produced them, see [`crate::scanner::ProbeOutcome`].

use std::time::Duration;
use thiserror::Error;

/// Main error type for reconnaissance operations
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("lookup failed: {0}")]
    LookupError(String),

    #[error("port scan failed: {0}")]
    ScanError(String),

    /// An echo probe could not be delivered. `diagnostic` carries whatever
    /// text the transport produced alongside the failure (for example the
    /// stderr of a ping command).
    #[error("echo transport error: {message}")]
    TransportError {
        message: String,
        diagnostic: Option<String>,
    },

    #[error("unrecognized echo reply: {0}")]
    ParseError(String),

    #[error("timed out after {0:?}")]
    TimeoutError(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("probe task failed: {0}")]
    TaskError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReconError {
    pub fn transport(message: impl Into<String>) -> Self {
        ReconError::TransportError {
            message: message.into(),
            diagnostic: None,
        }
    }

    /// Raw detail text for this error.
    ///
    /// Transport failures that produced diagnostic output surface that output
    /// verbatim; everything else falls back to the display form.
    pub fn detail(&self) -> String {
        match self {
            ReconError::TransportError {
                diagnostic: Some(text),
                ..
            } if !text.trim().is_empty() => text.trim().to_string(),
            ReconError::TransportError { message, .. } => message.clone(),
            ReconError::ParseError(raw) => raw.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ReconError {
    fn from(err: reqwest::Error) -> Self {
        ReconError::LookupError(err.to_string())
    }
}

impl From<hickory_resolver::ResolveError> for ReconError {
    fn from(err: hickory_resolver::ResolveError) -> Self {
        ReconError::LookupError(err.to_string())
    }
}
