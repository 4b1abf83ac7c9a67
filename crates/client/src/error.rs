//! Client error types.

use std::path::PathBuf;

use nexstage_protocol::{NexusError, ParseError};
use nexstage_transfer::TransferError;
use tracing::error;

/// Errors produced by the Nexus client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The server answered with an error status, or with a success status
    /// other than the one the request requires.
    #[error("HTTP error {status}: {message}")]
    Http {
        status: u16,
        message: String,
        errors: Vec<NexusError>,
    },

    /// The request never produced a response.
    #[error("HTTP failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Every upload attempt for a file failed.
    #[error("Failed to upload file {} after {attempts} attempts", path.display())]
    UploadFailed { path: PathBuf, attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns the HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns the errors decoded from the response body, if any.
    pub fn nexus_errors(&self) -> &[NexusError] {
        match self {
            Self::Http { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// Logs each decoded server error.
pub fn log_nexus_errors(errors: &[NexusError]) {
    for e in errors {
        error!(id = %e.id, message = %e.message, "server error");
    }
}
