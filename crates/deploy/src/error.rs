//! Deploy error types.

use nexstage_client::ClientError;

/// Errors produced while deploying to, or waiting on, a staging repository.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] nexstage_transfer::TransferError),

    #[error("invalid upload request: {0}")]
    InvalidRequest(String),

    #[error("The repository {0} unexpectedly vanished!")]
    Vanished(String),

    #[error("The repository {id} is no longer transitioning, but unexpectedly ended up in state {state}")]
    UnexpectedState { id: String, state: String },
}
