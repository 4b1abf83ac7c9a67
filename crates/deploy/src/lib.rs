//! Staging deploy flow: scan, upload, wait.
//!
//! This crate holds the **business logic** that sits on top of the
//! staging client. It has no UI dependencies; the CLI drives it.
//!
//! # Pipeline
//!
//! 1. **Scan**: recursively walk the artifact directory into an
//!    [`UploadRequest`]
//! 2. **Upload**: send each file, in order, through a retrying uploader
//! 3. **Transition**: after a close or release, poll the repository
//!    until the server is done with it

pub mod chatter;
pub mod deploy;
pub mod error;
pub mod scanner;
pub mod transition;

// Re-export primary types for convenience.
pub use chatter::Chatter;
pub use deploy::UploadOrchestrator;
pub use error::DeployError;
pub use scanner::{UploadRequest, UploadRequestParameters, create_upload_request};
pub use transition::wait_for_transition;
