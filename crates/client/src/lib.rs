//! Nexus staging REST client.
//!
//! [`NexusClient`] performs the repository lifecycle requests (list, get,
//! create, drop, close, release) and hands out [`RetryingUploader`]s for
//! individual files. Callers that only need the lifecycle requests can
//! depend on the [`StagingService`] trait instead, which is what the
//! deploy crate and its tests do.

pub mod client;
pub mod config;
pub mod error;
pub mod uploader;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export primary types for convenience.
pub use client::{NexusClient, ServiceFuture, StagingService, create_client};
pub use config::{ApplicationVersion, ClientConfig, DEFAULT_BASE_URI};
pub use error::ClientError;
pub use uploader::{FileUpload, RetryPolicy, RetryingUploader};
