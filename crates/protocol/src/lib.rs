//! Wire protocol for the Nexus staging REST API.
//!
//! The server speaks a small XML dialect. This crate provides a
//! hand-rolled reader that remembers where every element started (so
//! structural errors can point at the offending element), a minimal
//! escaping writer, and the codec that maps documents to domain types.

pub mod codec;
pub mod error;
pub mod types;
pub mod xml;

// Re-export primary types for convenience.
pub use codec::{
    encode_bulk_request, encode_create_request, encode_release_request,
    parse_created_repository_id, parse_errors_if_present, parse_repositories, parse_repository,
};
pub use error::ParseError;
pub use types::{NexusError, StagingRepository};
pub use xml::{Element, Position, XmlWriter};
