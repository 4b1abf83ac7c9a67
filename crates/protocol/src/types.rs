use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// A staging repository as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingRepository {
    pub profile_id: String,
    pub profile_name: String,
    pub profile_type: String,
    pub repository_id: String,
    /// Repository state, e.g. `open` or `closed`.
    #[serde(rename = "type")]
    pub repository_type: String,
    pub policy: String,
    pub user_id: String,
    pub user_agent: String,
    pub ip_address: String,
    #[serde(rename = "repositoryURI")]
    pub repository_uri: String,
    pub created: DateTime<FixedOffset>,
    pub updated: DateTime<FixedOffset>,
    pub description: String,
    pub provider: String,
    pub release_repository_id: String,
    pub release_repository_name: String,
    pub notifications: String,
    /// True while the server is closing, releasing or dropping it.
    pub transitioning: bool,
}

/// An error entry from an XML error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NexusError {
    pub id: String,
    pub message: String,
}

impl std::fmt::Display for NexusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.message)
    }
}
