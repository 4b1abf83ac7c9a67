//! Waiting for a repository to finish a close, release or drop.

use std::time::Duration;

use nexstage_client::StagingService;
use nexstage_protocol::StagingRepository;
use tracing::{debug, info};

use crate::error::DeployError;

/// Polls a repository until the server stops transitioning it.
///
/// Sleeps `poll_interval` before every fetch. Returns the repository once
/// it is no longer transitioning and its type matches `expected_type`
/// (ASCII case-insensitive).
pub async fn wait_for_transition(
    service: &dyn StagingService,
    repository_id: &str,
    expected_type: &str,
    poll_interval: Duration,
) -> Result<StagingRepository, DeployError> {
    loop {
        debug!(repository = %repository_id, "waiting for repository to finish transitioning");
        tokio::time::sleep(poll_interval).await;

        let Some(repository) = service.repository(repository_id).await? else {
            return Err(DeployError::Vanished(repository_id.to_string()));
        };
        if repository.transitioning {
            continue;
        }
        if !repository.repository_type.eq_ignore_ascii_case(expected_type) {
            return Err(DeployError::UnexpectedState {
                id: repository_id.to_string(),
                state: repository.repository_type,
            });
        }

        info!(repository = %repository_id, state = %repository.repository_type, "repository transition finished");
        return Ok(repository);
    }
}
