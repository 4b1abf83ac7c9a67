//! Upload orchestrator.
//!
//! Uploads the files of an [`UploadRequest`] one after another and stops
//! at the first file that cannot be uploaded.

use std::sync::Arc;

use nexstage_client::{FileUpload, NexusClient, RetryPolicy};
use nexstage_transfer::{ProgressCounter, ProgressSink, SharedProgressCounter};
use tracing::{error, info};

use crate::error::DeployError;
use crate::scanner::UploadRequest;

/// Drives a retrying uploader over every file of a request.
///
/// All files of a request report to the same progress counter.
pub struct UploadOrchestrator<'a> {
    client: &'a NexusClient,
    counter: SharedProgressCounter,
}

impl<'a> UploadOrchestrator<'a> {
    /// Creates an orchestrator that reports progress to `sink`.
    pub fn new(client: &'a NexusClient, sink: ProgressSink) -> Self {
        Self {
            client,
            counter: ProgressCounter::shared(sink),
        }
    }

    /// Uploads every file in order. No partial success: the first failed
    /// file ends the upload with its error.
    pub async fn upload(&self, request: &UploadRequest) -> Result<(), DeployError> {
        let repository = request.repository_id();
        let file_count = request.files().len();
        let policy = RetryPolicy::new(request.retry_count(), request.retry_delay());
        info!(repository = %repository, files = file_count, "upload started");

        for (index, relative) in request.files().iter().enumerate() {
            let upload = FileUpload {
                service_url: self.client.repository_url(repository),
                target_url: self.client.deploy_url(repository, relative),
                file: request.base_directory().join(relative),
                file_index: index,
                file_count,
            };
            let uploader = self
                .client
                .uploader(upload, policy, Arc::clone(&self.counter))?;

            if let Err(e) = uploader.upload().await {
                error!(
                    repository = %repository,
                    file = %relative.display(),
                    error = %e,
                    "upload aborted"
                );
                return Err(e.into());
            }
        }

        info!(repository = %repository, files = file_count, "upload finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{UploadRequestParameters, create_upload_request};
    use nexstage_client::testing::{MockResponse, MockServer};
    use nexstage_client::{ApplicationVersion, ClientConfig, ClientError, create_client};
    use nexstage_transfer::ProgressEvent;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn client(server: &MockServer) -> NexusClient {
        let config = ClientConfig::new("u", "p", "12ab", ApplicationVersion::new("test", "0"))
            .with_base_uri(server.url());
        create_client(config).unwrap()
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a.pom"), b"pom").unwrap();
        fs::write(dir.path().join("b").join("c.jar"), b"jar").unwrap();
        fs::write(dir.path().join("b").join("d e.txt"), b"text").unwrap();
        dir
    }

    fn request(dir: &TempDir, retry_count: u32) -> UploadRequest {
        create_upload_request(UploadRequestParameters {
            repository_id: "r0".into(),
            base_directory: dir.path().to_path_buf(),
            retry_delay: Duration::from_millis(10),
            retry_count,
        })
        .unwrap()
    }

    fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = Arc::clone(&events);
        (Box::new(move |event: ProgressEvent| e.lock().unwrap().push(event)), events)
    }

    fn put_paths(server: &MockServer) -> Vec<String> {
        server
            .requests()
            .into_iter()
            .filter(|r| r.method == "PUT")
            .map(|r| r.path)
            .collect()
    }

    #[tokio::test]
    async fn uploads_each_file_once_in_order() {
        let dir = tree();
        let server = MockServer::start(|_| MockResponse::status(201)).await;
        let client = client(&server);
        let (sink, events) = recording_sink();

        UploadOrchestrator::new(&client, sink)
            .upload(&request(&dir, 3))
            .await
            .unwrap();

        let prefix = "/service/local/staging/deployByRepositoryId/r0";
        assert_eq!(
            put_paths(&server),
            [
                format!("{prefix}/a.pom"),
                format!("{prefix}/b/c.jar"),
                format!("{prefix}/b/d%20e.txt"),
            ]
        );
        assert_eq!(server.count("HEAD"), 3);
        assert!(
            server
                .requests()
                .iter()
                .filter(|r| r.method == "HEAD")
                .all(|r| r.path == "/service/local/staging/repository/r0")
        );

        let started: Vec<(usize, String)> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::FileStarted {
                    file_index_current,
                    file_index_max,
                    name,
                    ..
                } => {
                    assert_eq!(*file_index_max, 3);
                    Some((*file_index_current, name.clone()))
                }
                ProgressEvent::Update { .. } => None,
            })
            .collect();
        assert_eq!(started.len(), 3);
        assert_eq!(started.iter().map(|(i, _)| *i).collect::<Vec<_>>(), [1, 2, 3]);
        assert!(started[1].1.ends_with("c.jar"));
    }

    #[tokio::test]
    async fn first_failed_file_aborts_request() {
        let dir = tree();
        let server = MockServer::start(|req| {
            if req.method == "PUT" && req.path.ends_with("/b/c.jar") {
                MockResponse::status(500)
            } else {
                MockResponse::status(201)
            }
        })
        .await;
        let client = client(&server);
        let (sink, _) = recording_sink();

        let err = UploadOrchestrator::new(&client, sink)
            .upload(&request(&dir, 2))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::Client(ClientError::UploadFailed { attempts: 2, .. })
        ));
        let puts = put_paths(&server);
        assert_eq!(puts.len(), 3);
        assert!(puts[0].ends_with("/a.pom"));
        assert!(puts[1..].iter().all(|p| p.ends_with("/b/c.jar")));
        assert_eq!(server.count("HEAD"), 3);
    }

    #[tokio::test]
    async fn empty_request_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start(|_| MockResponse::status(201)).await;
        let client = client(&server);
        let (sink, events) = recording_sink();

        UploadOrchestrator::new(&client, sink)
            .upload(&request(&dir, 1))
            .await
            .unwrap();

        assert!(server.requests().is_empty());
        assert!(events.lock().unwrap().is_empty());
    }
}
