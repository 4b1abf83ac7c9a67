//! Single-file uploads with a preflight check and bounded retries.

use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use nexstage_protocol::codec;
use nexstage_transfer::{
    ProgressCounter, SharedProgressCounter, StatisticsConsumer, StatisticsTracker, TimedReader,
    TransferStatistics, require_absolute,
};
use reqwest::Body;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::client::content_type;
use crate::error::{ClientError, log_nexus_errors};

/// How often, and how far apart, a file upload is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling. 1 means a single attempt.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// One file of a deployment and where it goes.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Repository resource checked before each attempt.
    pub service_url: String,
    /// URL the file is PUT to.
    pub target_url: String,
    /// Absolute path of the local file.
    pub file: PathBuf,
    /// 0-based position of the file in the deployment.
    pub file_index: usize,
    pub file_count: usize,
}

/// Uploads one file, retrying failed attempts after a fixed delay.
///
/// Each attempt starts a new file in the progress counter, issues a HEAD
/// against the service URL and then streams the file in a PUT. An error
/// status or a transport failure in either request ends the attempt.
pub struct RetryingUploader {
    http: reqwest::Client,
    upload: FileUpload,
    policy: RetryPolicy,
    counter: SharedProgressCounter,
}

impl RetryingUploader {
    pub fn new(
        http: reqwest::Client,
        upload: FileUpload,
        policy: RetryPolicy,
        counter: SharedProgressCounter,
    ) -> Result<Self, ClientError> {
        require_absolute(&upload.file)?;
        if policy.max_attempts < 1 {
            return Err(ClientError::Config(
                "the number of upload attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            http,
            upload,
            policy,
            counter,
        })
    }

    pub fn file(&self) -> &Path {
        &self.upload.file
    }

    /// Runs attempts until one succeeds or the policy is exhausted.
    pub async fn upload(&self) -> Result<(), ClientError> {
        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            match self.attempt(attempt).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(
                        file = %self.upload.file.display(),
                        attempt,
                        max,
                        error = %e,
                        "upload attempt failed"
                    );
                    if attempt < max {
                        debug!(delay = ?self.policy.delay, "retrying upload after delay");
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        Err(ClientError::UploadFailed {
            path: self.upload.file.clone(),
            attempts: max,
        })
    }

    async fn attempt(&self, attempt: u32) -> Result<(), ClientError> {
        let size = tokio::fs::metadata(&self.upload.file).await?.len();
        let name = self.upload.file.display().to_string();
        let generation = {
            let mut counter = lock(&self.counter);
            counter.start_file(
                &name,
                size,
                attempt,
                self.policy.max_attempts,
                self.upload.file_index,
                self.upload.file_count,
            );
            counter.generation()
        };

        self.preflight().await?;

        let file = tokio::fs::File::open(&self.upload.file).await?;
        let consumer = progress_consumer(Arc::clone(&self.counter), generation);
        let reader = TimedReader::new(file, StatisticsTracker::start(Some(size), consumer));

        let response = self
            .http
            .put(&self.upload.target_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(reader)))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status >= 400 {
            let content_type = content_type(&response);
            let body = response.bytes().await?;
            let errors =
                codec::parse_errors_if_present(&content_type, &self.upload.target_url, &body)?;
            error!(url = %self.upload.target_url, status, "upload rejected");
            log_nexus_errors(&errors);
            return Err(ClientError::Http {
                status,
                message: format!("Error: {status}"),
                errors,
            });
        }
        Ok(())
    }

    async fn preflight(&self) -> Result<(), ClientError> {
        let response = self.http.head(&self.upload.service_url).send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            error!(url = %self.upload.service_url, status, "preflight rejected");
            return Err(ClientError::Http {
                status,
                message: format!("Error: {status}"),
                errors: Vec::new(),
            });
        }
        Ok(())
    }
}

/// Feeds byte counts into `counter` while it is still on attempt
/// `generation`. Samples from a stream whose attempt has ended are dropped.
fn progress_consumer(counter: SharedProgressCounter, generation: u64) -> StatisticsConsumer {
    Arc::new(move |stats: TransferStatistics| {
        let mut counter = lock(&counter);
        if counter.generation() == generation {
            counter.set_size_received(stats.transferred_total);
        }
    })
}

fn lock(counter: &SharedProgressCounter) -> MutexGuard<'_, ProgressCounter> {
    counter.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockResponse, MockServer, RecordedRequest};
    use nexstage_transfer::ProgressEvent;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        _dir: tempfile::TempDir,
        file: PathBuf,
        events: Arc<Mutex<Vec<ProgressEvent>>>,
        counter: SharedProgressCounter,
    }

    fn fixture(content: &[u8]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib-1.0.jar");
        std::fs::write(&file, content).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = Arc::clone(&events);
        let counter =
            ProgressCounter::shared(Box::new(move |event: ProgressEvent| e.lock().unwrap().push(event)));
        Fixture {
            _dir: dir,
            file,
            events,
            counter,
        }
    }

    fn uploader(server: &MockServer, fixture: &Fixture, max_attempts: u32) -> RetryingUploader {
        let upload = FileUpload {
            service_url: format!("{}/service/local/staging/repository/r0", server.url()),
            target_url: format!(
                "{}/service/local/staging/deployByRepositoryId/r0/lib-1.0.jar",
                server.url()
            ),
            file: fixture.file.clone(),
            file_index: 0,
            file_count: 1,
        };
        RetryingUploader::new(
            reqwest::Client::new(),
            upload,
            RetryPolicy::new(max_attempts, Duration::from_millis(10)),
            Arc::clone(&fixture.counter),
        )
        .unwrap()
    }

    /// Fails the first `failures` requests with the given method, then
    /// answers 201.
    fn failing(method: &'static str, failures: usize) -> impl Fn(&RecordedRequest) -> MockResponse {
        let seen = AtomicUsize::new(0);
        move |req| {
            if req.method == method && seen.fetch_add(1, Ordering::SeqCst) < failures {
                MockResponse::status(500)
            } else {
                MockResponse::status(201)
            }
        }
    }

    fn started_attempts(fixture: &Fixture) -> Vec<u32> {
        fixture
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::FileStarted { .. }))
            .map(|e| e.attempt_current())
            .collect()
    }

    #[tokio::test]
    async fn single_attempt_succeeds() {
        let fixture = fixture(b"0123456789");
        let server = MockServer::start(|_| MockResponse::status(201)).await;

        uploader(&server, &fixture, 3).upload().await.unwrap();

        assert_eq!(server.count("HEAD"), 1);
        assert_eq!(server.count("PUT"), 1);
        let put = server
            .requests()
            .into_iter()
            .find(|r| r.method == "PUT")
            .unwrap();
        assert_eq!(put.path, "/service/local/staging/deployByRepositoryId/r0/lib-1.0.jar");
        assert_eq!(put.body, b"0123456789");
        assert_eq!(put.header("content-type"), Some("application/octet-stream"));
        assert_eq!(put.header("content-length"), Some("10"));
        assert_eq!(started_attempts(&fixture), [1]);
    }

    #[tokio::test]
    async fn failed_preflight_skips_put_and_retries() {
        let fixture = fixture(b"data");
        let server = MockServer::start(failing("HEAD", 1)).await;

        uploader(&server, &fixture, 3).upload().await.unwrap();

        assert_eq!(server.count("HEAD"), 2);
        assert_eq!(server.count("PUT"), 1);
        assert_eq!(started_attempts(&fixture), [1, 2]);
    }

    #[tokio::test]
    async fn failed_put_retries_whole_attempt() {
        let fixture = fixture(b"data");
        let server = MockServer::start(failing("PUT", 1)).await;

        uploader(&server, &fixture, 3).upload().await.unwrap();

        assert_eq!(server.count("HEAD"), 2);
        assert_eq!(server.count("PUT"), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_fail() {
        let fixture = fixture(b"data");
        let server = MockServer::start(failing("HEAD", usize::MAX)).await;

        let err = uploader(&server, &fixture, 3).upload().await.unwrap_err();

        assert_eq!(server.count("HEAD"), 3);
        assert_eq!(server.count("PUT"), 0);
        match err {
            ClientError::UploadFailed { path, attempts } => {
                assert_eq!(path, fixture.file);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(started_attempts(&fixture), [1, 2, 3]);
    }

    #[tokio::test]
    async fn single_attempt_policy_does_not_retry() {
        let fixture = fixture(b"data");
        let server = MockServer::start(failing("PUT", usize::MAX)).await;

        let err = uploader(&server, &fixture, 1).upload().await.unwrap_err();

        assert!(matches!(err, ClientError::UploadFailed { attempts: 1, .. }));
        assert_eq!(server.count("HEAD"), 1);
        assert_eq!(server.count("PUT"), 1);
    }

    #[tokio::test]
    async fn rejected_put_reports_server_errors() {
        let fixture = fixture(b"data");
        let server = MockServer::start(|req| {
            if req.method == "PUT" {
                MockResponse::xml(
                    400,
                    "<nexus-error><errors><error><id>*</id><msg>Bad path</msg></error></errors></nexus-error>",
                )
            } else {
                MockResponse::status(200)
            }
        })
        .await;

        let uploader = uploader(&server, &fixture, 1);
        let err = uploader.attempt(1).await.unwrap_err();
        match err {
            ClientError::Http {
                status,
                message,
                errors,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Error: 400");
                assert_eq!(errors[0].message, "Bad path");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_consumes_attempts() {
        let fixture = fixture(b"data");
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let upload = FileUpload {
            service_url: format!("http://{closed}/service/local/staging/repository/r0"),
            target_url: format!(
                "http://{closed}/service/local/staging/deployByRepositoryId/r0/lib-1.0.jar"
            ),
            file: fixture.file.clone(),
            file_index: 0,
            file_count: 1,
        };
        let uploader = RetryingUploader::new(
            reqwest::Client::new(),
            upload,
            RetryPolicy::new(3, Duration::from_millis(10)),
            Arc::clone(&fixture.counter),
        )
        .unwrap();

        assert!(matches!(
            uploader.attempt(1).await,
            Err(ClientError::Transport(_))
        ));
        fixture.events.lock().unwrap().clear();

        let err = uploader.upload().await.unwrap_err();
        assert!(matches!(err, ClientError::UploadFailed { attempts: 3, .. }));
        assert_eq!(started_attempts(&fixture), [1, 2, 3]);
    }

    #[tokio::test]
    async fn each_put_reports_progress_for_its_own_attempt() {
        let fixture = fixture(&[7u8; 4096]);
        let server = MockServer::start(failing("PUT", 1)).await;

        uploader(&server, &fixture, 3).upload().await.unwrap();

        let events = fixture.events.lock().unwrap().clone();
        let mut current = None;
        let mut updated = Vec::new();
        for event in &events {
            match event {
                ProgressEvent::FileStarted {
                    attempt_current, ..
                } => {
                    current = Some(*attempt_current);
                    updated.push(false);
                }
                ProgressEvent::Update {
                    attempt_current,
                    bytes_max,
                    ..
                } => {
                    assert_eq!(Some(*attempt_current), current);
                    assert_eq!(*bytes_max, 4096);
                    if let Some(last) = updated.last_mut() {
                        *last = true;
                    }
                }
            }
        }
        assert_eq!(updated, [true, true]);
    }

    #[tokio::test]
    async fn samples_from_an_ended_attempt_are_ignored() {
        let fixture = fixture(b"data");
        let stale = {
            let mut counter = fixture.counter.lock().unwrap();
            counter.start_file("lib-1.0.jar", 4, 1, 2, 0, 1);
            progress_consumer(Arc::clone(&fixture.counter), counter.generation())
        };
        let current = {
            let mut counter = fixture.counter.lock().unwrap();
            counter.start_file("lib-1.0.jar", 4, 2, 2, 0, 1);
            progress_consumer(Arc::clone(&fixture.counter), counter.generation())
        };
        let sample = TransferStatistics {
            expected: Some(4),
            transferred_total: 3,
            octets_per_second: 3,
        };

        stale(sample);
        assert_eq!(fixture.events.lock().unwrap().len(), 2);

        current(sample);
        let events = fixture.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        match &events[2] {
            ProgressEvent::Update {
                attempt_current,
                bytes_sent,
                ..
            } => {
                assert_eq!(*attempt_current, 2);
                assert_eq!(*bytes_sent, 3);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn relative_file_is_rejected() {
        let upload = FileUpload {
            service_url: "http://localhost/s".into(),
            target_url: "http://localhost/t".into(),
            file: PathBuf::from("relative/lib.jar"),
            file_index: 0,
            file_count: 1,
        };
        let counter = ProgressCounter::shared(Box::new(|_| {}));
        let result = RetryingUploader::new(
            reqwest::Client::new(),
            upload,
            RetryPolicy::new(1, Duration::ZERO),
            counter,
        );
        assert!(matches!(result, Err(ClientError::Transfer(_))));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let fixture = fixture(b"");
        let upload = FileUpload {
            service_url: "http://localhost/s".into(),
            target_url: "http://localhost/t".into(),
            file: fixture.file.clone(),
            file_index: 0,
            file_count: 1,
        };
        let result = RetryingUploader::new(
            reqwest::Client::new(),
            upload,
            RetryPolicy::new(0, Duration::ZERO),
            Arc::clone(&fixture.counter),
        );
        assert!(matches!(result, Err(ClientError::Config(_))));
    }
}
