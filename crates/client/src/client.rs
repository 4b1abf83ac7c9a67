//! Staging lifecycle requests against a Nexus server.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use nexstage_protocol::{StagingRepository, codec};
use nexstage_transfer::SharedProgressCounter;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, log_nexus_errors};
use crate::uploader::{FileUpload, RetryPolicy, RetryingUploader};

/// Characters escaped in a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Boxed future returned by [`StagingService`] methods.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// The repository lifecycle operations.
///
/// Implemented by [`NexusClient`]; tests substitute their own.
pub trait StagingService: Send + Sync {
    /// Lists the repositories visible to the configured user.
    fn repositories(&self) -> ServiceFuture<'_, Vec<StagingRepository>>;

    /// Fetches one repository. `None` if the server does not know it.
    fn repository<'a>(&'a self, id: &'a str) -> ServiceFuture<'a, Option<StagingRepository>>;

    /// Creates a repository in the configured staging profile and returns
    /// its id.
    fn create<'a>(&'a self, description: &'a str) -> ServiceFuture<'a, String>;

    fn drop_repositories<'a>(&'a self, ids: &'a [String]) -> ServiceFuture<'a, ()>;

    fn close<'a>(&'a self, ids: &'a [String]) -> ServiceFuture<'a, ()>;

    fn release<'a>(&'a self, ids: &'a [String]) -> ServiceFuture<'a, ()>;
}

/// Creates a client for the given configuration.
pub fn create_client(config: ClientConfig) -> Result<NexusClient, ClientError> {
    NexusClient::new(config)
}

/// HTTP client for the Nexus staging REST API.
///
/// Every request carries the configured credentials as a preemptive
/// `Authorization: Basic` header and the [`ClientConfig::user_agent`].
pub struct NexusClient {
    http: reqwest::Client,
    config: ClientConfig,
    base_url: String,
}

impl NexusClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url().to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URI {base_url}: {e}")))?;

        let credentials = BASE64.encode(format!("{}:{}", config.user_name, config.password));
        let mut auth = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| ClientError::Config(format!("invalid credentials: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(format!("cannot build HTTP client: {e}")))?;

        debug!(base = %base_url, user = %config.user_name, "created staging client");
        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a repository's lifecycle resource.
    pub fn repository_url(&self, repository_id: &str) -> String {
        format!(
            "{}/service/local/staging/repository/{}",
            self.base_url,
            encode_segment(repository_id)
        )
    }

    /// URL a file at `relative` is deployed to inside a repository.
    ///
    /// Each path component becomes one percent-encoded segment.
    pub fn deploy_url(&self, repository_id: &str, relative: &Path) -> String {
        let mut url = format!(
            "{}/service/local/staging/deployByRepositoryId/{}",
            self.base_url,
            encode_segment(repository_id)
        );
        for component in relative.components() {
            if let std::path::Component::Normal(part) = component {
                url.push('/');
                url.push_str(&encode_segment(&part.to_string_lossy()));
            }
        }
        url
    }

    /// Builds an uploader for one file of a deployment.
    pub fn uploader(
        &self,
        upload: FileUpload,
        policy: RetryPolicy,
        counter: SharedProgressCounter,
    ) -> Result<RetryingUploader, ClientError> {
        RetryingUploader::new(self.http.clone(), upload, policy, counter)
    }

    pub async fn staging_repositories(&self) -> Result<Vec<StagingRepository>, ClientError> {
        let url = format!("{}/service/local/staging/profile_repositories", self.base_url);
        let response = check_status(&url, self.http.get(&url).send().await?).await?;
        let body = response.bytes().await?;
        Ok(codec::parse_repositories(&url, &body)?)
    }

    pub async fn staging_repository(
        &self,
        repository_id: &str,
    ) -> Result<Option<StagingRepository>, ClientError> {
        let url = self.repository_url(repository_id);
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(repository = %repository_id, "repository not found");
            return Ok(None);
        }
        let response = check_status(&url, response).await?;
        let body = response.bytes().await?;
        Ok(Some(codec::parse_repository(&url, &body)?))
    }

    pub async fn staging_repository_create(&self, description: &str) -> Result<String, ClientError> {
        let url = format!(
            "{}/service/local/staging/profiles/{}/start",
            self.base_url,
            encode_segment(&self.config.staging_profile_id)
        );
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/xml")
            .body(codec::encode_create_request(description))
            .send()
            .await?;
        let response = check_status(&url, response).await?;
        let body = response.bytes().await?;
        let id = codec::parse_created_repository_id(&url, &body)?;
        info!(repository = %id, profile = %self.config.staging_profile_id, "created staging repository");
        Ok(id)
    }

    pub async fn staging_repository_drop(&self, ids: &[String]) -> Result<(), ClientError> {
        self.bulk("drop", codec::encode_bulk_request(ids)).await
    }

    pub async fn staging_repository_close(&self, ids: &[String]) -> Result<(), ClientError> {
        self.bulk("close", codec::encode_bulk_request(ids)).await
    }

    pub async fn staging_repository_release(&self, ids: &[String]) -> Result<(), ClientError> {
        self.bulk("promote", codec::encode_release_request(ids)).await
    }

    async fn bulk(&self, action: &str, body: Vec<u8>) -> Result<(), ClientError> {
        let url = format!("{}/service/local/staging/bulk/{action}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await?;
        let response = check_status(&url, response).await?;

        let status = response.status().as_u16();
        if status != StatusCode::CREATED.as_u16() {
            return Err(ClientError::Http {
                status,
                message: format!("Expected server to return 201 Created, but received: {status}"),
                errors: Vec::new(),
            });
        }
        debug!(action, "bulk request accepted");
        Ok(())
    }
}

impl StagingService for NexusClient {
    fn repositories(&self) -> ServiceFuture<'_, Vec<StagingRepository>> {
        Box::pin(self.staging_repositories())
    }

    fn repository<'a>(&'a self, id: &'a str) -> ServiceFuture<'a, Option<StagingRepository>> {
        Box::pin(self.staging_repository(id))
    }

    fn create<'a>(&'a self, description: &'a str) -> ServiceFuture<'a, String> {
        Box::pin(self.staging_repository_create(description))
    }

    fn drop_repositories<'a>(&'a self, ids: &'a [String]) -> ServiceFuture<'a, ()> {
        Box::pin(self.staging_repository_drop(ids))
    }

    fn close<'a>(&'a self, ids: &'a [String]) -> ServiceFuture<'a, ()> {
        Box::pin(self.staging_repository_close(ids))
    }

    fn release<'a>(&'a self, ids: &'a [String]) -> ServiceFuture<'a, ()> {
        Box::pin(self.staging_repository_release(ids))
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Returns the `Content-Type` header, or an empty string.
pub(crate) fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Passes responses below 400 through. Anything else becomes
/// [`ClientError::Http`] carrying the reason phrase and any errors the
/// body describes.
async fn check_status(url: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(response);
    }

    let content_type = content_type(&response);
    let body = response.bytes().await.unwrap_or_default();
    let errors = match codec::parse_errors_if_present(&content_type, url, &body) {
        Ok(errors) => errors,
        Err(e) => {
            debug!(error = %e, "could not decode error response");
            Vec::new()
        }
    };
    log_nexus_errors(&errors);

    Err(ClientError::Http {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Unknown").to_string(),
        errors,
    })
}
