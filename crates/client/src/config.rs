//! Client configuration.

/// Base URI used when none is configured.
pub const DEFAULT_BASE_URI: &str = "https://oss.sonatype.org:443/";

/// Name and version of the application using the client.
///
/// Both appear in the `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationVersion {
    pub name: String,
    pub version: String,
}

impl ApplicationVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Connection settings for a Nexus server.
#[derive(Clone)]
pub struct ClientConfig {
    /// Server base URI. Trailing slashes are ignored.
    pub base_uri: String,
    pub user_name: String,
    pub password: String,
    /// Staging profile new repositories are created under.
    pub staging_profile_id: String,
    pub application: ApplicationVersion,
}

impl ClientConfig {
    /// Creates a configuration for [`DEFAULT_BASE_URI`].
    pub fn new(
        user_name: impl Into<String>,
        password: impl Into<String>,
        staging_profile_id: impl Into<String>,
        application: ApplicationVersion,
    ) -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            user_name: user_name.into(),
            password: password.into(),
            staging_profile_id: staging_profile_id.into(),
            application,
        }
    }

    /// Sets a different server base URI.
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    /// Returns `app/version (nexstage-client/version)`.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} ({}/{})",
            self.application.name,
            self.application.version,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    }

    /// Returns the base URI without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.base_uri.trim_end_matches('/')
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_uri", &self.base_uri)
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("staging_profile_id", &self.staging_profile_id)
            .field("application", &self.application)
            .finish()
    }
}
