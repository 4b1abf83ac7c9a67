//! Configuration file and effective settings.
//!
//! The file is TOML, read from `--config` or else from
//! `$XDG_CONFIG_HOME/nexstage/config.toml` (`~/.config/nexstage/config.toml`
//! when `XDG_CONFIG_HOME` is unset). Command-line flags override it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use nexstage_client::{ApplicationVersion, ClientConfig, DEFAULT_BASE_URI};
use serde::{Deserialize, Serialize};

use crate::args::Args;

/// Contents of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_base_uri")]
    pub base_uri: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub staging_profile_id: Option<String>,

    /// Upload attempts per file.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_seconds")]
    pub retry_seconds: u64,

    /// Seconds between polls while a repository is transitioning.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,

    /// Seconds between "still executing" log lines.
    #[serde(default = "default_chatter_seconds")]
    pub chatter_seconds: u64,
}

fn default_base_uri() -> String {
    DEFAULT_BASE_URI.into()
}

fn default_retry_count() -> u32 {
    25
}

fn default_retry_seconds() -> u64 {
    5
}

fn default_poll_seconds() -> u64 {
    2
}

fn default_chatter_seconds() -> u64 {
    20
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            base_uri: default_base_uri(),
            user: None,
            password: None,
            staging_profile_id: None,
            retry_count: default_retry_count(),
            retry_seconds: default_retry_seconds(),
            poll_seconds: default_poll_seconds(),
            chatter_seconds: default_chatter_seconds(),
        }
    }
}

impl FileConfig {
    /// Loads `explicit` if given, which must exist. Otherwise loads the
    /// default file if there is one, or returns the defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

fn default_config_path() -> Option<PathBuf> {
    config_path_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = xdg_config_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("nexstage").join("config.toml"))
}

/// Effective settings after applying command-line overrides.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientConfig,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    pub chatter_period: Duration,
}

impl Settings {
    pub fn resolve(args: &Args, file: FileConfig) -> anyhow::Result<Self> {
        let user = required(args.user.clone().or(file.user), "user", "--user")?;
        let password = required(args.password.clone().or(file.password), "password", "--password")?;
        let profile = required(
            args.staging_profile_id.clone().or(file.staging_profile_id),
            "staging_profile_id",
            "--staging-profile-id",
        )?;

        let retry_count = args.retry_count.unwrap_or(file.retry_count);
        if retry_count < 1 {
            bail!("retry_count must be at least 1");
        }
        if file.chatter_seconds < 1 {
            bail!("chatter_seconds must be at least 1");
        }

        let application = ApplicationVersion::new("nexstage", env!("CARGO_PKG_VERSION"));
        let client = ClientConfig::new(user, password, profile, application)
            .with_base_uri(args.base_uri.clone().unwrap_or(file.base_uri));

        Ok(Self {
            client,
            retry_count,
            retry_delay: Duration::from_secs(args.retry_seconds.unwrap_or(file.retry_seconds)),
            poll_interval: Duration::from_secs(file.poll_seconds),
            chatter_period: Duration::from_secs(file.chatter_seconds),
        })
    }
}

fn required(value: Option<String>, key: &str, flag: &str) -> anyhow::Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("missing {key}: pass {flag} or set `{key}` in the configuration file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["nexstage"];
        argv.extend_from_slice(extra);
        argv.push("list");
        Args::try_parse_from(argv).unwrap()
    }

    fn complete_file() -> FileConfig {
        FileConfig {
            user: Some("deployer".into()),
            password: Some("s3cret".into()),
            staging_profile_id: Some("12ab".into()),
            ..FileConfig::default()
        }
    }

    #[test]
    fn default_config() {
        let config = FileConfig::default();
        assert_eq!(config.base_uri, "https://oss.sonatype.org:443/");
        assert_eq!(config.retry_count, 25);
        assert_eq!(config.retry_seconds, 5);
        assert_eq!(config.poll_seconds, 2);
        assert_eq!(config.chatter_seconds, 20);
        assert!(config.user.is_none());
    }

    #[test]
    fn config_partial_toml() {
        let config: FileConfig = toml::from_str(
            r#"
            user = "deployer"
            retry_count = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.user.as_deref(), Some("deployer"));
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_seconds, 5);
        assert_eq!(config.base_uri, DEFAULT_BASE_URI);
    }

    #[test]
    fn config_load_explicit_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "base_uri = \"http://localhost:8081/nexus\"\nstaging_profile_id = \"12ab\"\n",
        )
        .unwrap();

        let config = FileConfig::load(Some(&path)).unwrap();
        assert_eq!(config.base_uri, "http://localhost:8081/nexus");
        assert_eq!(config.staging_profile_id.as_deref(), Some("12ab"));
    }

    #[test]
    fn config_load_missing_explicit_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FileConfig::load(Some(&tmp.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn config_load_rejects_bad_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "retry_count = \"many\"").unwrap();
        assert!(FileConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn config_path_prefers_xdg() {
        let path = config_path_from(Some("/xdg".into()), Some("/home/u".into())).unwrap();
        assert_eq!(path, Path::new("/xdg/nexstage/config.toml"));

        let path = config_path_from(Some("".into()), Some("/home/u".into())).unwrap();
        assert_eq!(path, Path::new("/home/u/.config/nexstage/config.toml"));

        assert!(config_path_from(None, None).is_none());
    }

    #[test]
    fn flags_override_file() {
        let args = args(&["--user", "other", "--retry-count", "2", "--base-uri", "http://h/"]);
        let settings = Settings::resolve(&args, complete_file()).unwrap();

        assert_eq!(settings.client.user_name, "other");
        assert_eq!(settings.client.password, "s3cret");
        assert_eq!(settings.client.base_uri, "http://h/");
        assert_eq!(settings.retry_count, 2);
        assert_eq!(settings.retry_delay, Duration::from_secs(5));
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.chatter_period, Duration::from_secs(20));
        assert!(settings.client.user_agent().starts_with("nexstage/"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let err = Settings::resolve(&args(&[]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--user"));

        let file = FileConfig {
            staging_profile_id: None,
            ..complete_file()
        };
        let err = Settings::resolve(&args(&[]), file).unwrap_err();
        assert!(err.to_string().contains("staging_profile_id"));
    }

    #[test]
    fn zero_retry_count_is_rejected() {
        let err = Settings::resolve(&args(&["--retry-count", "0"]), complete_file()).unwrap_err();
        assert!(err.to_string().contains("retry_count"));
    }
}
