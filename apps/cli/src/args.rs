//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "nexstage")]
#[command(about = "Create, fill, close and release Nexus staging repositories")]
#[command(version)]
pub struct Args {
    /// Configuration file (default: ~/.config/nexstage/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Nexus server base URI
    #[arg(long = "base-uri", global = true)]
    pub base_uri: Option<String>,

    /// User name for HTTP basic authentication
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Password for HTTP basic authentication
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Staging profile new repositories are created in
    #[arg(long = "staging-profile-id", global = true)]
    pub staging_profile_id: Option<String>,

    /// Upload attempts per file
    #[arg(long = "retry-count", global = true)]
    pub retry_count: Option<u32>,

    /// Seconds to wait between upload attempts
    #[arg(long = "retry-seconds", global = true)]
    pub retry_seconds: Option<u64>,

    /// Log level, unless RUST_LOG is set
    #[arg(long, global = true, value_enum, default_value_t = Verbosity::Info)]
    pub verbose: Verbosity,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a staging repository and print its id
    Create {
        #[arg(long)]
        description: String,
        /// Write the id to this file instead of standard output
        #[arg(long = "output-file")]
        output_file: Option<PathBuf>,
    },
    /// List staging repositories
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one staging repository
    Show {
        #[arg(long)]
        repository: String,
        #[arg(long)]
        json: bool,
    },
    /// Close a repository and wait until the server has closed it
    Close {
        #[arg(long)]
        repository: String,
    },
    /// Drop a repository
    Drop {
        #[arg(long)]
        repository: String,
    },
    /// Release a closed repository, dropping it afterwards
    Release {
        #[arg(long)]
        repository: String,
    },
    /// Upload every file below a directory into a repository
    Upload {
        #[arg(long)]
        repository: String,
        #[arg(long)]
        directory: PathBuf,
    },
    /// Print the program version
    Version,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Verbosity {
    /// Returns the level as an `EnvFilter` directive.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_with_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "nexstage",
            "upload",
            "--repository",
            "comexample-1000",
            "--directory",
            "target/staging",
            "--retry-count",
            "3",
            "--verbose",
            "debug",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Command::Upload {
                repository: "comexample-1000".into(),
                directory: PathBuf::from("target/staging"),
            }
        );
        assert_eq!(args.retry_count, Some(3));
        assert_eq!(args.verbose, Verbosity::Debug);
    }

    #[test]
    fn verbosity_defaults_to_info() {
        let args = Args::try_parse_from(["nexstage", "list"]).unwrap();
        assert_eq!(args.verbose.as_filter(), "info");
        assert_eq!(args.command, Command::List { json: false });
    }

    #[test]
    fn create_requires_description() {
        assert!(Args::try_parse_from(["nexstage", "create"]).is_err());
        let args =
            Args::try_parse_from(["nexstage", "create", "--description", "1.0", "--output-file", "id.txt"])
                .unwrap();
        assert_eq!(
            args.command,
            Command::Create {
                description: "1.0".into(),
                output_file: Some(PathBuf::from("id.txt")),
            }
        );
    }

    #[test]
    fn rejects_unknown_verbosity() {
        assert!(Args::try_parse_from(["nexstage", "--verbose", "loud", "list"]).is_err());
    }
}
