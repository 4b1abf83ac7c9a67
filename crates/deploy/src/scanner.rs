//! Directory scanning for upload.
//!
//! Recursively walks an artifact directory and produces an
//! [`UploadRequest`] whose files are sorted paths relative to it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nexstage_transfer::{require_absolute, validate_relative_path};
use tracing::debug;

use crate::error::DeployError;

/// Inputs to [`create_upload_request`].
#[derive(Debug, Clone)]
pub struct UploadRequestParameters {
    pub repository_id: String,
    /// Directory to upload. Relative paths are resolved against the
    /// current directory.
    pub base_directory: PathBuf,
    pub retry_delay: Duration,
    pub retry_count: u32,
}

/// A validated set of files to upload into one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    repository_id: String,
    base_directory: PathBuf,
    files: Vec<PathBuf>,
    retry_delay: Duration,
    retry_count: u32,
}

impl UploadRequest {
    /// Checks that the base directory is absolute, every file is relative
    /// and at least one attempt is allowed.
    pub fn new(
        repository_id: impl Into<String>,
        base_directory: PathBuf,
        files: Vec<PathBuf>,
        retry_delay: Duration,
        retry_count: u32,
    ) -> Result<Self, DeployError> {
        require_absolute(&base_directory)?;
        for file in &files {
            validate_relative_path(file)?;
        }
        if retry_count < 1 {
            return Err(DeployError::InvalidRequest(
                "retry count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            repository_id: repository_id.into(),
            base_directory,
            files,
            retry_delay,
            retry_count,
        })
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Files relative to [`base_directory`](Self::base_directory), in
    /// upload order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

/// Scans the base directory and builds an upload request for every
/// regular file in it.
pub fn create_upload_request(
    params: UploadRequestParameters,
) -> Result<UploadRequest, DeployError> {
    let base = std::path::absolute(&params.base_directory)?;

    let mut files = Vec::new();
    walk_dir(&base, &base, &mut files)?;
    files.sort();

    for file in &files {
        debug!("upload {} -> /{}", base.join(file).display(), forward_slashes(file));
    }

    UploadRequest::new(
        params.repository_id,
        base,
        files,
        params.retry_delay,
        params.retry_count,
    )
}

/// Symlinked directories are not entered. A symlink to a regular file is
/// kept, a dangling one is skipped.
fn walk_dir(root: &Path, current: &Path, files: &mut Vec<PathBuf>) -> Result<(), DeployError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        let is_file = if file_type.is_dir() {
            walk_dir(root, &path, files)?;
            false
        } else if file_type.is_symlink() {
            std::fs::metadata(&path).is_ok_and(|m| m.is_file())
        } else {
            file_type.is_file()
        };

        if is_file {
            let relative = path.strip_prefix(root).map_err(std::io::Error::other)?;
            files.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// Joins path components with `/` regardless of platform.
pub(crate) fn forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
