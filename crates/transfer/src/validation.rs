use std::path::{Component, Path};

use crate::TransferError;

/// Validates a path that will be appended to a repository deploy URL.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_relative_path(path: &Path) -> Result<(), TransferError> {
    if path.as_os_str().is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "path must be relative: {}",
            path.display()
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {}",
                    path.display()
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "path must be relative: {}",
                    path.display()
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Validates that a local path is absolute.
pub fn require_absolute(path: &Path) -> Result<(), TransferError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(TransferError::InvalidPath(format!(
            "path must be absolute: {}",
            path.display()
        )))
    }
}
