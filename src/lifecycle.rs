//! Input and output file guards run before a session starts

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Result of [`remove_if_present`]
#[derive(Debug)]
pub enum RemoveOutcome {
    Removed,
    /// Nothing to remove; counts as success
    Absent,
    /// Removal failed for another reason. Already logged as a warning.
    Failed(io::Error),
}

impl RemoveOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, RemoveOutcome::Failed(_))
    }
}

/// Fail with `InputUnavailable` unless `path` is a non-empty regular file.
/// Returns the file length.
pub fn ensure_input_readable(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let unavailable = |reason: String| Error::InputUnavailable {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => unavailable("file does not exist".to_string()),
        _ => unavailable(e.to_string()),
    })?;
    if !metadata.is_file() {
        return Err(unavailable("not a regular file".to_string()));
    }
    if metadata.len() == 0 {
        return Err(unavailable("file is empty".to_string()));
    }
    Ok(metadata.len())
}

/// Delete `path` if it exists
///
/// A missing file is not an error. Any other failure is logged and
/// returned, never raised.
pub fn remove_if_present(path: impl AsRef<Path>) -> RemoveOutcome {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed previous output");
            RemoveOutcome::Removed
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => RemoveOutcome::Absent,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not remove previous output");
            RemoveOutcome::Failed(e)
        }
    }
}

/// True for an existing regular file with at least one byte
pub fn is_non_empty_file(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}
