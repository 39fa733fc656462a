//! Output destination handling
//!
//! The engine refuses to overwrite an existing model, so whatever sits at the
//! destination is removed before a session is created.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, SessionError};

/// Clears the destination path for the final artifact
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputPathPreparer;

impl OutputPathPreparer {
    pub fn new() -> Self {
        Self
    }

    /// Remove any existing entry at `path`. A missing path is already prepared.
    pub async fn prepare(&self, path: &Path) -> Result<()> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(unwritable(path, e)),
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        removed.map_err(|e| unwritable(path, e))?;

        info!("Removed existing output at {}", path.display());
        Ok(())
    }
}

fn unwritable(path: &Path, source: std::io::Error) -> SessionError {
    SessionError::DestinationUnwritable {
        path: PathBuf::from(path),
        source,
    }
}
