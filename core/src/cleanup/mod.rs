//! Scratch directory cleanup
//!
//! The engine leaves intermediate files in its working directory. After a
//! successful reconstruction they are purged. Cleanup is best effort: every
//! failure is logged and swallowed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a purge pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
    pub preserved: usize,
}

/// Purges the engine's scratch directory
#[derive(Debug, Clone)]
pub struct CleanupManager {
    scratch_dir: PathBuf,
}

impl CleanupManager {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Delete every entry of the scratch directory except `keep` (or any
    /// entry containing it).
    pub async fn purge(&self, keep: Option<&Path>) -> CleanupReport {
        let mut report = CleanupReport::default();

        let scratch_dir = resolve(&self.scratch_dir).await;
        let keep = match keep {
            Some(keep) => Some(resolve(keep).await),
            None => None,
        };

        let mut entries = match tokio::fs::read_dir(&scratch_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Scratch directory {} does not exist", self.scratch_dir.display());
                return report;
            }
            Err(e) => {
                warn!("Cannot list scratch directory {}: {}", self.scratch_dir.display(), e);
                report.failed += 1;
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error reading scratch directory: {}", e);
                    report.failed += 1;
                    break;
                }
            };
            let path = entry.path();

            if keep.as_ref().is_some_and(|keep| keep.starts_with(&path)) {
                debug!("Keeping {} (holds the output)", path.display());
                report.preserved += 1;
                continue;
            }

            let removed = match entry.file_type().await {
                Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
                Ok(_) => tokio::fs::remove_file(&path).await,
                Err(e) => Err(e),
            };
            match removed {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("Failed to remove scratch entry {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Scratch cleanup: {} removed, {} failed, {} kept",
            report.removed, report.failed, report.preserved
        );
        report
    }
}

/// Absolute, symlink-free form of `path` so relative and absolute spellings
/// of the same location compare equal. Falls back to the lexical absolute
/// path when the target does not exist.
async fn resolve(path: &Path) -> PathBuf {
    if let Ok(path) = tokio::fs::canonicalize(path).await {
        return path;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match tokio::fs::canonicalize(parent).await {
            Ok(parent) => parent.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_purges_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("modelTemp");
        std::fs::create_dir_all(scratch.join("meshes")).unwrap();
        std::fs::write(scratch.join("meshes").join("part0.obj"), b"v 0 0 0").unwrap();
        std::fs::write(scratch.join("points.ply"), b"ply").unwrap();

        let report = CleanupManager::new(&scratch).purge(None).await;
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, 0);
        assert!(scratch.exists());
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_scratch_is_clean() {
        let temp = TempDir::new().unwrap();
        let report = CleanupManager::new(temp.path().join("absent")).purge(None).await;
        assert_eq!(report, CleanupReport::default());
    }

    #[tokio::test]
    async fn test_keeps_output_inside_scratch() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("modelTemp");
        let output_dir = scratch.join("result");
        std::fs::create_dir_all(&output_dir).unwrap();
        std::fs::write(output_dir.join("model.usdz"), b"usdz").unwrap();
        std::fs::write(scratch.join("depth.tmp"), b"tmp").unwrap();

        let report = CleanupManager::new(&scratch)
            .purge(Some(&output_dir.join("model.usdz")))
            .await;
        assert_eq!(report.removed, 1);
        assert_eq!(report.preserved, 1);
        assert!(output_dir.join("model.usdz").exists());
        assert!(!scratch.join("depth.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keeps_output_given_as_relative_path() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("modelTemp");
        std::fs::create_dir_all(&scratch).unwrap();
        let model = scratch.join("model.usdz");
        std::fs::write(&model, b"usdz").unwrap();
        std::fs::write(scratch.join("depth.tmp"), b"tmp").unwrap();

        // Same file, spelled relative to the working directory
        let cwd = std::env::current_dir().unwrap();
        let mut relative = PathBuf::new();
        for _ in cwd.components().skip(1) {
            relative.push("..");
        }
        relative.push(model.strip_prefix("/").unwrap());
        assert!(relative.is_relative());

        let report = CleanupManager::new(&scratch).purge(Some(&relative)).await;
        assert_eq!(report.removed, 1);
        assert_eq!(report.preserved, 1);
        assert!(model.exists());
        assert!(!scratch.join("depth.tmp").exists());
    }

    #[tokio::test]
    async fn test_keeps_output_given_with_parent_components() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("modelTemp");
        std::fs::create_dir_all(scratch.join("result")).unwrap();
        std::fs::write(scratch.join("result").join("model.usdz"), b"usdz").unwrap();

        let keep = scratch.join("result").join("..").join("result").join("model.usdz");
        let report = CleanupManager::new(&scratch).purge(Some(&keep)).await;
        assert_eq!(report.preserved, 1);
        assert!(scratch.join("result").join("model.usdz").exists());
    }

    #[tokio::test]
    async fn test_scratch_that_is_a_file_fails_softly() {
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("modelTemp");
        std::fs::write(&scratch, b"not a directory").unwrap();

        let report = CleanupManager::new(&scratch).purge(None).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 0);
        assert!(scratch.exists());
    }
}
