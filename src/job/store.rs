//! On-disk archive storage keyed by job id and file name.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::{JobError, JobId};

/// Stores archives at `<root>/<job id>/<filename>`.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a result would have. Rejects names that are not one plain segment.
    ///
    /// # Errors
    ///
    /// [`JobError::InvalidFilename`].
    pub fn path_for(&self, id: JobId, filename: &str) -> Result<PathBuf, JobError> {
        validate_filename(filename)?;
        Ok(self.root.join(id.to_string()).join(filename))
    }

    /// Writes `buffer` next to its final path, then renames it into place.
    ///
    /// # Errors
    ///
    /// [`JobError::InvalidFilename`] or [`JobError::Storage`].
    pub async fn save(&self, id: JobId, filename: &str, buffer: &[u8]) -> Result<PathBuf, JobError> {
        let path = self.path_for(id, filename)?;
        let dir = self.root.join(id.to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| JobError::storage(id, e))?;

        let partial = dir.join(format!("{filename}.part"));
        fs::write(&partial, buffer)
            .await
            .map_err(|e| JobError::storage(id, e))?;
        if let Err(error) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(JobError::storage(id, error));
        }
        debug!(job_id = %id, path = %path.display(), bytes = buffer.len(), "result saved");
        Ok(path)
    }

    /// Deletes everything stored for `id`. Missing directories are fine.
    ///
    /// # Errors
    ///
    /// [`JobError::Storage`] for other I/O failures.
    pub async fn remove(&self, id: JobId) -> Result<(), JobError> {
        match fs::remove_dir_all(self.root.join(id.to_string())).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JobError::storage(id, e)),
        }
    }
}

fn validate_filename(filename: &str) -> Result<(), JobError> {
    let valid = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.ends_with(".part")
        && !filename.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidFilename {
            filename: filename.to_string(),
        })
    }
}
