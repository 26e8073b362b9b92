use crate::catalog::is_image_name;
use crate::error::{Result, StoreError};
use std::io::ErrorKind;
use std::path::{is_separator, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Whether `id` is a bare filename: non-empty, not `.`/`..`, no separators
pub fn validate_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.chars().any(|c| is_separator(c) || c == '\\')
}

/// Moves active images into the holding directory instead of erasing them
#[derive(Debug, Clone)]
pub struct SoftDeleteMover {
    image_dir: PathBuf,
    delete_dir: PathBuf,
}

impl SoftDeleteMover {
    pub fn new(image_dir: impl Into<PathBuf>, delete_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
            delete_dir: delete_dir.into(),
        }
    }

    /// Relocate the image `id` into the holding directory.
    ///
    /// Never overwrites an existing holding entry. Malformed ids are reported
    /// as [`StoreError::NotFound`], the same as missing ones.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        if !validate_id(id) || !is_image_name(id) {
            warn!(id = %id, "Rejected malformed image id");
            return Err(StoreError::NotFound(id.to_string()));
        }

        let active_path = self.image_dir.join(id);
        match fs::symlink_metadata(&active_path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                debug!(id = %id, "Active entry is not a regular file");
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(StoreError::storage("stat", &active_path, e)),
        }

        let holding_path = self.delete_dir.join(id);
        match fs::symlink_metadata(&holding_path).await {
            Ok(_) => {
                warn!(id = %id, "Image already present in holding directory");
                return Err(StoreError::Conflict(id.to_string()));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::storage("stat", &holding_path, e)),
        }

        self.ensure_holding_dir().await?;

        fs::rename(&active_path, &holding_path).await.map_err(|e| {
            warn!(
                error = %e,
                from = %active_path.display(),
                to = %holding_path.display(),
                "Failed to move image"
            );
            StoreError::storage("move", &active_path, e)
        })?;

        info!(id = %id, "Moved image to holding directory");
        Ok(())
    }

    /// Create the holding directory if absent; one level only, parents must exist
    async fn ensure_holding_dir(&self) -> Result<()> {
        let dir = &self.delete_dir;
        match fs::metadata(dir).await {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::storage("stat", dir, e)),
        }

        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(0o755);

        match builder.create(dir).await {
            Ok(()) => {
                info!(dir = %dir.display(), "Created holding directory");
                Ok(())
            }
            // Created by a concurrent request
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(StoreError::storage("create directory", dir, e)),
        }
    }
}
