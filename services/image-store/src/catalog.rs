use crate::error::{Result, StoreError};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, instrument};

/// Extensions (without the dot) surfaced by the catalog, matched case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// An image as seen by clients, rebuilt from directory state on every read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    /// Bare filename inside the active-image directory
    pub id: String,
    /// Client-facing reference, not a filesystem path
    #[serde(rename = "image")]
    pub public_path: String,
    /// Last modification time of the file
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Whether a filename carries one of the recognized image extensions
pub fn is_image_name(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => IMAGE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Read-only view of the active-image directory
#[derive(Debug, Clone)]
pub struct Catalog {
    image_dir: PathBuf,
    prefix: String,
    base_path: String,
}

impl Catalog {
    pub fn new(image_dir: impl Into<PathBuf>, prefix: &str, base_path: &str) -> Self {
        Self {
            image_dir: image_dir.into(),
            prefix: prefix.to_string(),
            base_path: base_path.to_string(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Build the record for an image id with the given modification time
    pub fn record(&self, id: &str, modified: SystemTime) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            public_path: paths::public_path(&self.prefix, &self.base_path, id),
            created_at: DateTime::<Utc>::from(modified),
        }
    }

    /// List all images, most recently modified first
    #[instrument(skip(self), fields(dir = %self.image_dir.display()))]
    pub async fn list(&self) -> Result<Vec<ImageRecord>> {
        let mut entries = self.scan().await?;

        // Stable sort: equal timestamps keep directory listing order.
        entries.sort_by(|a, b| b.1.cmp(&a.1));

        let records: Vec<ImageRecord> = entries
            .into_iter()
            .map(|(id, modified)| self.record(&id, modified))
            .collect();

        debug!(count = records.len(), "Listed images");
        Ok(records)
    }

    /// Count images using the same filter as [`Catalog::list`]
    pub async fn count(&self) -> Result<usize> {
        Ok(self.scan().await?.len())
    }

    /// Collect `(name, mtime)` for every regular file with an image extension
    async fn scan(&self) -> Result<Vec<(String, SystemTime)>> {
        let dir = &self.image_dir;
        let mut read_dir = fs::read_dir(dir)
            .await
            .map_err(|e| StoreError::storage("list directory", dir, e))?;

        let mut entries = Vec::new();

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| StoreError::storage("list directory", dir, e))?
        {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!(name = ?raw, "Skipping non UTF-8 entry");
                    continue;
                }
            };

            if !is_image_name(&name) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Moved away between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::storage("stat", entry.path(), e)),
            };

            if !metadata.is_file() {
                continue;
            }

            let modified = metadata
                .modified()
                .map_err(|e| StoreError::storage("read modification time of", entry.path(), e))?;

            entries.push((name, modified));
        }

        Ok(entries)
    }
}
