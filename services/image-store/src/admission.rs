use crate::allocator::{FilenameAllocator, StagedFile, MAX_ALLOCATION_ATTEMPTS};
use crate::catalog::{Catalog, ImageRecord};
use crate::error::{Rejection, Result, StoreError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Extension given to every admitted upload
pub const PNG_EXTENSION: &str = ".png";

/// Decode a base64 upload body.
///
/// Line breaks are ignored so wrapped base64 is accepted.
pub fn decode_payload(body: &[u8]) -> std::result::Result<Vec<u8>, Rejection> {
    if body.is_empty() {
        return Err(Rejection::EmptyBody);
    }

    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| *b != b'\r' && *b != b'\n')
        .collect();

    STANDARD
        .decode(compact)
        .map_err(|_| Rejection::DecodeFailure)
}

/// Enforce the decoded size ceiling; a non-positive `max` disables it
pub fn check_size(size: usize, max: i64) -> std::result::Result<(), Rejection> {
    if max > 0 && size as u64 > max as u64 {
        return Err(Rejection::TooLarge { size, max });
    }
    Ok(())
}

/// Fully decode the bytes as PNG
pub fn verify_png(data: &[u8]) -> std::result::Result<(), Rejection> {
    image::load_from_memory_with_format(data, ImageFormat::Png)
        .map(|_| ())
        .map_err(|_| Rejection::InvalidPng)
}

/// Enforce the image count ceiling; a non-positive `max` disables it.
///
/// Runs before the new file exists, so only a count strictly above `max`
/// is refused and one image past the ceiling is still admitted.
pub fn check_quota(count: usize, max: i64) -> Result<()> {
    if max > 0 && count as u64 > max as u64 {
        return Err(StoreError::QuotaExceeded { count, max });
    }
    Ok(())
}

/// Validates uploads and writes the admitted ones
#[derive(Clone)]
pub struct AdmissionController {
    catalog: Arc<Catalog>,
    allocator: FilenameAllocator,
    max_data_size: i64,
    max_images: i64,
}

impl AdmissionController {
    pub fn new(
        catalog: Arc<Catalog>,
        allocator: FilenameAllocator,
        max_data_size: i64,
        max_images: i64,
    ) -> Self {
        Self {
            catalog,
            allocator,
            max_data_size,
            max_images,
        }
    }

    /// Decoded size ceiling, non-positive when unbounded
    pub fn max_data_size(&self) -> i64 {
        self.max_data_size
    }

    /// Run the admission pipeline on a base64 PNG body.
    ///
    /// Exactly one image is created on success and none on any failure. The
    /// bytes are written under a hidden staging name first, so the image only
    /// becomes visible once it is complete.
    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn admit(&self, body: &[u8]) -> Result<ImageRecord> {
        let data = decode_payload(body)?;
        check_size(data.len(), self.max_data_size)?;
        verify_png(&data)?;

        if self.max_images > 0 {
            let count = self.catalog.count().await?;
            debug!(count, max = self.max_images, "Checked image quota");
            check_quota(count, self.max_images)?;
        }

        let StagedFile {
            path: staged,
            mut file,
        } = self
            .allocator
            .stage()
            .await
            .map_err(|e| StoreError::storage("create", self.catalog.image_dir(), e))?;

        let written = async {
            file.write_all(&data).await?;
            file.flush().await
        }
        .await;
        drop(file);

        let published = match written {
            Ok(()) => self
                .allocator
                .publish(&staged, PNG_EXTENSION)
                .await
                .ok_or(StoreError::AllocationFailed {
                    attempts: MAX_ALLOCATION_ATTEMPTS,
                }),
            Err(e) => Err(StoreError::storage("write", &staged, e)),
        };

        // The published image is a second link to the same file
        if let Err(e) = fs::remove_file(&staged).await {
            warn!(error = %e, path = %staged.display(), "Failed to remove staging file");
        }

        let filename = published?;
        let path = self.catalog.image_dir().join(&filename);

        let modified = fs::metadata(&path)
            .await
            .and_then(|metadata| metadata.modified())
            .map_err(|e| StoreError::storage("stat", &path, e))?;

        metrics::counter!("image_store.bytes.written").increment(data.len() as u64);
        info!(filename = %filename, size = data.len(), "Stored new image");

        Ok(self.catalog.record(&filename, modified))
    }
}
