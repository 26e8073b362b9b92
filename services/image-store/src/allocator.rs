use chrono::Utc;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, warn};

/// Candidates tried before giving up on a new filename
pub const MAX_ALLOCATION_ATTEMPTS: usize = 10;

/// Source of the time-derived part of new filenames
#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    /// Nanoseconds since the Unix epoch
    fn now_nanos(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        let now = Utc::now();
        // Out of range only after the year 2262
        now.timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
    }
}

/// An upload being written under a hidden name in the active-image directory.
///
/// Staging names start with a dot and carry no image extension, so the
/// catalog never lists or counts them.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub file: File,
}

/// Hands out collision-free names in the active-image directory
#[derive(Clone)]
pub struct FilenameAllocator {
    image_dir: PathBuf,
    clock: Arc<dyn Clock + Send + Sync>,
    staged: Arc<AtomicU64>,
}

impl FilenameAllocator {
    pub fn new(image_dir: impl Into<PathBuf>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            image_dir: image_dir.into(),
            clock,
            staged: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Next candidate name: the current timestamp followed by `extension` (with its dot)
    pub fn candidate(&self, extension: &str) -> String {
        format!("{}{}", self.clock.now_nanos(), extension)
    }

    fn staging_name(&self) -> String {
        let seq = self.staged.fetch_add(1, Ordering::Relaxed);
        format!(".upload-{}-{}.partial", std::process::id(), seq)
    }

    /// Create an empty staging file, open for writing
    pub async fn stage(&self) -> io::Result<StagedFile> {
        let mut last_error = None;

        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let path = self.image_dir.join(self.staging_name());

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok(StagedFile { path, file }),
                // Left behind by a crashed process with a recycled pid
                Err(e) if e.kind() == ErrorKind::AlreadyExists => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| io::Error::new(ErrorKind::AlreadyExists, "no free staging name")))
    }

    /// Link a fully written staging file under an unused image name.
    ///
    /// The link is the existence check: it fails rather than replace an
    /// image that already holds the candidate name. Returns the new name, or
    /// `None` once every attempt collided or failed. The staging file is left
    /// for the caller to remove.
    pub async fn publish(&self, staged: &Path, extension: &str) -> Option<String> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let filename = self.candidate(extension);
            let path = self.image_dir.join(&filename);

            match fs::hard_link(staged, &path).await {
                Ok(()) => {
                    debug!(filename = %filename, attempt, "Published image");
                    return Some(filename);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(filename = %filename, attempt, "Filename already taken");
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        filename = %filename,
                        attempt,
                        "Unexpected error while publishing image"
                    );
                }
            }
        }

        None
    }
}
