use crate::admission::AdmissionController;
use crate::allocator::{Clock, FilenameAllocator, SystemClock};
use crate::catalog::{Catalog, ImageRecord};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::soft_delete::SoftDeleteMover;
use std::sync::Arc;
use tokio::fs;

/// The image store: catalog, admission and soft delete over one storage root.
///
/// Holds no image state of its own; every call re-reads the filesystem.
#[derive(Clone)]
pub struct ImageStore {
    catalog: Arc<Catalog>,
    admission: AdmissionController,
    mover: SoftDeleteMover,
}

impl ImageStore {
    /// Create a store; `prefix` is the request-scope prefix of public paths
    pub fn new(config: &StoreConfig, prefix: &str) -> Self {
        Self::with_clock(config, prefix, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &StoreConfig,
        prefix: &str,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let catalog = Arc::new(Catalog::new(
            &config.image_dir,
            prefix,
            &config.image_base_path,
        ));
        let allocator = FilenameAllocator::new(&config.image_dir, clock);
        let admission = AdmissionController::new(
            catalog.clone(),
            allocator,
            config.max_data_size,
            config.max_images,
        );
        let mover = SoftDeleteMover::new(&config.image_dir, &config.delete_dir);

        Self {
            catalog,
            admission,
            mover,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Decoded upload size ceiling, non-positive when unbounded
    pub fn max_data_size(&self) -> i64 {
        self.admission.max_data_size()
    }

    /// All active images, newest first
    pub async fn list(&self) -> Result<Vec<ImageRecord>> {
        self.catalog.list().await
    }

    /// Admit a base64 PNG body
    pub async fn upload_png(&self, body: &[u8]) -> Result<ImageRecord> {
        self.admission.admit(body).await
    }

    /// Soft-delete the image `id`
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.mover.soft_delete(id).await
    }

    /// Whether the active-image directory can currently be listed
    pub async fn is_ready(&self) -> bool {
        fs::read_dir(self.catalog.image_dir()).await.is_ok()
    }
}
