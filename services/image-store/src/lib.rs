//! Image Store Service
//!
//! Filesystem-backed image store exposed over HTTP. Images are plain files in
//! an active-image directory; there is no database and no in-memory index,
//! every request re-derives its view from the directory.
//!
//! ## Features
//!
//! - **Catalog**: lists recognized images (`.jpg`, `.jpeg`, `.png`) newest first
//! - **Admission**: accepts base64-encoded PNG uploads under size and count quotas
//! - **Filename allocation**: uploads staged under a hidden name, then linked to a
//!   free nanosecond-timestamp name
//! - **Soft delete**: moves images into a holding directory, never overwriting
//!
//! ## Architecture
//!
//! ```text
//!   HTTP API (axum)
//! ┌──────────────────┐
//! │ GET  /           │──────────────┐
//! │ POST /upload/png │───┐          │
//! │ DELETE /:id      │─┐ │          ▼
//! └──────────────────┘ │ │   ┌──────────────┐      ┌──────────────┐
//!                      │ └──▶│ Admission    │─────▶│ Catalog      │
//!                      │     │ Controller   │      │ Reader       │
//!                      │     └──────────────┘      └──────────────┘
//!                      │            │                     │
//!                      │            ▼                     ▼
//!                      │     ┌──────────────┐      ┌──────────────┐
//!                      │     │ Filename     │─────▶│ images/      │
//!                      │     │ Allocator    │      └──────────────┘
//!                      │     └──────────────┘             │ rename
//!                      │     ┌──────────────┐             ▼
//!                      └────▶│ Soft-Delete  │      ┌──────────────┐
//!                            │ Mover        │─────▶│ delete/      │
//!                            └──────────────┘      └──────────────┘
//! ```

pub mod admission;
pub mod allocator;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod paths;
pub mod soft_delete;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use admission::AdmissionController;
pub use allocator::{Clock, FilenameAllocator, SystemClock};
pub use api::AppState;
pub use catalog::{Catalog, ImageRecord};
pub use config::Config;
pub use error::{Rejection, StoreError};
pub use soft_delete::SoftDeleteMover;
pub use store::ImageStore;
