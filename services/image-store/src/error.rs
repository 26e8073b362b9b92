use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, warn};

/// Why an upload payload was refused before anything was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No payload at all
    EmptyBody,
    /// Payload is not valid standard base64
    DecodeFailure,
    /// Decoded payload exceeds the configured ceiling.
    ///
    /// `size` is a lower bound when the body was cut off at the upload cap.
    TooLarge { size: usize, max: i64 },
    /// Decoded payload does not parse as a PNG image
    InvalidPng,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::EmptyBody => "empty body",
            Rejection::DecodeFailure => "decode failure",
            Rejection::TooLarge { .. } => "too large",
            Rejection::InvalidPng => "invalid png",
        }
    }

    /// Metric label for this rejection
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::EmptyBody => "empty_body",
            Rejection::DecodeFailure => "decode_failure",
            Rejection::TooLarge { .. } => "too_large",
            Rejection::InvalidPng => "invalid_png",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the image store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Bad request: {0}")]
    BadRequest(Rejection),

    #[error("Quota exceeded: {count} images stored, limit is {max}")]
    QuotaExceeded { count: usize, max: i64 },

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Image already present in holding directory: {0}")]
    Conflict(String),

    #[error("No free filename found after {attempts} attempts")]
    AllocationFailed { attempts: usize },

    #[error("Storage unavailable: failed to {operation} {}: {source}", .path.display())]
    StorageUnavailable {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Wrap a filesystem error with the operation and path it hit
    pub fn storage(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        StoreError::StorageUnavailable {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            StoreError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::AllocationFailed { .. } | StoreError::StorageUnavailable { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Metric label for this error
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::BadRequest(rejection) => rejection.label(),
            StoreError::QuotaExceeded { .. } => "quota_exceeded",
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::AllocationFailed { .. } => "allocation_failed",
            StoreError::StorageUnavailable { .. } => "storage_unavailable",
        }
    }

    /// Whether the failure is environmental rather than caused by the request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoreError::AllocationFailed { .. } | StoreError::StorageUnavailable { .. }
        )
    }
}

impl From<Rejection> for StoreError {
    fn from(rejection: Rejection) -> Self {
        StoreError::BadRequest(rejection)
    }
}

// Rejections carry no body; the status code is the whole answer.
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_internal() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }
        status.into_response()
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StoreError::from(Rejection::InvalidPng).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::QuotaExceeded { count: 3, max: 2 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            StoreError::NotFound("a.png".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StoreError::Conflict("a.png".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            StoreError::AllocationFailed { attempts: 10 }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_error_message_names_path() {
        let err = StoreError::storage(
            "list directory",
            "/srv/images",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("list directory"));
        assert!(message.contains("/srv/images"));
        assert!(err.is_internal());
    }

    #[test]
    fn test_response_has_no_body() {
        let response = StoreError::Conflict("a.png".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.headers().get("content-type").is_none());
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(Rejection::EmptyBody.to_string(), "empty body");
        assert_eq!(Rejection::DecodeFailure.to_string(), "decode failure");
        assert_eq!(Rejection::TooLarge { size: 10, max: 5 }.to_string(), "too large");
        assert_eq!(Rejection::InvalidPng.label(), "invalid_png");
    }
}
