use crate::catalog::ImageRecord;
use crate::config::ApiConfig;
use crate::error::{Rejection, StoreError};
use crate::store::ImageStore;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ImageStore>,
}

/// Normalize the configured prefix to `""` or `/segment[/segment..]`
fn route_base(prefix: &str) -> String {
    prefix.trim_end_matches('/').to_string()
}

/// Create the API router.
///
/// `upload_limit` caps the raw upload body; `None` lifts the default cap.
pub fn create_router(state: AppState, config: &ApiConfig, upload_limit: Option<usize>) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let body_limit = match upload_limit {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    let base = route_base(&config.prefix);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(&format!("{}/", base), get(list_images))
        .route(
            &format!("{}/upload/png", base),
            post(upload_png).layer(body_limit),
        )
        .route(&format!("{}/:id", base), delete(delete_image));

    if !base.is_empty() {
        router = router.route(&base, get(list_images));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "image-store"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.store.is_ready().await {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "storage": "available"
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "storage": "unavailable"
            })),
        )
    }
}

/// List active images, newest first
#[instrument(skip(state))]
async fn list_images(
    State(state): State<AppState>,
) -> Result<Json<Vec<ImageRecord>>, StoreError> {
    metrics::counter!("image_store.list.requests").increment(1);

    let records = state.store.list().await?;
    metrics::histogram!("image_store.list.entries").record(records.len() as f64);

    Ok(Json(records))
}

/// Map a body that could not be buffered to an upload rejection
fn body_rejection(rejection: &BytesRejection, max_data_size: i64) -> StoreError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        // Past the cap the decoded payload is larger than the ceiling
        let size = usize::try_from(max_data_size)
            .unwrap_or(usize::MAX)
            .saturating_add(1);
        Rejection::TooLarge {
            size,
            max: max_data_size,
        }
        .into()
    } else {
        Rejection::DecodeFailure.into()
    }
}

/// Admit a base64-encoded PNG
#[instrument(skip(state, body))]
async fn upload_png(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<ImageRecord>, StoreError> {
    let result = match body {
        Ok(body) => state.store.upload_png(&body).await,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "Upload body not readable");
            Err(body_rejection(&rejection, state.store.max_data_size()))
        }
    };

    match result {
        Ok(record) => {
            metrics::counter!("image_store.uploads.admitted").increment(1);
            Ok(Json(record))
        }
        Err(e) => {
            metrics::counter!("image_store.uploads.rejected", "reason" => e.label()).increment(1);
            Err(e)
        }
    }
}

/// Soft-delete an image
#[instrument(skip(state))]
async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StoreError> {
    match state.store.delete(&id).await {
        Ok(()) => {
            metrics::counter!("image_store.deletes.completed").increment(1);
            Ok(StatusCode::OK)
        }
        Err(e) => {
            metrics::counter!("image_store.deletes.rejected", "reason" => e.label()).increment(1);
            Err(e)
        }
    }
}

/// Start the image API server
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    upload_limit: Option<usize>,
) -> Result<()> {
    let router = create_router(state, config, upload_limit);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, prefix = %config.prefix, "Starting image API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
