use crate::error::{AppError, Result};
use crate::identity::Owner;
use crate::model::{BatchShortenResponse, ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use snip_core::{BatchRequestRecord, StorageError, UrlId};
use tracing::{info, warn};

/// Stores a single URL. A URL that is already live resolves to its
/// existing id with `409 Conflict`.
async fn store_one(state: &AppState, url: &str, owner: &Owner) -> Result<(StatusCode, UrlId)> {
    match state.storage().store(url, owner.as_str()).await {
        Ok(id) => {
            info!(id, owner = owner.as_str(), "shortened url");
            Ok((StatusCode::CREATED, id))
        }
        Err(StorageError::Duplicate(_)) => {
            let existing = state.storage().get_by_url(url).await?;
            warn!(id = existing.id, url, "url is already shortened");
            Ok((StatusCode::CONFLICT, existing.id))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn shorten_text_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    body: String,
) -> Result<Response> {
    if body.is_empty() {
        return Err(AppError::EmptyUrl);
    }

    let (status, id) = store_one(&state, &body, &owner).await?;
    Ok((status, state.short_url(id)).into_response())
}

pub async fn shorten_json_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    body: Bytes,
) -> Result<Response> {
    let request: ShortenRequest = serde_json::from_slice(&body).map_err(AppError::InvalidJson)?;
    if request.url.is_empty() {
        return Err(AppError::EmptyUrl);
    }

    let (status, id) = store_one(&state, &request.url, &owner).await?;
    let response = ShortenResponse {
        result: state.short_url(id),
    };
    Ok((status, Json(response)).into_response())
}

pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    body: Bytes,
) -> Result<(StatusCode, Json<Vec<BatchShortenResponse>>)> {
    let records: Vec<BatchRequestRecord> =
        serde_json::from_slice(&body).map_err(AppError::InvalidJson)?;
    if records.is_empty() {
        return Err(AppError::EmptyBatch);
    }
    if records.iter().any(|record| record.original_url.is_empty()) {
        return Err(AppError::EmptyUrl);
    }

    let stored = state.storage().store_batch(&records, owner.as_str()).await?;
    info!(
        count = stored.len(),
        duplicates = stored.iter().filter(|record| record.duplicate).count(),
        owner = owner.as_str(),
        "shortened url batch"
    );

    let response = stored
        .into_iter()
        .map(|record| BatchShortenResponse {
            short_url: state.short_url(record.id),
            correlation_id: record.correlation_id,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(response)))
}
