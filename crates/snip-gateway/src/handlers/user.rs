use crate::error::{AppError, Result};
use crate::identity::Owner;
use crate::model::UserUrlResponse;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use snip_core::{StorageError, UrlId};
use tracing::{info, warn};

pub async fn list_user_urls_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> Result<Response> {
    let rows = match state.storage().get_all_user_urls(owner.as_str()).await {
        Ok(rows) => rows,
        Err(StorageError::NotFound(_)) => return Ok(StatusCode::NO_CONTENT.into_response()),
        Err(err) => return Err(err.into()),
    };

    let response: Vec<UserUrlResponse> = rows
        .into_iter()
        .map(|row| UserUrlResponse {
            short_url: state.short_url(row.id),
            original_url: row.original_url,
        })
        .collect();
    Ok(Json(response).into_response())
}

/// Accepts a JSON array of id strings and queues the caller's own URLs for
/// deletion. Ids that do not parse, do not exist or belong to someone else
/// are skipped.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    body: Bytes,
) -> Result<StatusCode> {
    let raw: Vec<String> = serde_json::from_slice(&body).map_err(AppError::InvalidJson)?;

    let ids: Vec<UrlId> = raw
        .iter()
        .filter_map(|value| match value.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(value = %value, "skipping id that is not an integer");
                None
            }
        })
        .collect();
    if ids.is_empty() {
        return Err(AppError::EmptyBatch);
    }

    let rows = state.storage().get_by_id_multi(&ids).await?;
    let owned: Vec<UrlId> = rows
        .iter()
        .filter(|row| row.added_by == owner.as_str())
        .map(|row| row.id)
        .collect();
    if owned.is_empty() {
        return Err(AppError::NothingToDelete);
    }

    state.deletes().enqueue_many(&owned)?;
    info!(count = owned.len(), owner = owner.as_str(), "queued urls for deletion");

    Ok(StatusCode::ACCEPTED)
}
