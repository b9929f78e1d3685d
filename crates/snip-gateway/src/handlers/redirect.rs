use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use snip_core::{StorageError, UrlId};

pub async fn redirect_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response> {
    let id: UrlId = id.parse().map_err(|_| AppError::InvalidId)?;

    let row = match state.storage().get_by_id(id).await {
        Ok(row) => row,
        Err(StorageError::NotFound(_)) => return Err(AppError::NotFound),
        Err(err) => return Err(err.into()),
    };

    if row.is_deleted {
        return Err(AppError::Gone);
    }

    // Stored bodies are arbitrary text and may not be valid header values.
    let location = HeaderValue::from_str(&row.original_url)
        .map_err(|source| AppError::UnusableUrl { id, source })?;
    Ok((StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response())
}
