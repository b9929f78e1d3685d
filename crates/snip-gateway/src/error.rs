use axum::http::header::InvalidHeaderValue;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use snip_core::{ErrorKind, StorageError, UrlId};
use snip_deleter::DeleterError;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("empty url")]
    EmptyUrl,
    #[error("empty batch")]
    EmptyBatch,
    #[error("can't parse json")]
    InvalidJson(#[source] serde_json::Error),
    #[error("wrong id")]
    InvalidId,
    #[error("url not found")]
    NotFound,
    #[error("url is deleted")]
    Gone,
    #[error("stored url {id} cannot be used as a redirect target")]
    UnusableUrl {
        id: UrlId,
        #[source]
        source: InvalidHeaderValue,
    },
    /// Deliberately silent about which ids belonged to someone else.
    #[error("nothing to delete")]
    NothingToDelete,
    #[error("deletion is unavailable: {0}")]
    Deleter(#[from] DeleterError),
    #[error("storage operation failed: {0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::EmptyUrl
            | AppError::EmptyBatch
            | AppError::InvalidJson(_)
            | AppError::InvalidId => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            AppError::Gone => StatusCode::GONE.into_response(),
            AppError::UnusableUrl { id, ref source } => {
                error!(id, error = %source, "stored url is not a valid Location header");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
            AppError::NothingToDelete => StatusCode::BAD_REQUEST.into_response(),
            AppError::Deleter(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
            }
            AppError::Storage(source) => {
                error!(error = %source, "storage operation failed");
                let status = match source.kind() {
                    ErrorKind::Timeout | ErrorKind::Closed => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, "internal error").into_response()
            }
        }
    }
}
