use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors returned by every [`Storage`](crate::Storage) backend.
///
/// Callers should branch on [`StorageError::kind`] (or match the variant)
/// rather than on the rendered message.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("url already shortened: {0}")]
    Duplicate(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("storage is inconsistent: {0}")]
    Consistency(String),
    #[error("storage is closed")]
    Closed,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

/// A stable, copyable classification of [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Duplicate,
    Timeout,
    Io,
    Consistency,
    Closed,
    Other,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Duplicate(_) => ErrorKind::Duplicate,
            StorageError::Timeout(_) => ErrorKind::Timeout,
            StorageError::Io(_) => ErrorKind::Io,
            StorageError::Consistency(_) => ErrorKind::Consistency,
            StorageError::Closed => ErrorKind::Closed,
            StorageError::Unavailable(_)
            | StorageError::Query(_)
            | StorageError::InvalidData(_) => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind() == ErrorKind::Duplicate
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => StorageError::Timeout(err.to_string()),
            _ => StorageError::Io(err.to_string()),
        }
    }
}
