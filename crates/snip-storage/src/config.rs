use crate::{FileStorage, MemoryStorage, PostgresSettings, PostgresStorage};
use snip_core::error::Result;
use snip_core::Storage;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Which backend a [`StorageConfig`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File,
    Postgres,
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::File => write!(f, "file"),
            StorageBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// Backend selection, supplied by the application at startup.
///
/// A database DSN wins over a file path, which wins over plain memory.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub database_dsn: Option<String>,
    pub file_path: Option<PathBuf>,
    pub query_timeout: Option<Duration>,
}

impl StorageConfig {
    pub fn backend(&self) -> StorageBackend {
        if self
            .database_dsn
            .as_deref()
            .is_some_and(|dsn| !dsn.is_empty())
        {
            StorageBackend::Postgres
        } else if self
            .file_path
            .as_deref()
            .is_some_and(|path| !path.as_os_str().is_empty())
        {
            StorageBackend::File
        } else {
            StorageBackend::Memory
        }
    }

    /// Builds the configured backend, ready to serve requests.
    pub async fn open(&self) -> Result<Arc<dyn Storage>> {
        let backend = self.backend();
        info!(backend = %backend, "opening storage");

        let storage: Arc<dyn Storage> = match backend {
            StorageBackend::Postgres => {
                let dsn = self.database_dsn.clone().unwrap_or_default();
                let settings = match self.query_timeout {
                    Some(timeout) => PostgresSettings::builder()
                        .dsn(dsn)
                        .query_timeout(timeout)
                        .build(),
                    None => PostgresSettings::builder().dsn(dsn).build(),
                };
                let storage = PostgresStorage::connect(&settings).await?;
                storage.init_schema().await?;
                Arc::new(storage)
            }
            StorageBackend::File => {
                let path = self.file_path.clone().unwrap_or_default();
                Arc::new(FileStorage::open(path).await?)
            }
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        };

        Ok(storage)
    }
}
