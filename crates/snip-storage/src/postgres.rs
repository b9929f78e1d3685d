use async_trait::async_trait;
use snip_core::error::Result;
use snip_core::{
    BatchRequestRecord, BatchResponseRecord, ShortenedUrl, Storage, StorageError, UrlId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, trace};
use typed_builder::TypedBuilder;

/// Schema of the `urls` table, safe to apply repeatedly.
pub const SCHEMA: &str = include_str!("../ddl/postgres/urls.sql");

/// PostgreSQL accepts at most 65535 bind parameters per statement and each
/// row binds two.
const MAX_ROWS_PER_INSERT: usize = 1000;

const LIVE_CONFLICT: &str = "ON CONFLICT (original_url) WHERE NOT is_deleted DO NOTHING";

/// Connection settings for [`PostgresStorage`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PostgresSettings {
    /// libpq style connection string or URL.
    #[builder(setter(into))]
    pub dsn: String,
    /// Upper bound for every statement and for acquiring a connection.
    #[builder(default = Duration::from_secs(1))]
    pub query_timeout: Duration,
    #[builder(default = 10)]
    pub max_connections: u32,
}

/// PostgreSQL implementation of [`Storage`].
///
/// Rows live in the `urls` table (see [`SCHEMA`]). Uniqueness of live URLs
/// is enforced by a partial unique index, so tombstoned rows never block a
/// new insert of the same URL. Soft delete flips `is_deleted`; rows are
/// never removed.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresStorage {
    /// Creates a storage from an existing pool.
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Opens a new connection pool.
    pub async fn connect(settings: &PostgresSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.query_timeout)
            .connect(&settings.dsn)
            .await
            .map_err(map_sqlx_error)?;

        info!(
            max_connections = settings.max_connections,
            query_timeout = ?settings.query_timeout,
            "connected to postgres"
        );
        Ok(Self::new(pool, settings.query_timeout))
    }

    /// Creates the `urls` table and its indexes when missing.
    pub async fn init_schema(&self) -> Result<()> {
        self.bounded("init schema", sqlx::raw_sql(SCHEMA).execute(&self.pool))
            .await?;
        debug!("urls schema is in place");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs one database call under the configured timeout.
    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = sqlx::Result<T>>,
    {
        match tokio::time::timeout(self.query_timeout, call).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(StorageError::Timeout(format!(
                "{operation} took longer than {:?}",
                self.query_timeout
            ))),
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed => StorageError::Closed,
        sqlx::Error::WorkerCrashed | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::Io(_) => StorageError::Io(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn decode_row(row: &PgRow) -> Result<ShortenedUrl> {
    Ok(ShortenedUrl {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        added_by: row.try_get("added_by").map_err(map_sqlx_error)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

fn decode_rows(rows: &[PgRow]) -> Result<Vec<ShortenedUrl>> {
    rows.iter().map(decode_row).collect()
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn store(&self, original_url: &str, added_by: &str) -> Result<UrlId> {
        let sql = format!(
            "INSERT INTO urls (original_url, added_by) VALUES ($1, $2) {LIVE_CONFLICT} RETURNING id"
        );
        let id = self
            .bounded(
                "store",
                sqlx::query_scalar::<_, UrlId>(&sql)
                    .bind(original_url)
                    .bind(added_by)
                    .fetch_optional(&self.pool),
            )
            .await?;

        // no row back means the insert was skipped by the live-url index
        id.ok_or_else(|| StorageError::Duplicate(original_url.to_string()))
    }

    async fn store_batch(
        &self,
        records: &[BatchRequestRecord],
        added_by: &str,
    ) -> Result<Vec<BatchResponseRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.bounded("begin", self.pool.begin()).await?;

        let mut inserted: HashMap<String, UrlId> = HashMap::with_capacity(records.len());
        for chunk in records.chunks(MAX_ROWS_PER_INSERT) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO urls (original_url, added_by) ");
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.original_url.clone())
                    .push_bind(added_by.to_string());
            });
            builder.push(" ");
            builder.push(LIVE_CONFLICT);
            builder.push(" RETURNING id, original_url");

            let rows = self
                .bounded(
                    "store batch",
                    builder
                        .build_query_as::<(UrlId, String)>()
                        .fetch_all(&mut *tx),
                )
                .await?;
            inserted.extend(rows.into_iter().map(|(id, url)| (url, id)));
        }

        // rows skipped by ON CONFLICT belong to someone already; look them up
        // inside the same transaction
        let missing: Vec<String> = records
            .iter()
            .filter(|record| !inserted.contains_key(&record.original_url))
            .map(|record| record.original_url.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut existing: HashMap<String, UrlId> = HashMap::with_capacity(missing.len());
        if !missing.is_empty() {
            let rows: Vec<(UrlId, String)> = self
                .bounded(
                    "resolve batch duplicates",
                    sqlx::query_as(
                        "SELECT id, original_url FROM urls \
                         WHERE original_url = ANY($1) AND NOT is_deleted",
                    )
                    .bind(&missing)
                    .fetch_all(&mut *tx),
                )
                .await?;
            existing.extend(rows.into_iter().map(|(id, url)| (url, id)));
        }

        let mut claimed: HashSet<&str> = HashSet::with_capacity(inserted.len());
        let mut responses = Vec::with_capacity(records.len());
        for record in records {
            let url = record.original_url.as_str();
            let (id, duplicate) = match inserted.get(url) {
                Some(&id) => (id, !claimed.insert(url)),
                None => match existing.get(url) {
                    Some(&id) => (id, true),
                    None => {
                        return Err(StorageError::Query(format!(
                            "url {url} was neither inserted nor found as a live row"
                        )))
                    }
                },
            };
            responses.push(BatchResponseRecord {
                correlation_id: record.correlation_id.clone(),
                id,
                duplicate,
            });
        }

        self.bounded("commit", tx.commit()).await?;
        trace!(
            rows = records.len(),
            inserted = inserted.len(),
            "stored url batch"
        );

        Ok(responses)
    }

    async fn get_by_id(&self, id: UrlId) -> Result<ShortenedUrl> {
        let row = self
            .bounded(
                "get by id",
                sqlx::query(
                    "SELECT id, original_url, added_by, is_deleted FROM urls WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool),
            )
            .await?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(format!("id {id}")));
        };
        decode_row(&row)
    }

    async fn get_by_id_multi(&self, ids: &[UrlId]) -> Result<Vec<ShortenedUrl>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .bounded(
                "get by ids",
                sqlx::query(
                    "SELECT id, original_url, added_by, is_deleted FROM urls \
                     WHERE id = ANY($1) ORDER BY id",
                )
                .bind(ids)
                .fetch_all(&self.pool),
            )
            .await?;

        decode_rows(&rows)
    }

    async fn get_by_url(&self, original_url: &str) -> Result<ShortenedUrl> {
        let row = self
            .bounded(
                "get by url",
                sqlx::query(
                    "SELECT id, original_url, added_by, is_deleted FROM urls \
                     WHERE original_url = $1 AND NOT is_deleted",
                )
                .bind(original_url)
                .fetch_optional(&self.pool),
            )
            .await?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(format!("url {original_url}")));
        };
        decode_row(&row)
    }

    async fn get_all_user_urls(&self, added_by: &str) -> Result<Vec<ShortenedUrl>> {
        let rows = self
            .bounded(
                "get user urls",
                sqlx::query(
                    "SELECT id, original_url, added_by, is_deleted FROM urls \
                     WHERE added_by = $1 AND NOT is_deleted ORDER BY id",
                )
                .bind(added_by)
                .fetch_all(&self.pool),
            )
            .await?;

        if rows.is_empty() {
            return Err(StorageError::NotFound(format!("urls of {added_by}")));
        }
        decode_rows(&rows)
    }

    async fn delete_by_id(&self, id: UrlId) -> Result<()> {
        self.delete_by_id_multi(&[id]).await
    }

    async fn delete_by_id_multi(&self, ids: &[UrlId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let result = self
            .bounded(
                "delete by ids",
                sqlx::query("UPDATE urls SET is_deleted = true WHERE id = ANY($1) AND NOT is_deleted")
                    .bind(ids)
                    .execute(&self.pool),
            )
            .await?;

        debug!(
            requested = ids.len(),
            deleted = result.rows_affected(),
            "tombstoned urls"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", sqlx::query("SELECT 1").execute(&self.pool))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
