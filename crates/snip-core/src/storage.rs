use crate::error::Result;
use crate::model::{BatchRequestRecord, BatchResponseRecord, ShortenedUrl, UrlId};
use async_trait::async_trait;

/// The capability set every storage backend provides.
///
/// All backends share one contract:
///
/// - at most one non-deleted row per `original_url`; a second
///   [`store`](Storage::store) of a live URL fails with
///   [`StorageError::Duplicate`](crate::StorageError::Duplicate)
/// - rows are never physically removed, deletion only sets `is_deleted`
/// - ids are assigned by the backend, strictly increasing, never reused
/// - after [`close`](Storage::close) every call fails with
///   [`StorageError::Closed`](crate::StorageError::Closed)
///
/// Backends that perform I/O bound each call by the timeout they were
/// constructed with. Dropping a returned future cancels the call without
/// leaving the backend in a torn state.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Inserts a new row owned by `added_by` and returns its id.
    ///
    /// Returns `Err(Duplicate)` if a live row with the same URL exists; use
    /// [`get_by_url`](Storage::get_by_url) to resolve it.
    async fn store(&self, original_url: &str, added_by: &str) -> Result<UrlId>;

    /// Inserts several rows in one logical operation.
    ///
    /// The response holds exactly one entry per input, in input order, with
    /// the input's correlation id. URLs that are already live (or repeated
    /// within the batch) resolve to the existing id with `duplicate` set.
    async fn store_batch(
        &self,
        records: &[BatchRequestRecord],
        added_by: &str,
    ) -> Result<Vec<BatchResponseRecord>>;

    /// Retrieves a row by id, tombstoned or not.
    /// Returns `Err(NotFound)` only when no row has this id.
    async fn get_by_id(&self, id: UrlId) -> Result<ShortenedUrl>;

    /// Retrieves every row whose id is in `ids`.
    ///
    /// Unknown ids are skipped rather than failing the call. The result is
    /// sorted by id and holds each row once.
    async fn get_by_id_multi(&self, ids: &[UrlId]) -> Result<Vec<ShortenedUrl>>;

    /// Retrieves the live row for a URL.
    /// Returns `Err(NotFound)` when no non-deleted row matches.
    async fn get_by_url(&self, original_url: &str) -> Result<ShortenedUrl>;

    /// Lists the live rows owned by `added_by`, sorted by id.
    ///
    /// Returns `Err(NotFound)` when the owner has none; callers should treat
    /// that as an empty listing.
    async fn get_all_user_urls(&self, added_by: &str) -> Result<Vec<ShortenedUrl>>;

    /// Tombstones a row. Unknown or already deleted ids are a no-op.
    async fn delete_by_id(&self, id: UrlId) -> Result<()>;

    /// Tombstones several rows. Unknown or already deleted ids are a no-op.
    async fn delete_by_id_multi(&self, ids: &[UrlId]) -> Result<()>;

    /// Checks that the backend can serve requests.
    async fn ping(&self) -> Result<()>;

    /// Releases backend resources.
    ///
    /// Must be called once, after the application stopped issuing new
    /// calls. For the file backend this writes the durable snapshot.
    async fn close(&self) -> Result<()>;
}
