use async_trait::async_trait;
use parking_lot::Mutex;
use snip_core::error::Result;
use snip_core::{
    BatchRequestRecord, BatchResponseRecord, ShortenedUrl, Storage, StorageError, UrlId,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{trace, warn};

/// The indexes guarded by [`MemoryStorage`]'s lock.
#[derive(Debug, Default)]
struct State {
    /// Last assigned id.
    counter: UrlId,
    rows: BTreeMap<UrlId, ShortenedUrl>,
    by_owner: HashMap<String, Vec<UrlId>>,
    /// `original_url` of every non-deleted row.
    live_urls: HashMap<String, UrlId>,
    /// Extra live rows restored for a URL that is already in `live_urls`,
    /// ascending by id. Only a damaged snapshot produces these.
    shadowed: HashMap<String, Vec<UrlId>>,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn insert(&mut self, original_url: &str, added_by: &str) -> Result<UrlId> {
        if self.live_urls.contains_key(original_url) {
            return Err(StorageError::Duplicate(original_url.to_string()));
        }

        let id = self
            .counter
            .checked_add(1)
            .ok_or_else(|| StorageError::Consistency("id space exhausted".to_string()))?;
        self.counter = id;

        self.rows
            .insert(id, ShortenedUrl::new(id, original_url, added_by));
        self.by_owner.entry(added_by.to_string()).or_default().push(id);
        self.live_urls.insert(original_url.to_string(), id);

        Ok(id)
    }

    fn tombstone(&mut self, id: UrlId) {
        let Some(row) = self.rows.get_mut(&id) else {
            trace!(id, "delete of unknown id ignored");
            return;
        };
        if row.is_deleted {
            return;
        }

        row.is_deleted = true;
        let url = row.original_url.clone();
        if self.live_urls.get(&url) == Some(&id) {
            self.live_urls.remove(&url);
            self.promote_shadowed(&url);
        }
    }

    /// Indexes the oldest remaining live duplicate of `url`, if any.
    fn promote_shadowed(&mut self, url: &str) {
        let Some(candidates) = self.shadowed.remove(url) else {
            return;
        };

        let mut live: Vec<UrlId> = candidates
            .into_iter()
            .filter(|id| self.rows.get(id).is_some_and(|row| !row.is_deleted))
            .collect();
        if live.is_empty() {
            return;
        }

        let next = live.remove(0);
        trace!(id = next, url, "promoted restored duplicate for lookups");
        self.live_urls.insert(url.to_string(), next);
        if !live.is_empty() {
            self.shadowed.insert(url.to_string(), live);
        }
    }
}

/// In-memory implementation of [`Storage`].
///
/// Every operation takes one coarse lock for its whole duration, so each
/// call is atomic with respect to every other call. Nothing is persisted;
/// [`FileStorage`](crate::FileStorage) adds durability on top of this type.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the indexes from previously persisted rows.
    ///
    /// The id counter continues after the largest id seen. If several live
    /// rows share a URL, the one with the lowest id wins duplicate detection
    /// and the next one takes over once it is deleted.
    pub fn from_records(records: impl IntoIterator<Item = ShortenedUrl>) -> Self {
        let mut state = State::default();

        for row in records {
            state.counter = state.counter.max(row.id);
            state.rows.insert(row.id, row);
        }

        for row in state.rows.values() {
            state
                .by_owner
                .entry(row.added_by.clone())
                .or_default()
                .push(row.id);

            if row.is_deleted {
                continue;
            }
            if let Some(existing) = state.live_urls.get(&row.original_url) {
                warn!(
                    id = row.id,
                    existing = *existing,
                    url = %row.original_url,
                    "restored duplicate live url, the older id serves lookups until it is deleted"
                );
                state
                    .shadowed
                    .entry(row.original_url.clone())
                    .or_default()
                    .push(row.id);
                continue;
            }
            state.live_urls.insert(row.original_url.clone(), row.id);
        }

        Self {
            state: Mutex::new(state),
        }
    }

    /// Number of rows held, tombstones included.
    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the storage closed and returns every row, sorted by id.
    ///
    /// Runs under the same lock as every other operation: calls that
    /// completed before are part of the returned rows, calls that come after
    /// fail with [`StorageError::Closed`].
    pub(crate) fn seal(&self) -> Result<Vec<ShortenedUrl>> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.closed = true;

        Ok(state.rows.values().cloned().collect())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, original_url: &str, added_by: &str) -> Result<UrlId> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.insert(original_url, added_by)
    }

    async fn store_batch(
        &self,
        records: &[BatchRequestRecord],
        added_by: &str,
    ) -> Result<Vec<BatchResponseRecord>> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let mut responses = Vec::with_capacity(records.len());
        for record in records {
            let existing = state.live_urls.get(&record.original_url).copied();
            let response = match existing {
                Some(id) => BatchResponseRecord {
                    correlation_id: record.correlation_id.clone(),
                    id,
                    duplicate: true,
                },
                None => BatchResponseRecord {
                    correlation_id: record.correlation_id.clone(),
                    id: state.insert(&record.original_url, added_by)?,
                    duplicate: false,
                },
            };
            responses.push(response);
        }

        Ok(responses)
    }

    async fn get_by_id(&self, id: UrlId) -> Result<ShortenedUrl> {
        let state = self.state.lock();
        state.ensure_open()?;

        state
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("id {id}")))
    }

    async fn get_by_id_multi(&self, ids: &[UrlId]) -> Result<Vec<ShortenedUrl>> {
        let state = self.state.lock();
        state.ensure_open()?;

        let mut found: Vec<ShortenedUrl> = ids
            .iter()
            .filter_map(|id| state.rows.get(id).cloned())
            .collect();
        found.sort_by_key(|row| row.id);
        found.dedup_by_key(|row| row.id);

        Ok(found)
    }

    async fn get_by_url(&self, original_url: &str) -> Result<ShortenedUrl> {
        let state = self.state.lock();
        state.ensure_open()?;

        state
            .live_urls
            .get(original_url)
            .and_then(|id| state.rows.get(id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("url {original_url}")))
    }

    async fn get_all_user_urls(&self, added_by: &str) -> Result<Vec<ShortenedUrl>> {
        let state = self.state.lock();
        state.ensure_open()?;

        let rows: Vec<ShortenedUrl> = state
            .by_owner
            .get(added_by)
            .into_iter()
            .flatten()
            .filter_map(|id| state.rows.get(id))
            .filter(|row| !row.is_deleted)
            .cloned()
            .collect();

        if rows.is_empty() {
            return Err(StorageError::NotFound(format!("urls of {added_by}")));
        }
        Ok(rows)
    }

    async fn delete_by_id(&self, id: UrlId) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.tombstone(id);
        Ok(())
    }

    async fn delete_by_id_multi(&self, ids: &[UrlId]) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        for &id in ids {
            state.tombstone(id);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.state.lock().ensure_open()
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const YA: &str = "https://ya.ru";
    const GOOGLE: &str = "https://google.com";

    fn batch(items: &[(&str, &str)]) -> Vec<BatchRequestRecord> {
        items
            .iter()
            .map(|(correlation_id, url)| BatchRequestRecord {
                correlation_id: correlation_id.to_string(),
                original_url: url.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn store_and_get() {
        let storage = MemoryStorage::new();

        let id = storage.store(YA, "u1").await.unwrap();
        assert_eq!(id, 1);

        let row = storage.get_by_id(id).await.unwrap();
        assert_eq!(row, ShortenedUrl::new(1, YA, "u1"));
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let storage = MemoryStorage::new();

        let err = storage.get_by_id(3).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn store_conflict_then_resolve() {
        let storage = MemoryStorage::new();
        let id = storage.store(YA, "u1").await.unwrap();

        let err = storage.store(YA, "u2").await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));

        let existing = storage.get_by_url(YA).await.unwrap();
        assert_eq!(existing.id, id);
        assert_eq!(existing.added_by, "u1");
    }

    #[tokio::test]
    async fn deleted_url_can_be_shortened_again() {
        let storage = MemoryStorage::new();
        let first = storage.store(YA, "u1").await.unwrap();
        storage.delete_by_id(first).await.unwrap();

        assert!(storage.get_by_url(YA).await.unwrap_err().is_not_found());

        let second = storage.store(YA, "u1").await.unwrap();
        assert!(second > first);
        assert_eq!(storage.get_by_url(YA).await.unwrap().id, second);
        assert!(storage.get_by_id(first).await.unwrap().is_deleted);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let storage = MemoryStorage::new();
        let id = storage.store(YA, "u1").await.unwrap();

        storage.delete_by_id(id).await.unwrap();
        storage.delete_by_id(id).await.unwrap();
        storage.delete_by_id(42).await.unwrap();

        let row = storage.get_by_id(id).await.unwrap();
        assert!(row.is_deleted);
    }

    #[tokio::test]
    async fn user_listing_skips_tombstones() {
        let storage = MemoryStorage::new();
        let ya = storage.store(YA, "u1").await.unwrap();
        let google = storage.store(GOOGLE, "u1").await.unwrap();
        storage.store("https://other.org", "u2").await.unwrap();

        storage.delete_by_id_multi(&[ya]).await.unwrap();

        let rows = storage.get_all_user_urls("u1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, google);

        storage.delete_by_id_multi(&[google]).await.unwrap();
        assert!(storage.get_all_user_urls("u1").await.unwrap_err().is_not_found());
        assert!(storage.get_all_user_urls("nobody").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn get_by_id_multi_skips_unknown_ids() {
        let storage = MemoryStorage::new();
        let ya = storage.store(YA, "u1").await.unwrap();
        let google = storage.store(GOOGLE, "u1").await.unwrap();

        let rows = storage
            .get_by_id_multi(&[google, 99, ya, google])
            .await
            .unwrap();
        let ids: Vec<UrlId> = rows.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![ya, google]);

        assert!(storage.get_by_id_multi(&[7, 8]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_batch_echoes_correlation_ids() {
        let storage = MemoryStorage::new();
        let existing = storage.store(GOOGLE, "u0").await.unwrap();

        let responses = storage
            .store_batch(&batch(&[("a", YA), ("b", GOOGLE), ("c", YA)]), "u1")
            .await
            .unwrap();

        let correlation: Vec<&str> = responses
            .iter()
            .map(|r| r.correlation_id.as_str())
            .collect();
        assert_eq!(correlation, vec!["a", "b", "c"]);

        assert!(!responses[0].duplicate);
        assert_eq!(responses[1].id, existing);
        assert!(responses[1].duplicate);
        assert_eq!(responses[2].id, responses[0].id);
        assert!(responses[2].duplicate);
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn from_records_restores_counter_and_indexes() {
        let mut deleted = ShortenedUrl::new(2, GOOGLE, "u1");
        deleted.is_deleted = true;
        let storage = MemoryStorage::from_records(vec![ShortenedUrl::new(5, YA, "u1"), deleted]);

        assert_eq!(storage.store("https://new.org", "u1").await.unwrap(), 6);
        assert!(storage.store(YA, "u2").await.unwrap_err().is_duplicate());
        assert_eq!(storage.store(GOOGLE, "u2").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn restored_duplicate_takes_over_after_delete() {
        let storage = MemoryStorage::from_records(vec![
            ShortenedUrl::new(1, YA, "u1"),
            ShortenedUrl::new(2, YA, "u2"),
            ShortenedUrl::new(3, YA, "u3"),
        ]);
        assert_eq!(storage.get_by_url(YA).await.unwrap().id, 1);

        storage.delete_by_id_multi(&[1, 2]).await.unwrap();

        assert_eq!(storage.get_by_url(YA).await.unwrap().id, 3);
        assert!(storage.store(YA, "u4").await.unwrap_err().is_duplicate());

        storage.delete_by_id(3).await.unwrap();
        assert!(storage.get_by_url(YA).await.unwrap_err().is_not_found());
        assert_eq!(storage.store(YA, "u4").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn closed_storage_rejects_calls() {
        let storage = MemoryStorage::new();
        storage.store(YA, "u1").await.unwrap();

        storage.close().await.unwrap();
        storage.close().await.unwrap();

        assert!(matches!(
            storage.store(GOOGLE, "u1").await,
            Err(StorageError::Closed)
        ));
        assert!(matches!(storage.ping().await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn seal_returns_sorted_rows_once() {
        let storage = MemoryStorage::new();
        storage.store(YA, "u2").await.unwrap();
        storage.store(GOOGLE, "u1").await.unwrap();

        let rows = storage.seal().unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(matches!(storage.seal(), Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn concurrent_access() {
        let storage = Arc::new(MemoryStorage::new());
        let mut handles = vec![];

        for i in 0..50 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .store(&format!("https://example{i}.com"), "u1")
                    .await
                    .unwrap()
            }));
        }

        let mut ids = vec![];
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=50).collect::<Vec<UrlId>>());
        assert_eq!(storage.get_all_user_urls("u1").await.unwrap().len(), 50);
    }
}
