use crate::memory::MemoryStorage;
use async_trait::async_trait;
use snip_core::error::Result;
use snip_core::{
    BatchRequestRecord, BatchResponseRecord, ShortenedUrl, Storage, StorageError, UrlId,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

const BACKUP_SUFFIX: &str = ".new";

/// File-backed implementation of [`Storage`].
///
/// All reads and writes go through an owned [`MemoryStorage`]. The backing
/// file only matters at two moments:
///
/// - [`open`](FileStorage::open) loads the snapshot, a JSON array of
///   `[id, original_url, added_by, is_deleted]` rows
/// - [`close`](Storage::close) writes the whole state to `<path>.new`
///   (create-new, fsynced), renames it over `<path>` and fsyncs the
///   directory
///
/// A leftover `<path>.new` means an earlier shutdown died half way through
/// writing its snapshot. `open` refuses to start in that case until an
/// operator moves the file away.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    memory: MemoryStorage,
}

impl FileStorage {
    /// Opens (or creates) the snapshot at `path` and loads it into memory.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let backup = backup_path(&path);

        if fs::try_exists(&backup).await? {
            error!(
                path = %path.display(),
                backup = %backup.display(),
                "temporary backup file still exists, the last shutdown did not finish"
            );
            return Err(StorageError::Consistency(format!(
                "{} exists: the previous shutdown was interrupted and some urls may be lost; \
                 move the file away (and inspect it) before starting again",
                backup.display()
            )));
        }

        let rows = read_snapshot(&path).await?;
        info!(path = %path.display(), rows = rows.len(), "loaded url snapshot");

        Ok(Self {
            path,
            memory: MemoryStorage::from_records(rows),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_snapshot(&self, rows: &[ShortenedUrl]) -> Result<()> {
        let backup = backup_path(&self.path);
        let bytes = serde_json::to_vec(rows)
            .map_err(|e| StorageError::InvalidData(format!("cannot encode snapshot: {e}")))?;

        // create_new: an existing backup was checked for at startup, so
        // finding one here means something else is writing it too.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&backup)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    StorageError::Consistency(format!("cannot create {}: {e}", backup.display()))
                }
                _ => e.into(),
            })?;

        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&backup, &self.path).await?;
        sync_dir(parent_dir(&self.path)).await
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Directory holding `path`, `.` for a bare file name.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Makes a rename inside `dir` durable.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

async fn read_snapshot(path: &Path) -> Result<Vec<ShortenedUrl>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            fs::write(path, b"").await?;
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::InvalidData(format!("cannot decode snapshot {}: {e}", path.display()))
    })
}

#[async_trait]
impl Storage for FileStorage {
    async fn store(&self, original_url: &str, added_by: &str) -> Result<UrlId> {
        self.memory.store(original_url, added_by).await
    }

    async fn store_batch(
        &self,
        records: &[BatchRequestRecord],
        added_by: &str,
    ) -> Result<Vec<BatchResponseRecord>> {
        self.memory.store_batch(records, added_by).await
    }

    async fn get_by_id(&self, id: UrlId) -> Result<ShortenedUrl> {
        self.memory.get_by_id(id).await
    }

    async fn get_by_id_multi(&self, ids: &[UrlId]) -> Result<Vec<ShortenedUrl>> {
        self.memory.get_by_id_multi(ids).await
    }

    async fn get_by_url(&self, original_url: &str) -> Result<ShortenedUrl> {
        self.memory.get_by_url(original_url).await
    }

    async fn get_all_user_urls(&self, added_by: &str) -> Result<Vec<ShortenedUrl>> {
        self.memory.get_all_user_urls(added_by).await
    }

    async fn delete_by_id(&self, id: UrlId) -> Result<()> {
        self.memory.delete_by_id(id).await
    }

    async fn delete_by_id_multi(&self, ids: &[UrlId]) -> Result<()> {
        self.memory.delete_by_id_multi(ids).await
    }

    async fn ping(&self) -> Result<()> {
        self.memory.ping().await
    }

    async fn close(&self) -> Result<()> {
        let rows = self.memory.seal()?;

        if let Err(err) = self.write_snapshot(&rows).await {
            error!(
                path = %self.path.display(),
                rows = rows.len(),
                error = %err,
                "failed to dump url snapshot to disk, investigate before restarting"
            );
            return Err(err);
        }

        info!(path = %self.path.display(), rows = rows.len(), "url snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/tmp/urls.json")),
            PathBuf::from("/tmp/urls.json.new")
        );
        assert_eq!(backup_path(Path::new("urls")), PathBuf::from("urls.new"));
    }

    #[tokio::test]
    async fn open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");

        let storage = FileStorage::open(&path).await.unwrap();

        assert!(path.exists());
        assert!(storage.get_by_id(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn open_refuses_leftover_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");
        std::fs::write(dir.path().join("urls.json.new"), b"[]").unwrap();

        let err = FileStorage::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Consistency(_)));
    }

    #[tokio::test]
    async fn open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = FileStorage::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
    }

    #[tokio::test]
    async fn close_fails_loudly_when_backup_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");
        let storage = FileStorage::open(&path).await.unwrap();
        storage.store("https://ya.ru", "u1").await.unwrap();

        std::fs::write(dir.path().join("urls.json.new"), b"partial").unwrap();

        let err = storage.close().await.unwrap_err();
        assert!(matches!(err, StorageError::Consistency(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn parent_dir_of_bare_name_is_cwd() {
        assert_eq!(parent_dir(Path::new("urls.json")), Path::new("."));
        assert_eq!(
            parent_dir(Path::new("/tmp/urls.json")),
            Path::new("/tmp")
        );
    }

    #[tokio::test]
    async fn close_reports_io_when_directory_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let storage = FileStorage::open(data.join("urls.json")).await.unwrap();
        storage.store("https://ya.ru", "u1").await.unwrap();

        std::fs::remove_dir_all(&data).unwrap();

        let err = storage.close().await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)), "{err:?}");
    }

    #[tokio::test]
    async fn close_persists_rows_for_next_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");
        let storage = FileStorage::open(&path).await.unwrap();
        storage.store("https://ya.ru", "u1").await.unwrap();

        storage.close().await.unwrap();

        let reopened = FileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get_by_id(1).await.unwrap().original_url, "https://ya.ru");
        assert!(!backup_path(&path).exists());
    }

    #[tokio::test]
    async fn close_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("urls.json"))
            .await
            .unwrap();

        storage.close().await.unwrap();
        assert!(matches!(storage.close().await, Err(StorageError::Closed)));
        assert!(!dir.path().join("urls.json.new").exists());
    }
}
