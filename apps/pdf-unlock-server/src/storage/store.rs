//! File Store
//!
//! Directory-backed registry of generated artifacts. The directory is the
//! database: every artifact is a data file under `<root>/<kind dir>/` named by
//! its id, with a JSON sidecar (`<id>.meta`) carrying the display name and
//! timestamps. Writes are staged under `<root>/.staging/` and linked into
//! place, so readers never observe a partially written file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::naming::generate_file_name;
use super::types::{FileKind, FileMetadata, StoredFile};

/// Staging directory name below the store root
pub const STAGING_DIR: &str = ".staging";

/// Extension appended to a data file name to form its sidecar name
const META_SUFFIX: &str = ".meta";

/// Attempts at finding a free name before giving up
const MAX_NAME_ATTEMPTS: usize = 5;

/// Maximum accepted id length
const MAX_ID_LEN: usize = 255;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// File Store
// ============================================================================

/// Directory-backed store of generated files
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

struct FileStoreInner {
    root: PathBuf,
    ttl: Duration,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self, StoreError> {
        let root = root.into();

        for dir in FileKind::ALL
            .iter()
            .map(|kind| root.join(kind.dir_name()))
            .chain(std::iter::once(root.join(STAGING_DIR)))
        {
            fs::create_dir_all(&dir).await.map_err(|source| StoreError::Write {
                path: dir.clone(),
                source,
            })?;
        }

        tracing::debug!(root = %root.display(), ttl_hours = ttl.num_hours(), "File store ready");

        Ok(Self {
            inner: Arc::new(FileStoreInner { root, ttl }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Time to live applied to every new file
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn kind_dir(&self, kind: FileKind) -> PathBuf {
        self.inner.root.join(kind.dir_name())
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.inner.root.join(STAGING_DIR)
    }

    /// A fresh, unused path in the staging directory
    pub fn staging_path(&self, extension: &str) -> PathBuf {
        self.staging_dir()
            .join(format!("{}.{}", Uuid::new_v4(), extension.trim_start_matches('.')))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store `bytes` as a new artifact of `kind`
    ///
    /// The file name is generated from the stem of `display_name`. Both the
    /// sidecar and the data file are hard-linked from the staging area, which
    /// fails instead of clobbering an existing name.
    pub async fn put(
        &self,
        kind: FileKind,
        display_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StoreError> {
        let title = display_stem(display_name);
        let staged_data = self.staging_path(kind.extension());
        let staged_meta = self.staging_path("meta");

        let result = self
            .link_into_place(kind, display_name, &title, bytes, &staged_data, &staged_meta)
            .await;

        // The staged names are only ever hard links at this point
        let _ = fs::remove_file(&staged_data).await;
        let _ = fs::remove_file(&staged_meta).await;

        let stored = result?;

        tracing::info!(
            file_id = %stored.id,
            kind = ?kind,
            size_bytes = stored.size_bytes,
            expires_at = %stored.expires_at,
            "Stored file"
        );

        Ok(stored)
    }

    async fn link_into_place(
        &self,
        kind: FileKind,
        display_name: &str,
        title: &str,
        bytes: &[u8],
        staged_data: &Path,
        staged_meta: &Path,
    ) -> Result<StoredFile, StoreError> {
        write_synced(staged_data, bytes)
            .await
            .map_err(|source| StoreError::Write {
                path: staged_data.to_path_buf(),
                source,
            })?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let id = generate_file_name(title, kind.extension());
            let data_path = self.kind_dir(kind).join(&id);
            let meta_path = sidecar_path(&data_path);

            let created_at = Utc::now();
            let metadata = FileMetadata {
                display_name: display_name.to_string(),
                kind,
                created_at,
                expires_at: created_at + self.inner.ttl,
            };
            let meta_json = serde_json::to_vec(&metadata).map_err(|e| StoreError::Write {
                path: meta_path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            })?;

            write_synced(staged_meta, &meta_json)
                .await
                .map_err(|source| StoreError::Write {
                    path: staged_meta.to_path_buf(),
                    source,
                })?;

            match fs::hard_link(staged_meta, &meta_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(file_id = %id, "Name already taken, regenerating");
                    continue;
                }
                Err(source) => {
                    return Err(StoreError::Write {
                        path: meta_path,
                        source,
                    })
                }
            }

            match fs::hard_link(staged_data, &data_path).await {
                Ok(()) => {}
                Err(e) => {
                    let _ = fs::remove_file(&meta_path).await;
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        tracing::debug!(file_id = %id, "Name already taken, regenerating");
                        continue;
                    }
                    return Err(StoreError::Write {
                        path: data_path,
                        source: e,
                    });
                }
            }

            return Ok(StoredFile {
                id,
                display_name: metadata.display_name,
                absolute_path: data_path,
                created_at: metadata.created_at,
                expires_at: metadata.expires_at,
                size_bytes: bytes.len() as u64,
                kind,
            });
        }

        Err(StoreError::Write {
            path: self.kind_dir(kind),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "could not find a free file name",
            ),
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Look up a live (unexpired) file by id
    pub async fn get(&self, id: &str) -> Result<StoredFile, StoreError> {
        let (kind, path) = self.resolve(id)?;
        let entry = self.load_entry(kind, id, &path).await?;

        if entry.is_expired() {
            tracing::debug!(file_id = %id, "File expired, awaiting sweep");
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(entry)
    }

    /// Read a live file's contents
    pub async fn read(&self, id: &str) -> Result<(StoredFile, Vec<u8>), StoreError> {
        let entry = self.get(id).await?;
        let bytes = fs::read(&entry.absolute_path)
            .await
            .map_err(|e| not_found_or_io(e, id))?;
        Ok((entry, bytes))
    }

    /// Open a live file for streaming
    ///
    /// The returned handle stays readable even if the file is swept while the
    /// caller is still streaming it.
    pub async fn open_file(&self, id: &str) -> Result<(StoredFile, fs::File), StoreError> {
        let entry = self.get(id).await?;
        let file = fs::File::open(&entry.absolute_path)
            .await
            .map_err(|e| not_found_or_io(e, id))?;
        Ok((entry, file))
    }

    /// Live files of `kind`, oldest first
    pub async fn list(&self, kind: FileKind) -> Result<Vec<StoredFile>, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries(kind)
            .await?
            .into_iter()
            .filter(|entry| !entry.is_expired_at(now))
            .collect())
    }

    /// Every file of `kind` including expired ones, oldest first
    pub(crate) async fn entries(&self, kind: FileKind) -> Result<Vec<StoredFile>, StoreError> {
        let dir = self.kind_dir(kind);
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let name = match dir_entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.starts_with('.') || FileKind::from_file_name(&name) != Some(kind) {
                continue;
            }

            match self.load_entry(kind, &name, &dir_entry.path()).await {
                Ok(entry) => entries.push(entry),
                // Deleted between read_dir and stat
                Err(StoreError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(file_id = %name, error = %e, "Skipping unreadable entry");
                }
            }
        }

        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    // ========================================================================
    // Deletes
    // ========================================================================

    /// Remove a file and its sidecar
    ///
    /// Deleting an id that is already gone is `NotFound`.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let (_, path) = self.resolve(id)?;

        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, id))?;

        if let Err(e) = fs::remove_file(sidecar_path(&path)).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(file_id = %id, error = %e, "Failed to remove sidecar");
            }
        }

        tracing::info!(file_id = %id, "Deleted file");
        Ok(())
    }

    /// Remove leftovers older than `older_than`: sidecars without a data file
    /// and abandoned staging files
    pub async fn prune_orphans(&self, older_than: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - older_than;
        let mut removed = 0;

        for kind in FileKind::ALL {
            let mut read_dir = match fs::read_dir(self.kind_dir(kind)).await {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(dir_entry) = read_dir.next_entry().await? {
                let path = dir_entry.path();
                let Some(data_name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(META_SUFFIX))
                else {
                    continue;
                };

                let data_path = path.with_file_name(data_name);
                if fs::metadata(&data_path).await.is_ok() || !modified_before(&path, cutoff).await {
                    continue;
                }
                if fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }

        let mut staging = match fs::read_dir(self.staging_dir()).await {
            Ok(read_dir) => Some(read_dir),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(read_dir) = staging.as_mut() {
            while let Some(dir_entry) = read_dir.next_entry().await? {
                let path = dir_entry.path();
                if modified_before(&path, cutoff).await && fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(count = removed, "Pruned orphaned store files");
        }
        Ok(removed)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Validate an id and map it to its on-disk path
    fn resolve(&self, id: &str) -> Result<(FileKind, PathBuf), StoreError> {
        let kind = validate_id(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok((kind, self.kind_dir(kind).join(id)))
    }

    async fn load_entry(
        &self,
        kind: FileKind,
        id: &str,
        path: &Path,
    ) -> Result<StoredFile, StoreError> {
        let stat = fs::metadata(path).await.map_err(|e| not_found_or_io(e, id))?;
        if !stat.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let sidecar = match fs::read(sidecar_path(path)).await {
            Ok(raw) => serde_json::from_slice::<FileMetadata>(&raw)
                .ok()
                .filter(|meta| meta.kind == kind),
            Err(_) => None,
        };

        let (display_name, created_at, expires_at) = match sidecar {
            Some(meta) => (meta.display_name, meta.created_at, meta.expires_at),
            None => {
                let created_at: DateTime<Utc> = stat
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                (id.to_string(), created_at, created_at + self.inner.ttl)
            }
        };

        Ok(StoredFile {
            id: id.to_string(),
            display_name,
            absolute_path: path.to_path_buf(),
            created_at,
            expires_at,
            size_bytes: stat.len(),
            kind,
        })
    }
}

/// Check an id's shape and return the kind its extension names
///
/// Ids are plain file names: no separators, no leading dot, no `..`.
pub fn validate_id(id: &str) -> Option<FileKind> {
    if id.is_empty() || id.len() > MAX_ID_LEN || id.starts_with('.') || id.contains("..") {
        return None;
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return None;
    }
    FileKind::from_file_name(id)
}

fn display_stem(display_name: &str) -> String {
    Path::new(display_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(display_name)
        .to_string()
}

fn sidecar_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

fn not_found_or_io(error: io::Error, id: &str) -> StoreError {
    if error.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(id.to_string())
    } else {
        StoreError::Io(error)
    }
}

async fn modified_before(path: &Path, cutoff: DateTime<Utc>) -> bool {
    match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified) < cutoff,
        Err(_) => false,
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn open_store(ttl: Duration) -> (TempDir, FileStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path(), ttl).await.unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (_dir, store) = open_store(Duration::hours(24)).await;
        let data = b"%PDF-1.7 fake body".to_vec();

        let stored = store.put(FileKind::Pdf, "Annual Report.pdf", &data).await.unwrap();
        assert!(stored.id.starts_with("Annual_Report_"));
        assert!(stored.id.ends_with(".pdf"));
        assert_eq!(stored.display_name, "Annual Report.pdf");
        assert_eq!(stored.size_bytes, data.len() as u64);
        assert_eq!(stored.expires_at, stored.created_at + Duration::hours(24));

        let fetched = store.get(&stored.id).await.unwrap();
        assert_eq!(fetched.display_name, "Annual Report.pdf");
        assert_eq!(fetched.created_at, stored.created_at);

        let (_, bytes) = store.read(&stored.id).await.unwrap();
        assert_eq!(bytes, data);
    }

    #[tokio::test]
    async fn test_wide_character_title_round_trip() {
        let (_dir, store) = open_store(Duration::hours(1)).await;
        let display_name = format!("{}.pdf", "\u{20000}".repeat(100));

        let stored = store.put(FileKind::Pdf, &display_name, b"%PDF-1.4").await.unwrap();
        assert!(stored.id.len() <= MAX_ID_LEN);
        assert_eq!(validate_id(&stored.id), Some(FileKind::Pdf));

        let (fetched, bytes) = store.read(&stored.id).await.unwrap();
        assert_eq!(fetched.display_name, display_name);
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (_dir, store) = open_store(Duration::hours(1)).await;
        let stored = store.put(FileKind::Pptx, "deck", b"zip").await.unwrap();

        store.delete(&stored.id).await.unwrap();
        let second = store.delete(&stored.id).await;
        assert!(matches!(second, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get(&stored.id).await, Err(StoreError::NotFound(_))));
        assert!(!sidecar_path(&stored.absolute_path).exists());
    }

    #[tokio::test]
    async fn test_list_orders_by_creation_and_skips_internal_files() {
        let (_dir, store) = open_store(Duration::hours(1)).await;
        let first = store.put(FileKind::Pdf, "first.pdf", b"1").await.unwrap();
        let second = store.put(FileKind::Pdf, "second.pdf", b"2").await.unwrap();
        store.put(FileKind::Pptx, "other", b"3").await.unwrap();

        // Stray staging file and a non-pdf file in the kind directory
        std::fs::write(store.staging_path("pdf"), b"partial").unwrap();
        std::fs::write(store.kind_dir(FileKind::Pdf).join("notes.txt"), b"x").unwrap();

        let listed = store.list(FileKind::Pdf).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[tokio::test]
    async fn test_expired_files_are_hidden() {
        let (_dir, store) = open_store(Duration::zero()).await;
        let stored = store.put(FileKind::Pdf, "gone.pdf", b"x").await.unwrap();

        assert!(store.list(FileKind::Pdf).await.unwrap().is_empty());
        assert!(matches!(store.get(&stored.id).await, Err(StoreError::NotFound(_))));

        // Still on disk until a sweep removes it
        let all = store.entries(FileKind::Pdf).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_external_removal_is_not_found() {
        let (_dir, store) = open_store(Duration::hours(1)).await;
        let stored = store.put(FileKind::Pdf, "a.pdf", b"x").await.unwrap();

        std::fs::remove_file(&stored.absolute_path).unwrap();

        assert!(matches!(store.get(&stored.id).await, Err(StoreError::NotFound(_))));
        assert!(store.list(FileKind::Pdf).await.unwrap().is_empty());
        assert!(matches!(store.delete(&stored.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_sidecar_falls_back_to_mtime() {
        let (_dir, store) = open_store(Duration::hours(2)).await;
        let stored = store.put(FileKind::Pdf, "a.pdf", b"x").await.unwrap();
        std::fs::remove_file(sidecar_path(&stored.absolute_path)).unwrap();

        let fetched = store.get(&stored.id).await.unwrap();
        assert_eq!(fetched.display_name, stored.id);
        assert_eq!(fetched.expires_at, fetched.created_at + Duration::hours(2));
    }

    #[tokio::test]
    async fn test_invalid_ids_are_not_found() {
        let (_dir, store) = open_store(Duration::hours(1)).await;
        for id in ["", "../secret.pdf", ".hidden.pdf", "a/b.pdf", "noext", "x.pdf.meta"] {
            assert!(
                matches!(store.get(id).await, Err(StoreError::NotFound(_))),
                "id {:?} should be rejected",
                id
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_puts_never_collide() {
        let (_dir, store) = open_store(Duration::hours(1)).await;

        let mut handles = Vec::new();
        for i in 0..100u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let body = format!("payload-{}", i).into_bytes();
                let stored = store.put(FileKind::Pdf, "Same Title", &body).await.unwrap();
                (stored.id, body)
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            let (id, body) = handle.await.unwrap();
            let (_, bytes) = store.read(&id).await.unwrap();
            assert_eq!(bytes, body);
            assert!(ids.insert(id));
        }

        assert_eq!(ids.len(), 100);
        assert_eq!(store.list(FileKind::Pdf).await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_prune_orphans() {
        let (_dir, store) = open_store(Duration::hours(1)).await;
        let stored = store.put(FileKind::Pdf, "a.pdf", b"x").await.unwrap();
        std::fs::remove_file(&stored.absolute_path).unwrap();
        std::fs::write(store.staging_path("pdf"), b"stale").unwrap();

        // Nothing is old enough yet
        assert_eq!(store.prune_orphans(Duration::hours(1)).await.unwrap(), 0);

        // Everything older than "now + 1s" qualifies
        let removed = store.prune_orphans(Duration::seconds(-1)).await.unwrap();
        assert_eq!(removed, 2);
        assert!(!sidecar_path(&stored.absolute_path).exists());
    }
}
