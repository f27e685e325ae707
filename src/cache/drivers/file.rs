//! File Backend
//!
//! One file per key inside a cache directory. Files carry no native expiry,
//! so TTL is enforced lazily: an expired record is deleted when it is read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::{CacheBackend, CacheDriver, CacheMetadata, Clock, StoredRecord};
use crate::config::FileConfig;
use crate::error::{CacheError, Result};

/// Files kept in the cache directory by `clean` so it stays closed to web access.
const PROTECTED_FILES: [&str; 4] = [".htaccess", "index.html", "index.php", "web.config"];

// == File Cache ==
/// Cache backend storing one JSON record per key on disk.
///
/// `delete` returns `false` when the file did not exist.
#[derive(Debug)]
pub struct FileCache {
    cache_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCache {
    pub fn new(config: &FileConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_path: config.resolved_path(),
            clock,
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    // == Key Mapping ==
    /// Maps a key to its file, refusing keys that would leave the directory.
    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let escapes = key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(['/', '\\', '\0']);
        if escapes {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.cache_path.join(key))
    }

    // == Read Record ==
    /// Loads a live record, deleting it if its TTL has elapsed.
    async fn read_record(&self, key: &str) -> Result<Option<StoredRecord>> {
        let path = self.entry_path(key)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record = StoredRecord::decode(&raw)?;
        if record.is_expired(self.clock.now()) {
            debug!("File cache: '{}' expired, removing {}", key, path.display());
            tokio::fs::remove_file(&path).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn write_record(&self, key: &str, value: Value, ttl: u64) -> Result<()> {
        let path = self.entry_path(key)?;
        let record = StoredRecord::new(value, ttl, self.clock.now());
        tokio::fs::write(&path, record.encode()?).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).await?;
        }
        Ok(())
    }

    async fn remove_record(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // == Clean ==
    /// Deletes every file below the cache directory, keeping directories and
    /// the top-level protective files.
    fn remove_all(root: &Path) -> Result<()> {
        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(|e| CacheError::Backend(format!("walk failed: {e}")))?;
            if entry.file_type().is_dir() {
                continue;
            }
            let protected = entry.depth() == 1
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| PROTECTED_FILES.contains(&name));
            if !protected {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    // == Directory Listing ==
    fn list_files(root: &Path) -> Result<Value> {
        let mut files = Map::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| CacheError::Backend(format!("walk failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = entry.metadata().map_err(|e| CacheError::Backend(e.to_string()))?;
            let date = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs());

            files.insert(
                name.clone(),
                json!({
                    "name": name,
                    "server_path": entry.path().display().to_string(),
                    "size": metadata.len(),
                    "date": date,
                }),
            );
        }
        Ok(Value::Object(files))
    }
}

#[async_trait]
impl CacheBackend for FileCache {
    fn driver(&self) -> CacheDriver {
        CacheDriver::File
    }

    /// The directory must exist and accept a new file from this process.
    /// Mode bits alone miss ownership and ACLs, so an anonymous temp file is
    /// created and dropped instead.
    fn is_supported(&self) -> bool {
        match std::fs::metadata(&self.cache_path) {
            Ok(meta) if meta.is_dir() => match tempfile::tempfile_in(&self.cache_path) {
                Ok(_) => true,
                Err(e) => {
                    debug!("File cache: {} is not writable: {}", self.cache_path.display(), e);
                    false
                }
            },
            Ok(_) => {
                debug!("File cache: {} is not a directory", self.cache_path.display());
                false
            }
            Err(e) => {
                debug!("File cache: {} unavailable: {}", self.cache_path.display(), e);
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Option<Value> {
        match self.read_record(key).await {
            Ok(record) => record.map(|r| r.value),
            Err(e) => {
                warn!("File cache: failed to read '{}': {}", key, e);
                None
            }
        }
    }

    async fn save(&self, key: &str, value: Value, ttl: u64) -> bool {
        match self.write_record(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!("File cache: failed to write '{}': {}", key, e);
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.remove_record(key).await.unwrap_or_else(|e| {
            warn!("File cache: failed to delete '{}': {}", key, e);
            false
        })
    }

    async fn clean(&self) -> bool {
        let root = self.cache_path.clone();
        let result = tokio::task::spawn_blocking(move || Self::remove_all(&root))
            .await
            .map_err(CacheError::from)
            .and_then(|inner| inner);

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("File cache: failed to clean {}: {}", self.cache_path.display(), e);
                false
            }
        }
    }

    async fn cache_info(&self, _kind: Option<&str>) -> Option<Value> {
        let root = self.cache_path.clone();
        let result = tokio::task::spawn_blocking(move || Self::list_files(&root))
            .await
            .map_err(CacheError::from)
            .and_then(|inner| inner);

        result
            .map_err(|e| warn!("File cache: failed to list {}: {}", self.cache_path.display(), e))
            .ok()
    }

    async fn get_metadata(&self, key: &str) -> Option<CacheMetadata> {
        match self.read_record(key).await {
            Ok(record) => record.map(|r| r.metadata()),
            Err(e) => {
                warn!("File cache: failed to read metadata for '{}': {}", key, e);
                None
            }
        }
    }
}
