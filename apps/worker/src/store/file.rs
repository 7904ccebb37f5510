use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{RecordStore, StoreError};

const RECORD_EXTENSION: &str = "json";

/// JSON-file record store: `<base_dir>/<collection>/<id>.json`
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StoreError> {
        check_key(collection)?;
        Ok(self.base_dir.join(collection))
    }

    fn record_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        check_key(id)?;
        Ok(self.collection_dir(collection)?.join(format!("{id}.{RECORD_EXTENSION}")))
    }

    /// Create a new record, failing if it already exists
    pub async fn create(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        let dir = self.collection_dir(collection)?;
        fs::create_dir_all(&dir).await.map_err(|source| StoreError::Io { path: dir, source })?;

        let path = self.record_path(collection, id)?;
        let contents = serde_json::to_vec(record)?;

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        file.write_all(&contents)
            .await
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;
        file.flush().await.map_err(|source| StoreError::Io { path, source })
    }

    /// Remove a record
    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(collection, id)?;
        fs::remove_file(&path).await.map_err(|source| match source.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            },
            _ => StoreError::Io { path, source },
        })
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.collection_dir(collection)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // Nothing has been created in this collection yet
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Io { path: dir.clone(), source })?
        {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        let path = self.record_path(collection, id)?;

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_slice(&raw).map_err(|source| StoreError::Parse { path, source })
    }

    async fn update(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        let path = self.record_path(collection, id)?;
        let not_found = || StoreError::NotFound { collection: collection.to_string(), id: id.to_string() };

        // Write next to the record and rename so readers never see a half-written file.
        let contents = serde_json::to_vec(record)?;
        let staging = path.with_extension("json.tmp");
        match fs::write(&staging, &contents).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(source) => return Err(StoreError::Io { path: staging, source }),
        }

        // Checked as late as possible so a record deleted meanwhile is not revived.
        match fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                let _ = fs::remove_file(&staging).await;
                return Err(not_found());
            }
            Err(source) => {
                let _ = fs::remove_file(&staging).await;
                return Err(StoreError::Io { path, source });
            }
        }

        fs::rename(&staging, &path).await.map_err(|source| StoreError::Io { path, source })
    }
}

/// Keys become file names, so path separators and dot-segments are refused
fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
