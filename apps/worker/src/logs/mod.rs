//! Per-check append-only logs and their compressed archives.
//!
//! Layout inside the logs directory:
//! - `<stream>.log`: live stream, one JSON document per line
//! - `<archive>.gz.b64`: base64 encoded gzip of a former live stream
//!
//! Archives written by older deployments used the `.gs.b64` spelling; they
//! are still listed and can be decompressed.

mod codec;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub use codec::{compress_text, decompress_text};

pub const LOG_EXTENSION: &str = "log";
pub const ARCHIVE_EXTENSION: &str = "gz.b64";
pub const LEGACY_ARCHIVE_EXTENSION: &str = "gs.b64";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log stream {0} does not exist")]
    StreamNotFound(String),

    #[error("archive {0} does not exist")]
    ArchiveNotFound(String),

    #[error("archive {0} already exists")]
    ArchiveExists(String),

    #[error("log stream {0} is empty, nothing to compress")]
    Empty(String),

    #[error("invalid log identifier: {0:?}")]
    InvalidId(String),

    #[error("archive {id} is corrupt: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only writer for per-check log streams.
///
/// Appends and rotations of one stream are serialized through a per-stream
/// lock; different streams never wait on each other.
pub struct LogWriter {
    base_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LogWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), locks: Mutex::new(HashMap::new()) }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create the logs directory if needed
    pub async fn ensure_dir(&self) -> Result<(), LogError> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|source| LogError::Io { path: self.base_dir.clone(), source })
    }

    fn stream_lock(&self, stream_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(stream_id.to_string()).or_default())
    }

    fn stream_path(&self, stream_id: &str) -> Result<PathBuf, LogError> {
        check_id(stream_id)?;
        Ok(self.base_dir.join(format!("{stream_id}.{LOG_EXTENSION}")))
    }

    fn archive_path(&self, archive_id: &str, extension: &str) -> Result<PathBuf, LogError> {
        check_id(archive_id)?;
        Ok(self.base_dir.join(format!("{archive_id}.{extension}")))
    }

    /// Append one record to a stream, creating the stream if absent
    pub async fn append(&self, stream_id: &str, record: &str) -> Result<(), LogError> {
        let path = self.stream_path(stream_id)?;
        let lock = self.stream_lock(stream_id);
        let _guard = lock.lock().await;

        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');

        let io_err = |source| LogError::Io { path: path.clone(), source };
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await.map_err(io_err)?;
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)
    }

    /// Current content of a live stream
    pub async fn read(&self, stream_id: &str) -> Result<String, LogError> {
        let path = self.stream_path(stream_id)?;
        read_stream(&path, stream_id).await
    }

    /// Live stream ids, plus archive ids when `include_archived` is set
    pub async fn list(&self, include_archived: bool) -> Result<Vec<String>, LogError> {
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|source| LogError::Io { path: self.base_dir.clone(), source })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| LogError::Io { path: self.base_dir.clone(), source })?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            if let Some(id) = name.strip_suffix(".log") {
                ids.push(id.to_string());
            } else if include_archived {
                if let Some(id) = name
                    .strip_suffix(".gz.b64")
                    .or_else(|| name.strip_suffix(".gs.b64"))
                {
                    ids.push(id.to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Compress a live stream into a new archive, leaving the stream as is
    pub async fn compress(&self, stream_id: &str, archive_id: &str) -> Result<(), LogError> {
        let lock = self.stream_lock(stream_id);
        let _guard = lock.lock().await;
        self.compress_locked(stream_id, archive_id).await
    }

    /// Empty a live stream
    pub async fn truncate(&self, stream_id: &str) -> Result<(), LogError> {
        let lock = self.stream_lock(stream_id);
        let _guard = lock.lock().await;
        self.truncate_locked(stream_id).await
    }

    /// Compress then truncate without letting an append slip in between
    pub async fn rotate(&self, stream_id: &str, archive_id: &str) -> Result<(), LogError> {
        let lock = self.stream_lock(stream_id);
        let guard = lock.lock().await;

        let result = match self.compress_locked(stream_id, archive_id).await {
            Ok(()) => self.truncate_locked(stream_id).await,
            Err(e) => Err(e),
        };

        drop(guard);
        drop(lock);
        self.release_lock(stream_id);
        result
    }

    /// Forget the lock of a stream that no task holds or waits on
    fn release_lock(&self, stream_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(stream_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(stream_id);
        }
    }

    /// Content of an archive
    pub async fn decompress(&self, archive_id: &str) -> Result<String, LogError> {
        for extension in [ARCHIVE_EXTENSION, LEGACY_ARCHIVE_EXTENSION] {
            let path = self.archive_path(archive_id, extension)?;
            match fs::read_to_string(&path).await {
                Ok(encoded) => {
                    return decompress_text(&encoded).map_err(|source| LogError::Corrupt {
                        id: archive_id.to_string(),
                        source,
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(LogError::Io { path, source }),
            }
        }

        Err(LogError::ArchiveNotFound(archive_id.to_string()))
    }

    async fn compress_locked(&self, stream_id: &str, archive_id: &str) -> Result<(), LogError> {
        let source_path = self.stream_path(stream_id)?;
        let archive_path = self.archive_path(archive_id, ARCHIVE_EXTENSION)?;

        let content = read_stream(&source_path, stream_id).await?;
        if content.is_empty() {
            return Err(LogError::Empty(stream_id.to_string()));
        }

        let encoded = compress_text(&content)
            .map_err(|source| LogError::Io { path: archive_path.clone(), source })?;

        let io_err = |source| LogError::Io { path: archive_path.clone(), source };
        let mut archive = match fs::OpenOptions::new().write(true).create_new(true).open(&archive_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LogError::ArchiveExists(archive_id.to_string()));
            }
            Err(source) => return Err(io_err(source)),
        };
        archive.write_all(encoded.as_bytes()).await.map_err(io_err)?;
        archive.flush().await.map_err(io_err)?;

        debug!(stream = stream_id, archive = archive_id, bytes = content.len(), "log stream compressed");
        Ok(())
    }

    async fn truncate_locked(&self, stream_id: &str) -> Result<(), LogError> {
        let path = self.stream_path(stream_id)?;

        let file = match fs::OpenOptions::new().write(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LogError::StreamNotFound(stream_id.to_string()));
            }
            Err(source) => return Err(LogError::Io { path, source }),
        };

        file.set_len(0).await.map_err(|source| LogError::Io { path, source })
    }
}

async fn read_stream(path: &Path, stream_id: &str) -> Result<String, LogError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(LogError::StreamNotFound(stream_id.to_string())),
        Err(source) => Err(LogError::Io { path: path.to_path_buf(), source }),
    }
}

fn check_id(id: &str) -> Result<(), LogError> {
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(LogError::InvalidId(id.to_string()));
    }
    Ok(())
}
