/// Record store abstraction
///
/// The CRUD layer and the worker share one flat store of JSON records keyed
/// by collection and id. The worker only needs to enumerate, read and update.
pub mod file;

pub use file::FileStore;

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Collection holding check records
pub const CHECKS: &str = "checks";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("invalid record key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Store trait for abstracting record persistence
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List all record ids in a collection
    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    /// Read a record, [`StoreError::NotFound`] if it does not exist
    async fn read(&self, collection: &str, id: &str) -> Result<Value, StoreError>;

    /// Replace an existing record
    async fn update(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError>;
}
