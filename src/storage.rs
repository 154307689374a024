//! File storage abstraction for message attachments.
//!
//! The dispatcher hands attachment bytes to a `FileStore` and persists only
//! the returned storage key. Backends: filesystem directory, or a no-op
//! store that discards payloads (used when attachments are disabled and by
//! tests that don't care about bytes).

use crate::config::StorageConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Object-storage collaborator for file message payloads.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` under `stored_name`. Returns the stable storage key
    /// persisted in the message record.
    async fn store(&self, stored_name: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

/// Store that discards all payloads. Every write succeeds and the stored
/// name itself serves as the key.
pub struct NoOpStore;

#[async_trait]
impl FileStore for NoOpStore {
    async fn store(&self, stored_name: &str, _bytes: &[u8]) -> Result<String, StorageError> {
        Ok(stored_name.to_string())
    }
}

/// Filesystem-backed store writing into a flat directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for FsStore {
    async fn store(&self, stored_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        // Stored names are generated server-side, but reject separators in
        // case a caller ever passes one through.
        if stored_name.contains(['/', '\\']) {
            return Err(StorageError::InvalidPayload(format!(
                "stored name {stored_name:?} contains a path separator"
            )));
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(stored_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(stored_name.to_string())
    }
}

/// Build the configured store.
pub fn from_config(config: &StorageConfig) -> Arc<dyn FileStore> {
    match config.backend.as_str() {
        "fs" => {
            tracing::info!(path = %config.path, "Initializing filesystem attachment store");
            Arc::new(FsStore::new(config.path.clone()))
        }
        _ => {
            tracing::info!("Attachment store 'none' or unknown. Using NoOp.");
            Arc::new(NoOpStore)
        }
    }
}
