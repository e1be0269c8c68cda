use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::Recording;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store layout version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("recording not found: {0}")]
    NotFound(String),
}

/// Persistence collaborator for saved recordings.
///
/// `id` is the unique key; duplicate names are allowed. Saving a recording
/// whose id already exists replaces it, so a retried save is harmless.
#[async_trait]
pub trait RecordingStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Recording>, StoreError>;

    async fn save(&self, recording: Recording) -> Result<(), StoreError>;

    /// Remove a recording; unknown ids are ignored. Clears the selection if it pointed here.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn get_selected(&self) -> Result<Option<String>, StoreError>;

    /// Fails with [`StoreError::NotFound`] for ids that are not stored
    async fn set_selected(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Recording>, StoreError> {
        Ok(self.list().await?.into_iter().find(|r| r.id == id))
    }
}
