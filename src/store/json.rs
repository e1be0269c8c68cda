//! Recordings persisted as a single JSON document.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::memory::{remove, select, upsert};
use super::traits::{RecordingStore, StoreError};
use crate::model::{Recording, StoreLayout, STORE_LAYOUT_VERSION};

/// File-backed store. A missing file is an empty store.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn load(&self) -> Result<StoreLayout, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreLayout::default())
            }
            Err(e) => return Err(self.io_error(e)),
        };
        if content.trim().is_empty() {
            return Ok(StoreLayout::default());
        }

        // Check the version before the shape so newer layouts get a clear error
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or(1);
        if found > u64::from(STORE_LAYOUT_VERSION) {
            return Err(StoreError::UnsupportedVersion {
                found,
                supported: STORE_LAYOUT_VERSION,
            });
        }

        let mut layout: StoreLayout = serde_json::from_value(value)?;
        layout.version = STORE_LAYOUT_VERSION;
        Ok(layout)
    }

    async fn persist(&self, layout: &StoreLayout) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        let json = serde_json::to_string_pretty(layout)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        log::debug!("store written to {}", self.path.display());
        Ok(())
    }

    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreLayout) -> Result<(), StoreError> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut layout = self.load().await?;
        change(&mut layout)?;
        self.persist(&layout).await
    }
}

#[async_trait]
impl RecordingStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Recording>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.recordings)
    }

    async fn save(&self, recording: Recording) -> Result<(), StoreError> {
        self.update(|layout| {
            upsert(layout, recording);
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.update(|layout| {
            remove(layout, id);
            Ok(())
        })
        .await
    }

    async fn get_selected(&self) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.current_recording_id)
    }

    async fn set_selected(&self, id: &str) -> Result<(), StoreError> {
        self.update(|layout| select(layout, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use tempfile::TempDir;

    fn recording(id: &str) -> Recording {
        Recording {
            id: id.to_string(),
            name: format!("rec {}", id),
            timestamp: "2024-05-01 08:30:00".to_string(),
            actions: vec![
                Action::click("#submit-btn", 10),
                Action::keydown("body > input:nth-child(1)", "a", 65, "", 11),
            ],
            count: 2,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/store.json"));
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.get_selected().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persists_versioned_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/store.json");
        let store = JsonFileStore::new(&path);
        store.save(recording("100")).await.unwrap();
        store.set_selected("100").await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["currentRecordingId"], "100");
        assert_eq!(raw["recordings"][0]["actions"][1]["code"], "KeyA");

        let reopened = JsonFileStore::new(&path);
        let loaded = reopened.get("100").await.unwrap().unwrap();
        assert_eq!(loaded, recording("100"));
    }

    #[tokio::test]
    async fn test_reads_unversioned_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r##"{"recordings":[{"id":"7","name":"old","timestamp":"t","count":1,
                "actions":[{"type":"click","target":"#x","timestamp":1}]}]}"##,
        )
        .unwrap();
        let store = JsonFileStore::new(&path);
        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].actions[0], Action::click("#x", 1));
    }

    #[tokio::test]
    async fn test_rejects_newer_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"version": 2, "recordings": {"shape": "changed"}}"#).unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.list().await,
            Err(StoreError::UnsupportedVersion { found: 2, supported: 1 })
        ));

        // 2^32 + 1 must not wrap around to a supported version
        std::fs::write(&path, r#"{"version": 4294967297, "recordings": []}"#).unwrap();
        assert!(matches!(
            store.list().await,
            Err(StoreError::UnsupportedVersion {
                found: 4294967297,
                supported: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_delete_selected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));
        store.save(recording("1")).await.unwrap();
        store.set_selected("1").await.unwrap();
        store.delete("1").await.unwrap();
        assert_eq!(store.get_selected().await.unwrap(), None);
        assert!(store.list().await.unwrap().is_empty());
    }
}
