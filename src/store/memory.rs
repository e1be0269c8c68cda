use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::{RecordingStore, StoreError};
use crate::model::{Recording, StoreLayout};

/// Volatile store, used by tests and one-shot sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    layout: Mutex<StoreLayout>,
    fail_saves: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail, as an unreachable or full store would
    pub async fn fail_saves_with(&self, message: &str) {
        *self.fail_saves.lock().await = Some(message.to_string());
    }

    pub async fn layout(&self) -> StoreLayout {
        self.layout.lock().await.clone()
    }
}

#[async_trait]
impl RecordingStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Recording>, StoreError> {
        Ok(self.layout.lock().await.recordings.clone())
    }

    async fn save(&self, recording: Recording) -> Result<(), StoreError> {
        if let Some(message) = self.fail_saves.lock().await.clone() {
            return Err(StoreError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, message),
            });
        }
        let mut layout = self.layout.lock().await;
        upsert(&mut layout, recording);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        remove(&mut *self.layout.lock().await, id);
        Ok(())
    }

    async fn get_selected(&self) -> Result<Option<String>, StoreError> {
        Ok(self.layout.lock().await.current_recording_id.clone())
    }

    async fn set_selected(&self, id: &str) -> Result<(), StoreError> {
        let mut layout = self.layout.lock().await;
        select(&mut layout, id)
    }
}

pub(crate) fn upsert(layout: &mut StoreLayout, recording: Recording) {
    match layout.recordings.iter_mut().find(|r| r.id == recording.id) {
        Some(existing) => *existing = recording,
        None => layout.recordings.push(recording),
    }
}

pub(crate) fn remove(layout: &mut StoreLayout, id: &str) {
    layout.recordings.retain(|r| r.id != id);
    if layout.current_recording_id.as_deref() == Some(id) {
        layout.current_recording_id = None;
    }
}

pub(crate) fn select(layout: &mut StoreLayout, id: &str) -> Result<(), StoreError> {
    if !layout.recordings.iter().any(|r| r.id == id) {
        return Err(StoreError::NotFound(id.to_string()));
    }
    layout.current_recording_id = Some(id.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;

    fn recording(id: &str, name: &str) -> Recording {
        Recording {
            id: id.to_string(),
            name: name.to_string(),
            timestamp: "2024-05-01 08:30:00".to_string(),
            actions: vec![Action::click("#a", 1)],
            count: 1,
        }
    }

    #[tokio::test]
    async fn test_save_is_idempotent_by_id() {
        let store = MemoryStore::new();
        store.save(recording("1", "a")).await.unwrap();
        store.save(recording("1", "a")).await.unwrap();
        store.save(recording("2", "a")).await.unwrap();
        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, list[1].name);
    }

    #[tokio::test]
    async fn test_delete_clears_selection() {
        let store = MemoryStore::new();
        store.save(recording("1", "a")).await.unwrap();
        store.save(recording("2", "b")).await.unwrap();
        store.set_selected("1").await.unwrap();

        store.delete("2").await.unwrap();
        assert_eq!(store.get_selected().await.unwrap().as_deref(), Some("1"));

        store.delete("1").await.unwrap();
        assert_eq!(store.get_selected().await.unwrap(), None);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_unknown() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_selected("nope").await,
            Err(StoreError::NotFound(id)) if id == "nope"
        ));
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
