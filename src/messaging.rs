//! Cross-context commands delivered into the page, and the notification the
//! page sends back to the list-management context when the store changes.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::dom::{CaptureHost, LiveDocument};
use crate::model::{Action, Recording};
use crate::recorder::{EventRecorder, RecorderError};
use crate::replayer::{ReplayError, ReplayHandle, Replayer};
use crate::store::{RecordingStore, StoreError};

/// Command delivered into the page context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PageCommand {
    /// Begin a new recording with the given display name
    Start { name: String },
    /// Begin replaying the given recording
    Replay { recording: Recording },
}

/// Notification from the page to the list-management context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ListNotification {
    UpdateRecordings {
        #[serde(rename = "selectedId", default, skip_serializing_if = "Option::is_none")]
        selected_id: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("malformed command: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a command set in motion
pub enum CommandOutcome {
    RecordingStarted,
    ReplayStarted(ReplayHandle),
}

/// Page-side endpoint: owns the recorder and replayer for one document.
///
/// Notifications are best effort; if the list context is gone they are dropped.
pub struct PageContext<D, S: ?Sized> {
    document: Arc<D>,
    store: Arc<S>,
    recorder: EventRecorder,
    replayer: Replayer<D>,
    notifier: Option<mpsc::UnboundedSender<ListNotification>>,
}

impl<D, S> PageContext<D, S>
where
    D: LiveDocument + CaptureHost + 'static,
    S: RecordingStore + ?Sized,
{
    pub fn new(document: Arc<D>, store: Arc<S>, recorder: EventRecorder, replayer: Replayer<D>) -> Self {
        Self {
            document,
            store,
            recorder,
            replayer,
            notifier: None,
        }
    }

    /// Route store-change notifications to the list context
    pub fn with_notifier(mut self, notifier: mpsc::UnboundedSender<ListNotification>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut EventRecorder {
        &mut self.recorder
    }

    pub fn replayer(&self) -> &Replayer<D> {
        &self.replayer
    }

    /// Decode and dispatch a raw command message
    pub async fn handle_message(&mut self, raw: &str) -> Result<CommandOutcome, MessagingError> {
        let command: PageCommand = serde_json::from_str(raw)?;
        self.handle(command).await
    }

    pub async fn handle(&mut self, command: PageCommand) -> Result<CommandOutcome, MessagingError> {
        match command {
            PageCommand::Start { name } => {
                self.recorder.start(&*self.document, Some(&name)).await?;
                Ok(CommandOutcome::RecordingStarted)
            }
            PageCommand::Replay { recording } => {
                let handle = self.replayer.start(&recording.name, recording.actions)?;
                Ok(CommandOutcome::ReplayStarted(handle))
            }
        }
    }

    /// Process captured events until `stop` resolves or capture ends.
    ///
    /// `stop` is polled before every event, so a steady stream of events
    /// cannot hold off a stop request. Events still in flight are picked up by
    /// [`stop_recording`](Self::stop_recording).
    pub async fn record_until<F>(&mut self, stop: F, mut on_action: impl FnMut(&Action))
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                step = self.recorder.process_next() => match step {
                    Some(actions) => actions.iter().for_each(&mut on_action),
                    None => break,
                },
            }
        }
    }

    pub async fn stop_recording(&mut self) -> Result<(), MessagingError> {
        self.recorder.stop(&*self.document).await?;
        Ok(())
    }

    /// Stop recording if still active, then save, select the recording and
    /// tell the list context
    pub async fn save_recording(&mut self) -> Result<Recording, MessagingError> {
        if self.recorder.is_recording() {
            self.recorder.stop(&*self.document).await?;
        }
        let recording = self.recorder.save(&*self.store).await?;
        self.notify(ListNotification::UpdateRecordings {
            selected_id: Some(recording.id.clone()),
        });
        Ok(recording)
    }

    pub async fn delete_recording(&mut self, id: &str) -> Result<(), MessagingError> {
        self.store.delete(id).await?;
        let selected_id = self.store.get_selected().await?;
        self.notify(ListNotification::UpdateRecordings { selected_id });
        Ok(())
    }

    fn notify(&self, notification: ListNotification) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if notifier.send(notification).is_err() {
            log::debug!("list context gone, notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;
    use crate::model::Action;
    use crate::replayer::ReplayOptions;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn context(
        doc: &Arc<MemoryDocument>,
        store: &Arc<MemoryStore>,
    ) -> PageContext<MemoryDocument, MemoryStore> {
        PageContext::new(
            doc.clone(),
            store.clone(),
            EventRecorder::default(),
            Replayer::new(doc.clone(), ReplayOptions::default()),
        )
    }

    #[test]
    fn test_command_wire_shape() {
        let start: PageCommand =
            serde_json::from_str(r#"{"command": "start", "name": "login"}"#).unwrap();
        assert_eq!(
            start,
            PageCommand::Start {
                name: "login".to_string()
            }
        );

        let replay: PageCommand = serde_json::from_str(
            r##"{"command": "replay", "recording": {"id": "1", "name": "r", "timestamp": "t",
                "count": 1, "actions": [{"type": "click", "target": "#a", "timestamp": 5}]}}"##,
        )
        .unwrap();
        match replay {
            PageCommand::Replay { recording } => assert_eq!(recording.actions[0].target, "#a"),
            other => panic!("unexpected {:?}", other),
        }

        let update = serde_json::to_value(ListNotification::UpdateRecordings {
            selected_id: Some("9".to_string()),
        })
        .unwrap();
        assert_eq!(update["command"], "updateRecordings");
        assert_eq!(update["selectedId"], "9");
        let cleared = serde_json::to_value(ListNotification::UpdateRecordings { selected_id: None })
            .unwrap();
        assert!(cleared.get("selectedId").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_save_and_replay_cycle() {
        let doc = Arc::new(MemoryDocument::new());
        let button = doc.append_element(doc.body(), "button");
        doc.set_id(button, "submit-btn");
        let store = Arc::new(MemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut page = context(&doc, &store).with_notifier(tx);

        page.handle_message(r#"{"command": "start", "name": "submit"}"#)
            .await
            .unwrap();
        doc.user_click(button);
        page.recorder_mut().process_next().await.unwrap();
        page.stop_recording().await.unwrap();

        let recording = page.save_recording().await.unwrap();
        assert_eq!(recording.name, "submit");
        assert_eq!(recording.actions, vec![Action::click("#submit-btn", recording.actions[0].timestamp)]);
        assert_eq!(
            rx.try_recv().unwrap(),
            ListNotification::UpdateRecordings {
                selected_id: Some(recording.id.clone())
            }
        );

        let outcome = page
            .handle(PageCommand::Replay {
                recording: recording.clone(),
            })
            .await
            .unwrap();
        let CommandOutcome::ReplayStarted(handle) = outcome else {
            panic!("expected replay to start");
        };
        assert!(matches!(
            page.handle(PageCommand::Replay { recording: recording.clone() }).await,
            Err(MessagingError::Replay(ReplayError::AlreadyRunning))
        ));
        let run = handle.wait().await.unwrap();
        assert_eq!(run.cursor, 1);
        assert!(run.errors.is_empty());

        page.delete_recording(&recording.id).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ListNotification::UpdateRecordings { selected_id: None }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_while_recording_stops_first() {
        let doc = Arc::new(MemoryDocument::new());
        let link = doc.append_element(doc.body(), "a");
        doc.set_id(link, "home");
        let store = Arc::new(MemoryStore::new());
        let mut page = context(&doc, &store);

        page.handle(PageCommand::Start {
            name: "nav".to_string(),
        })
        .await
        .unwrap();
        doc.user_click(link);

        let recording = page.save_recording().await.unwrap();
        assert!(!page.recorder().is_recording());
        assert_eq!(recording.count, 1);
        assert_eq!(recording.actions[0].target, "#home");
        assert_eq!(store.get_selected().await.unwrap(), Some(recording.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_until_reports_actions() {
        let doc = Arc::new(MemoryDocument::new());
        let button = doc.append_element(doc.body(), "button");
        doc.set_id(button, "go");
        let store = Arc::new(MemoryStore::new());
        let mut page = context(&doc, &store);

        page.handle(PageCommand::Start { name: "go".to_string() }).await.unwrap();
        doc.user_click(button);
        doc.user_click(button);

        let mut seen = Vec::new();
        page.record_until(tokio::time::sleep(Duration::from_millis(500)), |a| {
            seen.push(a.target.clone())
        })
        .await;
        assert_eq!(seen, vec!["#go".to_string(), "#go".to_string()]);
        assert!(page.recorder().is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_until_honors_stop_under_event_flood() {
        let doc = Arc::new(MemoryDocument::new());
        let button = doc.append_element(doc.body(), "button");
        doc.set_id(button, "go");
        let store = Arc::new(MemoryStore::new());
        let mut page = context(&doc, &store);

        page.handle(PageCommand::Start { name: "flood".to_string() }).await.unwrap();
        for _ in 0..200 {
            doc.user_click(button);
        }

        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        stop_tx.send(true).unwrap();
        let mut seen = 0;
        page.record_until(
            async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            },
            |_| seen += 1,
        )
        .await;
        assert_eq!(seen, 0);

        page.stop_recording().await.unwrap();
        assert_eq!(page.recorder().actions().len(), 200);
    }

    #[tokio::test]
    async fn test_notifications_survive_closed_list_context() {
        let doc = Arc::new(MemoryDocument::new());
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut page = context(&doc, &store).with_notifier(tx);

        page.handle(PageCommand::Start { name: String::new() }).await.unwrap();
        page.stop_recording().await.unwrap();
        let recording = page.save_recording().await.unwrap();
        assert!(recording.name.starts_with("recording-"));
        assert!(page.handle_message("{\"command\": \"pause\"}").await.is_err());
    }
}
