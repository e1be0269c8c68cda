use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use super::action::Action;

/// Current layout version of persisted store data
pub const STORE_LAYOUT_VERSION: u32 = 1;

/// A named, ordered bundle of actions, read-only once saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Unique key, derived from the save time in epoch milliseconds
    pub id: String,
    pub name: String,
    /// Display save time (`YYYY-MM-DD HH:MM:SS`)
    pub timestamp: String,
    pub actions: Vec<Action>,
    /// Redundant with `actions.len()`, kept for list displays
    pub count: usize,
}

impl Recording {
    /// Build a recording saved at `saved_at`
    pub fn new<Tz: TimeZone>(name: String, actions: Vec<Action>, saved_at: DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let count = actions.len();
        Self {
            id: saved_at.timestamp_millis().to_string(),
            name,
            timestamp: saved_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            actions,
            count,
        }
    }
}

/// Default display name when the user did not choose one
pub fn default_recording_name(now: DateTime<Local>) -> String {
    format!("recording-{}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Name proposed by the creation form before recording starts
pub fn proposed_recording_name(now: DateTime<Local>) -> String {
    format!("replayer-{}", now.timestamp())
}

/// Persisted layout: one slot for the recordings, one for the selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreLayout {
    #[serde(default = "unversioned")]
    pub version: u32,
    #[serde(default)]
    pub recordings: Vec<Recording>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_recording_id: Option<String>,
}

// Data written before the version tag existed is layout 1.
fn unversioned() -> u32 {
    1
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            version: STORE_LAYOUT_VERSION,
            recordings: Vec::new(),
            current_recording_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_recording_metadata() {
        let saved_at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let rec = Recording::new(
            "login".to_string(),
            vec![Action::click("#submit-btn", 1), Action::click("#next", 2)],
            saved_at,
        );
        assert_eq!(rec.id, saved_at.timestamp_millis().to_string());
        assert_eq!(rec.timestamp, "2024-05-01 08:30:00");
        assert_eq!(rec.count, 2);
    }

    #[test]
    fn test_default_names() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(default_recording_name(now), "recording-2024-05-01 08:30:00");
        assert_eq!(
            proposed_recording_name(now),
            format!("replayer-{}", now.timestamp())
        );
    }

    #[test]
    fn test_layout_reads_unversioned_data() {
        let json = r##"{"recordings":[{"id":"1","name":"a","timestamp":"t","actions":[{"type":"click","target":"#x","timestamp":1}],"count":1}],"currentRecordingId":"1"}"##;
        let layout: StoreLayout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.version, 1);
        assert_eq!(layout.recordings.len(), 1);
        assert_eq!(layout.current_recording_id.as_deref(), Some("1"));
    }
}
