use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dom::{BrowserType, WebDocumentConfig};
use crate::locator::{ExclusionPolicy, DEFAULT_EXCLUSION_PATTERNS, DEFAULT_INSTRUMENTATION_MARKERS};
use crate::replayer::{ReplayOptions, DEFAULT_HIGHLIGHT_BACKGROUND, DEFAULT_HIGHLIGHT_OUTLINE};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON file holding saved recordings
    pub store_path: PathBuf,

    /// Quiet window before a scroll burst is recorded (ms)
    pub scroll_quiet_window_ms: u64,

    /// Hold after each replayed action (ms)
    pub observation_delay_ms: u64,

    pub highlight_background: String,
    pub highlight_outline: String,

    /// Regexes matched against `#<id>`; matching ids are never used in locators
    pub exclusion_patterns: Vec<String>,

    /// Names marking the recorder's own UI
    pub instrumentation_markers: Vec<String>,

    /// chromium, firefox or webkit
    pub browser: String,
    pub headless: bool,
    pub cdp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            scroll_quiet_window_ms: 300,
            observation_delay_ms: 800,
            highlight_background: DEFAULT_HIGHLIGHT_BACKGROUND.to_string(),
            highlight_outline: DEFAULT_HIGHLIGHT_OUTLINE.to_string(),
            exclusion_patterns: DEFAULT_EXCLUSION_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            instrumentation_markers: DEFAULT_INSTRUMENTATION_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            browser: "chromium".to_string(),
            headless: false,
            cdp_endpoint: None,
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lumi-recorder")
        .join("recordings.json")
}

/// `~/.config/lumi-recorder/config.yaml` or the platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lumi-recorder").join("config.yaml"))
}

impl Config {
    /// Defaults, then the YAML file, then environment overrides.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_yaml(&content)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)?;
                    Self::from_yaml(&content)
                        .with_context(|| format!("Failed to parse config {}", path.display()))?
                }
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply `LUMI_RECORDER_STORE`, `LUMI_HEADLESS` and `LUMI_CDP_ENDPOINT`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(store) = lookup("LUMI_RECORDER_STORE").filter(|s| !s.is_empty()) {
            self.store_path = PathBuf::from(store);
        }
        if let Some(headless) = lookup("LUMI_HEADLESS") {
            self.headless = headless == "true" || headless == "1";
        }
        if let Some(endpoint) = lookup("LUMI_CDP_ENDPOINT").filter(|s| !s.is_empty()) {
            self.cdp_endpoint = Some(endpoint);
        }
    }

    pub fn scroll_quiet_window(&self) -> Duration {
        Duration::from_millis(self.scroll_quiet_window_ms)
    }

    pub fn exclusion_policy(&self) -> Result<ExclusionPolicy> {
        ExclusionPolicy::from_patterns(&self.exclusion_patterns[..], &self.instrumentation_markers[..])
            .context("Invalid exclusion pattern")
    }

    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            observation_delay: Duration::from_millis(self.observation_delay_ms),
            highlight_background: self.highlight_background.clone(),
            highlight_outline: self.highlight_outline.clone(),
        }
    }

    pub fn web_config(&self) -> WebDocumentConfig {
        WebDocumentConfig {
            browser_type: BrowserType::parse(&self.browser),
            headless: self.headless,
            cdp_endpoint: self.cdp_endpoint.clone(),
            ..WebDocumentConfig::default()
        }
    }
}
