//! Settings — the three-field record the workflow depends on, persisted as a
//! JSON file compatible with the original `settings.json` layout.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::EngineError;

/// User-provided configuration for the workflow. All three fields must be
/// non-empty before the workflow may leave the Source phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub api_key: String,
    pub resume: String,
    pub initial_prompt: String,
}

impl Settings {
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.resume.is_empty() && !self.initial_prompt.is_empty()
    }
}

/// Loads and persists the settings record at a fixed path.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the persisted record, or `None` when there is no usable one.
    /// A missing file and an unparseable file both mean "no settings yet";
    /// the caller routes the user through the setup flow.
    pub fn load(&self) -> Option<Settings> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to read settings file {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(
                    "ignoring unparseable settings file {}: {e}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Validates, then persists. A record with any empty field is rejected
    /// before anything touches the file, so the previous record survives a
    /// bad save.
    pub fn save(&self, settings: &Settings) -> Result<(), EngineError> {
        if !settings.is_complete() {
            return Err(EngineError::Validation(
                "api key, resume, and initial prompt must all be filled in".to_string(),
            ));
        }
        let payload = serde_json::to_string_pretty(settings)
            .map_err(|e| anyhow::anyhow!("failed to serialize settings: {e}"))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, payload)?;
        debug!("settings saved to {}", self.path.display());
        Ok(())
    }
}
