//! Sync configuration and naming rules.
//!
//! # Responsibility
//! - Own the storage key and bus topic used by the sync layer.
//! - Check event names against the desktop shell's naming rules.

use once_cell::sync::Lazy;
use regex::Regex;

/// Durable storage key holding the serialized preference set.
pub const SETTINGS_STORAGE_KEY: &str = "editor-settings";
/// Event-bus topic carrying full preference sets between windows.
pub const SETTINGS_CHANGED_TOPIC: &str = "settings-changed";

static EVENT_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9\-/:_]+$").expect("event name pattern must compile")
});

/// Returns whether `name` is accepted as an event topic by the shell.
pub fn is_valid_event_name(name: &str) -> bool {
    EVENT_NAME_PATTERN.is_match(name)
}

/// Names used by one `SyncController`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub storage_key: String,
    pub topic: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_key: SETTINGS_STORAGE_KEY.to_string(),
            topic: SETTINGS_CHANGED_TOPIC.to_string(),
        }
    }
}

impl SyncConfig {
    /// Checks the storage key and topic.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage_key.trim().is_empty() {
            return Err("storage key cannot be empty".to_string());
        }
        if !is_valid_event_name(&self.topic) {
            return Err(format!(
                "topic `{}` may only contain alphanumerics, `-`, `/`, `:` and `_`",
                self.topic
            ));
        }
        Ok(())
    }
}
