//! Persisted user settings (JSON on disk).
//!
//! Loading never fails: a missing or corrupt file yields defaults.

use crate::alarm::AlarmPreferences;
use crate::error::{CompanionError, CompanionResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

pub const SEARCH_HISTORY_CAPACITY: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sound_muted: bool,
    pub vibration_intensity: f64,
    /// Most recent first
    pub search_history: VecDeque<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound_muted: false,
            vibration_intensity: 1.0,
            search_history: VecDeque::with_capacity(SEARCH_HISTORY_CAPACITY),
        }
    }
}

impl Settings {
    /// Move `query` to the front, dropping duplicates and the oldest overflow
    pub fn record_search(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        self.search_history.retain(|q| !q.eq_ignore_ascii_case(query));
        self.search_history.push_front(query.to_string());
        self.search_history.truncate(SEARCH_HISTORY_CAPACITY);
    }

    pub fn set_vibration_intensity(&mut self, intensity: f64) {
        self.vibration_intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    pub fn alarm_preferences(&self) -> AlarmPreferences {
        AlarmPreferences {
            sound_muted: self.sound_muted,
            vibration_intensity: self.vibration_intensity,
        }
    }

    /// Bring hand-edited values back into range
    fn sanitized(mut self) -> Self {
        self.set_vibration_intensity(self.vibration_intensity);
        self.search_history.retain(|q| !q.trim().is_empty());
        self.search_history.truncate(SEARCH_HISTORY_CAPACITY);
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {}, using defaults", self.path.display());
                return Settings::default();
            }
            Err(e) => {
                warn!("Failed to read settings {}: {}", self.path.display(), e);
                return Settings::default();
            }
        };

        match serde_json::from_str::<Settings>(&json) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                warn!("Corrupt settings {}, using defaults: {}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> CompanionResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| CompanionError::Settings(e.to_string()))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "drive_companion_{}_{}_{}.json",
            name,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }

    #[test]
    fn test_search_history_is_mru_and_bounded() {
        let mut settings = Settings::default();
        for q in ["a", "b", "c", "d", "e", "f"] {
            settings.record_search(q);
        }
        settings.record_search("C");
        settings.record_search("   ");

        let history: Vec<_> = settings.search_history.iter().map(String::as_str).collect();
        assert_eq!(history, vec!["C", "f", "e", "d", "b"]);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let store = SettingsStore::new(temp_path("roundtrip"));
        let mut settings = Settings::default();
        settings.sound_muted = true;
        settings.set_vibration_intensity(0.4);
        settings.record_search("Beach Road");

        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let store = SettingsStore::new(temp_path("missing"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let store = SettingsStore::new(temp_path("corrupt"));
        fs::write(store.path(), "{\"sound_muted\": tru").unwrap();
        assert_eq!(store.load(), Settings::default());
        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let store = SettingsStore::new(temp_path("clamp"));
        fs::write(
            store.path(),
            r#"{"vibration_intensity": 3.0, "search_history": ["a","b","c","d","e","f","g"]}"#,
        )
        .unwrap();

        let settings = store.load();
        assert_eq!(settings.vibration_intensity, 1.0);
        assert_eq!(settings.search_history.len(), SEARCH_HISTORY_CAPACITY);
        assert!(!settings.sound_muted);
        let _ = fs::remove_file(store.path());
    }
}
