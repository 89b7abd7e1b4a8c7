//! Recording persistence.
//!
//! A [`StorageBackend`] is an opaque key-value store. [`RecordingRepository`] keeps the
//! recording list under one key as JSON and implements the [`RecordingStore`] contract:
//! loading never fails, and malformed entries are dropped one by one.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::Value;

use super::library::make_id;
use super::types::{RecordingEntry, RecordingSettings};
use crate::capture::KeyEvent;
use crate::error::KeysonicError;
use crate::keymap::to_display_sequence;

/// Storage key of the saved recording list.
pub const STORAGE_KEY: &str = "keysonic-saved-v1";

/// Key-value persistence.
pub trait StorageBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, KeysonicError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), KeysonicError>;
}

/// Load/save contract used by the recording library.
pub trait RecordingStore {
    /// Stored recordings. Missing or corrupt data yields an empty list.
    fn load(&self) -> Vec<RecordingEntry>;
    fn save(&mut self, recordings: &[RecordingEntry]);
}

/// In-process backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    items: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, KeysonicError> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), KeysonicError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

fn storage_error(key: &str, err: std::io::Error) -> KeysonicError {
    KeysonicError::StorageError {
        key: key.to_string(),
        message: err.to_string(),
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, KeysonicError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(key, e)),
        }
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), KeysonicError> {
        fs::create_dir_all(&self.dir).map_err(|e| storage_error(key, e))?;
        fs::write(self.path_for(key), value).map_err(|e| storage_error(key, e))
    }
}

/// Recording list stored as one JSON document in a backend.
#[derive(Debug, Clone)]
pub struct RecordingRepository<B: StorageBackend> {
    key: String,
    backend: B,
}

impl<B: StorageBackend> RecordingRepository<B> {
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, STORAGE_KEY)
    }

    pub fn with_key(backend: B, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: StorageBackend> RecordingStore for RecordingRepository<B> {
    fn load(&self) -> Vec<RecordingEntry> {
        match self.backend.get_item(&self.key) {
            Ok(Some(raw)) => parse_recordings(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("could not read recordings: {}", e);
                Vec::new()
            }
        }
    }

    fn save(&mut self, recordings: &[RecordingEntry]) {
        let json = match serde_json::to_string(recordings) {
            Ok(json) => json,
            Err(e) => {
                warn!("could not serialize recordings: {}", e);
                return;
            }
        };
        if let Err(e) = self.backend.set_item(&self.key, &json) {
            warn!("could not save recordings: {}", e);
        }
    }
}

/// Parse a stored recording list leniently. Anything but a JSON array is empty.
pub fn parse_recordings(raw: &str) -> Vec<RecordingEntry> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => normalize_entries(&items),
        Ok(_) => {
            warn!("stored recordings are not a list, ignoring");
            Vec::new()
        }
        Err(e) => {
            warn!("stored recordings are not valid JSON: {}", e);
            Vec::new()
        }
    }
}

pub(crate) fn normalize_entries(items: &[Value]) -> Vec<RecordingEntry> {
    let entries: Vec<RecordingEntry> = items.iter().filter_map(normalize_entry).collect();
    if entries.len() != items.len() {
        warn!(
            "dropped {} malformed recording(s)",
            items.len() - entries.len()
        );
    }
    entries
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn finite(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|f| f.is_finite())
}

fn normalize_timed_event(value: &Value) -> Option<KeyEvent> {
    let code = value.get("code")?.as_str()?;
    let offset_ms = finite(value.get("offsetMs")).unwrap_or(0.0).max(0.0).round() as u64;
    let duration_ms = finite(value.get("durationMs"))
        .filter(|d| *d >= 0.0)
        .map(|d| d.round() as u64);
    Some(KeyEvent {
        code: code.to_string(),
        offset_ms,
        velocity: finite(value.get("velocity")),
        duration_ms,
    })
}

fn normalize_settings(value: &Value) -> Option<RecordingSettings> {
    if !value.is_object() {
        return None;
    }
    RecordingSettings {
        tempo: finite(value.get("tempo")),
        scale_id: non_empty_str(value.get("scaleId")),
        instrument: non_empty_str(value.get("instrument")),
        root_freq: finite(value.get("rootFreq")),
    }
    .sanitized()
}

/// Normalize one stored entry. Entries without a `sequence` list are rejected.
pub fn normalize_entry(value: &Value) -> Option<RecordingEntry> {
    let sequence = string_list(value.get("sequence"))?;
    let play_sequence = string_list(value.get("playSequence"))
        .filter(|codes| !codes.is_empty())
        .unwrap_or_else(|| sequence.clone());
    let display_sequence = if sequence.is_empty() {
        to_display_sequence(&play_sequence)
    } else {
        sequence
    };

    let timed_events = value
        .get("timedEvents")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize_timed_event).collect::<Vec<_>>())
        .filter(|events| !events.is_empty());

    Some(RecordingEntry {
        id: non_empty_str(value.get("id")).unwrap_or_else(make_id),
        name: non_empty_str(value.get("name")).unwrap_or_else(|| "Recording".to_string()),
        display_sequence,
        play_sequence,
        looping: value.get("loop").and_then(Value::as_bool).unwrap_or(false),
        reverse: value.get("reverse").and_then(Value::as_bool).unwrap_or(false),
        compose: value.get("compose").and_then(Value::as_bool).unwrap_or(false),
        timed_events,
        settings: value.get("settings").and_then(normalize_settings),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_data_loads_empty() {
        let repo = RecordingRepository::new(MemoryBackend::new());
        assert!(repo.load().is_empty());
    }

    #[test]
    fn test_corrupt_data_loads_empty() {
        let mut backend = MemoryBackend::new();
        backend.set_item(STORAGE_KEY, "{not json").unwrap();
        assert!(RecordingRepository::new(backend).load().is_empty());

        let mut backend = MemoryBackend::new();
        backend.set_item(STORAGE_KEY, r#"{"recordings": []}"#).unwrap();
        assert!(RecordingRepository::new(backend).load().is_empty());
    }

    #[test]
    fn test_malformed_entries_are_filtered() {
        let raw = json!([
            { "id": "a", "name": "Ok", "sequence": ["H"], "playSequence": ["KeyH"] },
            { "id": "b", "name": "No sequence" },
            42,
            { "sequence": "not a list" }
        ]);
        let entries = parse_recordings(&raw.to_string());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "a");
    }

    #[test]
    fn test_legacy_entry_without_play_sequence() {
        let raw = json!([{ "sequence": ["KeyA", "KeyB"], "loop": 1 }]);
        let entries = parse_recordings(&raw.to_string());
        let entry = &entries[0];
        assert_eq!(entry.play_sequence, vec!["KeyA", "KeyB"]);
        assert_eq!(entry.name, "Recording");
        assert!(!entry.id.is_empty());
        // non-boolean flags read as false
        assert!(!entry.looping);
    }

    #[test]
    fn test_empty_display_is_derived() {
        let raw = json!([{ "sequence": [], "playSequence": ["KeyH", "Enter"] }]);
        let entries = parse_recordings(&raw.to_string());
        assert_eq!(entries[0].display_sequence, vec!["H", " "]);
    }

    #[test]
    fn test_timed_events_and_settings_are_cleaned() {
        let raw = json!([{
            "sequence": ["A"],
            "playSequence": ["KeyA"],
            "timedEvents": [
                { "code": "KeyA", "offsetMs": -5, "velocity": 0.8, "durationMs": 90.4 },
                { "code": 7, "offsetMs": 10 },
                { "offsetMs": 10 }
            ],
            "settings": { "tempo": "fast", "scaleId": "lydian", "rootFreq": 261.63 }
        }]);
        let entry = &parse_recordings(&raw.to_string())[0];
        let events = entry.timed_events.as_ref().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].offset_ms, 0);
        assert_eq!(events[0].velocity, Some(0.8));
        assert_eq!(events[0].duration_ms, Some(90));

        let settings = entry.settings.as_ref().unwrap();
        assert_eq!(settings.tempo, None);
        assert_eq!(settings.scale_id.as_deref(), Some("lydian"));
        assert_eq!(settings.root_freq, Some(261.63));
    }

    #[test]
    fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = RecordingRepository::new(FileBackend::new(dir.path().join("store")));
        assert!(repo.load().is_empty());

        let raw = json!([{ "id": "x", "name": "Hey", "sequence": ["H"], "playSequence": ["KeyH"] }]);
        let entries = parse_recordings(&raw.to_string());
        repo.save(&entries);

        assert!(dir.path().join("store").join("keysonic-saved-v1.json").exists());
        assert_eq!(repo.load(), entries);
    }

    #[test]
    fn test_file_backend_read_error_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        std::fs::create_dir_all(dir.path().join("keysonic-saved-v1.json")).unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(backend.get_item(STORAGE_KEY).is_err());
        assert!(RecordingRepository::new(backend).load().is_empty());
    }
}
