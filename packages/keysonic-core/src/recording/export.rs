//! Export bundles: all recordings in one JSON document.
//!
//! ```text
//! { "version": 1, "appId": "keysonic", "exportedAt": <epoch ms>,
//!   "stepNoteValue": "eighth", "recordings": [ ... ] }
//! ```
//!
//! Import is strict about the envelope (app id, version) and lenient about the entries,
//! which go through the same normalization as stored recordings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::store::normalize_entries;
use super::types::RecordingEntry;
use crate::composer::STEP_NOTE_VALUE;
use crate::error::KeysonicError;

pub const BUNDLE_VERSION: u32 = 1;
pub const APP_ID: &str = "keysonic";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: u32,
    pub app_id: String,
    pub exported_at: u64,
    pub step_note_value: String,
    pub recordings: Vec<RecordingEntry>,
}

impl ExportBundle {
    pub fn new(recordings: Vec<RecordingEntry>, exported_at: u64) -> Self {
        Self {
            version: BUNDLE_VERSION,
            app_id: APP_ID.to_string(),
            exported_at,
            step_note_value: STEP_NOTE_VALUE.to_string(),
            recordings,
        }
    }

    pub fn to_json(&self) -> Result<String, KeysonicError> {
        serde_json::to_string_pretty(self).map_err(|e| KeysonicError::BundleError(e.to_string()))
    }
}

/// Parse an export bundle and return its recordings, normalized.
///
/// A bare JSON array of recordings is accepted as well.
pub fn parse_bundle(json: &str) -> Result<Vec<RecordingEntry>, KeysonicError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| KeysonicError::BundleError(e.to_string()))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => {
            match map.get("appId").and_then(Value::as_str) {
                Some(APP_ID) => {}
                Some(other) => {
                    return Err(KeysonicError::BundleError(format!(
                        "bundle belongs to '{}'",
                        other
                    )))
                }
                None => return Err(KeysonicError::BundleError("missing appId".to_string())),
            }
            match map.get("version").and_then(Value::as_u64) {
                Some(v) if v == BUNDLE_VERSION as u64 => {}
                Some(v) => {
                    return Err(KeysonicError::BundleError(format!(
                        "unsupported version {}",
                        v
                    )))
                }
                None => return Err(KeysonicError::BundleError("missing version".to_string())),
            }
            map.get("recordings")
                .and_then(Value::as_array)
                .ok_or_else(|| KeysonicError::BundleError("missing recordings".to_string()))?
        }
        _ => {
            return Err(KeysonicError::BundleError(
                "expected an object or a list".to_string(),
            ))
        }
    };

    Ok(normalize_entries(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RecordingEntry {
        RecordingEntry {
            id: "r1".to_string(),
            name: "hello".to_string(),
            display_sequence: vec!["H".to_string()],
            play_sequence: vec!["KeyH".to_string()],
            looping: true,
            reverse: false,
            compose: true,
            timed_events: None,
            settings: None,
        }
    }

    #[test]
    fn test_bundle_envelope() {
        let bundle = ExportBundle::new(vec![sample()], 1_700_000_000_000);
        let value: Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["appId"], "keysonic");
        assert_eq!(value["exportedAt"], 1_700_000_000_000u64);
        assert_eq!(value["stepNoteValue"], "eighth");
        assert_eq!(value["recordings"][0]["loop"], true);
    }

    #[test]
    fn test_exported_bundle_imports() {
        let bundle = ExportBundle::new(vec![sample()], 0);
        let entries = parse_bundle(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(entries, vec![sample()]);
    }

    #[test]
    fn test_import_rejects_foreign_bundles() {
        let foreign = json!({ "version": 1, "appId": "other", "recordings": [] });
        assert!(matches!(
            parse_bundle(&foreign.to_string()),
            Err(KeysonicError::BundleError(_))
        ));

        let future = json!({ "version": 9, "appId": "keysonic", "recordings": [] });
        let err = parse_bundle(&future.to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid export bundle: unsupported version 9");

        assert!(parse_bundle("not json").is_err());
        assert!(parse_bundle("42").is_err());
    }

    #[test]
    fn test_import_accepts_bare_list_and_drops_bad_entries() {
        let list = json!([{ "sequence": ["A"] }, { "name": "broken" }]);
        let entries = parse_bundle(&list.to_string()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].play_sequence, vec!["A"]);
    }
}
