use keysonic::keymap::{text_to_codes, to_display_sequence};
use keysonic::recording::{normalize_entry, parse_bundle, ExportBundle};
use keysonic::{KeysonicConfig, KeysonicError};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Serialize)]
struct BindingError {
    kind: &'static str,
    message: String,
}

impl From<KeysonicError> for BindingError {
    fn from(e: KeysonicError) -> Self {
        let kind = match e {
            KeysonicError::ConfigError(_) => "config",
            KeysonicError::StorageError { .. } => "storage",
            KeysonicError::BundleError(_) => "bundle",
        };
        BindingError {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for BindingError {
    fn from(e: serde_json::Error) -> Self {
        BindingError {
            kind: "json",
            message: e.to_string(),
        }
    }
}

fn to_js_error(e: BindingError) -> JsValue {
    let json = serde_json::to_string(&e).unwrap_or_else(|_| e.message.clone());
    JsValue::from_str(&json)
}

/// Config from YAML or JSON text with kebab-case keys. Blank text gives the defaults.
fn config_from(text: &str) -> Result<KeysonicConfig, BindingError> {
    Ok(KeysonicConfig::from_yaml(text)?)
}

fn compose_json(text: &str, config: &str) -> Result<String, BindingError> {
    let config = config_from(config)?;
    let song = keysonic::compose_text(text, &config.composer);
    Ok(serde_json::to_string(&song)?)
}

fn flatten_json(text: &str, config: &str) -> Result<String, BindingError> {
    let config = config_from(config)?;
    let tokens = keysonic::flatten_text(text, &config.composer);
    Ok(serde_json::to_string(&tokens)?)
}

fn musicxml_text(text: &str, config: &str) -> Result<String, BindingError> {
    let config = config_from(config)?;
    Ok(keysonic::text_to_musicxml(
        text,
        &config.composer,
        &config.playback_settings(),
    ))
}

fn export_json(recordings: &str, exported_at: f64) -> Result<String, BindingError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(recordings)?;
    let entries = values.iter().filter_map(normalize_entry).collect();
    let exported_at = if exported_at.is_finite() && exported_at > 0.0 {
        exported_at as u64
    } else {
        0
    };
    Ok(ExportBundle::new(entries, exported_at).to_json()?)
}

fn import_json(bundle: &str) -> Result<String, BindingError> {
    let entries = parse_bundle(bundle)?;
    Ok(serde_json::to_string(&entries)?)
}

fn song_json(entry: &str, config: &str) -> Result<String, BindingError> {
    let config = config_from(config)?;
    let value: serde_json::Value = serde_json::from_str(entry)?;
    let song = normalize_entry(&value).and_then(|entry| {
        keysonic::song_export(&entry, &config.playback_settings(), config.composer.tempo)
    });
    Ok(serde_json::to_string(&song)?)
}

/// Compose typed text; returns the composed song as JSON
#[wasm_bindgen]
pub fn compose(text: &str, config: &str) -> Result<String, JsValue> {
    compose_json(text, config).map_err(to_js_error)
}

/// Compose typed text; returns one step token per eighth note as JSON
#[wasm_bindgen]
pub fn flatten(text: &str, config: &str) -> Result<String, JsValue> {
    flatten_json(text, config).map_err(to_js_error)
}

/// Compose typed text and render it as MusicXML
#[wasm_bindgen]
pub fn musicxml(text: &str, config: &str) -> Result<String, JsValue> {
    musicxml_text(text, config).map_err(to_js_error)
}

#[wasm_bindgen]
pub fn frequency(code: &str, scale_id: &str, root_freq: f64) -> f64 {
    keysonic::frequency_for(code, scale_id, root_freq)
}

/// Key codes for typed text, as a JSON array
#[wasm_bindgen]
pub fn text_codes(text: &str) -> String {
    serde_json::to_string(&text_to_codes(text)).unwrap_or_else(|_| "[]".to_string())
}

/// Display characters for a JSON array of key codes
#[wasm_bindgen]
pub fn display_sequence(codes: &str) -> String {
    let codes: Vec<String> = serde_json::from_str(codes).unwrap_or_default();
    serde_json::to_string(&to_display_sequence(&codes)).unwrap_or_else(|_| "[]".to_string())
}

/// Wrap a JSON array of recordings in an export bundle
#[wasm_bindgen]
pub fn export_bundle(recordings: &str, exported_at: f64) -> Result<String, JsValue> {
    export_json(recordings, exported_at).map_err(to_js_error)
}

/// Validate an export bundle; returns its normalized recordings as JSON
#[wasm_bindgen]
pub fn import_bundle(bundle: &str) -> Result<String, JsValue> {
    import_json(bundle).map_err(to_js_error)
}

/// Pitched steps of one recording as JSON, `null` when nothing is pitched
#[wasm_bindgen]
pub fn song_export(entry: &str, config: &str) -> Result<String, JsValue> {
    song_json(entry, config).map_err(to_js_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_with_json_config() {
        let json = compose_json("hi", r#"{"composer": {"meter": "3/4"}}"#).unwrap();
        let song: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(song["meter"], "3/4");
        assert_eq!(song["unit"], "eighth");
    }

    #[test]
    fn test_bad_config_reports_kind() {
        let err = compose_json("hi", "composer:\n  meter: 7/8\n").unwrap_err();
        assert_eq!(err.kind, "config");
    }

    #[test]
    fn test_flatten_and_musicxml() {
        let tokens: Vec<serde_json::Value> =
            serde_json::from_str(&flatten_json("ok", "").unwrap()).unwrap();
        assert!(tokens.iter().any(|t| t["kind"] == "rest"));
        assert!(musicxml_text("ok", "").unwrap().contains("<score-partwise"));
    }

    #[test]
    fn test_export_then_import() {
        let recordings = r#"[{"id": "a", "name": "one", "sequence": ["A"], "playSequence": ["KeyA"]}]"#;
        let bundle = export_json(recordings, 42.0).unwrap();
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&import_json(&bundle).unwrap()).unwrap();
        assert_eq!(entries[0]["name"], "one");
        assert_eq!(import_json("[]").unwrap(), "[]");
        assert_eq!(import_json("{}").unwrap_err().kind, "bundle");
    }

    #[test]
    fn test_song_export_and_helpers() {
        let entry = r#"{"id": "a", "name": "one", "sequence": ["`"], "playSequence": ["`"]}"#;
        let song: serde_json::Value = serde_json::from_str(&song_json(entry, "").unwrap()).unwrap();
        assert_eq!(song["events"][0]["midi"], 57);
        assert_eq!(text_codes("a b"), r#"["A"," ","B"]"#);
        assert_eq!(display_sequence(r#"["KeyA","Enter"]"#), r#"["A"," "]"#);
        assert_eq!(frequency("`", "major", 220.0), 220.0);
    }
}
