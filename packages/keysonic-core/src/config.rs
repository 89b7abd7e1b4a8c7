//! # Configuration
//!
//! YAML configuration for a Keysonic session. Every key is optional:
//!
//! ```yaml
//! tempo: 1.25            # playback speed multiplier
//! scale: lydian
//! root-freq: 220
//! instrument: glass
//! storage-dir: ~/.keysonic
//! composer:
//!   meter: 3/4
//!   rest-between-words: 3
//!   word-contour: arch   # arch | rise | fall, unset lets each word choose
//!   max-span: 4
//!   bpm: 120
//! ```
//!
//! The YAML is read into [`RawConfig`] and then validated into [`KeysonicConfig`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::composer::{ContourShape, ComposerOptions, Meter};
use crate::error::KeysonicError;
use crate::playback::{PlaybackSettings, DEFAULT_TEMPO};
use crate::scale::{is_known_scale, DEFAULT_ROOT_FREQ, DEFAULT_SCALE_ID};

/// Rest steps between words unless configured otherwise.
pub const DEFAULT_REST_BETWEEN_WORDS: u32 = 3;

/// Largest accepted `rest-between-words`.
pub const MAX_REST_BETWEEN_WORDS: u32 = 64;

/// Raw configuration for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    pub tempo: Option<f64>,
    pub scale: Option<String>,
    pub root_freq: Option<f64>,
    pub instrument: Option<String>,
    pub storage_dir: Option<PathBuf>,
    pub composer: Option<RawComposerConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RawComposerConfig {
    pub meter: Option<String>,
    pub rest_between_words: Option<u32>,
    pub word_contour: Option<String>,
    pub max_span: Option<u32>,
    pub bpm: Option<u32>,
}

/// Validated session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysonicConfig {
    /// Playback speed multiplier.
    pub tempo: f64,
    pub scale: String,
    pub root_freq: f64,
    pub instrument: Option<String>,
    /// Where the file-backed recording store keeps its data.
    pub storage_dir: Option<PathBuf>,
    pub composer: ComposerOptions,
}

impl Default for KeysonicConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            scale: DEFAULT_SCALE_ID.to_string(),
            root_freq: DEFAULT_ROOT_FREQ,
            instrument: None,
            storage_dir: None,
            composer: ComposerOptions {
                rest_between_words: DEFAULT_REST_BETWEEN_WORDS,
                ..ComposerOptions::default()
            },
        }
    }
}

impl KeysonicConfig {
    /// Parse and validate a YAML document. An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, KeysonicError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig = serde_yaml::from_str(content)
            .map_err(|e| KeysonicError::ConfigError(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeysonicError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            KeysonicError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, KeysonicError> {
        let defaults = Self::default();

        let tempo = match raw.tempo {
            Some(t) if t.is_finite() && t > 0.0 => t,
            Some(t) => {
                return Err(KeysonicError::ConfigError(format!(
                    "tempo must be a positive number, got {}",
                    t
                )))
            }
            None => defaults.tempo,
        };

        let scale = match raw.scale {
            Some(id) if is_known_scale(&id) => id,
            Some(id) => {
                return Err(KeysonicError::ConfigError(format!("Unknown scale: {}", id)))
            }
            None => defaults.scale,
        };

        let root_freq = match raw.root_freq {
            Some(f) if f.is_finite() && f > 0.0 => f,
            Some(f) => {
                return Err(KeysonicError::ConfigError(format!(
                    "root-freq must be a positive frequency, got {}",
                    f
                )))
            }
            None => defaults.root_freq,
        };

        let composer = match raw.composer {
            Some(c) => Self::composer_from_raw(c, defaults.composer)?,
            None => defaults.composer,
        };

        Ok(Self {
            tempo,
            scale,
            root_freq,
            instrument: raw.instrument.filter(|i| !i.trim().is_empty()),
            storage_dir: raw.storage_dir,
            composer,
        })
    }

    fn composer_from_raw(
        raw: RawComposerConfig,
        defaults: ComposerOptions,
    ) -> Result<ComposerOptions, KeysonicError> {
        let meter = match &raw.meter {
            Some(m) => Meter::parse(m).ok_or_else(|| {
                KeysonicError::ConfigError(format!("Invalid meter: {} (expected 4/4 or 3/4)", m))
            })?,
            None => defaults.meter,
        };

        let word_contour = match &raw.word_contour {
            Some(shape) => Some(ContourShape::parse(shape).ok_or_else(|| {
                KeysonicError::ConfigError(format!(
                    "Invalid word-contour: {} (expected arch, rise or fall)",
                    shape
                ))
            })?),
            None => defaults.word_contour,
        };

        let rest_between_words = raw.rest_between_words.unwrap_or(defaults.rest_between_words);
        if rest_between_words > MAX_REST_BETWEEN_WORDS {
            return Err(KeysonicError::ConfigError(format!(
                "Invalid rest-between-words: {} (at most {})",
                rest_between_words, MAX_REST_BETWEEN_WORDS
            )));
        }

        Ok(ComposerOptions {
            meter,
            rest_between_words,
            word_contour,
            max_span: raw.max_span.unwrap_or(defaults.max_span),
            tempo: raw.bpm.filter(|bpm| *bpm > 0).unwrap_or(defaults.tempo),
        })
    }

    /// Playback settings for the configured scale, root and instrument.
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            scale_id: self.scale.clone(),
            root_freq: self.root_freq,
            instrument: self.instrument.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = KeysonicConfig::from_yaml("").unwrap();
        assert_eq!(config, KeysonicConfig::default());
        assert_eq!(config.tempo, 1.0);
        assert_eq!(config.scale, "major");
        assert_eq!(config.root_freq, 220.0);
        assert_eq!(config.composer.rest_between_words, 3);
        assert_eq!(config.composer.max_span, 4);
        assert_eq!(config.composer.tempo, 120);
        assert_eq!(config.composer.word_contour, None);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
tempo: 1.5
scale: lydian
root-freq: 261.63
instrument: glass
storage-dir: /tmp/keysonic
composer:
  meter: 3/4
  rest-between-words: 2
  word-contour: rise
  max-span: 6
  bpm: 90
"#;
        let config = KeysonicConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tempo, 1.5);
        assert_eq!(config.scale, "lydian");
        assert_eq!(config.instrument.as_deref(), Some("glass"));
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/keysonic")));
        assert_eq!(config.composer.meter, Meter::ThreeFour);
        assert_eq!(config.composer.rest_between_words, 2);
        assert_eq!(config.composer.word_contour, Some(ContourShape::Rise));
        assert_eq!(config.composer.max_span, 6);
        assert_eq!(config.composer.tempo, 90);

        let settings = config.playback_settings();
        assert_eq!(settings.scale_id, "lydian");
        assert_eq!(settings.root_freq, 261.63);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for yaml in [
            "composer:\n  meter: 5/4\n",
            "composer:\n  word-contour: zigzag\n",
            "root-freq: 0\n",
            "tempo: -1\n",
            "scale: chromatic\n",
            "composer:\n  max-span: -1\n",
            "tempo: [1, 2]\n",
            "composer:\n  rest-between-words: 65\n",
            "composer:\n  rest-between-words: 3000000000\n",
        ] {
            assert!(
                matches!(KeysonicConfig::from_yaml(yaml), Err(KeysonicError::ConfigError(_))),
                "accepted: {}",
                yaml
            );
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keysonic.yaml");
        fs::write(&path, "scale: phrygian\n").unwrap();
        assert_eq!(KeysonicConfig::from_file(&path).unwrap().scale, "phrygian");
        assert!(KeysonicConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
