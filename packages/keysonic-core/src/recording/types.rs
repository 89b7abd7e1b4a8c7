//! Recording data type definitions
//!
//! The persisted shape of a saved recording. Field names on the wire follow the
//! stored documents: `sequence` is the display sequence and `loop` the loop flag.

use serde::{Deserialize, Serialize};

use crate::capture::KeyEvent;
use crate::composer::{compose, flatten, tokens_from_codes, ComposerOptions};
use crate::keymap::to_display_sequence;
use crate::playback::{PlaybackSequence, PlaybackSettings};

/// Settings captured alongside a recording. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_freq: Option<f64>,
}

impl RecordingSettings {
    pub fn is_empty(&self) -> bool {
        self.tempo.is_none()
            && self.scale_id.is_none()
            && self.instrument.is_none()
            && self.root_freq.is_none()
    }

    /// Drop non-finite numbers and empty strings. `None` when nothing is left.
    pub fn sanitized(self) -> Option<Self> {
        let settings = Self {
            tempo: self.tempo.filter(|t| t.is_finite()),
            scale_id: self.scale_id.filter(|s| !s.is_empty()),
            instrument: self.instrument.filter(|s| !s.is_empty()),
            root_freq: self.root_freq.filter(|f| f.is_finite()),
        };
        (!settings.is_empty()).then_some(settings)
    }

    /// Fill the pitch settings for playback, taking missing fields from `fallback`.
    pub fn resolve(&self, fallback: &PlaybackSettings) -> PlaybackSettings {
        PlaybackSettings {
            scale_id: self
                .scale_id
                .clone()
                .unwrap_or_else(|| fallback.scale_id.clone()),
            root_freq: self
                .root_freq
                .filter(|f| *f > 0.0)
                .unwrap_or(fallback.root_freq),
            instrument: self
                .instrument
                .clone()
                .or_else(|| fallback.instrument.clone()),
        }
    }
}

/// A saved recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    pub id: String,
    pub name: String,
    /// Human-facing characters, one per key.
    #[serde(rename = "sequence")]
    pub display_sequence: Vec<String>,
    /// Raw key codes, one per captured key-down.
    pub play_sequence: Vec<String>,
    #[serde(rename = "loop", default)]
    pub looping: bool,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default)]
    pub compose: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_events: Option<Vec<KeyEvent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RecordingSettings>,
}

impl RecordingEntry {
    /// What playback of this entry walks through.
    ///
    /// - `compose` set: the composed, flattened play sequence
    /// - timed events present: the timed events
    /// - otherwise: the play sequence, one step per code
    pub fn playback_source(&self, options: &ComposerOptions) -> PlaybackSequence {
        if self.compose {
            let song = compose(&self.play_sequence, options);
            return PlaybackSequence::Steps(flatten(&song));
        }
        match &self.timed_events {
            Some(events) if !events.is_empty() => PlaybackSequence::Timed(events.clone()),
            _ => PlaybackSequence::Steps(tokens_from_codes(&self.play_sequence)),
        }
    }

    /// Label shown while this entry plays.
    pub fn label(&self) -> String {
        self.display_sequence.concat()
    }
}

/// Input for creating a recording.
#[derive(Debug, Clone, Default)]
pub struct NewRecording {
    /// Base name. Empty names become `Recording N`.
    pub name: String,
    pub play_sequence: Vec<String>,
    /// Derived from the play sequence when absent.
    pub display_sequence: Option<Vec<String>>,
    pub timed_events: Option<Vec<KeyEvent>>,
    pub settings: Option<RecordingSettings>,
}

impl NewRecording {
    pub fn from_codes(name: impl Into<String>, codes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            play_sequence: codes,
            ..Default::default()
        }
    }

    pub(crate) fn display_sequence(&self) -> Vec<String> {
        self.display_sequence
            .clone()
            .unwrap_or_else(|| to_display_sequence(&self.play_sequence))
    }
}
