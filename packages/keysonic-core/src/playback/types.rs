//! Playback data type definitions
//!
//! This module defines the sequences the scheduler plays and the notifications it emits.

use serde::{Deserialize, Serialize};

use crate::capture::KeyEvent;
use crate::composer::StepToken;
use crate::scale::{scale_by_id, PitchMapper, DEFAULT_ROOT_FREQ, DEFAULT_SCALE_ID};

/// What a playback session walks through.
///
/// - `Steps`: fixed-step tokens, one every `220ms / tempo`
/// - `Timed`: captured events, spaced by their recorded offsets
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "lowercase")]
pub enum PlaybackSequence {
    Steps(Vec<StepToken>),
    Timed(Vec<KeyEvent>),
}

impl PlaybackSequence {
    pub fn len(&self) -> usize {
        match self {
            PlaybackSequence::Steps(tokens) => tokens.len(),
            PlaybackSequence::Timed(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_timed(&self) -> bool {
        matches!(self, PlaybackSequence::Timed(_))
    }

    /// Recorded offset at `index`. Only timed sequences have one.
    pub fn offset_at(&self, index: isize) -> Option<u64> {
        match self {
            PlaybackSequence::Timed(events) if index >= 0 => {
                events.get(index as usize).map(|e| e.offset_ms)
            }
            _ => None,
        }
    }
}

/// Pitch and timbre settings a playback resolves notes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSettings {
    pub scale_id: String,
    pub root_freq: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            scale_id: DEFAULT_SCALE_ID.to_string(),
            root_freq: DEFAULT_ROOT_FREQ,
            instrument: None,
        }
    }
}

impl PlaybackSettings {
    pub fn mapper(&self) -> PitchMapper<'static> {
        PitchMapper::new(&scale_by_id(&self.scale_id).scale, self.root_freq)
    }
}

/// The active playback session.
///
/// `index` is the next position to fire. It may sit one step outside the sequence
/// between the last note and the wrap or stop decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub id: Option<String>,
    pub sequence: PlaybackSequence,
    pub index: isize,
    pub reversed: bool,
    pub label: String,
    pub settings: PlaybackSettings,
}

/// Payload of a step notification.
///
/// `code` is `None` for rest steps; those advance time without sounding.
/// The sequence itself travels in the `Start` snapshot; each step carries its length.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNotice {
    pub index: usize,
    pub sequence_len: usize,
    pub code: Option<String>,
    pub velocity: Option<f64>,
    pub duration_hint_ms: Option<u64>,
    /// Resolved pitch, `None` for rests.
    pub frequency: Option<f64>,
    pub is_echo: bool,
    pub bass_offset: i32,
    pub accent: bool,
    pub settings: PlaybackSettings,
    pub playback_id: Option<String>,
}

/// Scheduler notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum PlaybackEvent {
    Start(PlaybackSnapshot),
    Step(StepNotice),
    Stop,
}

/// Arguments for [`Scheduler::play`](super::Scheduler::play).
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub label: String,
    pub id: Option<String>,
    pub reversed: bool,
    pub looping: bool,
    /// Falls back to the scheduler's default settings.
    pub settings: Option<PlaybackSettings>,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Passed to listeners so they can end playback from inside a notification.
#[derive(Debug, Default)]
pub struct PlaybackControl {
    stop_requested: bool,
}

impl PlaybackControl {
    /// Stop playback once the current notification has been delivered.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}
