//! # Timeline Capture
//!
//! Records key-down/key-up activity into a raw code list and a timed event list.
//!
//! ## Timing
//! - Zero time is fixed by the first key-down of a session (or by an orphan release
//!   that arrives before any key-down).
//! - `offset_ms = round(timestamp - zero)`, never negative.
//! - A release fills `duration_ms` on the most recent open event with the same code.
//!   A release with no open event is kept as a zero-duration marker.
//!
//! ## Velocity
//! When the input layer supplies no velocity, it is derived from the gap since the
//! previous key-down: fast typing plays louder.
//!
//! ```text
//! gap      = clamp(now - previous_down, 40, 400)
//! velocity = 0.3 + (400 - gap) / 360 * 0.7
//! ```
//!
//! The first key-down of a session has no gap and carries no velocity; playback uses
//! [`NEUTRAL_VELOCITY`] for it.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::keymap::{code_to_char, normalize_code};

/// Velocity used for events that carry none.
pub const NEUTRAL_VELOCITY: f64 = 0.65;

/// Longest typed buffer, in characters.
pub const TYPED_MAX_LENGTH: usize = 500;

const MIN_GAP_MS: f64 = 40.0;
const MAX_GAP_MS: f64 = 400.0;
const MIN_DERIVED_VELOCITY: f64 = 0.3;
const MIN_VELOCITY: f64 = 0.3;
const MAX_VELOCITY: f64 = 1.5;
const DERIVED_VELOCITY_RANGE: f64 = 0.7;

/// One captured key activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    pub code: String,
    pub offset_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl KeyEvent {
    pub fn new(code: impl Into<String>, offset_ms: u64) -> Self {
        Self {
            code: code.into(),
            offset_ms,
            velocity: None,
            duration_ms: None,
        }
    }
}

/// Velocity for a key-down `gap_ms` after the previous one.
pub fn velocity_from_gap(gap_ms: f64) -> f64 {
    let gap = gap_ms.clamp(MIN_GAP_MS, MAX_GAP_MS);
    MIN_DERIVED_VELOCITY + (MAX_GAP_MS - gap) / (MAX_GAP_MS - MIN_GAP_MS) * DERIVED_VELOCITY_RANGE
}

fn round_ms(ms: f64) -> u64 {
    if ms.is_finite() && ms > 0.0 {
        ms.round() as u64
    } else {
        0
    }
}

/// A capture session.
///
/// Key calls are ignored unless the session is recording.
#[derive(Debug, Default)]
pub struct CaptureSession {
    recording: bool,
    zero_ms: Option<f64>,
    last_down_ms: Option<f64>,
    down_times: HashMap<String, f64>,
    raw_codes: Vec<String>,
    timed_events: Vec<KeyEvent>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh take, discarding anything captured before.
    pub fn start(&mut self) {
        self.clear();
        self.recording = true;
        debug!("capture started");
    }

    /// Stop recording. Captured data stays readable until the next [`start`](Self::start).
    pub fn stop(&mut self) {
        if self.recording {
            debug!(
                "capture stopped: {} codes, {} timed events",
                self.raw_codes.len(),
                self.timed_events.len()
            );
        }
        self.recording = false;
    }

    pub fn clear(&mut self) {
        self.zero_ms = None;
        self.last_down_ms = None;
        self.down_times.clear();
        self.raw_codes.clear();
        self.timed_events.clear();
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn raw_codes(&self) -> &[String] {
        &self.raw_codes
    }

    pub fn timed_events(&self) -> &[KeyEvent] {
        &self.timed_events
    }

    /// Take the captured data, leaving the session empty.
    pub fn take(&mut self) -> (Vec<String>, Vec<KeyEvent>) {
        let codes = std::mem::take(&mut self.raw_codes);
        let events = std::mem::take(&mut self.timed_events);
        self.clear();
        (codes, events)
    }

    /// Record a key-down at `timestamp_ms`. Returns whether it was captured.
    pub fn on_key_down(&mut self, code: &str, timestamp_ms: f64, velocity: Option<f64>) -> bool {
        if !self.recording {
            return false;
        }

        let zero = *self.zero_ms.get_or_insert(timestamp_ms);
        let velocity = velocity
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(MIN_VELOCITY, MAX_VELOCITY))
            .or_else(|| {
                self.last_down_ms
                    .map(|previous| velocity_from_gap(timestamp_ms - previous))
            });
        self.last_down_ms = Some(timestamp_ms);
        self.down_times.insert(code.to_string(), timestamp_ms);

        self.raw_codes.push(code.to_string());
        self.timed_events.push(KeyEvent {
            code: code.to_string(),
            offset_ms: round_ms(timestamp_ms - zero),
            velocity,
            duration_ms: None,
        });
        true
    }

    /// Record a key-up at `timestamp_ms`. Returns whether it was captured.
    pub fn on_key_up(&mut self, code: &str, timestamp_ms: f64) -> bool {
        if !self.recording {
            return false;
        }

        let zero = *self.zero_ms.get_or_insert(timestamp_ms);
        let held_ms = self
            .down_times
            .remove(code)
            .filter(|down| *down <= timestamp_ms)
            .map(|down| round_ms(timestamp_ms - down).max(1));

        let open = self
            .timed_events
            .iter_mut()
            .rev()
            .find(|e| e.code == code && e.duration_ms.is_none());

        match open {
            Some(event) => event.duration_ms = Some(held_ms.unwrap_or(1)),
            None => {
                debug!("release of {} without a matching key-down", code);
                self.timed_events.push(KeyEvent {
                    code: code.to_string(),
                    offset_ms: round_ms(timestamp_ms - zero),
                    velocity: None,
                    duration_ms: Some(0),
                });
            }
        }
        true
    }
}

/// Text typed outside a capture session, kept with the codes that typed it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedBuffer {
    text: String,
    codes: Vec<String>,
}

impl TypedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one key. `Backspace` deletes; keys that type nothing are ignored.
    ///
    /// Returns whether the buffer changed.
    pub fn type_code(&mut self, code: &str) -> bool {
        if normalize_code(code) == "Backspace" {
            return self.backspace();
        }
        let Some(ch) = code_to_char(code) else {
            return false;
        };

        self.text.push(ch);
        self.codes.push(code.to_string());

        let overflow = self.codes.len().saturating_sub(TYPED_MAX_LENGTH);
        if overflow > 0 {
            self.text.drain(..overflow);
            self.codes.drain(..overflow);
        }
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.text.pop().is_some() {
            self.codes.pop();
            true
        } else {
            false
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.codes.clear();
    }
}
