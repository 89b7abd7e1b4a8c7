//! # Notation
//!
//! Frequencies as notes: MIDI numbers, spelled note names, and the per-recording song
//! export.
//!
//! ## Spelling
//! Black keys are spelled with sharps or flats depending on the scale in use. Minor and
//! darker scales read in flats, everything else in sharps:
//!
//! | scale id           | spelling |
//! |--------------------|----------|
//! | `major`, `lydian`  | sharps   |
//! | `naturalMinor`     | flats    |
//! | `minorPentatonic`  | flats    |

use serde::Serialize;

use crate::composer::STEP_NOTE_VALUE;
use crate::playback::PlaybackSettings;
use crate::recording::RecordingEntry;

const FLAT_HINTS: [&str; 7] = ["flat", "blue", "jazzy", "dark", "lofi", "moody", "minor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spelling {
    Sharps,
    Flats,
}

impl Spelling {
    pub fn for_scale(scale_id: &str) -> Self {
        let context = scale_id.to_lowercase();
        if FLAT_HINTS.iter().any(|hint| context.contains(hint)) {
            Spelling::Flats
        } else {
            Spelling::Sharps
        }
    }
}

/// Nearest MIDI note for a frequency, `None` for non-positive or non-finite input.
pub fn midi_from_frequency(frequency: f64) -> Option<i32> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    let midi = (69.0 + 12.0 * (frequency / 440.0).log2()).round();
    midi.is_finite().then_some(midi as i32)
}

/// A spelled pitch: letter, alteration in semitones, octave (middle C = C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitch {
    pub step: char,
    pub alter: i8,
    pub octave: i32,
}

impl Pitch {
    pub fn from_midi(midi: i32, spelling: Spelling) -> Self {
        let semitone = midi.rem_euclid(12);
        let octave = midi.div_euclid(12) - 1;
        let (step, alter) = match (semitone, spelling) {
            (0, _) => ('C', 0),
            (2, _) => ('D', 0),
            (4, _) => ('E', 0),
            (5, _) => ('F', 0),
            (7, _) => ('G', 0),
            (9, _) => ('A', 0),
            (11, _) => ('B', 0),
            (1, Spelling::Sharps) => ('C', 1),
            (1, Spelling::Flats) => ('D', -1),
            (3, Spelling::Sharps) => ('D', 1),
            (3, Spelling::Flats) => ('E', -1),
            (6, Spelling::Sharps) => ('F', 1),
            (6, Spelling::Flats) => ('G', -1),
            (8, Spelling::Sharps) => ('G', 1),
            (8, Spelling::Flats) => ('A', -1),
            (_, Spelling::Sharps) => ('A', 1),
            (_, Spelling::Flats) => ('B', -1),
        };
        Self {
            step,
            alter,
            octave,
        }
    }

    /// Display name such as `C♯4` or `B♭3`.
    pub fn name(&self) -> String {
        let accidental = match self.alter {
            1 => "♯",
            -1 => "♭",
            _ => "",
        };
        format!("{}{}{}", self.step, accidental, self.octave)
    }
}

pub fn note_name(midi: i32, spelling: Spelling) -> String {
    Pitch::from_midi(midi, spelling).name()
}

/// One note of a song export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongEvent {
    /// Position in steps of [`STEP_NOTE_VALUE`].
    pub step: usize,
    pub midi: i32,
    pub note: String,
}

/// A recording rendered as pitched steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongExport {
    pub id: String,
    pub name: String,
    /// Scale the notes were spelled in.
    pub key: String,
    pub tempo: u32,
    pub step_note_value: String,
    pub events: Vec<SongEvent>,
}

/// Pitch every key of an entry's play sequence. `None` when nothing is pitched.
///
/// The entry's own settings take precedence over `fallback`.
pub fn song_export(
    entry: &RecordingEntry,
    fallback: &PlaybackSettings,
    tempo_bpm: u32,
) -> Option<SongExport> {
    let codes = if entry.play_sequence.is_empty() {
        &entry.display_sequence
    } else {
        &entry.play_sequence
    };

    let settings = match &entry.settings {
        Some(own) => own.resolve(fallback),
        None => fallback.clone(),
    };
    let mapper = settings.mapper();
    let spelling = Spelling::for_scale(&settings.scale_id);

    let events: Vec<SongEvent> = codes
        .iter()
        .enumerate()
        .filter_map(|(step, code)| {
            let midi = midi_from_frequency(mapper.frequency_for_code(code, 0))?;
            Some(SongEvent {
                step,
                midi,
                note: note_name(midi, spelling),
            })
        })
        .collect();

    if events.is_empty() {
        return None;
    }

    Some(SongExport {
        id: entry.id.clone(),
        name: entry.name.clone(),
        key: settings.scale_id,
        tempo: if tempo_bpm > 0 { tempo_bpm } else { 120 },
        step_note_value: STEP_NOTE_VALUE.to_string(),
        events,
    })
}
