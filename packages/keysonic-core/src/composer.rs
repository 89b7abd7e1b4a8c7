//! # Composer
//!
//! Turns a typed key-code sequence into a short rhythmic, melodic phrase.
//!
//! ## Pipeline
//! 1. **Segment** the codes into words, word separators (space and action keys) and
//!    sentence breaks (punctuation).
//! 2. **Hash** each word (see [`polynomial_hash`]) to pick a rhythm pattern for the
//!    meter and, unless the caller pinned one, a contour shape.
//! 3. **Walk** the letters: each takes the next pattern duration, vowels one step longer
//!    (at most 4).
//! 4. **Echo** the last three letters of the word in one or two bass-shifted layers,
//!    every echo note followed by a one-step rest.
//! 5. **Separators** add rests; **sentence breaks** re-strike the last code as an
//!    accented three-step note, then rest twice as long.
//!
//! All positions are in elementary steps (eighth notes). The event list is gap-free:
//! every event starts where the previous one ended.
//!
//! ## Determinism
//! No clock and no randomness: identical `(codes, options)` always produce an identical
//! [`ComposedSong`].
//!
//! ## Example
//! ```rust
//! use keysonic::composer::{compose, flatten, ComposerOptions};
//!
//! let codes: Vec<String> = ["KeyH", "KeyI", " "].iter().map(|s| s.to_string()).collect();
//! let song = compose(&codes, &ComposerOptions { rest_between_words: 2, ..Default::default() });
//! let steps: u32 = song.events.iter().map(|e| e.duration_steps).sum();
//! assert_eq!(flatten(&song).len() as u32, steps);
//! ```

use serde::{Deserialize, Serialize};

use crate::keymap::{code_to_char, normalize_code, polynomial_hash};

/// Note value of one step.
pub const STEP_NOTE_VALUE: &str = "eighth";

/// Longest a single letter may last, in steps.
const MAX_LETTER_STEPS: u32 = 4;

/// Letters of a word that get echoed.
const ECHO_TAIL: usize = 3;

/// Bass offsets per echo layer, walking up to the root.
const ECHO_BASS_WALKS: [[i32; ECHO_TAIL]; 2] = [[-2, -1, 0], [-4, -2, 0]];

const SENTENCE_ACCENT_STEPS: u32 = 3;
const SENTENCE_ACCENT_MOVE: i32 = -2;
const SENTENCE_ACCENT_BASS: i32 = -3;

const WORD_SEPARATORS: [&str; 15] = [
    " ",
    "Enter",
    "Tab",
    "Backspace",
    "CapsLock",
    "Shift",
    "Control",
    "Alt",
    "Meta",
    "Fn",
    "ArrowLeft",
    "ArrowRight",
    "ArrowUp",
    "ArrowDown",
    "NumLock",
];

const SENTENCE_BREAKS: [&str; 6] = [".", ",", "!", "?", ";", ":"];

const PATTERNS_FOUR_FOUR: [&[u32]; 4] = [
    &[1, 1, 2, 1, 1, 2],
    &[2, 1, 1, 2, 1, 1],
    &[1, 1, 1, 1, 2, 2],
    &[2, 2, 1, 1, 1, 1],
];

const PATTERNS_THREE_FOUR: [&[u32]; 3] = [&[1, 1, 1, 1, 2], &[2, 1, 1, 2], &[1, 2, 1, 2]];

/// Time signature of a composed phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Meter {
    #[default]
    #[serde(rename = "4/4")]
    FourFour,
    #[serde(rename = "3/4")]
    ThreeFour,
}

impl Meter {
    /// Parse `"4/4"` or `"3/4"`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "4/4" => Some(Meter::FourFour),
            "3/4" => Some(Meter::ThreeFour),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Meter::FourFour => "4/4",
            Meter::ThreeFour => "3/4",
        }
    }

    /// Beats per bar and the beat's note type.
    pub fn signature(self) -> (u8, u8) {
        match self {
            Meter::FourFour => (4, 4),
            Meter::ThreeFour => (3, 4),
        }
    }

    /// Eighth-note steps in one bar.
    pub fn steps_per_bar(self) -> u32 {
        self.signature().0 as u32 * 2
    }

    fn patterns(self) -> &'static [&'static [u32]] {
        match self {
            Meter::FourFour => &PATTERNS_FOUR_FOUR,
            Meter::ThreeFour => &PATTERNS_THREE_FOUR,
        }
    }
}

/// Melodic shape laid over a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContourShape {
    Arch,
    Rise,
    Fall,
}

impl ContourShape {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "arch" => Some(ContourShape::Arch),
            "rise" => Some(ContourShape::Rise),
            "fall" => Some(ContourShape::Fall),
            _ => None,
        }
    }

    fn from_hash(magnitude: u32) -> Self {
        match magnitude % 3 {
            0 => ContourShape::Arch,
            1 => ContourShape::Rise,
            _ => ContourShape::Fall,
        }
    }
}

/// Knobs for [`compose`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposerOptions {
    pub meter: Meter,
    /// Rest steps per word separator; sentence breaks rest twice this.
    pub rest_between_words: u32,
    /// Pin every word to one shape. `None` lets each word's hash choose.
    pub word_contour: Option<ContourShape>,
    /// Widest contour, in scale degrees.
    pub max_span: u32,
    /// Tempo in BPM, carried through as metadata for exports.
    pub tempo: u32,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        Self {
            meter: Meter::FourFour,
            rest_between_words: 1,
            word_contour: None,
            max_span: 4,
            tempo: 120,
        }
    }
}

/// One note or rest of a composed phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedEvent {
    /// Start position in steps.
    pub step_position: u32,
    /// Key code to sound, `None` for a rest.
    pub code: Option<String>,
    pub duration_steps: u32,
    /// Scale-degree move from the word's center.
    pub pitch_move: i32,
    pub word_index: usize,
    pub position_in_word: usize,
    pub is_echo: bool,
    pub bass_offset: i32,
    pub accent: bool,
}

impl ComposedEvent {
    pub fn is_rest(&self) -> bool {
        self.code.is_none()
    }
}

/// Output of [`compose`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedSong {
    pub meter: Meter,
    pub unit: String,
    pub tempo: u32,
    pub events: Vec<ComposedEvent>,
}

impl ComposedSong {
    /// Total length in steps.
    pub fn total_steps(&self) -> u32 {
        self.events.iter().map(|e| e.duration_steps).sum()
    }
}

/// A sounding token of a fixed-step stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteToken {
    pub code: String,
    pub is_echo: bool,
    pub bass_offset: i32,
    pub pitch_move: i32,
    pub accent: bool,
}

impl NoteToken {
    pub fn plain(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            is_echo: false,
            bass_offset: 0,
            pitch_move: 0,
            accent: false,
        }
    }

    /// Scale-degree shift to apply when resolving this token's pitch.
    pub fn degree_offset(&self) -> i64 {
        self.pitch_move as i64 + self.bass_offset as i64
    }
}

/// One step of a fixed-step stream: a note or a rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepToken {
    Note(NoteToken),
    Rest,
}

impl StepToken {
    pub fn plain(code: impl Into<String>) -> Self {
        StepToken::Note(NoteToken::plain(code))
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StepToken::Note(note) => Some(&note.code),
            StepToken::Rest => None,
        }
    }
}

/// Plain tokens for a raw code sequence, one step each.
pub fn tokens_from_codes(codes: &[String]) -> Vec<StepToken> {
    codes.iter().map(|code| StepToken::plain(code.as_str())).collect()
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Word(Vec<&'a str>),
    Separator,
    SentenceBreak,
}

fn segment(codes: &[String]) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut word: Vec<&str> = Vec::new();

    for code in codes {
        let normalized = normalize_code(code);
        let marker = if WORD_SEPARATORS.contains(&normalized.as_ref()) {
            Some(Segment::Separator)
        } else if SENTENCE_BREAKS.contains(&normalized.as_ref()) {
            Some(Segment::SentenceBreak)
        } else {
            None
        };

        match marker {
            Some(marker) => {
                if !word.is_empty() {
                    segments.push(Segment::Word(std::mem::take(&mut word)));
                }
                segments.push(marker);
            }
            None => word.push(code.as_str()),
        }
    }
    if !word.is_empty() {
        segments.push(Segment::Word(word));
    }

    segments
}

/// Round half up, matching the contour values of existing songs.
fn round_half_up(x: f64) -> i32 {
    (x + 0.5).floor() as i32
}

/// Per-letter scale-degree moves for a word of `len` letters, centered on zero.
pub fn make_contour(len: usize, shape: ContourShape, max_span: u32) -> Vec<i32> {
    if len <= 1 {
        return vec![0; len];
    }

    let span = max_span as f64;
    let last = (len - 1) as f64;
    let mid = last / 2.0;
    let raw: Vec<i32> = (0..len)
        .map(|i| {
            let i = i as f64;
            let level = match shape {
                ContourShape::Rise => i / last,
                ContourShape::Fall => (last - i) / last,
                ContourShape::Arch => 1.0 - (i - mid).abs() / mid,
            };
            round_half_up(level * span)
        })
        .collect();

    let min = raw.iter().copied().min().unwrap_or(0);
    let max = raw.iter().copied().max().unwrap_or(0);
    let mid = (min + max) as f64 / 2.0;
    raw.into_iter().map(|v| round_half_up(v as f64 - mid)).collect()
}

fn is_vowel(code: &str) -> bool {
    matches!(
        code_to_char(code).map(|c| c.to_ascii_uppercase()),
        Some('A' | 'E' | 'I' | 'O' | 'U')
    )
}

/// Running state while composing.
struct Score {
    events: Vec<ComposedEvent>,
    cursor: u32,
}

impl Score {
    fn note(&mut self, code: &str, steps: u32, word_index: usize, position: usize) -> &mut ComposedEvent {
        self.events.push(ComposedEvent {
            step_position: self.cursor,
            code: Some(code.to_string()),
            duration_steps: steps,
            pitch_move: 0,
            word_index,
            position_in_word: position,
            is_echo: false,
            bass_offset: 0,
            accent: false,
        });
        self.cursor += steps;
        let last = self.events.len() - 1;
        &mut self.events[last]
    }

    fn rests(&mut self, count: u32, word_index: usize, is_echo: bool) {
        for _ in 0..count {
            self.events.push(ComposedEvent {
                step_position: self.cursor,
                code: None,
                duration_steps: 1,
                pitch_move: 0,
                word_index,
                position_in_word: 0,
                is_echo,
                bass_offset: 0,
                accent: false,
            });
            self.cursor += 1;
        }
    }
}

/// Compose a phrase from a key-code sequence.
pub fn compose(codes: &[String], options: &ComposerOptions) -> ComposedSong {
    let mut score = Score {
        events: Vec::new(),
        cursor: 0,
    };
    let mut word_index = 0usize;
    let mut last_word: Option<(usize, usize)> = None;
    let mut last_code: Option<&str> = None;

    for seg in segment(codes) {
        match seg {
            Segment::Word(letters) => {
                let magnitude = polynomial_hash(letters.iter().copied()).unsigned_abs();
                let patterns = options.meter.patterns();
                let pattern = patterns[magnitude as usize % patterns.len()];
                let shape = options
                    .word_contour
                    .unwrap_or_else(|| ContourShape::from_hash(magnitude));
                let contour = make_contour(letters.len(), shape, options.max_span);

                for (i, code) in letters.iter().enumerate() {
                    let base = pattern[i % pattern.len()];
                    let steps = if is_vowel(code) {
                        (base + 1).min(MAX_LETTER_STEPS)
                    } else {
                        base
                    };
                    score.note(code, steps, word_index, i).pitch_move = contour[i];
                }

                let tail = letters.len().min(ECHO_TAIL);
                let layers = (magnitude % 2 + 1) as usize;
                for walk in ECHO_BASS_WALKS.iter().take(layers) {
                    let offsets = &walk[ECHO_TAIL - tail..];
                    for (k, i) in (letters.len() - tail..letters.len()).enumerate() {
                        let echo = score.note(letters[i], 1, word_index, i);
                        echo.pitch_move = contour[i];
                        echo.is_echo = true;
                        echo.bass_offset = offsets[k];
                        score.rests(1, word_index, true);
                    }
                }

                last_code = letters.last().copied();
                last_word = Some((word_index, letters.len()));
                word_index += 1;
            }
            Segment::Separator => {
                let owner = last_word.map(|(w, _)| w).unwrap_or(0);
                score.rests(options.rest_between_words, owner, false);
            }
            Segment::SentenceBreak => {
                let (owner, position) = last_word.unwrap_or((0, 0));
                if let Some(code) = last_code {
                    let accent = score.note(code, SENTENCE_ACCENT_STEPS, owner, position);
                    accent.pitch_move = SENTENCE_ACCENT_MOVE;
                    accent.bass_offset = SENTENCE_ACCENT_BASS;
                    accent.accent = true;
                }
                score.rests(options.rest_between_words.saturating_mul(2), owner, false);
            }
        }
    }

    ComposedSong {
        meter: options.meter,
        unit: STEP_NOTE_VALUE.to_string(),
        tempo: options.tempo,
        events: score.events,
    }
}

/// Expand a composed phrase into one token per step.
///
/// Notes repeat once per step of their duration; rests emit one rest token per step.
pub fn flatten(song: &ComposedSong) -> Vec<StepToken> {
    let mut out = Vec::with_capacity(song.total_steps() as usize);
    for event in &song.events {
        let token = match &event.code {
            Some(code) => StepToken::Note(NoteToken {
                code: code.clone(),
                is_echo: event.is_echo,
                bass_offset: event.bass_offset,
                pitch_move: event.pitch_move,
                accent: event.accent,
            }),
            None => StepToken::Rest,
        };
        for _ in 0..event.duration_steps {
            out.push(token.clone());
        }
    }
    out
}
