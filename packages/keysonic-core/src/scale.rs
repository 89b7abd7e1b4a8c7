//! # Scales and Pitch Mapping
//!
//! Deterministic mapping from an abstract key index to a frequency.
//!
//! ## Index Space
//! A scale spans `octave_span` octaves of `steps.len()` degrees each. That product is
//! the *window size*: index `i` and index `i + window_size` always sound the same pitch.
//!
//! ```text
//! index ──wrap──▶ wrapped ──┬── degree = wrapped % steps.len()
//!                           └── octave = wrapped / steps.len()
//! semitones = offset + steps[degree] + 12 * octave
//! frequency = root * 2^(semitones / 12)
//! ```
//!
//! ## Presets
//! [`SCALES`] holds the built-in scales. [`scale_by_id`] never fails: unknown ids fall
//! back to `major`.
//!
//! ## Example
//! ```rust
//! use keysonic::scale::{frequency, scale_by_id};
//!
//! let major = &scale_by_id("major").scale;
//! assert_eq!(frequency(0, major, 220.0), 220.0);
//! assert!((frequency(7, major, 220.0) - 440.0).abs() < 1e-9);
//! ```

use std::borrow::Cow;

use crate::keymap::key_index;

/// Root frequency used when no setting overrides it.
pub const DEFAULT_ROOT_FREQ: f64 = 220.0;

/// Scale used when a scale id is unknown.
pub const DEFAULT_SCALE_ID: &str = "major";

/// Semitone pattern of a scale plus how it is laid over the index space.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDefinition {
    /// Semitone offsets within one octave, first element conventionally 0.
    pub steps: Cow<'static, [i32]>,
    /// Global semitone shift applied to every degree.
    pub offset: i32,
    /// Number of octaves the index space wraps across.
    pub octave_span: u32,
}

impl ScaleDefinition {
    pub fn new(steps: Vec<i32>, offset: i32, octave_span: u32) -> Self {
        Self {
            steps: Cow::Owned(steps),
            offset,
            octave_span: octave_span.max(1),
        }
    }

    /// `steps × octave_span`, never zero.
    pub fn window_size(&self) -> usize {
        (self.steps.len() * self.octave_span.max(1) as usize).max(1)
    }
}

/// A named, built-in scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalePreset {
    pub id: &'static str,
    pub label: &'static str,
    pub scale: ScaleDefinition,
}

const fn preset(
    id: &'static str,
    label: &'static str,
    steps: &'static [i32],
    offset: i32,
    octave_span: u32,
) -> ScalePreset {
    ScalePreset {
        id,
        label,
        scale: ScaleDefinition {
            steps: Cow::Borrowed(steps),
            offset,
            octave_span,
        },
    }
}

/// Built-in scales. The first entry is the fallback.
pub static SCALES: [ScalePreset; 6] = [
    preset("major", "Major", &[0, 2, 4, 5, 7, 9, 11], 0, 3),
    preset("naturalMinor", "Natural Minor", &[0, 2, 3, 5, 7, 8, 10], -2, 3),
    preset("majorPentatonic", "Major Pentatonic", &[0, 2, 4, 7, 9], 0, 2),
    preset("minorPentatonic", "Minor Pentatonic", &[0, 3, 5, 7, 10], -5, 2),
    preset("lydian", "Bright (Lydian)", &[0, 2, 4, 6, 7, 9, 11], 5, 3),
    preset("phrygian", "Spooky (Phrygian)", &[0, 1, 3, 5, 7, 8, 10], -7, 2),
];

/// Look up a preset by id, falling back to `major`.
pub fn scale_by_id(id: &str) -> &'static ScalePreset {
    SCALES
        .iter()
        .find(|preset| preset.id == id)
        .unwrap_or(&SCALES[0])
}

/// Whether `id` names a built-in scale.
pub fn is_known_scale(id: &str) -> bool {
    SCALES.iter().any(|preset| preset.id == id)
}

/// Frequency of `index` within `scale`, rooted at `root_frequency`.
///
/// Negative indices clamp to 0.
pub fn frequency(index: i64, scale: &ScaleDefinition, root_frequency: f64) -> f64 {
    let index = index.max(0) as usize;
    let wrapped = index % scale.window_size();

    let semitones = if scale.steps.is_empty() {
        scale.offset
    } else {
        let degrees = scale.steps.len();
        let degree = wrapped % degrees;
        let octave = (wrapped / degrees) as i32;
        scale.offset + scale.steps[degree] + 12 * octave
    };

    root_frequency * 2f64.powf(semitones as f64 / 12.0)
}

/// Like [`frequency`], with a signed degree shift applied before wrapping.
///
/// The shifted index is re-clamped to 0, so a bass walk below the bottom of the
/// index space lands on the lowest degree.
pub fn frequency_with_offset(
    index: i64,
    degree_offset: i64,
    scale: &ScaleDefinition,
    root_frequency: f64,
) -> f64 {
    frequency((index + degree_offset).max(0), scale, root_frequency)
}

/// Scale + root bundled for repeated lookups by key code.
#[derive(Debug, Clone, Copy)]
pub struct PitchMapper<'a> {
    scale: &'a ScaleDefinition,
    root_frequency: f64,
}

impl<'a> PitchMapper<'a> {
    pub fn new(scale: &'a ScaleDefinition, root_frequency: f64) -> Self {
        let root_frequency = if root_frequency.is_finite() && root_frequency > 0.0 {
            root_frequency
        } else {
            DEFAULT_ROOT_FREQ
        };
        Self {
            scale,
            root_frequency,
        }
    }

    pub fn for_scale_id(scale_id: &str, root_frequency: f64) -> PitchMapper<'static> {
        PitchMapper::new(&scale_by_id(scale_id).scale, root_frequency)
    }

    pub fn frequency(&self, index: i64) -> f64 {
        frequency(index, self.scale, self.root_frequency)
    }

    /// Resolve a key code to a frequency. Every code resolves to some pitch.
    pub fn frequency_for_code(&self, code: &str, degree_offset: i64) -> f64 {
        frequency_with_offset(
            key_index(code) as i64,
            degree_offset,
            self.scale,
            self.root_frequency,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_major_scale_root_and_octave() {
        let major = &scale_by_id("major").scale;
        assert_eq!(frequency(0, major, 220.0), 220.0);
        assert!(approx(frequency(7, major, 220.0), 440.0));
        assert!(approx(frequency(14, major, 220.0), 880.0));
    }

    #[test]
    fn test_window_wraps_back_to_root() {
        let major = &scale_by_id("major").scale;
        assert_eq!(major.window_size(), 21);
        assert!(approx(frequency(21, major, 220.0), 220.0));
    }

    #[test]
    fn test_periodicity_for_every_preset() {
        for preset in SCALES.iter() {
            let window = preset.scale.window_size() as i64;
            for i in 0..(window * 2) {
                let a = frequency(i, &preset.scale, 130.81);
                let b = frequency(i + window, &preset.scale, 130.81);
                assert!(approx(a, b), "{} index {}", preset.id, i);
            }
        }
    }

    #[test]
    fn test_negative_index_clamps_to_zero() {
        let major = &scale_by_id("major").scale;
        assert_eq!(frequency(-5, major, 220.0), frequency(0, major, 220.0));
        assert_eq!(
            frequency_with_offset(1, -4, major, 220.0),
            frequency(0, major, 220.0)
        );
    }

    #[test]
    fn test_offset_shifts_semitones() {
        let minor = &scale_by_id("naturalMinor").scale;
        // offset -2 semitones below the root
        assert!(approx(frequency(0, minor, 220.0), 220.0 * 2f64.powf(-2.0 / 12.0)));
    }

    #[test]
    fn test_unknown_scale_falls_back_to_major() {
        assert_eq!(scale_by_id("klingon").id, "major");
        assert!(!is_known_scale("klingon"));
        assert!(is_known_scale("lydian"));
    }

    #[test]
    fn test_empty_steps_do_not_panic() {
        let empty = ScaleDefinition::new(vec![], 0, 0);
        assert_eq!(empty.window_size(), 1);
        assert_eq!(frequency(12, &empty, 220.0), 220.0);
    }

    #[test]
    fn test_pitch_mapper_resolves_unknown_codes() {
        let mapper = PitchMapper::for_scale_id("major", 220.0);
        let f = mapper.frequency_for_code("NotAKey", 0);
        assert!(f.is_finite() && f > 0.0);
        assert_eq!(f, mapper.frequency_for_code("NotAKey", 0));
    }

    #[test]
    fn test_pitch_mapper_rejects_bad_root() {
        let mapper = PitchMapper::for_scale_id("major", f64::NAN);
        assert_eq!(mapper.frequency(0), DEFAULT_ROOT_FREQ);
    }
}
