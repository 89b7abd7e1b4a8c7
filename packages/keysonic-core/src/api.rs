//! # Public API
//!
//! One-call entry points for hosts that only need the pure parts of the instrument.
//!
//! ## Functions
//!
//! - [`compose_text()`] - Compose a phrase from typed text
//! - [`flatten_text()`] - Composed phrase as one token per step
//! - [`text_to_musicxml()`] - Composed phrase rendered as MusicXML
//! - [`frequency_for()`] - Pitch of one key under a scale and root
//!
//! ## Typical Usage
//!
//! ```rust
//! use keysonic::{compose_text, frequency_for, ComposerOptions};
//!
//! let song = compose_text("hello world.", &ComposerOptions::default());
//! assert!(song.events.iter().any(|e| e.accent));
//!
//! let a = frequency_for("KeyA", "major", 220.0);
//! assert!(a > 220.0);
//! ```

use crate::composer::{compose, flatten, ComposedSong, ComposerOptions, StepToken};
use crate::keymap::text_to_codes;
use crate::musicxml::to_musicxml;
use crate::playback::PlaybackSettings;
use crate::scale::PitchMapper;

/// Compose a phrase from typed text.
///
/// Characters without a key on the layout are skipped.
///
/// # Example
/// ```rust
/// use keysonic::{compose_text, ComposerOptions};
///
/// let song = compose_text("hi", &ComposerOptions::default());
/// assert_eq!(song.events[0].code.as_deref(), Some("H"));
/// ```
pub fn compose_text(text: &str, options: &ComposerOptions) -> ComposedSong {
    compose(&text_to_codes(text), options)
}

/// Compose typed text and expand it to one token per step.
pub fn flatten_text(text: &str, options: &ComposerOptions) -> Vec<StepToken> {
    flatten(&compose_text(text, options))
}

/// Compose typed text and render it as a MusicXML document titled with the text.
pub fn text_to_musicxml(text: &str, options: &ComposerOptions, settings: &PlaybackSettings) -> String {
    let song = compose_text(text, options);
    let title = text.trim();
    to_musicxml(&song, settings, (!title.is_empty()).then_some(title))
}

/// Frequency of `code` under `scale_id` (falling back to `major`) and `root_freq`.
pub fn frequency_for(code: &str, scale_id: &str, root_freq: f64) -> f64 {
    PitchMapper::for_scale_id(scale_id, root_freq).frequency_for_code(code, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_text_matches_codes() {
        let options = ComposerOptions::default();
        let codes: Vec<String> = ["H", "I"].iter().map(|s| s.to_string()).collect();
        assert_eq!(compose_text("hi", &options), compose(&codes, &options));
    }

    #[test]
    fn test_flatten_text_covers_every_step() {
        let options = ComposerOptions::default();
        let song = compose_text("hey you", &options);
        assert_eq!(flatten_text("hey you", &options).len() as u32, song.total_steps());
    }

    #[test]
    fn test_text_to_musicxml_titles_with_text() {
        let xml = text_to_musicxml(" hi ", &ComposerOptions::default(), &PlaybackSettings::default());
        assert!(xml.contains("<work-title>hi</work-title>"));
        let untitled = text_to_musicxml("", &ComposerOptions::default(), &PlaybackSettings::default());
        assert!(!untitled.contains("<work>"));
    }

    #[test]
    fn test_frequency_for_falls_back_to_major() {
        assert_eq!(frequency_for("`", "nope", 220.0), 220.0);
        assert_eq!(frequency_for("`", "nope", -5.0), 220.0);
        assert_eq!(
            frequency_for("KeyQ", "nope", 220.0),
            frequency_for("KeyQ", "major", 220.0)
        );
    }
}
