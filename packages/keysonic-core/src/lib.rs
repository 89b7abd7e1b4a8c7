pub mod api;
pub mod capture;
pub mod composer;
pub mod config;
pub mod error;
pub mod keymap;
pub mod musicxml;
pub mod notation;
pub mod playback;
pub mod recording;
pub mod scale;
pub mod session;

pub use api::{compose_text, flatten_text, frequency_for, text_to_musicxml};
pub use capture::{CaptureSession, KeyEvent, TypedBuffer};
pub use composer::{
    compose, flatten, ComposedEvent, ComposedSong, ComposerOptions, ContourShape, Meter,
    NoteToken, StepToken,
};
pub use config::KeysonicConfig;
pub use error::*;
pub use musicxml::to_musicxml;
pub use notation::{song_export, SongExport};
pub use playback::{PlayOptions, PlaybackEvent, PlaybackSequence, PlaybackSettings, Scheduler};
pub use recording::{RecordingEntry, RecordingLibrary, RecordingSettings};
pub use scale::PitchMapper;
pub use session::Keysonic;
