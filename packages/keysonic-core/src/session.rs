//! # Session
//!
//! [`Keysonic`] ties the pieces together the way the instrument uses them: the live
//! keyboard, the capture session, the typed buffer, the recording library and one
//! scheduler.
//!
//! ## Keys
//! Every key-down starts a held tone for its code and every key-up releases it. While a
//! capture is running the keys are captured; otherwise printable keys go into the typed
//! buffer.
//!
//! ## Capture vs. playback
//! Only one of them runs at a time. Starting a capture stops playback, and starting
//! playback stops a running capture. A capture stopped that way keeps its keys until
//! [`Keysonic::stop_recording`] saves them or the next capture starts.
//!
//! ## Example
//! ```rust
//! use keysonic::playback::VirtualClock;
//! use keysonic::recording::{MemoryBackend, RecordingRepository};
//! use keysonic::{Keysonic, KeysonicConfig};
//!
//! let store = RecordingRepository::new(MemoryBackend::new());
//! let mut app = Keysonic::new(VirtualClock::new(), store, KeysonicConfig::default());
//!
//! for (i, code) in ["KeyH", "KeyI"].iter().enumerate() {
//!     app.key_down(code, i as f64 * 100.0, None);
//!     app.key_up(code, i as f64 * 100.0 + 50.0);
//! }
//! let entry = app.save_typed().unwrap();
//! assert_eq!(entry.name, "HI");
//! assert!(app.play_entry(&entry.id));
//! ```

use log::debug;

use crate::capture::{CaptureSession, TypedBuffer};
use crate::composer::{compose, ComposedSong};
use crate::config::KeysonicConfig;
use crate::error::KeysonicError;
use crate::musicxml::to_musicxml;
use crate::notation::{song_export, SongExport};
use crate::playback::{
    Clock, PlayOptions, PlaybackControl, PlaybackEvent, PlaybackSettings, Scheduler,
    SubscriptionId, ToneTrigger, VirtualClock,
};
use crate::recording::{
    epoch_ms, parse_bundle, ExportBundle, NewRecording, RecordingEntry, RecordingLibrary,
    RecordingSettings, RecordingStore,
};
use crate::scale::is_known_scale;

/// One running instrument.
pub struct Keysonic<C: Clock, S: RecordingStore> {
    scheduler: Scheduler<C>,
    capture: CaptureSession,
    typed: TypedBuffer,
    library: RecordingLibrary<S>,
    config: KeysonicConfig,
}

impl<C: Clock, S: RecordingStore> Keysonic<C, S> {
    pub fn new(clock: C, store: S, config: KeysonicConfig) -> Self {
        let mut scheduler = Scheduler::new(clock);
        scheduler.set_tempo(config.tempo);
        scheduler.set_default_settings(config.playback_settings());
        Self {
            scheduler,
            capture: CaptureSession::new(),
            typed: TypedBuffer::new(),
            library: RecordingLibrary::open(store),
            config,
        }
    }

    pub fn with_tone(mut self, tone: Box<dyn ToneTrigger>) -> Self {
        self.scheduler.set_tone(tone);
        self
    }

    pub fn scheduler(&self) -> &Scheduler<C> {
        &self.scheduler
    }

    /// Listen to playback notifications. Playback itself starts through [`Self::play_entry`].
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&PlaybackEvent, &mut PlaybackControl) + 'static,
    {
        self.scheduler.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.scheduler.unsubscribe(id)
    }

    pub fn library(&self) -> &RecordingLibrary<S> {
        &self.library
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    pub fn typed(&self) -> &TypedBuffer {
        &self.typed
    }

    pub fn config(&self) -> &KeysonicConfig {
        &self.config
    }

    pub fn key_down(&mut self, code: &str, timestamp_ms: f64, velocity: Option<f64>) {
        self.scheduler.start_held(code, velocity);
        if !self.capture.on_key_down(code, timestamp_ms, velocity) {
            self.typed.type_code(code);
        }
    }

    pub fn key_up(&mut self, code: &str, timestamp_ms: f64) {
        self.scheduler.stop_held(code);
        self.capture.on_key_up(code, timestamp_ms);
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// Begin a capture, stopping any playback first.
    pub fn start_recording(&mut self) {
        self.scheduler.stop();
        self.capture.start();
    }

    /// End the capture and save it. Returns the saved entry, `None` if nothing was captured.
    pub fn stop_recording(&mut self, name: &str) -> Option<RecordingEntry> {
        self.capture.stop();
        let (codes, events) = self.capture.take();
        let settings = self.recording_settings();
        self.library
            .create(NewRecording {
                name: name.to_string(),
                play_sequence: codes,
                display_sequence: None,
                timed_events: Some(events),
                settings: Some(settings),
            })
            .cloned()
    }

    /// End the capture and throw it away.
    pub fn cancel_recording(&mut self) {
        self.capture.stop();
        self.capture.clear();
    }

    /// Save the typed buffer as a recording named after its text, then clear it.
    pub fn save_typed(&mut self) -> Option<RecordingEntry> {
        if self.typed.is_empty() {
            return None;
        }
        let name = self.typed.text().trim().to_string();
        let codes = self.typed.codes().to_vec();
        let settings = self.recording_settings();
        let entry = self
            .library
            .create(NewRecording {
                settings: Some(settings),
                ..NewRecording::from_codes(name, codes)
            })
            .cloned();
        if entry.is_some() {
            self.typed.clear();
        }
        entry
    }

    pub fn clear_typed(&mut self) {
        self.typed.clear();
    }

    /// Start playing a saved entry with its own loop, direction and settings.
    ///
    /// Returns `false` for unknown ids and empty sources.
    pub fn play_entry(&mut self, id: &str) -> bool {
        let Some(reversed) = self.library.get(id).map(|e| e.reverse) else {
            return false;
        };
        if self.capture.is_recording() {
            debug!("capture interrupted by playback of {}", id);
            self.capture.stop();
        }
        self.start_entry(id, reversed)
    }

    pub fn stop_playback(&mut self) {
        self.scheduler.stop();
    }

    /// Flip an entry's loop flag. A playing entry picks it up immediately.
    pub fn toggle_loop(&mut self, id: &str) -> Option<bool> {
        let looping = !self.library.get(id)?.looping;
        self.library.set_loop(id, looping)?;
        if self.scheduler.playing_id() == Some(id) {
            self.scheduler.set_looping(looping);
        }
        Some(looping)
    }

    /// Flip an entry's direction. A playing entry turns around without skipping a note.
    pub fn toggle_reverse(&mut self, id: &str) -> Option<bool> {
        let reverse = !self.library.get(id)?.reverse;
        self.library.set_reverse(id, reverse)?;
        if self.scheduler.playing_id() == Some(id) {
            self.scheduler.set_reversed(reverse);
        }
        Some(reverse)
    }

    /// Flip an entry's compose flag. A playing entry restarts with its new source in
    /// its current direction.
    pub fn toggle_compose(&mut self, id: &str) -> Option<bool> {
        let compose = !self.library.get(id)?.compose;
        self.library.set_compose(id, compose)?;

        let playing_reversed = self
            .scheduler
            .snapshot()
            .filter(|s| s.id.as_deref() == Some(id))
            .map(|s| s.reversed);
        if let Some(reversed) = playing_reversed {
            self.start_entry(id, reversed);
        }
        Some(compose)
    }

    /// Delete an entry, stopping it first if it is playing.
    pub fn remove(&mut self, id: &str) -> Option<RecordingEntry> {
        if self.scheduler.playing_id() == Some(id) {
            self.scheduler.stop();
        }
        self.library.remove(id)
    }

    pub fn export_bundle(&self) -> Result<String, KeysonicError> {
        ExportBundle::new(self.library.entries().to_vec(), epoch_ms()).to_json()
    }

    /// Merge the recordings of an export bundle. Returns how many were added.
    pub fn import_bundle(&mut self, json: &str) -> Result<usize, KeysonicError> {
        let entries = parse_bundle(json)?;
        Ok(self.library.import(entries))
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        self.scheduler.set_tempo(tempo);
        self.config.tempo = self.scheduler.tempo();
    }

    /// Switch the live scale. Unknown ids are ignored; returns whether it changed.
    pub fn set_scale(&mut self, scale_id: &str) -> bool {
        if !is_known_scale(scale_id) {
            return false;
        }
        self.config.scale = scale_id.to_string();
        self.scheduler
            .set_default_settings(self.config.playback_settings());
        true
    }

    pub fn set_instrument(&mut self, instrument: Option<&str>) {
        self.config.instrument = instrument.map(str::to_string);
        self.scheduler
            .set_default_settings(self.config.playback_settings());
    }

    /// The composed phrase of an entry's play sequence.
    pub fn compose_entry(&self, id: &str) -> Option<ComposedSong> {
        let entry = self.library.get(id)?;
        Some(compose(&entry.play_sequence, &self.config.composer))
    }

    pub fn song_export(&self, id: &str) -> Option<SongExport> {
        let entry = self.library.get(id)?;
        song_export(entry, &self.live_settings(), self.config.composer.tempo)
    }

    /// MusicXML of an entry's composed phrase.
    pub fn musicxml(&self, id: &str) -> Option<String> {
        let entry = self.library.get(id)?;
        let song = compose(&entry.play_sequence, &self.config.composer);
        let settings = self.entry_settings(entry);
        Some(to_musicxml(&song, &settings, Some(&entry.name)))
    }

    fn live_settings(&self) -> PlaybackSettings {
        self.scheduler.default_settings().clone()
    }

    fn entry_settings(&self, entry: &RecordingEntry) -> PlaybackSettings {
        let live = self.live_settings();
        match &entry.settings {
            Some(own) => own.resolve(&live),
            None => live,
        }
    }

    fn recording_settings(&self) -> RecordingSettings {
        RecordingSettings {
            tempo: Some(self.scheduler.tempo()),
            scale_id: Some(self.config.scale.clone()),
            instrument: self.config.instrument.clone(),
            root_freq: Some(self.config.root_freq),
        }
    }

    fn start_entry(&mut self, id: &str, reversed: bool) -> bool {
        let Some(entry) = self.library.get(id) else {
            return false;
        };
        let sequence = entry.playback_source(&self.config.composer);
        if sequence.is_empty() {
            return false;
        }
        let options = PlayOptions {
            label: entry.label(),
            id: Some(entry.id.clone()),
            reversed,
            looping: entry.looping,
            settings: Some(self.entry_settings(entry)),
        };
        self.scheduler.play(sequence, options);
        self.scheduler.is_playing()
    }
}

impl<S: RecordingStore> Keysonic<VirtualClock, S> {
    /// Move virtual time forward by `ms`.
    pub fn advance(&mut self, ms: f64) {
        self.scheduler.advance(ms);
    }

    /// Run playback to its end, at most `limit_ms` of virtual time.
    pub fn run_until_idle(&mut self, limit_ms: f64) -> bool {
        self.scheduler.run_until_idle(limit_ms)
    }
}
