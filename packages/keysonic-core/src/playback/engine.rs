//! Playback scheduler
//!
//! Drives a [`PlaybackSequence`] forward or backward against a [`Clock`], emitting
//! start/step/stop notifications and triggering tones.
//!
//! ## Cycle
//! Each cycle resolves the next index:
//! 1. Out of range: wrap when looping, otherwise schedule the tail stop (`200ms / tempo`).
//! 2. Timed sequences playing forward wait `(offset - previous offset) / tempo` before
//!    firing. Reversed timed playback fires without a pre-delay.
//! 3. Fire: sound the note, advance the index, schedule the next cycle after
//!    `|next offset - offset| / tempo` (timed) or `220ms / tempo` (steps).
//!
//! At most one timer is pending at any time. Tempo is read whenever a delay is
//! computed, so a change only affects the next delay.

use log::debug;

use super::clock::{Clock, SystemClock, TimerToken, VirtualClock};
use super::tone::ToneTrigger;
use super::types::{
    PlayOptions, PlaybackControl, PlaybackEvent, PlaybackSequence, PlaybackSettings,
    PlaybackSnapshot, StepNotice, SubscriptionId,
};
use crate::capture::NEUTRAL_VELOCITY;
use crate::composer::StepToken;

/// Fixed-step spacing at tempo 1.0.
pub const BASE_STEP_MS: f64 = 220.0;

/// Grace period after the last note of a non-looping sequence, at tempo 1.0.
pub const TAIL_MS: f64 = 200.0;

pub const DEFAULT_TEMPO: f64 = 1.0;

/// Floor for the gap between two steps, so events captured on the same millisecond
/// cannot spin a looping sequence.
const MIN_STEP_MS: f64 = 1.0;

/// Replace non-positive or non-finite tempo multipliers with the default.
pub fn sanitize_tempo(tempo: f64) -> f64 {
    if tempo.is_finite() && tempo > 0.0 {
        tempo
    } else {
        DEFAULT_TEMPO
    }
}

type Listener = Box<dyn FnMut(&PlaybackEvent, &mut PlaybackControl)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    /// Resolve the next index.
    Cycle,
    /// Fire the current index after a timed pre-delay.
    Fire,
    /// End of a non-looping sequence.
    Stop,
}

/// Single-session playback driver.
pub struct Scheduler<C: Clock> {
    clock: C,
    tone: Option<Box<dyn ToneTrigger>>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    snapshot: Option<PlaybackSnapshot>,
    looping: bool,
    pending: Option<(TimerToken, PendingAction)>,
    prev_offset_ms: u64,
    tempo: f64,
    default_settings: PlaybackSettings,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            tone: None,
            listeners: Vec::new(),
            next_subscription: 0,
            snapshot: None,
            looping: false,
            pending: None,
            prev_offset_ms: 0,
            tempo: DEFAULT_TEMPO,
            default_settings: PlaybackSettings::default(),
        }
    }

    pub fn with_tone(mut self, tone: Box<dyn ToneTrigger>) -> Self {
        self.set_tone(tone);
        self
    }

    pub fn set_tone(&mut self, mut tone: Box<dyn ToneTrigger>) {
        if let Some(instrument) = self.default_settings.instrument.as_deref() {
            tone.set_instrument(instrument);
        }
        self.tone = Some(tone);
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Register a notification handler.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&PlaybackEvent, &mut PlaybackControl) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&PlaybackSnapshot> {
        self.snapshot.as_ref()
    }

    /// Id of the entry being played, if it has one.
    pub fn playing_id(&self) -> Option<&str> {
        self.snapshot.as_ref().and_then(|s| s.id.as_deref())
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = sanitize_tempo(tempo);
    }

    pub fn default_settings(&self) -> &PlaybackSettings {
        &self.default_settings
    }

    /// Settings used for live notes and for playback without its own settings.
    pub fn set_default_settings(&mut self, settings: PlaybackSettings) {
        if settings.instrument != self.default_settings.instrument {
            if let (Some(tone), Some(instrument)) = (self.tone.as_mut(), settings.instrument.as_deref()) {
                tone.set_instrument(instrument);
            }
        }
        self.default_settings = settings;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Change whether the active playback wraps at its end.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Flip direction of the active playback without repeating or skipping a note.
    pub fn set_reversed(&mut self, reversed: bool) {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };
        if snapshot.reversed == reversed {
            return;
        }

        let len = snapshot.sequence.len() as isize;
        let old_step = if snapshot.reversed { -1 } else { 1 };
        let last_played = (snapshot.index - old_step).rem_euclid(len);
        snapshot.index = last_played - old_step;
        snapshot.reversed = reversed;
        debug!(
            "playback reversed={} resumes at index {}",
            reversed, snapshot.index
        );
    }

    /// Start playing `sequence`, replacing any active playback. Empty sequences are ignored.
    pub fn play(&mut self, sequence: PlaybackSequence, options: PlayOptions) {
        if sequence.is_empty() {
            debug!("ignoring play of an empty sequence");
            return;
        }
        self.stop();

        let settings = options
            .settings
            .unwrap_or_else(|| self.default_settings.clone());
        if settings.instrument != self.default_settings.instrument {
            if let (Some(tone), Some(instrument)) = (self.tone.as_mut(), settings.instrument.as_deref()) {
                tone.set_instrument(instrument);
            }
        }

        let len = sequence.len() as isize;
        let snapshot = PlaybackSnapshot {
            id: options.id,
            sequence,
            index: if options.reversed { len - 1 } else { 0 },
            reversed: options.reversed,
            label: options.label,
            settings,
        };
        debug!(
            "playback start: {} items, reversed={}, looping={}",
            len, snapshot.reversed, options.looping
        );

        self.prev_offset_ms = 0;
        self.looping = options.looping;
        self.snapshot = Some(snapshot.clone());
        self.emit(PlaybackEvent::Start(snapshot));

        if self.is_playing() {
            self.cycle();
        }
    }

    /// Cancel any pending timer and end playback. Does nothing when idle.
    pub fn stop(&mut self) {
        if let Some((token, _)) = self.pending.take() {
            self.clock.cancel(token);
        }
        self.prev_offset_ms = 0;
        self.looping = false;

        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        debug!("playback stop at index {}", snapshot.index);

        if snapshot.settings.instrument != self.default_settings.instrument {
            if let (Some(tone), Some(instrument)) =
                (self.tone.as_mut(), self.default_settings.instrument.as_deref())
            {
                tone.set_instrument(instrument);
            }
        }
        self.emit(PlaybackEvent::Stop);
    }

    /// Deliver a due timer. Tokens that are no longer pending are ignored.
    pub fn on_timer(&mut self, token: TimerToken) {
        let action = match self.pending {
            Some((pending, action)) if pending == token => action,
            _ => return,
        };
        self.pending = None;

        match action {
            PendingAction::Cycle => self.cycle(),
            PendingAction::Fire => self.fire(),
            PendingAction::Stop => self.stop(),
        }
    }

    /// Sustain a live note for `code` until [`stop_held`](Self::stop_held).
    pub fn start_held(&mut self, code: &str, velocity: Option<f64>) {
        let frequency = self.default_settings.mapper().frequency_for_code(code, 0);
        if let Some(tone) = self.tone.as_mut() {
            tone.start_held(frequency, velocity.unwrap_or(NEUTRAL_VELOCITY), code);
        }
    }

    pub fn stop_held(&mut self, code: &str) {
        if let Some(tone) = self.tone.as_mut() {
            tone.stop_held(code);
        }
    }

    fn schedule(&mut self, action: PendingAction, delay_ms: f64) {
        if let Some((token, _)) = self.pending.take() {
            self.clock.cancel(token);
        }
        let token = self.clock.schedule(delay_ms);
        self.pending = Some((token, action));
    }

    fn cycle(&mut self) {
        let tempo = self.tempo;
        let looping = self.looping;
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };

        let len = snapshot.sequence.len() as isize;
        if snapshot.index < 0 || snapshot.index >= len {
            if !looping {
                self.schedule(PendingAction::Stop, TAIL_MS / tempo);
                return;
            }
            snapshot.index = if snapshot.reversed { len - 1 } else { 0 };
            self.prev_offset_ms = 0;
            debug!("playback wrapped to index {}", snapshot.index);
        }

        let wait_before = match snapshot.sequence.offset_at(snapshot.index) {
            Some(offset) if !snapshot.reversed => {
                offset.saturating_sub(self.prev_offset_ms) as f64 / tempo
            }
            _ => 0.0,
        };

        if wait_before > 0.0 {
            self.schedule(PendingAction::Fire, wait_before);
        } else {
            self.fire();
        }
    }

    fn fire(&mut self) {
        let tempo = self.tempo;
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };

        let len = snapshot.sequence.len() as isize;
        if snapshot.index < 0 || snapshot.index >= len {
            // direction changed while a pre-delay was pending
            self.cycle();
            return;
        }

        let index = snapshot.index;
        let step = if snapshot.reversed { -1 } else { 1 };
        let current = snapshot.sequence.offset_at(index);
        let next = snapshot.sequence.offset_at(index + step);

        // lookahead so the next cycle does not wait for this gap again
        self.prev_offset_ms = next.or(current).unwrap_or(self.prev_offset_ms);
        snapshot.index += step;

        let notice = step_notice(snapshot, index as usize);
        let delay = match (current, next) {
            (Some(current), Some(next)) => current.abs_diff(next) as f64 / tempo,
            _ => BASE_STEP_MS / tempo,
        }
        .max(MIN_STEP_MS);

        if let (Some(tone), Some(frequency)) = (self.tone.as_mut(), notice.frequency) {
            tone.play_one_shot(
                frequency,
                notice.velocity.unwrap_or(NEUTRAL_VELOCITY),
                notice.duration_hint_ms.map(|ms| ms as f64 / tempo),
            );
        }

        self.schedule(PendingAction::Cycle, delay);
        self.emit(PlaybackEvent::Step(notice));
    }

    fn emit(&mut self, event: PlaybackEvent) {
        let mut control = PlaybackControl::default();
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event, &mut control);
        }
        if control.stop_requested() && self.is_playing() {
            self.stop();
        }
    }
}

fn step_notice(snapshot: &PlaybackSnapshot, index: usize) -> StepNotice {
    let mapper = snapshot.settings.mapper();
    let mut notice = StepNotice {
        index,
        sequence_len: snapshot.sequence.len(),
        code: None,
        velocity: None,
        duration_hint_ms: None,
        frequency: None,
        is_echo: false,
        bass_offset: 0,
        accent: false,
        settings: snapshot.settings.clone(),
        playback_id: snapshot.id.clone(),
    };

    match &snapshot.sequence {
        PlaybackSequence::Steps(tokens) => {
            if let Some(StepToken::Note(note)) = tokens.get(index) {
                notice.frequency = Some(mapper.frequency_for_code(&note.code, note.degree_offset()));
                notice.code = Some(note.code.clone());
                notice.is_echo = note.is_echo;
                notice.bass_offset = note.bass_offset;
                notice.accent = note.accent;
            }
        }
        PlaybackSequence::Timed(events) => {
            if let Some(event) = events.get(index) {
                // zero-duration release markers keep their slot but stay silent
                if event.duration_ms != Some(0) {
                    notice.frequency = Some(mapper.frequency_for_code(&event.code, 0));
                }
                notice.code = Some(event.code.clone());
                notice.velocity = event.velocity;
                notice.duration_hint_ms = event.duration_ms;
            }
        }
    }

    notice
}

impl Scheduler<VirtualClock> {
    /// Move virtual time forward by `ms`, firing every timer that falls due on the way.
    pub fn advance(&mut self, ms: f64) {
        let target = self.clock.now_ms() + ms.max(0.0);
        while let Some((due, _)) = self.clock.next_due() {
            if due > target {
                break;
            }
            self.clock.set_now(due);
            if let Some(token) = self.clock.pop_due() {
                self.on_timer(token);
            }
        }
        self.clock.set_now(target);
    }

    /// Run until playback stops or `limit_ms` of virtual time has passed.
    ///
    /// Returns whether the scheduler ended idle.
    pub fn run_until_idle(&mut self, limit_ms: f64) -> bool {
        let deadline = self.clock.now_ms() + limit_ms.max(0.0);
        while self.is_playing() {
            match self.clock.next_due() {
                Some((due, _)) if due <= deadline => {
                    self.clock.set_now(due);
                    if let Some(token) = self.clock.pop_due() {
                        self.on_timer(token);
                    }
                }
                _ => break,
            }
        }
        !self.is_playing()
    }
}

impl Scheduler<SystemClock> {
    /// Block the current thread, firing timers on wall-clock time until playback stops.
    pub fn run_blocking(&mut self) {
        while self.is_playing() && self.clock.wait_next() {
            if let Some(token) = self.clock.pop_due() {
                self.on_timer(token);
            }
        }
    }
}
