//! # Playback Module
//!
//! Scheduled, tempo-aware, reversible playback of captured or composed sequences.
//!
//! ## Purpose
//! The [`Scheduler`] walks a [`PlaybackSequence`] and:
//! 1. **Notifies** subscribers with [`PlaybackEvent`]s (`Start`, `Step`, `Stop`)
//! 2. **Sounds** each step through a [`ToneTrigger`], resolving pitch with the
//!    playback's [`PlaybackSettings`]
//!
//! ## Sub-modules
//! - `types` - sequences, snapshots and notifications
//! - `clock` - the [`Clock`] capability plus [`VirtualClock`] and [`SystemClock`]
//! - `tone` - the [`ToneTrigger`] contract and the recording [`ToneLog`]
//! - `engine` - the scheduler state machine
//!
//! ## States
//! `Idle` (no snapshot) and `Playing`. [`Scheduler::play`] always passes through
//! `Idle` first, so two playbacks never overlap. [`Scheduler::stop`] from `Idle` is a
//! no-op.
//!
//! ## Example
//! ```rust
//! use keysonic::composer::StepToken;
//! use keysonic::playback::{PlayOptions, PlaybackSequence, Scheduler, VirtualClock};
//!
//! let mut scheduler = Scheduler::new(VirtualClock::new());
//! let tokens = vec![StepToken::plain("KeyA"), StepToken::Rest, StepToken::plain("KeyB")];
//! scheduler.play(PlaybackSequence::Steps(tokens), PlayOptions::default());
//!
//! assert!(scheduler.is_playing());
//! assert!(scheduler.run_until_idle(10_000.0));
//! ```

mod clock;
mod engine;
mod tone;
mod types;

#[cfg(test)]
mod tests;

pub use clock::{Clock, SystemClock, TimerQueue, TimerToken, VirtualClock};
pub use engine::{sanitize_tempo, Scheduler, BASE_STEP_MS, DEFAULT_TEMPO, TAIL_MS};
pub use tone::{ToneCall, ToneLog, ToneTrigger};
pub use types::{
    PlayOptions, PlaybackControl, PlaybackEvent, PlaybackSequence, PlaybackSettings,
    PlaybackSnapshot, StepNotice, SubscriptionId,
};
