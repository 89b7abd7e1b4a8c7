//! Tone-trigger contract.
//!
//! The scheduler and the live keyboard call into a [`ToneTrigger`] to make sound. Calls
//! are fire-and-forget: nothing a trigger does feeds back into scheduling.

/// Sound output consumed by the scheduler.
pub trait ToneTrigger {
    /// Play a single note. `hold_ms` is a duration hint for timed playback.
    fn play_one_shot(&mut self, frequency_hz: f64, velocity: f64, hold_ms: Option<f64>);

    /// Start a sustained voice, replacing any voice with the same id.
    fn start_held(&mut self, frequency_hz: f64, velocity: f64, voice_id: &str);

    /// Release a sustained voice. Unknown ids are ignored.
    fn stop_held(&mut self, voice_id: &str);

    fn set_instrument(&mut self, preset_id: &str);
}

/// One call made on a [`ToneLog`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToneCall {
    OneShot {
        frequency_hz: f64,
        velocity: f64,
        hold_ms: Option<f64>,
    },
    StartHeld {
        frequency_hz: f64,
        velocity: f64,
        voice_id: String,
    },
    StopHeld {
        voice_id: String,
    },
    SetInstrument(String),
}

/// Trigger that records calls into a shared log.
///
/// Used by the CLI to print what would sound, and by tests to inspect output.
#[derive(Debug, Clone, Default)]
pub struct ToneLog {
    calls: std::rc::Rc<std::cell::RefCell<Vec<ToneCall>>>,
}

impl ToneLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ToneCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn push(&self, call: ToneCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl ToneTrigger for ToneLog {
    fn play_one_shot(&mut self, frequency_hz: f64, velocity: f64, hold_ms: Option<f64>) {
        self.push(ToneCall::OneShot {
            frequency_hz,
            velocity,
            hold_ms,
        });
    }

    fn start_held(&mut self, frequency_hz: f64, velocity: f64, voice_id: &str) {
        self.push(ToneCall::StartHeld {
            frequency_hz,
            velocity,
            voice_id: voice_id.to_string(),
        });
    }

    fn stop_held(&mut self, voice_id: &str) {
        self.push(ToneCall::StopHeld {
            voice_id: voice_id.to_string(),
        });
    }

    fn set_instrument(&mut self, preset_id: &str) {
        self.push(ToneCall::SetInstrument(preset_id.to_string()));
    }
}
