use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::capture::KeyEvent;
use crate::composer::{NoteToken, StepToken};
use crate::scale::PitchMapper;

type Log = Rc<RefCell<Vec<PlaybackEvent>>>;

fn scheduler() -> (Scheduler<VirtualClock>, Log) {
    let mut scheduler = Scheduler::new(VirtualClock::new());
    let log: Log = Rc::default();
    let sink = log.clone();
    scheduler.subscribe(move |event, _| sink.borrow_mut().push(event.clone()));
    (scheduler, log)
}

fn steps(codes: &[&str]) -> PlaybackSequence {
    PlaybackSequence::Steps(codes.iter().map(|c| StepToken::plain(*c)).collect())
}

fn timed(offsets: &[u64]) -> PlaybackSequence {
    PlaybackSequence::Timed(
        offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| KeyEvent {
                code: format!("Digit{}", i),
                offset_ms: *offset,
                velocity: None,
                duration_ms: Some(40),
            })
            .collect(),
    )
}

fn step_indices(log: &Log) -> Vec<usize> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::Step(notice) => Some(notice.index),
            _ => None,
        })
        .collect()
}

fn stop_count(log: &Log) -> usize {
    log.borrow()
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::Stop))
        .count()
}

/// Advance one millisecond at a time, tagging each new step with the time it fired.
fn step_times(scheduler: &mut Scheduler<VirtualClock>, log: &Log, limit_ms: u32) -> Vec<(f64, usize)> {
    let mut out = Vec::new();
    let mut seen = 0;
    for _ in 0..=limit_ms {
        let now = scheduler.clock().now_ms();
        {
            let events = log.borrow();
            for event in &events[seen..] {
                if let PlaybackEvent::Step(notice) = event {
                    out.push((now, notice.index));
                }
            }
            seen = events.len();
        }
        scheduler.advance(1.0);
    }
    out
}

#[test]
fn test_playback_runs_to_tail_stop() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(steps(&["KeyA", "KeyB", "KeyC", "KeyD", "KeyE"]), PlayOptions::default());
    assert!(matches!(log.borrow()[0], PlaybackEvent::Start(_)));

    // fifth step fires at 880, the next cycle at 1100 finds index 5
    scheduler.advance(1100.0);
    assert_eq!(step_indices(&log), vec![0, 1, 2, 3, 4]);
    assert_eq!(scheduler.snapshot().unwrap().index, 5);
    assert!(scheduler.is_playing());

    // tail of 200ms / tempo
    scheduler.advance(199.0);
    assert!(scheduler.is_playing());
    scheduler.advance(1.0);
    assert!(!scheduler.is_playing());
    assert_eq!(stop_count(&log), 1);
    assert_eq!(step_indices(&log).len(), 5);
    assert!(matches!(log.borrow().last(), Some(PlaybackEvent::Stop)));

    scheduler.advance(5000.0);
    assert_eq!(log.borrow().len(), 7);
}

#[test]
fn test_fixed_steps_are_spaced_by_base_step() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(steps(&["KeyA", "KeyB", "KeyC"]), PlayOptions::default());
    let times = step_times(&mut scheduler, &log, 1000);
    assert_eq!(times, vec![(0.0, 0), (220.0, 1), (440.0, 2)]);
}

#[test]
fn test_empty_sequence_is_a_no_op() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(PlaybackSequence::Steps(vec![]), PlayOptions::default());
    assert!(!scheduler.is_playing());
    assert!(log.borrow().is_empty());
}

#[test]
fn test_stop_is_idempotent() {
    let (mut scheduler, log) = scheduler();
    scheduler.stop();
    assert!(log.borrow().is_empty());

    scheduler.play(steps(&["KeyA", "KeyB"]), PlayOptions::default());
    scheduler.stop();
    scheduler.stop();
    assert_eq!(stop_count(&log), 1);
    assert_eq!(scheduler.clock().pending(), 0);
}

#[test]
fn test_play_while_playing_stops_first() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(steps(&["KeyA", "KeyB", "KeyC"]), PlayOptions::default());
    scheduler.advance(220.0);
    scheduler.play(
        steps(&["KeyX"]),
        PlayOptions {
            label: "second".to_string(),
            ..Default::default()
        },
    );

    {
        let events = log.borrow();
        let kinds: Vec<_> = events
            .iter()
            .map(|e| match e {
                PlaybackEvent::Start(_) => "start",
                PlaybackEvent::Step(_) => "step",
                PlaybackEvent::Stop => "stop",
            })
            .collect();
        assert_eq!(kinds, vec!["start", "step", "step", "stop", "start", "step"]);
    }
    assert_eq!(scheduler.clock().pending(), 1);
    assert_eq!(scheduler.snapshot().unwrap().label, "second");
}

#[test]
fn test_reversed_starts_at_end() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(
        steps(&["KeyA", "KeyB", "KeyC"]),
        PlayOptions {
            reversed: true,
            ..Default::default()
        },
    );
    assert!(scheduler.run_until_idle(10_000.0));
    assert_eq!(step_indices(&log), vec![2, 1, 0]);
}

#[test]
fn test_looping_wraps_in_the_same_cycle() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(
        steps(&["KeyA", "KeyB", "KeyC"]),
        PlayOptions {
            looping: true,
            ..Default::default()
        },
    );
    let times = step_times(&mut scheduler, &log, 1320);
    assert_eq!(
        times,
        vec![
            (0.0, 0),
            (220.0, 1),
            (440.0, 2),
            (660.0, 0),
            (880.0, 1),
            (1100.0, 2),
            (1320.0, 0)
        ]
    );

    scheduler.set_looping(false);
    assert!(scheduler.run_until_idle(10_000.0));
    assert_eq!(step_indices(&log), vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
}

#[test]
fn test_reversal_continues_from_last_played() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(
        steps(&["KeyA", "KeyB", "KeyC", "KeyD", "KeyE", "KeyF"]),
        PlayOptions::default(),
    );
    scheduler.advance(440.0);
    assert_eq!(step_indices(&log), vec![0, 1, 2]);

    scheduler.set_reversed(true);
    assert!(scheduler.snapshot().unwrap().reversed);
    assert!(scheduler.run_until_idle(10_000.0));
    // neither 2 repeated nor 1 skipped
    assert_eq!(step_indices(&log), vec![0, 1, 2, 1, 0]);
}

#[test]
fn test_reversal_back_to_forward() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(
        steps(&["KeyA", "KeyB", "KeyC", "KeyD", "KeyE", "KeyF"]),
        PlayOptions {
            reversed: true,
            ..Default::default()
        },
    );
    scheduler.advance(220.0);
    assert_eq!(step_indices(&log), vec![5, 4]);

    scheduler.set_reversed(false);
    scheduler.set_reversed(false);
    assert!(scheduler.run_until_idle(10_000.0));
    assert_eq!(step_indices(&log), vec![5, 4, 5]);
}

#[test]
fn test_reversal_when_idle_is_ignored() {
    let (mut scheduler, log) = scheduler();
    scheduler.set_reversed(true);
    assert!(scheduler.snapshot().is_none());
    assert!(log.borrow().is_empty());
}

#[test]
fn test_tempo_change_affects_only_next_delay() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(steps(&["KeyA", "KeyB", "KeyC", "KeyD"]), PlayOptions::default());
    scheduler.advance(100.0);
    scheduler.set_tempo(2.0);

    // already scheduled at tempo 1.0
    scheduler.advance(119.0);
    assert_eq!(step_indices(&log).len(), 1);
    scheduler.advance(1.0);
    assert_eq!(step_indices(&log).len(), 2);

    // now 220 / 2
    scheduler.advance(109.0);
    assert_eq!(step_indices(&log).len(), 2);
    scheduler.advance(1.0);
    assert_eq!(step_indices(&log).len(), 3);
}

#[test]
fn test_invalid_tempo_falls_back() {
    let (mut scheduler, _) = scheduler();
    scheduler.set_tempo(f64::NAN);
    assert_eq!(scheduler.tempo(), 1.0);
    scheduler.set_tempo(-2.0);
    assert_eq!(scheduler.tempo(), 1.0);
    scheduler.set_tempo(0.5);
    assert_eq!(scheduler.tempo(), 0.5);
}

#[test]
fn test_timed_events_follow_recorded_offsets() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(timed(&[0, 100, 350]), PlayOptions::default());
    let times = step_times(&mut scheduler, &log, 1000);
    assert_eq!(times, vec![(0.0, 0), (100.0, 1), (350.0, 2)]);
    assert!(!scheduler.is_playing());
}

#[test]
fn test_timed_events_scale_with_tempo() {
    let (mut scheduler, log) = scheduler();
    scheduler.set_tempo(2.0);
    scheduler.play(timed(&[0, 100, 350]), PlayOptions::default());
    let times = step_times(&mut scheduler, &log, 1000);
    assert_eq!(times, vec![(0.0, 0), (50.0, 1), (175.0, 2)]);
}

#[test]
fn test_timed_leading_offset_waits_before_first_note() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(timed(&[50, 80]), PlayOptions::default());
    assert!(step_indices(&log).is_empty());
    let times = step_times(&mut scheduler, &log, 500);
    assert_eq!(times, vec![(50.0, 0), (80.0, 1)]);
}

#[test]
fn test_reversed_timed_playback_has_no_pre_delay() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(
        timed(&[0, 100, 350]),
        PlayOptions {
            reversed: true,
            ..Default::default()
        },
    );
    // last event fires at once; later gaps still come from the offsets
    let times = step_times(&mut scheduler, &log, 1000);
    assert_eq!(times, vec![(0.0, 2), (250.0, 1), (350.0, 0)]);
}

#[test]
fn test_timed_loop_restarts_offsets() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(
        timed(&[0, 100]),
        PlayOptions {
            looping: true,
            ..Default::default()
        },
    );
    let times = step_times(&mut scheduler, &log, 420);
    assert_eq!(times, vec![(0.0, 0), (100.0, 1), (320.0, 0), (420.0, 1)]);
    scheduler.stop();
}

#[test]
fn test_simultaneous_timed_events_do_not_spin() {
    let (mut scheduler, log) = scheduler();
    scheduler.play(
        timed(&[0, 0, 0]),
        PlayOptions {
            looping: true,
            ..Default::default()
        },
    );
    scheduler.advance(10.0);
    assert!(step_indices(&log).len() < 20);
    scheduler.stop();
}

#[test]
fn test_listener_can_stop_from_step() {
    let (mut scheduler, log) = scheduler();
    scheduler.subscribe(|event, control| {
        if let PlaybackEvent::Step(notice) = event {
            if notice.index == 1 {
                control.request_stop();
            }
        }
    });
    scheduler.play(steps(&["KeyA", "KeyB", "KeyC", "KeyD"]), PlayOptions::default());
    scheduler.advance(2000.0);

    assert_eq!(step_indices(&log), vec![0, 1]);
    assert_eq!(stop_count(&log), 1);
    assert!(!scheduler.is_playing());
    assert_eq!(scheduler.clock().pending(), 0);
}

#[test]
fn test_listener_can_stop_from_start() {
    let (mut scheduler, log) = scheduler();
    scheduler.subscribe(|event, control| {
        if matches!(event, PlaybackEvent::Start(_)) {
            control.request_stop();
        }
    });
    scheduler.play(steps(&["KeyA", "KeyB"]), PlayOptions::default());
    assert!(!scheduler.is_playing());
    assert!(step_indices(&log).is_empty());
    assert_eq!(stop_count(&log), 1);
}

#[test]
fn test_unsubscribe() {
    let (mut scheduler, log) = scheduler();
    let other: Log = Rc::default();
    let sink = other.clone();
    let id = scheduler.subscribe(move |event, _| sink.borrow_mut().push(event.clone()));
    assert!(scheduler.unsubscribe(id));
    assert!(!scheduler.unsubscribe(id));

    scheduler.play(steps(&["KeyA"]), PlayOptions::default());
    assert!(other.borrow().is_empty());
    assert!(!log.borrow().is_empty());
}

#[test]
fn test_rests_advance_time_silently() {
    let tones = ToneLog::new();
    let (scheduler, log) = scheduler();
    let mut scheduler = scheduler.with_tone(Box::new(tones.clone()));

    let sequence = PlaybackSequence::Steps(vec![
        StepToken::plain("KeyA"),
        StepToken::Rest,
        StepToken::plain("KeyB"),
    ]);
    scheduler.play(sequence, PlayOptions::default());
    assert!(scheduler.run_until_idle(10_000.0));

    assert_eq!(step_indices(&log), vec![0, 1, 2]);
    let one_shots = tones
        .calls()
        .iter()
        .filter(|c| matches!(c, ToneCall::OneShot { .. }))
        .count();
    assert_eq!(one_shots, 2);

    let events = log.borrow();
    let rest = events
        .iter()
        .find_map(|e| match e {
            PlaybackEvent::Step(n) if n.index == 1 => Some(n.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(rest.code, None);
    assert_eq!(rest.frequency, None);
}

#[test]
fn test_composed_tokens_shift_pitch() {
    let tones = ToneLog::new();
    let mut scheduler = Scheduler::new(VirtualClock::new()).with_tone(Box::new(tones.clone()));

    let token = StepToken::Note(NoteToken {
        code: "KeyH".to_string(),
        is_echo: true,
        bass_offset: -2,
        pitch_move: 1,
        accent: false,
    });
    scheduler.play(PlaybackSequence::Steps(vec![token]), PlayOptions::default());

    let expected = PitchMapper::for_scale_id("major", 220.0).frequency_for_code("KeyH", -1);
    assert_eq!(
        tones.calls()[0],
        ToneCall::OneShot {
            frequency_hz: expected,
            velocity: crate::capture::NEUTRAL_VELOCITY,
            hold_ms: None,
        }
    );
}

#[test]
fn test_timed_playback_tone_hints_and_markers() {
    let tones = ToneLog::new();
    let mut scheduler = Scheduler::new(VirtualClock::new()).with_tone(Box::new(tones.clone()));
    let sequence = PlaybackSequence::Timed(vec![
        KeyEvent {
            code: "KeyA".to_string(),
            offset_ms: 0,
            velocity: Some(0.9),
            duration_ms: Some(100),
        },
        KeyEvent {
            code: "KeyZ".to_string(),
            offset_ms: 30,
            velocity: None,
            duration_ms: Some(0),
        },
    ]);
    scheduler.play(sequence, PlayOptions::default());
    assert!(scheduler.run_until_idle(10_000.0));

    let calls = tones.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        ToneCall::OneShot {
            velocity, hold_ms, ..
        } => {
            assert_eq!(*velocity, 0.9);
            assert_eq!(*hold_ms, Some(100.0));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[test]
fn test_entry_instrument_is_restored_after_stop() {
    let tones = ToneLog::new();
    let mut scheduler = Scheduler::new(VirtualClock::new()).with_tone(Box::new(tones.clone()));
    scheduler.set_default_settings(PlaybackSettings {
        instrument: Some("sine".to_string()),
        ..Default::default()
    });
    tones.clear();

    scheduler.play(
        steps(&["KeyA"]),
        PlayOptions {
            settings: Some(PlaybackSettings {
                instrument: Some("piano".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    scheduler.stop();

    let instruments: Vec<_> = tones
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ToneCall::SetInstrument(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(instruments, vec!["piano", "sine"]);
}

#[test]
fn test_step_notice_carries_playback_context() {
    let (mut scheduler, log) = scheduler();
    let settings = PlaybackSettings {
        scale_id: "lydian".to_string(),
        root_freq: 261.63,
        instrument: None,
    };
    scheduler.play(
        steps(&["KeyA"]),
        PlayOptions {
            id: Some("rec-1".to_string()),
            settings: Some(settings.clone()),
            ..Default::default()
        },
    );

    let events = log.borrow();
    match &events[1] {
        PlaybackEvent::Step(notice) => {
            assert_eq!(notice.playback_id.as_deref(), Some("rec-1"));
            assert_eq!((notice.index, notice.sequence_len), (0, 1));
            assert_eq!(notice.settings, settings);
            assert_eq!(notice.code.as_deref(), Some("KeyA"));
            assert_eq!(
                notice.frequency,
                Some(PitchMapper::for_scale_id("lydian", 261.63).frequency_for_code("KeyA", 0))
            );
        }
        other => panic!("expected step, got {:?}", other),
    }
}

#[test]
fn test_held_notes() {
    let tones = ToneLog::new();
    let mut scheduler = Scheduler::new(VirtualClock::new()).with_tone(Box::new(tones.clone()));
    scheduler.start_held("KeyA", None);
    scheduler.stop_held("KeyA");

    let frequency = PitchMapper::for_scale_id("major", 220.0).frequency_for_code("KeyA", 0);
    assert_eq!(
        tones.calls(),
        vec![
            ToneCall::StartHeld {
                frequency_hz: frequency,
                velocity: crate::capture::NEUTRAL_VELOCITY,
                voice_id: "KeyA".to_string(),
            },
            ToneCall::StopHeld {
                voice_id: "KeyA".to_string()
            },
        ]
    );
}
