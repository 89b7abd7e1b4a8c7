//! Clock capability for the scheduler.
//!
//! A clock hands out timer tokens for "fire after N ms" requests and reports which
//! token is due next. It never runs callbacks itself: whoever drives the clock pops due
//! tokens and hands them to [`Scheduler::on_timer`](super::Scheduler::on_timer).

use std::time::{Duration, Instant};

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

pub trait Clock {
    /// Milliseconds since the clock's origin.
    fn now_ms(&self) -> f64;

    /// Schedule a timer `delay_ms` from now. Negative or NaN delays fire immediately.
    fn schedule(&mut self, delay_ms: f64) -> TimerToken;

    /// Cancel a timer. Unknown or already fired tokens are ignored.
    fn cancel(&mut self, token: TimerToken);

    /// Earliest pending timer and when it is due.
    fn next_due(&self) -> Option<(f64, TimerToken)>;

    /// Remove and return the earliest timer if it is due at `now_ms()`.
    fn pop_due(&mut self) -> Option<TimerToken>;
}

/// Pending timers ordered by due time, then by creation order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: Vec<(f64, TimerToken)>,
}

impl TimerQueue {
    pub fn insert(&mut self, due_ms: f64) -> TimerToken {
        let token = TimerToken(self.next_id);
        self.next_id += 1;
        self.entries.push((due_ms, token));
        token
    }

    pub fn remove(&mut self, token: TimerToken) {
        self.entries.retain(|(_, t)| *t != token);
    }

    pub fn peek(&self) -> Option<(f64, TimerToken)> {
        self.entries
            .iter()
            .copied()
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
    }

    pub fn pop_due(&mut self, now_ms: f64) -> Option<TimerToken> {
        let (due, token) = self.peek()?;
        if due <= now_ms {
            self.remove(token);
            Some(token)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sanitize_delay(delay_ms: f64) -> f64 {
    if delay_ms.is_finite() && delay_ms > 0.0 {
        delay_ms
    } else {
        0.0
    }
}

/// Manually advanced clock for deterministic tests and offline rendering.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_ms: f64,
    queue: TimerQueue,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward. Never moves backward.
    pub fn set_now(&mut self, now_ms: f64) {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> f64 {
        self.now_ms
    }

    fn schedule(&mut self, delay_ms: f64) -> TimerToken {
        self.queue.insert(self.now_ms + sanitize_delay(delay_ms))
    }

    fn cancel(&mut self, token: TimerToken) {
        self.queue.remove(token);
    }

    fn next_due(&self) -> Option<(f64, TimerToken)> {
        self.queue.peek()
    }

    fn pop_due(&mut self) -> Option<TimerToken> {
        self.queue.pop_due(self.now_ms)
    }
}

/// Wall-clock timers, driven by sleeping until the next one is due.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
    queue: TimerQueue,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            queue: TimerQueue::default(),
        }
    }

    /// Sleep until the next timer is due. Returns `false` when nothing is pending.
    pub fn wait_next(&self) -> bool {
        match self.queue.peek() {
            Some((due, _)) => {
                let remaining = due - self.now_ms();
                if remaining > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(remaining / 1000.0));
                }
                true
            }
            None => false,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn schedule(&mut self, delay_ms: f64) -> TimerToken {
        let due = self.now_ms() + sanitize_delay(delay_ms);
        self.queue.insert(due)
    }

    fn cancel(&mut self, token: TimerToken) {
        self.queue.remove(token);
    }

    fn next_due(&self) -> Option<(f64, TimerToken)> {
        self.queue.peek()
    }

    fn pop_due(&mut self) -> Option<TimerToken> {
        let now = self.now_ms();
        self.queue.pop_due(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_orders_by_due_then_creation() {
        let mut clock = VirtualClock::new();
        let late = clock.schedule(50.0);
        let first = clock.schedule(10.0);
        let tie = clock.schedule(10.0);

        clock.set_now(100.0);
        assert_eq!(clock.pop_due(), Some(first));
        assert_eq!(clock.pop_due(), Some(tie));
        assert_eq!(clock.pop_due(), Some(late));
        assert_eq!(clock.pop_due(), None);
    }

    #[test]
    fn test_virtual_clock_holds_future_timers() {
        let mut clock = VirtualClock::new();
        clock.schedule(20.0);
        clock.set_now(19.0);
        assert_eq!(clock.pop_due(), None);
        clock.set_now(20.0);
        assert!(clock.pop_due().is_some());
    }

    #[test]
    fn test_cancel_and_bad_delays() {
        let mut clock = VirtualClock::new();
        let token = clock.schedule(5.0);
        clock.cancel(token);
        assert_eq!(clock.pending(), 0);

        clock.schedule(f64::NAN);
        clock.schedule(-3.0);
        assert_eq!(clock.next_due().map(|(due, _)| due), Some(0.0));
        assert!(clock.pop_due().is_some());
    }

    #[test]
    fn test_virtual_clock_never_rewinds() {
        let mut clock = VirtualClock::new();
        clock.set_now(30.0);
        clock.set_now(10.0);
        assert_eq!(clock.now_ms(), 30.0);
    }
}
