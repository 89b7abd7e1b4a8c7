//! The in-memory recording list and its persistence.
//!
//! Every mutation is written through to the store immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use super::store::RecordingStore;
use super::types::{NewRecording, RecordingEntry};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// Milliseconds since the Unix epoch, 0 if the system clock is before it.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Fresh recording id: base-36 timestamp plus a process-wide counter.
pub fn make_id() -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{:0>4}", to_base36(epoch_ms()), to_base36(n))
}

/// `base`, or `base (2)`, `base (3)`, ... whichever is not taken.
pub fn make_unique_name<'a, I>(base: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let base = if base.is_empty() { "Recording" } else { base };
    let taken: std::collections::HashSet<&str> = existing.into_iter().collect();
    let mut name = base.to_string();
    let mut i = 2;
    while taken.contains(name.as_str()) {
        name = format!("{} ({})", base, i);
        i += 1;
    }
    name
}

/// Saved recordings backed by a [`RecordingStore`].
pub struct RecordingLibrary<S: RecordingStore> {
    store: S,
    entries: Vec<RecordingEntry>,
}

impl<S: RecordingStore> RecordingLibrary<S> {
    /// Load the stored recordings.
    pub fn open(store: S) -> Self {
        let entries = store.load();
        debug!("loaded {} recording(s)", entries.len());
        Self { store, entries }
    }

    pub fn entries(&self) -> &[RecordingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RecordingEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn unique_name(&self, base: &str) -> String {
        make_unique_name(base, self.entries.iter().map(|e| e.name.as_str()))
    }

    /// Save a new recording. Empty play sequences are not saved.
    pub fn create(&mut self, recording: NewRecording) -> Option<&RecordingEntry> {
        if recording.play_sequence.is_empty() {
            return None;
        }

        let base = if recording.name.trim().is_empty() {
            format!("Recording {}", self.entries.len() + 1)
        } else {
            recording.name.trim().to_string()
        };
        let display_sequence = recording.display_sequence();
        let timed_events = recording
            .timed_events
            .filter(|events| !events.is_empty());

        let entry = RecordingEntry {
            id: make_id(),
            name: self.unique_name(&base),
            display_sequence,
            play_sequence: recording.play_sequence,
            looping: false,
            reverse: false,
            compose: false,
            timed_events,
            settings: recording.settings.and_then(|s| s.sanitized()),
        };
        info!("saved recording '{}' ({} keys)", entry.name, entry.play_sequence.len());

        self.entries.push(entry);
        self.persist();
        self.entries.last()
    }

    pub fn remove(&mut self, id: &str) -> Option<RecordingEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let removed = self.entries.remove(pos);
        self.persist();
        Some(removed)
    }

    pub fn set_loop(&mut self, id: &str, looping: bool) -> Option<&RecordingEntry> {
        self.update(id, |e| e.looping = looping)
    }

    pub fn set_reverse(&mut self, id: &str, reverse: bool) -> Option<&RecordingEntry> {
        self.update(id, |e| e.reverse = reverse)
    }

    pub fn set_compose(&mut self, id: &str, compose: bool) -> Option<&RecordingEntry> {
        self.update(id, |e| e.compose = compose)
    }

    /// Add imported entries under fresh ids and unique names. Returns how many were added.
    pub fn import(&mut self, entries: Vec<RecordingEntry>) -> usize {
        let count = entries.len();
        for mut entry in entries {
            entry.id = make_id();
            entry.name = self.unique_name(&entry.name);
            self.entries.push(entry);
        }
        if count > 0 {
            info!("imported {} recording(s)", count);
            self.persist();
        }
        count
    }

    fn update<F>(&mut self, id: &str, change: F) -> Option<&RecordingEntry>
    where
        F: FnOnce(&mut RecordingEntry),
    {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        change(&mut self.entries[pos]);
        self.persist();
        self.entries.get(pos)
    }

    fn persist(&mut self) {
        self.store.save(&self.entries);
    }
}
