//! # Recording Model
//!
//! Saved recordings: what was played, how to play it back, and where it is kept.
//!
//! ## Sub-modules
//! - `types` - [`RecordingEntry`] and its settings
//! - `store` - the [`RecordingStore`] contract and the JSON [`RecordingRepository`]
//! - `library` - the in-memory list with write-through persistence
//! - `export` - export bundles and import
//!
//! ## Playback Source
//! An entry plays its composed phrase when `compose` is set, its timed events when it
//! has any, and its raw play sequence otherwise (see
//! [`RecordingEntry::playback_source`]).

mod export;
mod library;
mod store;
mod types;

pub use export::{parse_bundle, ExportBundle, APP_ID, BUNDLE_VERSION};
pub use library::{epoch_ms, make_id, make_unique_name, RecordingLibrary};
pub use store::{
    normalize_entry, parse_recordings, FileBackend, MemoryBackend, RecordingRepository,
    RecordingStore, StorageBackend, STORAGE_KEY,
};
pub use types::{NewRecording, RecordingEntry, RecordingSettings};
