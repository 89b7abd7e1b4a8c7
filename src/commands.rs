//! # Commands
//!
//! Argument parsing and the subcommands of the `keysonic` binary.
//!
//! ## Subcommands
//! - `compose <text>` - composed phrase as JSON (or YAML with `--yaml`)
//! - `flatten <text>` - one step token per eighth note
//! - `freq <code>...` - frequency and note name of each key
//! - `play <text>` - play on the wall clock, printing every step
//! - `musicxml <text>` - composed phrase as a MusicXML document
//! - `save <text>`, `list` - add to or list the recording store
//! - `export`, `import <bundle.json>` - move recordings in and out of the store

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use keysonic::composer::tokens_from_codes;
use keysonic::keymap::text_to_codes;
use keysonic::notation::{midi_from_frequency, note_name, Spelling};
use keysonic::playback::{PlaybackEvent, StepNotice, SystemClock, ToneTrigger};
use keysonic::recording::{
    epoch_ms, parse_bundle, ExportBundle, FileBackend, NewRecording, RecordingRepository,
};
use keysonic::scale::is_known_scale;
use keysonic::{
    compose_text, flatten_text, text_to_musicxml, KeysonicConfig, PlayOptions, PlaybackSequence,
    RecordingLibrary, Scheduler,
};
use log::info;
use serde::Serialize;

use crate::error::CliError;

pub const USAGE: &str = "\
Usage: keysonic <command> [options] [args]

Commands:
  compose <text>          Compose typed text into a phrase
  flatten <text>          Composed phrase as one token per step
  freq <code>...          Frequency of each key code
  play <text>             Play typed text in real time
  musicxml <text>         Composed phrase as MusicXML
  save <text>             Save typed text as a recording
  list                    List saved recordings
  export                  Export saved recordings as a bundle
  import <bundle.json>    Import recordings from a bundle

Options:
  --config <file>         YAML configuration
  --store <dir>           Recording store directory
  --scale <id>            Scale (major, naturalMinor, majorPentatonic, ...)
  --tempo <x>             Playback speed multiplier
  -o, --output <file>     Write output to a file
  --compose               Play the composed phrase
  --reverse               Play backwards
  --yaml                  YAML instead of JSON";

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub command: String,
    pub positional: Vec<String>,
    pub config: Option<PathBuf>,
    pub store: Option<PathBuf>,
    pub scale: Option<String>,
    pub tempo: Option<f64>,
    pub output: Option<PathBuf>,
    pub compose: bool,
    pub reverse: bool,
    pub yaml: bool,
}

impl Args {
    /// Parse arguments, not including the program name.
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        let mut parsed = Args::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| CliError::Usage(format!("{} needs a value", flag)))
            };
            match arg.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value(arg.as_str())?)),
                "--store" => parsed.store = Some(PathBuf::from(value(arg.as_str())?)),
                "--scale" => parsed.scale = Some(value(arg.as_str())?),
                "-o" | "--output" => parsed.output = Some(PathBuf::from(value(arg.as_str())?)),
                "--tempo" => {
                    let raw = value(arg.as_str())?;
                    let tempo = raw
                        .parse::<f64>()
                        .map_err(|_| CliError::Usage(format!("Invalid tempo: {}", raw)))?;
                    parsed.tempo = Some(tempo);
                }
                "--compose" => parsed.compose = true,
                "--reverse" => parsed.reverse = true,
                "--yaml" => parsed.yaml = true,
                flag if flag.starts_with("--") => {
                    return Err(CliError::Usage(format!("Unknown option: {}", flag)))
                }
                _ if parsed.command.is_empty() => parsed.command = arg.clone(),
                _ => parsed.positional.push(arg.clone()),
            }
        }

        if parsed.command.is_empty() {
            return Err(CliError::Usage(USAGE.to_string()));
        }
        Ok(parsed)
    }

    fn text(&self) -> Result<String, CliError> {
        if self.positional.is_empty() {
            return Err(CliError::Usage(format!("{} needs some text", self.command)));
        }
        Ok(self.positional.join(" "))
    }
}

/// What a command produced.
#[derive(Debug, PartialEq)]
pub enum Output {
    /// Print to stdout.
    Stdout(String),
    /// Written to a file.
    Wrote(PathBuf),
}

/// Run one command.
pub fn run(args: &Args) -> Result<Output, CliError> {
    let config = load_config(args)?;

    match args.command.as_str() {
        "compose" => {
            let song = compose_text(&args.text()?, &config.composer);
            emit(args, encode(&song, args.yaml)?)
        }
        "flatten" => {
            let tokens = flatten_text(&args.text()?, &config.composer);
            emit(args, encode(&tokens, args.yaml)?)
        }
        "freq" => freq(args, &config),
        "musicxml" => {
            let xml = text_to_musicxml(&args.text()?, &config.composer, &config.playback_settings());
            emit(args, xml)
        }
        "play" => play(args, &config),
        "save" => {
            let text = args.text()?;
            let mut library = open_library(args, &config)?;
            let entry = library
                .create(NewRecording::from_codes(text.trim(), text_to_codes(&text)))
                .ok_or_else(|| CliError::Usage("nothing to save".to_string()))?;
            Ok(Output::Stdout(format!("Saved '{}' ({})", entry.name, entry.id)))
        }
        "list" => {
            let library = open_library(args, &config)?;
            let lines: Vec<String> = library
                .entries()
                .iter()
                .map(|e| format!("{}\t{}\t{}", e.id, e.name, e.label()))
                .collect();
            Ok(Output::Stdout(lines.join("\n")))
        }
        "export" => {
            let library = open_library(args, &config)?;
            let bundle = ExportBundle::new(library.entries().to_vec(), epoch_ms());
            emit(args, bundle.to_json()?)
        }
        "import" => {
            let path = args
                .positional
                .first()
                .map(PathBuf::from)
                .ok_or_else(|| CliError::Usage("import needs a bundle file".to_string()))?;
            let json = read(&path)?;
            let entries = parse_bundle(&json)?;
            let mut library = open_library(args, &config)?;
            let added = library.import(entries);
            Ok(Output::Stdout(format!("Imported {} recording(s)", added)))
        }
        other => Err(CliError::Usage(format!("Unknown command: {}\n\n{}", other, USAGE))),
    }
}

fn load_config(args: &Args) -> Result<KeysonicConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => KeysonicConfig::from_yaml(&read(path)?)?,
        None => KeysonicConfig::default(),
    };
    if let Some(scale) = &args.scale {
        if !is_known_scale(scale) {
            return Err(CliError::Usage(format!("Unknown scale: {}", scale)));
        }
        config.scale = scale.clone();
    }
    if let Some(tempo) = args.tempo {
        if !(tempo.is_finite() && tempo > 0.0) {
            return Err(CliError::Usage(format!("Invalid tempo: {}", tempo)));
        }
        config.tempo = tempo;
    }
    if let Some(store) = &args.store {
        config.storage_dir = Some(store.clone());
    }
    Ok(config)
}

fn open_library(
    args: &Args,
    config: &KeysonicConfig,
) -> Result<RecordingLibrary<RecordingRepository<FileBackend>>, CliError> {
    let dir = config.storage_dir.clone().ok_or_else(|| {
        CliError::Usage(format!("{} needs --store or storage-dir in the config", args.command))
    })?;
    Ok(RecordingLibrary::open(RecordingRepository::new(
        FileBackend::new(dir),
    )))
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn encode<T: Serialize>(value: &T, yaml: bool) -> Result<String, CliError> {
    if yaml {
        Ok(serde_yaml::to_string(value)?)
    } else {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

fn emit(args: &Args, content: String) -> Result<Output, CliError> {
    match &args.output {
        Some(path) => {
            fs::write(path, content).map_err(|source| CliError::Write {
                path: path.clone(),
                source,
            })?;
            Ok(Output::Wrote(path.clone()))
        }
        None => Ok(Output::Stdout(content)),
    }
}

fn freq(args: &Args, config: &KeysonicConfig) -> Result<Output, CliError> {
    if args.positional.is_empty() {
        return Err(CliError::Usage("freq needs at least one key code".to_string()));
    }
    let settings = config.playback_settings();
    let mapper = settings.mapper();
    let spelling = Spelling::for_scale(&settings.scale_id);

    let lines: Vec<String> = args
        .positional
        .iter()
        .map(|code| {
            let hz = mapper.frequency_for_code(code, 0);
            let note = midi_from_frequency(hz)
                .map(|midi| note_name(midi, spelling))
                .unwrap_or_default();
            format!("{}\t{:.2} Hz\t{}", code, hz, note)
        })
        .collect();
    emit(args, lines.join("\n"))
}

/// Tone output for the terminal: every sound becomes a log line.
struct LogTone;

impl ToneTrigger for LogTone {
    fn play_one_shot(&mut self, frequency_hz: f64, velocity: f64, hold_ms: Option<f64>) {
        info!("tone {:.2} Hz vel {:.2} hold {:?}", frequency_hz, velocity, hold_ms);
    }

    fn start_held(&mut self, frequency_hz: f64, velocity: f64, voice_id: &str) {
        info!("hold {} at {:.2} Hz vel {:.2}", voice_id, frequency_hz, velocity);
    }

    fn stop_held(&mut self, voice_id: &str) {
        info!("release {}", voice_id);
    }

    fn set_instrument(&mut self, preset_id: &str) {
        info!("instrument {}", preset_id);
    }
}

fn step_line(notice: &StepNotice) -> String {
    match (&notice.code, notice.frequency) {
        (Some(code), Some(hz)) => format!("{:>4}  {:<10} {:>8.2} Hz", notice.index, code, hz),
        (Some(code), None) => format!("{:>4}  {:<10}", notice.index, code),
        _ => format!("{:>4}  -", notice.index),
    }
}

fn play(args: &Args, config: &KeysonicConfig) -> Result<Output, CliError> {
    let text = args.text()?;
    let sequence = if args.compose {
        PlaybackSequence::Steps(flatten_text(&text, &config.composer))
    } else {
        PlaybackSequence::Steps(tokens_from_codes(&text_to_codes(&text)))
    };

    let mut scheduler = Scheduler::new(SystemClock::new()).with_tone(Box::new(LogTone));
    scheduler.set_tempo(config.tempo);
    scheduler.set_default_settings(config.playback_settings());

    let steps = Rc::new(RefCell::new(0usize));
    let counter = steps.clone();
    scheduler.subscribe(move |event, _| {
        if let PlaybackEvent::Step(notice) = event {
            println!("{}", step_line(notice));
            *counter.borrow_mut() += 1;
        }
    });

    scheduler.play(
        sequence,
        PlayOptions {
            label: text.clone(),
            reversed: args.reverse,
            ..Default::default()
        },
    );
    scheduler.run_blocking();

    let played = *steps.borrow();
    Ok(Output::Stdout(format!("Played {} step(s)", played)))
}
