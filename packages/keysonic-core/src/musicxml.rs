use crate::composer::{ComposedSong, Meter};
use crate::notation::{midi_from_frequency, Pitch, Spelling};
use crate::playback::PlaybackSettings;

/// Writable note lengths in steps, longest first: whole, dotted half, half,
/// dotted quarter, quarter, eighth.
const WRITABLE_STEPS: [u32; 6] = [8, 6, 4, 3, 2, 1];

/// Convert a composed song to MusicXML format
///
/// One step is an eighth note. Notes crossing a barline are split and tied, and the
/// last measure is filled with rests.
pub fn to_musicxml(song: &ComposedSong, settings: &PlaybackSettings, title: Option<&str>) -> String {
    let mut xml = String::new();

    // XML declaration and doctype
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(r#"<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">"#);
    xml.push('\n');

    xml.push_str(r#"<score-partwise version="4.0">"#);
    xml.push('\n');

    if let Some(title) = title {
        xml.push_str("  <work>\n");
        xml.push_str(&format!("    <work-title>{}</work-title>\n", escape_xml(title)));
        xml.push_str("  </work>\n");
    }

    xml.push_str("  <part-list>\n");
    xml.push_str("    <score-part id=\"P1\">\n");
    xml.push_str("      <part-name print-object=\"no\"></part-name>\n");
    xml.push_str("    </score-part>\n");
    xml.push_str("  </part-list>\n");

    xml.push_str("  <part id=\"P1\">\n");

    let measures = layout_measures(song, settings);
    for (i, measure) in measures.iter().enumerate() {
        xml.push_str(&measure_to_xml(measure, i + 1, song.meter, song.tempo, i == 0));
    }

    xml.push_str("  </part>\n");
    xml.push_str("</score-partwise>\n");

    xml
}

/// One written note or rest, after splitting at barlines.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Piece {
    pitch: Option<Pitch>,
    steps: u32,
    tie_start: bool,
    tie_stop: bool,
    accent: bool,
}

impl Piece {
    fn rest(steps: u32) -> Self {
        Self {
            pitch: None,
            steps,
            tie_start: false,
            tie_stop: false,
            accent: false,
        }
    }
}

fn largest_writable(steps: u32) -> u32 {
    WRITABLE_STEPS
        .iter()
        .copied()
        .find(|w| *w <= steps)
        .unwrap_or(1)
}

fn layout_measures(song: &ComposedSong, settings: &PlaybackSettings) -> Vec<Vec<Piece>> {
    let mapper = settings.mapper();
    let spelling = Spelling::for_scale(&settings.scale_id);
    let bar = song.meter.steps_per_bar();

    let mut measures: Vec<Vec<Piece>> = vec![Vec::new()];
    let mut position = 0;

    for event in &song.events {
        let pitch = event.code.as_deref().and_then(|code| {
            let degree = event.pitch_move as i64 + event.bass_offset as i64;
            midi_from_frequency(mapper.frequency_for_code(code, degree))
                .map(|midi| Pitch::from_midi(midi, spelling))
        });

        let mut remaining = event.duration_steps;
        let mut first = true;
        while remaining > 0 {
            if position == bar {
                measures.push(Vec::new());
                position = 0;
            }
            let chunk = largest_writable(remaining.min(bar - position));
            remaining -= chunk;

            let piece = Piece {
                pitch,
                steps: chunk,
                tie_start: pitch.is_some() && remaining > 0,
                tie_stop: pitch.is_some() && !first,
                accent: event.accent && first,
            };
            if let Some(measure) = measures.last_mut() {
                measure.push(piece);
            }
            position += chunk;
            first = false;
        }
    }

    let mut fill = bar - position;
    while fill > 0 {
        let chunk = largest_writable(fill);
        if let Some(measure) = measures.last_mut() {
            measure.push(Piece::rest(chunk));
        }
        fill -= chunk;
    }

    measures
}

/// Beam state for a note
#[derive(Clone, Copy, PartialEq)]
enum BeamState {
    None,
    Begin,
    End,
}

/// Beam pairs of eighth notes that share a beat
fn calculate_beam_states(pieces: &[Piece]) -> Vec<BeamState> {
    let mut states = vec![BeamState::None; pieces.len()];
    let mut position = 0;

    for i in 0..pieces.len() {
        let beamable = |p: &Piece| p.pitch.is_some() && p.steps == 1;
        if position % 2 == 0 && i + 1 < pieces.len() && beamable(&pieces[i]) && beamable(&pieces[i + 1]) {
            states[i] = BeamState::Begin;
            states[i + 1] = BeamState::End;
        }
        position += pieces[i].steps;
    }

    states
}

fn measure_to_xml(
    pieces: &[Piece],
    number: usize,
    meter: Meter,
    tempo: u32,
    include_attributes: bool,
) -> String {
    let mut xml = String::new();

    xml.push_str(&format!("    <measure number=\"{}\">\n", number));

    // Time signature, key and clef on the first measure
    if include_attributes {
        let (beats, beat_type) = meter.signature();
        xml.push_str("      <attributes>\n");
        xml.push_str("        <divisions>2</divisions>\n"); // 2 divisions per quarter note
        xml.push_str("        <key>\n");
        xml.push_str("          <fifths>0</fifths>\n");
        xml.push_str("        </key>\n");
        xml.push_str("        <time>\n");
        xml.push_str(&format!("          <beats>{}</beats>\n", beats));
        xml.push_str(&format!("          <beat-type>{}</beat-type>\n", beat_type));
        xml.push_str("        </time>\n");
        xml.push_str("        <clef>\n");
        xml.push_str("          <sign>G</sign>\n");
        xml.push_str("          <line>2</line>\n");
        xml.push_str("        </clef>\n");
        xml.push_str("      </attributes>\n");
        xml.push_str(&format!("      <sound tempo=\"{}\"/>\n", tempo));
    }

    let beam_states = calculate_beam_states(pieces);
    for (piece, beam_state) in pieces.iter().zip(beam_states.iter()) {
        xml.push_str(&piece_to_xml(piece, *beam_state));
    }

    xml.push_str("    </measure>\n");
    xml
}

fn steps_to_type(steps: u32) -> (&'static str, bool) {
    match steps {
        8 => ("whole", false),
        6 => ("half", true),
        4 => ("half", false),
        3 => ("quarter", true),
        2 => ("quarter", false),
        _ => ("eighth", false),
    }
}

fn piece_to_xml(piece: &Piece, beam_state: BeamState) -> String {
    let mut xml = String::new();
    let (note_type, dotted) = steps_to_type(piece.steps);

    xml.push_str("      <note>\n");

    match piece.pitch {
        Some(pitch) => {
            xml.push_str("        <pitch>\n");
            xml.push_str(&format!("          <step>{}</step>\n", pitch.step));
            if pitch.alter != 0 {
                xml.push_str(&format!("          <alter>{}</alter>\n", pitch.alter));
            }
            xml.push_str(&format!("          <octave>{}</octave>\n", pitch.octave));
            xml.push_str("        </pitch>\n");
        }
        None => xml.push_str("        <rest/>\n"),
    }

    // Duration in divisions, one per step
    xml.push_str(&format!("        <duration>{}</duration>\n", piece.steps));

    // Ties (for playback - must come before <type>)
    if piece.tie_start {
        xml.push_str("        <tie type=\"start\"/>\n");
    }
    if piece.tie_stop {
        xml.push_str("        <tie type=\"stop\"/>\n");
    }

    xml.push_str(&format!("        <type>{}</type>\n", note_type));
    if dotted {
        xml.push_str("        <dot/>\n");
    }

    if let Some(pitch) = piece.pitch {
        match pitch.alter {
            1 => xml.push_str("        <accidental>sharp</accidental>\n"),
            -1 => xml.push_str("        <accidental>flat</accidental>\n"),
            _ => {}
        }
    }

    match beam_state {
        BeamState::Begin => xml.push_str("        <beam number=\"1\">begin</beam>\n"),
        BeamState::End => xml.push_str("        <beam number=\"1\">end</beam>\n"),
        BeamState::None => {}
    }

    if piece.tie_start || piece.tie_stop || piece.accent {
        xml.push_str("        <notations>\n");
        if piece.tie_start {
            xml.push_str("          <tied type=\"start\"/>\n");
        }
        if piece.tie_stop {
            xml.push_str("          <tied type=\"stop\"/>\n");
        }
        if piece.accent {
            xml.push_str("          <articulations>\n");
            xml.push_str("            <accent/>\n");
            xml.push_str("          </articulations>\n");
        }
        xml.push_str("        </notations>\n");
    }

    xml.push_str("      </note>\n");
    xml
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
