use crate::error::{PipelineError, Result};
use crate::model::notes::{NoteRow, TimedNote};
use crate::util::StagedFile;
use crate::windower::Normalization;
use log::warn;
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_INSTRUMENT: &str = "Acoustic Grand Piano";
pub const DEFAULT_VELOCITY: u8 = 100;

/// Fixed relative timing applied to generated pitch sequences.
pub const GENERATED_STEP: f64 = 0.025;
pub const GENERATED_DURATION: f64 = 0.3;

const TICKS_PER_QUARTER: u16 = 480;
const TEMPO_BPM: u32 = 120;
const MAX_PITCH: u8 = 127;

/// The 128 General MIDI program names, in program order.
pub const GM_INSTRUMENTS: [&str; 128] = [
    "Acoustic Grand Piano",
    "Bright Acoustic Piano",
    "Electric Grand Piano",
    "Honky-tonk Piano",
    "Electric Piano 1",
    "Electric Piano 2",
    "Harpsichord",
    "Clavinet",
    "Celesta",
    "Glockenspiel",
    "Music Box",
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Tubular Bells",
    "Dulcimer",
    "Drawbar Organ",
    "Percussive Organ",
    "Rock Organ",
    "Church Organ",
    "Reed Organ",
    "Accordion",
    "Harmonica",
    "Tango Accordion",
    "Acoustic Guitar (nylon)",
    "Acoustic Guitar (steel)",
    "Electric Guitar (jazz)",
    "Electric Guitar (clean)",
    "Electric Guitar (muted)",
    "Overdriven Guitar",
    "Distortion Guitar",
    "Guitar Harmonics",
    "Acoustic Bass",
    "Electric Bass (finger)",
    "Electric Bass (pick)",
    "Fretless Bass",
    "Slap Bass 1",
    "Slap Bass 2",
    "Synth Bass 1",
    "Synth Bass 2",
    "Violin",
    "Viola",
    "Cello",
    "Contrabass",
    "Tremolo Strings",
    "Pizzicato Strings",
    "Orchestral Harp",
    "Timpani",
    "String Ensemble 1",
    "String Ensemble 2",
    "Synth Strings 1",
    "Synth Strings 2",
    "Choir Aahs",
    "Voice Oohs",
    "Synth Choir",
    "Orchestra Hit",
    "Trumpet",
    "Trombone",
    "Tuba",
    "Muted Trumpet",
    "French Horn",
    "Brass Section",
    "Synth Brass 1",
    "Synth Brass 2",
    "Soprano Sax",
    "Alto Sax",
    "Tenor Sax",
    "Baritone Sax",
    "Oboe",
    "English Horn",
    "Bassoon",
    "Clarinet",
    "Piccolo",
    "Flute",
    "Recorder",
    "Pan Flute",
    "Blown Bottle",
    "Shakuhachi",
    "Whistle",
    "Ocarina",
    "Lead 1 (square)",
    "Lead 2 (sawtooth)",
    "Lead 3 (calliope)",
    "Lead 4 (chiff)",
    "Lead 5 (charang)",
    "Lead 6 (voice)",
    "Lead 7 (fifths)",
    "Lead 8 (bass + lead)",
    "Pad 1 (new age)",
    "Pad 2 (warm)",
    "Pad 3 (polysynth)",
    "Pad 4 (choir)",
    "Pad 5 (bowed)",
    "Pad 6 (metallic)",
    "Pad 7 (halo)",
    "Pad 8 (sweep)",
    "FX 1 (rain)",
    "FX 2 (soundtrack)",
    "FX 3 (crystal)",
    "FX 4 (atmosphere)",
    "FX 5 (brightness)",
    "FX 6 (goblins)",
    "FX 7 (echoes)",
    "FX 8 (sci-fi)",
    "Sitar",
    "Banjo",
    "Shamisen",
    "Koto",
    "Kalimba",
    "Bagpipe",
    "Fiddle",
    "Shanai",
    "Tinkle Bell",
    "Agogo",
    "Steel Drums",
    "Woodblock",
    "Taiko Drum",
    "Melodic Tom",
    "Synth Drum",
    "Reverse Cymbal",
    "Guitar Fret Noise",
    "Breath Noise",
    "Seashore",
    "Bird Tweet",
    "Telephone Ring",
    "Helicopter",
    "Applause",
    "Gunshot",
];

/// Case-insensitive General MIDI program lookup.
pub fn program_for_instrument(name: &str) -> Option<u8> {
    GM_INSTRUMENTS
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .map(|index| index as u8)
}

/// Unrolls relative rows into absolute times. The first row's step is taken
/// from zero, each later start is previous start plus step, and every end
/// is start plus duration. Rejects any pitch above 127 before touching the
/// clock, so a bad sequence produces no notes at all.
pub fn resolve_rows(rows: &[NoteRow]) -> Result<Vec<TimedNote>> {
    let mut notes = Vec::with_capacity(rows.len());
    let mut prev_start = 0.0f64;

    for row in rows {
        if row.pitch > MAX_PITCH {
            return Err(PipelineError::InvalidPitch(f64::from(row.pitch)));
        }
        let start = prev_start + row.step;
        notes.push(TimedNote {
            pitch: row.pitch,
            start,
            end: start + row.duration,
        });
        prev_start = start;
    }
    Ok(notes)
}

/// Maps raw generated pitch values back to rows: inverse of the vocabulary
/// scaling, negatives clamped to zero, then truncated to a note number.
/// A value that still lands above 127 is rejected as out of range.
pub fn rows_from_predictions(predictions: &[f64]) -> Result<Vec<NoteRow>> {
    let mut rows = Vec::with_capacity(predictions.len());
    for &raw in predictions {
        let scaled = Normalization::PitchVocab.invert(raw).max(0.0);
        let pitch = scaled.trunc();
        if pitch > f64::from(MAX_PITCH) {
            return Err(PipelineError::InvalidPitch(scaled));
        }
        rows.push(NoteRow {
            pitch: pitch as u8,
            step: GENERATED_STEP,
            duration: GENERATED_DURATION,
        });
    }
    Ok(rows)
}

struct AbsoluteEvent {
    tick: u64,
    kind: TrackEventKind<'static>,
}

// Releases sort before attacks at a shared tick so back-to-back notes
// keyed on the same pitch never swallow each other.
fn event_order(kind: &TrackEventKind) -> u8 {
    match kind {
        TrackEventKind::Meta(_) => 0,
        TrackEventKind::Midi {
            message: MidiMessage::ProgramChange { .. },
            ..
        } => 1,
        TrackEventKind::Midi {
            message: MidiMessage::NoteOff { .. },
            ..
        } => 2,
        _ => 3,
    }
}

fn to_tick(seconds: f64, ticks_per_second: f64) -> u64 {
    if seconds < 0.0 {
        warn!("Clamping negative note time {:.6}s to zero..!", seconds);
        return 0;
    }
    (seconds * ticks_per_second).round() as u64
}

/// Renders rows to standard MIDI file bytes: one track, fixed tempo, one
/// program, every note at the same velocity.
pub fn midi_bytes(rows: &[NoteRow], instrument: &str, velocity: u8) -> Result<Vec<u8>> {
    let notes = resolve_rows(rows)?;
    let velocity = velocity.min(MAX_PITCH);
    let ticks_per_second = f64::from(TICKS_PER_QUARTER) * f64::from(TEMPO_BPM) / 60.0;

    let program = match program_for_instrument(instrument) {
        Some(program) => program,
        None => {
            warn!(
                "Unknown General MIDI instrument '{}', defaulting to '{}'..!",
                instrument, GM_INSTRUMENTS[0]
            );
            0
        }
    };

    let mut events: Vec<AbsoluteEvent> = Vec::with_capacity(notes.len() * 2 + 2);
    events.push(AbsoluteEvent {
        tick: 0,
        kind: TrackEventKind::Meta(MetaMessage::Tempo((60_000_000 / TEMPO_BPM).into())),
    });
    events.push(AbsoluteEvent {
        tick: 0,
        kind: TrackEventKind::Midi {
            channel: 0.into(),
            message: MidiMessage::ProgramChange {
                program: program.into(),
            },
        },
    });

    for note in &notes {
        let start_tick = to_tick(note.start, ticks_per_second);
        // a sub-tick note still needs its release after its attack
        let end_tick = to_tick(note.end, ticks_per_second).max(start_tick + 1);

        events.push(AbsoluteEvent {
            tick: start_tick,
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: note.pitch.into(),
                    vel: velocity.into(),
                },
            },
        });
        events.push(AbsoluteEvent {
            tick: end_tick,
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOff {
                    key: note.pitch.into(),
                    vel: 0.into(),
                },
            },
        });
    }

    events.sort_by_key(|event| (event.tick, event_order(&event.kind)));

    let mut smf = Smf::new(Header {
        format: Format::SingleTrack,
        timing: Timing::Metrical(TICKS_PER_QUARTER.into()),
    });
    let mut track = Track::new();
    let mut last_tick: u64 = 0;
    for event in events {
        let delta = (event.tick - last_tick) as u32;
        track.push(TrackEvent {
            delta: delta.into(),
            kind: event.kind,
        });
        last_tick = event.tick;
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}

/// Writes rows to a MIDI file, all or nothing. Bytes are staged next to the
/// destination and renamed into place; on any failure the destination is
/// left untouched and the staged file is removed.
pub fn write_midi_file<P: AsRef<Path>>(
    path: P,
    rows: &[NoteRow],
    instrument: &str,
    velocity: u8,
) -> Result<()> {
    let path = path.as_ref();
    let bytes = midi_bytes(rows, instrument, velocity)?;

    let staged = StagedFile::new(path).map_err(|source| write_error(path, source))?;
    fs::write(staged.path(), &bytes).map_err(|source| write_error(path, source))?;
    staged.commit().map_err(|source| write_error(path, source))?;
    Ok(())
}

fn write_error(path: &Path, source: io::Error) -> PipelineError {
    PipelineError::FileWrite {
        path: path.to_path_buf(),
        source,
    }
}
