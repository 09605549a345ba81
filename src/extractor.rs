use crate::error::{PipelineError, Result};
use crate::model::notes::{NoteTable, TimedNote};
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DEFAULT_MPQN: u32 = 500_000;

/// One instrument voice: the notes sounded on a single channel of a single
/// track. Voices are ordered by first channel activity, track-major, and
/// extraction always keeps the first voice only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VoiceId {
    track: usize,
    channel: u8,
}

struct RawNote {
    key: u8,
    start_tick: u64,
    end_tick: u64,
}

#[derive(Debug, Clone)]
struct TempoSegment {
    mpqn: u32,
    start_tick: u64,
    secs_at_start: f64,
}

/// Maps absolute ticks to seconds for either timing scheme.
enum TickClock {
    Tempo {
        ticks_per_quarter: u64,
        segments: Vec<TempoSegment>,
    },
    Timecode {
        seconds_per_tick: f64,
    },
}

impl TickClock {
    fn new(timing: &Timing, mut tempo_changes: Vec<(u64, u32)>) -> TickClock {
        match timing {
            Timing::Timecode(fps, subframe) => TickClock::Timecode {
                seconds_per_tick: 1.0 / (f64::from(fps.as_f32()) * f64::from(*subframe)),
            },
            Timing::Metrical(tpq) => {
                let ticks_per_quarter = u64::from(tpq.as_int());
                tempo_changes.sort_unstable_by_key(|(tick, _)| *tick);

                // default tempo (~120bpm) holds until the first tempo meta
                let mut segments = vec![TempoSegment {
                    mpqn: DEFAULT_MPQN,
                    start_tick: 0,
                    secs_at_start: 0.0,
                }];
                let mut last_tick: u64 = 0;
                let mut last_mpqn: u32 = DEFAULT_MPQN;
                let mut secs_accum: f64 = 0.0;

                for (tick, mpqn) in tempo_changes {
                    if tick > last_tick {
                        let delta_ticks = (tick - last_tick) as f64;
                        secs_accum +=
                            delta_ticks * (last_mpqn as f64) / (ticks_per_quarter as f64) / 1e6;
                    }
                    segments.push(TempoSegment {
                        mpqn,
                        start_tick: tick,
                        secs_at_start: secs_accum,
                    });
                    last_tick = tick;
                    last_mpqn = mpqn;
                }

                TickClock::Tempo {
                    ticks_per_quarter,
                    segments,
                }
            }
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            TickClock::Timecode { seconds_per_tick } => tick as f64 * seconds_per_tick,
            TickClock::Tempo {
                ticks_per_quarter,
                segments,
            } => {
                // segments always start at tick 0, so rfind cannot miss
                let segment = segments
                    .iter()
                    .rfind(|seg| seg.start_tick <= tick)
                    .unwrap_or(&segments[0]);

                let delta_ticks = (tick - segment.start_tick) as f64;
                segment.secs_at_start
                    + delta_ticks * (segment.mpqn as f64) / (*ticks_per_quarter as f64) / 1e6
            }
        }
    }
}

/// Reads one MIDI file and extracts the note table of its first instrument
/// voice. Fails with [`PipelineError::NoInstrument`] when no track carries
/// channel messages, and with [`PipelineError::EmptyTrack`] when the first
/// voice never completes a note.
pub fn extract_notes<P: AsRef<Path>>(path: P) -> Result<NoteTable> {
    let bytes = fs::read(path.as_ref())?;
    notes_from_midi_bytes(&bytes)
}

/// [`extract_notes`] for already-loaded bytes.
pub fn notes_from_midi_bytes(bytes: &[u8]) -> Result<NoteTable> {
    let smf = Smf::parse(bytes)?;

    debug!(
        "MIDI format: {:?}, timing: {:?}, tracks: {}",
        smf.header.format,
        smf.header.timing,
        smf.tracks.len()
    );

    let fallback_ticks = match smf.header.timing {
        Timing::Metrical(tpq) => u64::from(tpq.as_int()),
        Timing::Timecode(fps, subframe) => u64::from(fps.as_int()) * u64::from(subframe),
    };

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    let mut voice_order: Vec<VoiceId> = Vec::new();
    let mut voice_notes: HashMap<VoiceId, Vec<RawNote>> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        let mut open_notes: HashMap<(u8, u8), Vec<u64>> = HashMap::new();

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(u64::from(event.delta.as_int()));

            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micro)) => {
                    tempo_changes.push((abs_tick, micro.as_int()));
                    debug!(
                        "Tempo change at tick {} -> {} us/qn (track {})",
                        abs_tick,
                        micro.as_int(),
                        track_idx
                    );
                }
                TrackEventKind::Midi { channel, message } => {
                    let voice = VoiceId {
                        track: track_idx,
                        channel: channel.as_int(),
                    };
                    if !voice_notes.contains_key(&voice) {
                        voice_order.push(voice);
                        voice_notes.insert(voice, Vec::new());
                    }

                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open_notes
                                .entry((voice.channel, key.as_int()))
                                .or_default()
                                .push(abs_tick);
                        }
                        // a NoteOn at velocity zero is a release
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            close_note(
                                &mut open_notes,
                                &mut voice_notes,
                                voice,
                                key.as_int(),
                                abs_tick,
                            );
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        let track_end = abs_tick;
        for ((channel, key), stack) in open_notes {
            for start_tick in stack {
                let end_tick = if track_end > start_tick {
                    track_end
                } else {
                    start_tick + fallback_ticks
                };
                warn!(
                    "Unclosed NoteOn for {} ch{} at tick {}, auto-closing at {}..!",
                    key, channel, start_tick, end_tick
                );
                voice_notes
                    .entry(VoiceId {
                        track: track_idx,
                        channel,
                    })
                    .or_default()
                    .push(RawNote {
                        key,
                        start_tick,
                        end_tick,
                    });
            }
        }
    }

    let Some(first_voice) = voice_order.first() else {
        return Err(PipelineError::NoInstrument);
    };
    if voice_order.len() > 1 {
        debug!(
            "Keeping first of {} instrument voices: track {}, channel {}",
            voice_order.len(),
            first_voice.track,
            first_voice.channel
        );
    }

    let raw = voice_notes.remove(first_voice).unwrap_or_default();
    if raw.is_empty() {
        return Err(PipelineError::EmptyTrack);
    }

    let clock = TickClock::new(&smf.header.timing, tempo_changes);
    let mut timed = Vec::with_capacity(raw.len());
    for note in raw {
        let start = clock.seconds_at(note.start_tick);
        let end = clock.seconds_at(note.end_tick);

        if end <= start {
            debug!(
                "Skipping zero-length note {} at tick {}..!",
                note.key, note.start_tick
            );
            continue;
        }
        timed.push(TimedNote {
            pitch: note.key,
            start,
            end,
        });
    }

    if timed.is_empty() {
        return Err(PipelineError::EmptyTrack);
    }
    Ok(NoteTable::from_timed_notes(timed))
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<u64>>,
    voice_notes: &mut HashMap<VoiceId, Vec<RawNote>>,
    voice: VoiceId,
    key: u8,
    abs_tick: u64,
) {
    match open_notes
        .get_mut(&(voice.channel, key))
        .and_then(Vec::pop)
    {
        Some(start_tick) => voice_notes.entry(voice).or_default().push(RawNote {
            key,
            start_tick,
            end_tick: abs_tick,
        }),
        None => debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            key, voice.channel, abs_tick
        ),
    }
}

/// Recursively lists the `.mid`/`.midi` files under `dir`, sorted by path
/// so corpus order is reproducible across runs.
pub fn scan_corpus<P: AsRef<Path>>(dir: P, limit: Option<usize>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir.as_ref())
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(why) => {
                debug!("Skipping unreadable directory entry: {}", why);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_midi_path(path))
        .collect();

    paths.sort();
    if let Some(limit) = limit {
        paths.truncate(limit);
    }
    paths
}

fn is_midi_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
}

/// Extracts every file in order and concatenates the surviving tables.
/// A file that fails to parse, has no instrument, or has no notes is
/// logged and skipped; it never aborts the rest of the corpus.
pub fn extract_corpus(paths: &[PathBuf]) -> NoteTable {
    let mut tables = Vec::with_capacity(paths.len());
    for path in paths {
        match extract_notes(path) {
            Ok(table) => {
                debug!("Parsed {} notes from '{}'", table.len(), path.display());
                tables.push(table);
            }
            Err(why) => {
                warn!("Skipping '{}': {}..!", path.display(), why);
            }
        }
    }
    NoteTable::concat(tables)
}

#[cfg(test)]
mod test {
    use super::*;
    use midly::num::u4;
    use midly::{Format, Fps, Header, TrackEvent};
    use std::env;

    fn midi_event(delta: u32, channel: u8, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: u4::from(channel),
                message,
            },
        }
    }

    fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
        midi_event(
            delta,
            0,
            MidiMessage::NoteOn {
                key: key.into(),
                vel: 80.into(),
            },
        )
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        midi_event(
            delta,
            0,
            MidiMessage::NoteOff {
                key: key.into(),
                vel: 0.into(),
            },
        )
    }

    fn smf_bytes(timing: Timing, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let mut smf = Smf::new(Header {
            format: Format::Parallel,
            timing,
        });
        for mut track in tracks {
            track.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    // 480 ticks per quarter at the default tempo is 960 ticks per second
    fn metrical() -> Timing {
        Timing::Metrical(480.into())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn extracts_sorted_notes_with_step_and_duration() {
        env_logger::try_init().unwrap_or(());

        let bytes = smf_bytes(
            metrical(),
            vec![vec![
                note_on(0, 60),
                note_off(480, 60),
                note_on(0, 62),
                note_off(384, 62),
                note_on(288, 64),
                note_off(288, 64),
            ]],
        );

        let table = notes_from_midi_bytes(&bytes).unwrap();
        let pitches: Vec<u8> = table.events().iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![60, 62, 64]);

        let steps = table.steps();
        let durations = table.durations();
        for (got, want) in steps.iter().zip([0.0, 0.5, 0.7]) {
            assert!(approx(*got, want), "step {got} != {want}");
        }
        for (got, want) in durations.iter().zip([0.5, 0.4, 0.3]) {
            assert!(approx(*got, want), "duration {got} != {want}");
        }
    }

    #[test]
    fn single_note_track_extracts_cleanly() {
        env_logger::try_init().unwrap_or(());

        let bytes = smf_bytes(metrical(), vec![vec![note_on(0, 72), note_off(960, 72)]]);
        let table = notes_from_midi_bytes(&bytes).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.events()[0].pitch, 72);
        assert!(approx(table.events()[0].step, 0.0));
        assert!(approx(table.events()[0].duration, 1.0));
    }

    #[test]
    fn keeps_only_the_first_voice() {
        env_logger::try_init().unwrap_or(());

        // channel 2 becomes active first, so channel 0's notes are ignored
        let bytes = smf_bytes(
            metrical(),
            vec![vec![
                midi_event(
                    0,
                    2,
                    MidiMessage::NoteOn {
                        key: 70.into(),
                        vel: 90.into(),
                    },
                ),
                midi_event(
                    240,
                    2,
                    MidiMessage::NoteOff {
                        key: 70.into(),
                        vel: 0.into(),
                    },
                ),
                note_on(0, 60),
                note_off(480, 60),
            ]],
        );

        let table = notes_from_midi_bytes(&bytes).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.events()[0].pitch, 70);
    }

    #[test]
    fn file_without_channel_messages_has_no_instrument() {
        env_logger::try_init().unwrap_or(());

        let bytes = smf_bytes(
            metrical(),
            vec![vec![TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(b"conductor")),
            }]],
        );

        assert!(matches!(
            notes_from_midi_bytes(&bytes),
            Err(PipelineError::NoInstrument)
        ));
    }

    #[test]
    fn voice_without_notes_is_an_empty_track() {
        env_logger::try_init().unwrap_or(());

        // program change registers the voice but it never plays a note
        let bytes = smf_bytes(
            metrical(),
            vec![vec![midi_event(
                0,
                0,
                MidiMessage::ProgramChange { program: 0.into() },
            )]],
        );

        assert!(matches!(
            notes_from_midi_bytes(&bytes),
            Err(PipelineError::EmptyTrack)
        ));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        env_logger::try_init().unwrap_or(());

        assert!(matches!(
            notes_from_midi_bytes(b"definitely not midi"),
            Err(PipelineError::MalformedFile(_))
        ));
    }

    #[test]
    fn unclosed_note_is_auto_closed_at_track_end() {
        env_logger::try_init().unwrap_or(());

        let bytes = smf_bytes(
            metrical(),
            vec![vec![
                note_on(0, 60),
                TrackEvent {
                    delta: 960.into(),
                    kind: TrackEventKind::Meta(MetaMessage::Text(b"end marker")),
                },
            ]],
        );

        let table = notes_from_midi_bytes(&bytes).unwrap();
        assert_eq!(table.len(), 1);
        assert!(approx(table.events()[0].start, 0.0));
        assert!(approx(table.events()[0].end, 1.0));
    }

    #[test]
    fn velocity_zero_note_on_releases() {
        env_logger::try_init().unwrap_or(());

        let bytes = smf_bytes(
            metrical(),
            vec![vec![
                note_on(0, 64),
                midi_event(
                    480,
                    0,
                    MidiMessage::NoteOn {
                        key: 64.into(),
                        vel: 0.into(),
                    },
                ),
            ]],
        );

        let table = notes_from_midi_bytes(&bytes).unwrap();
        assert_eq!(table.len(), 1);
        assert!(approx(table.events()[0].duration, 0.5));
    }

    #[test]
    fn tempo_change_stretches_later_ticks() {
        env_logger::try_init().unwrap_or(());

        // first half at 120bpm, second half at 240bpm
        let bytes = smf_bytes(
            metrical(),
            vec![vec![
                note_on(0, 69),
                TrackEvent {
                    delta: 480.into(),
                    kind: TrackEventKind::Meta(MetaMessage::Tempo(250_000.into())),
                },
                midi_event(
                    480,
                    0,
                    MidiMessage::NoteOff {
                        key: 69.into(),
                        vel: 0.into(),
                    },
                ),
            ]],
        );

        let table = notes_from_midi_bytes(&bytes).unwrap();
        assert_eq!(table.len(), 1);
        assert!(approx(table.events()[0].start, 0.0));
        assert!(approx(table.events()[0].end, 0.75));
    }

    #[test]
    fn smpte_timing_resolves_to_seconds() {
        env_logger::try_init().unwrap_or(());

        // 25 fps at 40 ticks per frame is 1000 ticks per second
        let bytes = smf_bytes(
            Timing::Timecode(Fps::Fps25, 40),
            vec![vec![note_on(0, 60), note_off(500, 60)]],
        );

        let table = notes_from_midi_bytes(&bytes).unwrap();
        assert_eq!(table.len(), 1);
        assert!(approx(table.events()[0].duration, 0.5));
    }

    #[test]
    fn scan_finds_midi_files_case_insensitively() {
        env_logger::try_init().unwrap_or(());

        let dir = env::temp_dir().join(format!("pianogan_scan_{}", std::process::id()));
        let nested = dir.join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.join("b.mid"), b"x").unwrap();
        fs::write(nested.join("a.MIDI"), b"x").unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();

        let found = scan_corpus(&dir, None);
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("b.mid"));
        assert!(found[1].ends_with("nested/a.MIDI"));

        let limited = scan_corpus(&dir, Some(1));
        assert_eq!(limited.len(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corpus_extraction_skips_bad_files_and_keeps_going() {
        env_logger::try_init().unwrap_or(());

        let dir = env::temp_dir().join(format!("pianogan_corpus_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let good = smf_bytes(metrical(), vec![vec![note_on(0, 60), note_off(480, 60)]]);
        fs::write(dir.join("a_good.mid"), &good).unwrap();
        fs::write(dir.join("b_broken.mid"), b"garbage").unwrap();
        fs::write(dir.join("c_good.mid"), &good).unwrap();

        let paths = scan_corpus(&dir, None);
        assert_eq!(paths.len(), 3);

        let table = extract_corpus(&paths);
        assert_eq!(table.len(), 2);
        // each file derives its own steps, so both notes keep step zero
        assert_eq!(table.steps(), vec![0.0, 0.0]);

        fs::remove_dir_all(&dir).unwrap();
    }
}
