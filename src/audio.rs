use crate::error::{PipelineError, Result};
use crate::model::notes::NoteTable;
use crate::synthesizer::DEFAULT_VELOCITY;
use crate::util::StagedFile;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::debug;
use std::f64::consts::TAU;
use std::io;
use std::path::Path;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

// additive synthesis voice: fundamental plus three overtones
const OVERTONES: [f64; 4] = [1.0, 0.5, 0.3, 0.1];
const OVERTONE_NORM: f64 = 1.9;
const ATTACK_SECONDS: f64 = 0.05;
const RELEASE_SECONDS: f64 = 0.1;
const PEAK_TARGET: f32 = 0.95;

/// Equal-tempered frequency of a MIDI note number, A4 (69) at 440 Hz.
pub fn pitch_frequency(pitch: u8) -> f64 {
    440.0 * 2.0_f64.powf((f64::from(pitch) - 69.0) / 12.0)
}

fn envelope(time_in_note: f64, duration: f64) -> f64 {
    if time_in_note < ATTACK_SECONDS {
        time_in_note / ATTACK_SECONDS
    } else if time_in_note > duration {
        (1.0 - (time_in_note - duration) / RELEASE_SECONDS).max(0.0)
    } else {
        1.0
    }
}

/// Renders a note table to mono samples for quick listening checks.
/// `limit_seconds` cuts the timeline; notes starting past the cut are not
/// rendered. The result is peak-normalized, so it never clips.
pub fn render_waveform(table: &NoteTable, sample_rate: u32, limit_seconds: Option<f64>) -> Vec<f32> {
    if table.is_empty() || sample_rate == 0 {
        return Vec::new();
    }
    let sr = f64::from(sample_rate);
    let track_end = table.events().iter().fold(0.0f64, |acc, n| acc.max(n.end));
    let cut = limit_seconds.map_or(track_end, |limit| track_end.min(limit.max(0.0)));
    let total = ((cut + RELEASE_SECONDS) * sr).ceil() as usize;
    let mut buffer = vec![0.0f32; total];

    debug!(
        "Rendering {} note(s) over {:.2}s at {} Hz",
        table.len(),
        cut,
        sample_rate
    );

    let amp = f64::from(DEFAULT_VELOCITY) / 127.0 * 0.3;
    for note in table.events() {
        if note.start >= cut {
            continue;
        }
        let freq = pitch_frequency(note.pitch);
        let start_sample = (note.start * sr) as usize;
        let note_samples = ((note.duration + RELEASE_SECONDS) * sr) as usize;
        let len = note_samples.min(total.saturating_sub(start_sample));

        for i in 0..len {
            let time_in_note = i as f64 / sr;
            let mut value = 0.0;
            for (overtone, &gain) in OVERTONES.iter().enumerate() {
                let harmonic = freq * (overtone as f64 + 1.0);
                if harmonic < sr / 2.0 {
                    value += gain * (TAU * harmonic * time_in_note).sin();
                }
            }
            value /= OVERTONE_NORM;
            buffer[start_sample + i] += (value * amp * envelope(time_in_note, note.duration)) as f32;
        }
    }

    let peak = buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        let scale = PEAK_TARGET / peak;
        for sample in &mut buffer {
            *sample *= scale;
        }
    }
    buffer
}

/// Writes mono samples as a 16-bit WAV, staged and renamed like every other
/// output file so a failed write leaves nothing at the destination.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let staged = StagedFile::new(path).map_err(|source| write_error(path, source))?;
    let mut writer =
        WavWriter::create(staged.path(), spec).map_err(|source| wav_error(path, source))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(value)
            .map_err(|source| wav_error(path, source))?;
    }
    writer.finalize().map_err(|source| wav_error(path, source))?;
    staged.commit().map_err(|source| write_error(path, source))?;
    Ok(())
}

fn write_error(path: &Path, source: io::Error) -> PipelineError {
    PipelineError::FileWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn wav_error(path: &Path, source: hound::Error) -> PipelineError {
    let source = match source {
        hound::Error::IoError(io_error) => io_error,
        other => io::Error::other(other),
    };
    write_error(path, source)
}
