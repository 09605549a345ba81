use crate::audio::DEFAULT_SAMPLE_RATE;
use crate::synthesizer::{DEFAULT_INSTRUMENT, DEFAULT_VELOCITY};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pianogan",
    about = "Turn a piano MIDI corpus into aligned training batches, and generated sequences back into MIDI."
)]
pub struct Args {
    /// Directory scanned recursively for .mid/.midi training files.
    pub data_dir: PathBuf,

    /// Directory for MIDI, WAV, and stats output.
    #[arg(short, long, default_value = "out")]
    pub output: PathBuf,

    /// Notes per training window; the note after each window is its label.
    #[arg(long, default_value_t = 256)]
    pub seq_length: usize,

    /// Windows per batch. A final partial batch is dropped.
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Seed for the joint shuffle shared by all three attribute streams.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Keep windows in positional order instead of shuffling.
    #[arg(long, default_value_t = false)]
    pub no_shuffle: bool,

    /// Parse at most this many files from the corpus.
    #[arg(long)]
    pub max_files: Option<usize>,

    /// General MIDI instrument name for synthesized output.
    #[arg(short, long, default_value = DEFAULT_INSTRUMENT)]
    pub instrument: String,

    /// Note velocity for synthesized output (0..=127).
    #[arg(long, default_value_t = DEFAULT_VELOCITY)]
    pub velocity: u8,

    /// Also render the extracted corpus to a WAV preview.
    #[arg(short, long, default_value_t = false)]
    pub render_audio: bool,

    /// Sample rate for rendered audio.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Cap rendered audio at this many seconds.
    #[arg(long, default_value_t = 20.0)]
    pub preview_seconds: f64,

    /// Write a JSON summary of the note distributions to this path.
    #[arg(long)]
    pub stats_out: Option<PathBuf>,

    /// Dry run (print the first dry_run_max extracted notes and exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum notes to print in dry run.
    #[arg(long, default_value_t = 10)]
    pub dry_run_max: usize,
}
