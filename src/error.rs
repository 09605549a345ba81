use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between a MIDI corpus on disk and a batch
/// stream, or between generated sequences and a written file.
///
/// Extraction and windowing failures are per-file: callers skip the file,
/// log it, and keep going. Synthesis failures abort only the output request
/// that raised them. None of these are transient, so nothing here is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file parsed, but no track carries any channel voice.
    #[error("MIDI file has no instrument voice")]
    NoInstrument,

    /// The selected instrument voice has zero completed notes, so the
    /// first note's previous-start reference would be undefined.
    #[error("selected instrument track has no notes")]
    EmptyTrack,

    /// The bytes are not a standard MIDI file.
    #[error("malformed MIDI data: {0}")]
    MalformedFile(#[from] midly::Error),

    /// The series is too short to cut even one window plus its label.
    #[error("series of {actual} value(s) cannot fill a window of {needed} (window plus label)")]
    InsufficientData { needed: usize, actual: usize },

    /// A pitch landed outside 0..=127 after inverse scaling.
    #[error("pitch {0} is outside the MIDI range 0..=127")]
    InvalidPitch(f64),

    /// Writing an output file failed. The staged temp file is removed, so
    /// no partial output is ever left readable at the destination.
    #[error("failed to write '{}': {source}", path.display())]
    FileWrite { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
