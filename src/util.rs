use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Human-readable name for a MIDI note number, middle C (60) being "C4".
pub fn note_name(pitch: u8) -> String {
    let name = NOTE_NAMES[usize::from(pitch % 12)];
    let octave = i32::from(pitch / 12) - 1;
    format!("{name}{octave}")
}

/// Linear-interpolated percentile with `q` in 0..=100.
/// `values` may be unsorted but must be non-empty.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    debug_assert!(!values.is_empty(), "percentile of an empty series");
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

/// All-or-nothing file output. Writes go to a sibling `.tmp` path and only
/// become visible at the destination on `commit`; dropping an uncommitted
/// stage removes the temp file again.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn new<P: AsRef<Path>>(dest: P) -> io::Result<StagedFile> {
        let dest = dest.as_ref().to_path_buf();
        let Some(file_name) = dest.file_name() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination path has no file name",
            ));
        };
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = OsString::from(file_name);
        tmp_name.push(".tmp");
        let tmp = dest.with_file_name(tmp_name);
        Ok(StagedFile {
            tmp,
            dest,
            committed: false,
        })
    }

    /// Path to write the staged contents to.
    pub fn path(&self) -> &Path {
        &self.tmp
    }

    /// Atomically moves the staged file into place.
    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.tmp, &self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}
