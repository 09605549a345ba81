use crate::error::Result;
use crate::model::notes::NoteTable;
use crate::windower::{self, Normalization};
use log::debug;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Whether window order is randomized before batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleMode {
    /// One seeded permutation over window offsets, shared by all three
    /// attribute streams so their windows stay positionally aligned.
    Aligned { seed: u64 },
    /// Keep windows in their positional order.
    Off,
}

/// A batch of windows for one attribute: `inputs` is batch x window length,
/// `labels` holds the next-value label per row.
#[derive(Debug, Clone)]
pub struct WindowBatch {
    pub inputs: Array2<f64>,
    pub labels: Array1<f64>,
}

/// The three per-attribute batches cut from the same window offsets. Row i
/// of `pitch`, `step`, and `duration` always describes the same stretch of
/// the note table.
#[derive(Debug, Clone)]
pub struct BatchSet {
    pub pitch: WindowBatch,
    pub step: WindowBatch,
    pub duration: WindowBatch,
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetAssembler {
    window_len: usize,
    batch_size: usize,
    shuffle: ShuffleMode,
}

impl DatasetAssembler {
    pub fn new(window_len: usize, batch_size: usize, shuffle: ShuffleMode) -> DatasetAssembler {
        assert!(window_len > 0, "window length must be positive");
        assert!(batch_size > 0, "batch size must be positive");
        DatasetAssembler {
            window_len,
            batch_size,
            shuffle,
        }
    }

    /// Builds the lazy batch stream over a note table. Fails up front with
    /// the windower's error when the table cannot fill one window plus its
    /// label; otherwise batches materialize one at a time and a final
    /// partial batch is dropped.
    pub fn batches(&self, table: &NoteTable) -> Result<Batches> {
        let pitch = table.pitches();
        let pair_count = windower::pair_count(pitch.len(), self.window_len)?;

        let mut order: Vec<usize> = (0..pair_count).collect();
        if let ShuffleMode::Aligned { seed } = self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }

        debug!(
            "Cutting {} window pair(s) into batches of {}",
            pair_count, self.batch_size
        );
        Ok(Batches {
            pitch,
            step: table.steps(),
            duration: table.durations(),
            order,
            cursor: 0,
            window_len: self.window_len,
            batch_size: self.batch_size,
        })
    }
}

#[derive(Debug)]
pub struct Batches {
    pitch: Vec<f64>,
    step: Vec<f64>,
    duration: Vec<f64>,
    order: Vec<usize>,
    cursor: usize,
    window_len: usize,
    batch_size: usize,
}

impl Batches {
    fn attribute_batch(series: &[f64], offsets: &[usize], window_len: usize, norm: Normalization) -> WindowBatch {
        let mut inputs = Vec::with_capacity(offsets.len() * window_len);
        let mut labels = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let (input, label) = windower::pair_at(series, offset, window_len, norm);
            inputs.extend_from_slice(&input);
            labels.push(label);
        }
        WindowBatch {
            inputs: Array2::from_shape_vec((offsets.len(), window_len), inputs)
                .expect("rows * window length matches the collected inputs"),
            labels: Array1::from_vec(labels),
        }
    }
}

impl Iterator for Batches {
    type Item = BatchSet;

    fn next(&mut self) -> Option<BatchSet> {
        if self.order.len() - self.cursor < self.batch_size {
            return None;
        }
        let offsets = &self.order[self.cursor..self.cursor + self.batch_size];
        let set = BatchSet {
            pitch: Self::attribute_batch(&self.pitch, offsets, self.window_len, Normalization::PitchVocab),
            step: Self::attribute_batch(&self.step, offsets, self.window_len, Normalization::Identity),
            duration: Self::attribute_batch(&self.duration, offsets, self.window_len, Normalization::Identity),
        };
        self.cursor += self.batch_size;
        Some(set)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor) / self.batch_size;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches {}
