use crate::error::{PipelineError, Result};

/// Number of distinct MIDI pitch values, and the pitch normalization divisor.
pub const VOCAB_SIZE: usize = 128;

/// How a series is scaled on its way into the model. Whatever is applied to
/// a window is applied to its label too, so the two always share a range,
/// and generated output can be mapped back with `invert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Pass values through untouched (step and duration streams).
    #[default]
    Identity,
    /// Divide by the pitch vocabulary size, mapping 0..=127 into [0, 1).
    PitchVocab,
}

impl Normalization {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Normalization::Identity => value,
            Normalization::PitchVocab => value / VOCAB_SIZE as f64,
        }
    }

    pub fn invert(self, value: f64) -> f64 {
        match self {
            Normalization::Identity => value,
            Normalization::PitchVocab => value * VOCAB_SIZE as f64,
        }
    }
}

/// Number of (window, label) pairs a series of `series_len` values yields
/// at stride one, or the typed error when not even one window plus its
/// label fits.
pub fn pair_count(series_len: usize, window_len: usize) -> Result<usize> {
    if series_len <= window_len {
        return Err(PipelineError::InsufficientData {
            needed: window_len + 1,
            actual: series_len,
        });
    }
    Ok(series_len - window_len)
}

/// The pair starting at `offset`: `window_len` consecutive values plus the
/// value immediately after them as the label. Caller guarantees the offset
/// is in range (see [`pair_count`]).
pub fn pair_at(series: &[f64], offset: usize, window_len: usize, norm: Normalization) -> (Vec<f64>, f64) {
    let input = series[offset..offset + window_len]
        .iter()
        .map(|&v| norm.apply(v))
        .collect();
    let label = norm.apply(series[offset + window_len]);
    (input, label)
}

/// Lazy, strictly ordered stream of (window, label) pairs over one series.
pub fn windows(series: &[f64], window_len: usize, norm: Normalization) -> Result<Windows<'_>> {
    assert!(window_len > 0, "window length must be positive");
    let remaining = pair_count(series.len(), window_len)?;
    Ok(Windows {
        series,
        window_len,
        norm,
        offset: 0,
        remaining,
    })
}

#[derive(Debug, Clone)]
pub struct Windows<'a> {
    series: &'a [f64],
    window_len: usize,
    norm: Normalization,
    offset: usize,
    remaining: usize,
}

impl Iterator for Windows<'_> {
    type Item = (Vec<f64>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let pair = pair_at(self.series, self.offset, self.window_len, self.norm);
        self.offset += 1;
        self.remaining -= 1;
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn yields_all_pairs_in_positional_order() {
        let series = [1.0, 2.0, 3.0, 4.0, 5.0];
        let pairs: Vec<_> = windows(&series, 3, Normalization::Identity).unwrap().collect();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], (vec![1.0, 2.0, 3.0], 4.0));
        assert_eq!(pairs[1], (vec![2.0, 3.0, 4.0], 5.0));
    }

    #[test]
    fn scales_label_exactly_like_the_window() {
        let series = [60.0, 62.0, 64.0];
        let pairs: Vec<_> = windows(&series, 2, Normalization::PitchVocab)
            .unwrap()
            .collect();

        assert_eq!(pairs.len(), 1);
        let (input, label) = &pairs[0];
        assert_eq!(input.as_slice(), &[0.46875, 0.484375]);
        assert_eq!(*label, 0.5);
    }

    #[test]
    fn series_of_window_length_is_insufficient() {
        let series = [60.0, 62.0, 64.0];
        let err = windows(&series, 3, Normalization::Identity).unwrap_err();
        match err {
            PipelineError::InsufficientData { needed, actual } => {
                assert_eq!(needed, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn single_value_series_fails_for_any_window_length() {
        let series = [60.0];
        for window_len in 1..=4 {
            assert!(windows(&series, window_len, Normalization::Identity).is_err());
        }
    }

    #[test]
    fn reports_exact_length() {
        let series = [0.0; 10];
        let iter = windows(&series, 4, Normalization::Identity).unwrap();
        assert_eq!(iter.len(), 6);
        assert_eq!(iter.count(), 6);
    }

    #[test]
    fn identity_leaves_steps_and_durations_alone() {
        let series = [0.0, 0.5, 0.7];
        let (input, label) = windows(&series, 2, Normalization::Identity)
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(input, vec![0.0, 0.5]);
        assert_eq!(label, 0.7);
    }

    #[test]
    fn invert_undoes_apply() {
        for value in [0.0, 21.0, 64.0, 127.0] {
            let scaled = Normalization::PitchVocab.apply(value);
            assert!((Normalization::PitchVocab.invert(scaled) - value).abs() < 1e-12);
        }
    }
}
