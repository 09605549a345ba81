use crate::error::Result;
use crate::model::notes::NoteTable;
use crate::util::percentile;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Distribution summary of one note attribute. The 97.5th percentile is
/// the usual upper bound when plotting steps and durations, which have a
/// long right tail.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AttributeSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub percentile_97_5: f64,
}

impl AttributeSummary {
    fn of(values: &[f64]) -> AttributeSummary {
        let min = values.iter().fold(f64::INFINITY, |acc, &v| acc.min(v));
        let max = values.iter().fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        AttributeSummary {
            min,
            max,
            mean,
            percentile_97_5: percentile(values, 97.5),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NoteStats {
    pub note_count: usize,
    pub pitch: AttributeSummary,
    pub step: AttributeSummary,
    pub duration: AttributeSummary,
}

impl NoteStats {
    /// None for an empty table; there is nothing meaningful to summarize.
    pub fn from_table(table: &NoteTable) -> Option<NoteStats> {
        if table.is_empty() {
            return None;
        }
        Some(NoteStats {
            note_count: table.len(),
            pitch: AttributeSummary::of(&table.pitches()),
            step: AttributeSummary::of(&table.steps()),
            duration: AttributeSummary::of(&table.durations()),
        })
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)?;
        Ok(())
    }
}
