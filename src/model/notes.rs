use serde::{Deserialize, Serialize};

/// A pitched note with absolute times, before step/duration derivation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TimedNote {
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
}

/// One row of an extracted note table. Times are in seconds; `step` is the
/// gap from the previous note's start and `duration` is `end - start`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub duration: f64,
}

/// The synthesizer's input: a note as relative timing only.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteRow {
    pub pitch: u8,
    pub step: f64,
    pub duration: f64,
}

/// An ordered note table. Built once from timed notes and immutable after;
/// the attribute projections below feed the windowing stages.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NoteTable {
    events: Vec<NoteEvent>,
}

impl NoteTable {
    /// Sorts by start time (stable, so simultaneous notes keep their input
    /// order) and derives step and duration. The first note's step is zero
    /// regardless of when it starts.
    pub fn from_timed_notes(mut notes: Vec<TimedNote>) -> NoteTable {
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut events = Vec::with_capacity(notes.len());
        let mut prev_start = notes.first().map_or(0.0, |n| n.start);
        for note in notes {
            events.push(NoteEvent {
                pitch: note.pitch,
                start: note.start,
                end: note.end,
                step: note.start - prev_start,
                duration: note.end - note.start,
            });
            prev_start = note.start;
        }
        NoteTable { events }
    }

    /// Appends tables in order. Steps keep their per-source derivation and
    /// are never recomputed across the join.
    pub fn concat<I: IntoIterator<Item = NoteTable>>(tables: I) -> NoteTable {
        let mut events = Vec::new();
        for table in tables {
            events.extend(table.events);
        }
        NoteTable { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn pitches(&self) -> Vec<f64> {
        self.events.iter().map(|e| f64::from(e.pitch)).collect()
    }

    pub fn steps(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.step).collect()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.duration).collect()
    }

    pub fn rows(&self) -> Vec<NoteRow> {
        self.events
            .iter()
            .map(|e| NoteRow {
                pitch: e.pitch,
                step: e.step,
                duration: e.duration,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn timed(pitch: u8, start: f64, end: f64) -> TimedNote {
        TimedNote { pitch, start, end }
    }

    #[test]
    fn derives_step_and_duration_in_start_order() {
        let table = NoteTable::from_timed_notes(vec![
            timed(64, 1.2, 1.5),
            timed(60, 0.0, 0.5),
            timed(62, 0.5, 0.9),
        ]);

        let pitches: Vec<u8> = table.events().iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![60, 62, 64]);
        assert_eq!(table.steps(), vec![0.0, 0.5, 0.7]);
        assert_eq!(table.durations(), vec![0.5, 0.4, 0.3]);
    }

    #[test]
    fn first_step_is_zero_even_with_late_start() {
        let table = NoteTable::from_timed_notes(vec![timed(72, 3.0, 3.5), timed(74, 4.0, 4.1)]);
        assert_eq!(table.steps(), vec![0.0, 1.0]);
    }

    #[test]
    fn simultaneous_notes_keep_input_order() {
        let table = NoteTable::from_timed_notes(vec![
            timed(60, 0.0, 1.0),
            timed(64, 0.0, 1.0),
            timed(67, 0.0, 1.0),
        ]);
        let pitches: Vec<u8> = table.events().iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67]);
        assert_eq!(table.steps(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn concat_never_recomputes_steps_across_the_join() {
        let first = NoteTable::from_timed_notes(vec![timed(60, 0.0, 0.5), timed(62, 0.5, 0.9)]);
        let second = NoteTable::from_timed_notes(vec![timed(70, 10.0, 10.2)]);

        let joined = NoteTable::concat(vec![first, second]);
        assert_eq!(joined.len(), 3);
        // the appended table's first note keeps its own zero step
        assert_eq!(joined.steps(), vec![0.0, 0.5, 0.0]);
    }

    #[test]
    fn projections_share_one_positional_order() {
        let table = NoteTable::from_timed_notes(vec![timed(60, 0.0, 0.5), timed(62, 0.5, 0.9)]);
        let rows = table.rows();
        assert_eq!(rows[1].pitch, 62);
        assert_eq!(rows[1].step, 0.5);
        assert_eq!(rows[1].duration, 0.4);
        assert_eq!(table.pitches(), vec![60.0, 62.0]);
    }
}
