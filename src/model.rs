//! # Score Graph
//!
//! The in-memory representation the pipeline builds up and then walks.
//! Beats form a cyclic graph once goto/repeat back-edges are installed,
//! so they live in a flat arena (`Vec<Beat>`) addressed by [`BeatId`]
//! indices rather than as a tree of owned/reference-counted nodes —
//! this prevents reference cycles and keeps the score trivially clonable.

use crate::metadata::MetaData;
use crate::note::Note;
use crate::position::Position;
use std::collections::HashMap;

/// Index into [`Score::beats`]. `u32` keeps the arena compact; scores with
/// more than 4 billion beats are not a real scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeatId(pub u32);

/// One traversal of a beat; distinct passes can carry distinct content.
/// `-1` is the default pass id, stored as `DEFAULT_PASS`, applying when
/// no pass-specific override exists.
pub const DEFAULT_PASS: i32 = -1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pass {
    pub notes: Vec<Note>,
    pub line: Option<usize>,
}

impl Pass {
    pub fn total_duration(&self) -> f64 {
        self.notes.iter().map(Note::total_duration).sum()
    }
}

/// Per-position content for one beat: a default pass plus any pass-specific
/// overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub position: Position,
    pub passes: HashMap<i32, Pass>,
}

impl Measure {
    pub fn new(position: Position) -> Self {
        Measure { position, passes: HashMap::new() }
    }

    /// The pass in effect for `pass_id`: its own override if present,
    /// otherwise the default pass.
    pub fn pass_for(&self, pass_id: i32) -> Option<&Pass> {
        self.passes.get(&pass_id).or_else(|| self.passes.get(&DEFAULT_PASS))
    }

    pub fn default_pass_mut(&mut self) -> &mut Pass {
        self.passes.entry(DEFAULT_PASS).or_default()
    }
}

/// A scheduled tempo or dynamics ramp keyed to the beat it starts at.
/// Ramps are resolved by the flow interpreter as beats are entered, not
/// pre-baked into absolute times, since a goto can re-enter the same beat
/// identity along a different path — a ramp in progress when a goto fires
/// simply continues along the new path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduledChange {
    Tempo { target: f64, beat_count: u32 },
    Dynamics { target: u8, beat_count: u32 },
}

/// A REPEAT directive bound to a beat: how many more times to loop back to
/// `goto`, counting down as the beat is re-entered (repeat takes priority
/// over goto, which takes priority over falling through to the next beat).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeatRecord {
    pub goto: BeatId,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum ValidationCheck {
    BeatLength,
    EqualMeasureLength,
    InRange,
    Kempyung,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Beat {
    pub id: BeatId,
    pub gongan: usize,
    pub prev: Option<BeatId>,
    pub next: Option<BeatId>,
    pub measures: HashMap<Position, Measure>,
    /// Mode of all measures' total durations. Recomputed by the builder
    /// whenever measure content changes.
    pub duration: f64,
    pub scheduled_changes: HashMap<(&'static str, i32), ScheduledChange>,
    pub goto: HashMap<i32, BeatId>,
    pub repeat: Option<RepeatRecord>,
    pub has_kempli_beat: bool,
    pub validation_ignore: Vec<ValidationCheck>,
    /// Current traversal pass counter, incremented before the beat's
    /// contents are emitted.
    pub pass_counter: u32,
}

impl Beat {
    pub fn new(id: BeatId, gongan: usize) -> Self {
        Beat {
            id,
            gongan,
            prev: None,
            next: None,
            measures: HashMap::new(),
            duration: 0.0,
            scheduled_changes: HashMap::new(),
            goto: HashMap::new(),
            repeat: None,
            has_kempli_beat: true,
            validation_ignore: Vec::new(),
            pass_counter: 0,
        }
    }

    pub fn recompute_duration(&mut self) {
        use std::collections::HashMap as StdMap;
        let mut counts: StdMap<u64, (f64, u32)> = StdMap::new();
        for measure in self.measures.values() {
            if let Some(pass) = measure.passes.get(&DEFAULT_PASS) {
                let total = pass.total_duration();
                let key = total.to_bits();
                let entry = counts.entry(key).or_insert((total, 0));
                entry.1 += 1;
            }
        }
        if let Some((value, _)) = counts.values().max_by_key(|(_, count)| *count) {
            self.duration = *value;
        }
    }

    pub fn ignores(&self, check: ValidationCheck) -> bool {
        self.validation_ignore.contains(&check)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GonganType {
    Regular,
    Kebyar,
    Gineman,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gongan {
    pub id: usize,
    pub beats: Vec<BeatId>,
    pub kind: GonganType,
    pub metadata: Vec<MetaData>,
    pub comments: Vec<String>,
}

impl Gongan {
    pub fn new(id: usize, kind: GonganType) -> Self {
        Gongan { id, beats: Vec::new(), kind, metadata: Vec::new(), comments: Vec::new() }
    }
}

/// Resolved label→beat map and the pending (not-yet-resolvable) goto
/// queue, plus the list of SEQUENCE directives waiting to be installed
/// as gotos once every labeled beat in the score is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowInfo {
    pub labels: HashMap<String, BeatId>,
    pub pending_gotos: Vec<PendingGoto>,
    pub sequences: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingGoto {
    pub label: String,
    pub from_beat: BeatId,
    pub passes: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Score {
    pub title: String,
    pub gongans: Vec<Gongan>,
    pub beats: Vec<Beat>,
    pub active_positions: Vec<Position>,
    pub flow: FlowInfo,
}

impl Score {
    pub fn new(title: String) -> Self {
        Score { title, gongans: Vec::new(), beats: Vec::new(), active_positions: Vec::new(), flow: FlowInfo::default() }
    }

    pub fn beat(&self, id: BeatId) -> &Beat {
        &self.beats[id.0 as usize]
    }

    pub fn beat_mut(&mut self, id: BeatId) -> &mut Beat {
        &mut self.beats[id.0 as usize]
    }

    pub fn push_beat(&mut self, gongan: usize) -> BeatId {
        let id = BeatId(self.beats.len() as u32);
        self.beats.push(Beat::new(id, gongan));
        id
    }

    /// First beat of the score (gongan 1, beat 1 in 1-based
    /// description; index 0 here since the arena is 0-based).
    pub fn first_beat(&self) -> Option<BeatId> {
        self.gongans.first().and_then(|g| g.beats.first()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::{Pitch, Stroke, Tone};

    fn note(duration: f64, rest_after: f64) -> Note {
        Note {
            position: Position::Jegogan,
            tone: Tone::new(Pitch::Dong, Some(1)),
            stroke: Stroke::Open,
            duration,
            rest_after,
            symbol: "o".to_string(),
            modifiers: Vec::new(),
            velocity: 90,
            midi_notes: Vec::new(),
            sample_file: None,
        }
    }

    #[test]
    fn beat_duration_is_the_mode_of_measure_totals() {
        let mut beat = Beat::new(BeatId(0), 0);
        let mut m1 = Measure::new(Position::Jegogan);
        m1.default_pass_mut().notes.push(note(4.0, 0.0));
        let mut m2 = Measure::new(Position::Calung);
        m2.default_pass_mut().notes.push(note(4.0, 0.0));
        let mut m3 = Measure::new(Position::Ugal);
        m3.default_pass_mut().notes.push(note(2.0, 0.0));
        beat.measures.insert(Position::Jegogan, m1);
        beat.measures.insert(Position::Calung, m2);
        beat.measures.insert(Position::Ugal, m3);
        beat.recompute_duration();
        assert_eq!(beat.duration, 4.0);
    }

    #[test]
    fn doubly_linked_beats_form_a_chain() {
        let mut score = Score::new("t".to_string());
        let a = score.push_beat(0);
        let b = score.push_beat(0);
        score.beat_mut(a).next = Some(b);
        score.beat_mut(b).prev = Some(a);
        assert_eq!(score.beat(a).next, Some(b));
        assert_eq!(score.beat(b).prev, Some(a));
        assert_eq!(score.beat(b).next, None);
    }
}
