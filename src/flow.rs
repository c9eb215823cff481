//! # Flow Interpreter & MIDI Emitter
//!
//! Walks the beat graph the builder produced in performance order —
//! following `next`/`goto`/`repeat` edges exactly as a player would — and
//! renders the walk as a [`crate::midi::MidiFile`]. Unlike a flat
//! measure-by-measure walk over a `Vec`, the score graph here is cyclic,
//! so it needs an explicit termination condition and a loop-count guard
//! instead of a plain index increment.
//!
//! Tick positions come purely from each note's duration and the fixed
//! `base_note_time` multiplier — tempo never touches note timing. TEMPO and
//! DYNAMICS directives only change the emitted `Tempo` meta-events and the
//! velocity of subsequently emitted notes, interpolated linearly over the
//! directive's `beat_count`. Since ramp progress is counted
//! in beats *visited*, not absolute score position, a ramp in progress when
//! a goto fires carries on unchanged along the new path.
//!
//! This crate invents its own Tone→MIDI-key mapping (see `melodic_key` and
//! `percussive_key` below): no example in the corpus pins down concrete key
//! numbers for Balinese gamelan tunings, so the mapping here is this
//! crate's own resolution, recorded in DESIGN.md.

use crate::error::{GamelanError, Location};
use crate::midi::{MetaEvent, MidiFile, MidiMessage, Track};
use crate::model::{BeatId, Score, ScheduledChange, DEFAULT_PASS};
use crate::note::Note;
use crate::position::Position;
use crate::settings::RunSettings;
use crate::tone::{Pitch, Stroke, Tone};
use std::collections::{HashMap, HashSet};

/// Starting tempo when a score never issues an initial TEMPO directive.
/// Arbitrary; see DESIGN.md.
const DEFAULT_BPM: f64 = 60.0;
const DEFAULT_VELOCITY: u8 = 90;

/// Walks `score` to completion and renders it as a Standard MIDI File.
pub fn emit(score: &Score, settings: &RunSettings) -> Result<MidiFile, GamelanError> {
    let mut interpreter = Interpreter::new(score, settings);
    interpreter.run()?;
    Ok(interpreter.finish())
}

/// Semitone offset of each of the seven scale steps from the instrument's
/// base key, approximating the Balinese pentatonic/pelog scales onto the
/// nearest chromatic degrees.
const DIATONIC_STEPS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Invented per-position base key (octave 1, scale step 0). See DESIGN.md.
fn instrument_base_key(position: Position) -> i32 {
    match position {
        Position::Ugal => 60,
        Position::PemadePolos | Position::PemadeSangsih => 72,
        Position::KantilanPolos | Position::KantilanSangsih => 84,
        Position::Reyong1 => 74,
        Position::Reyong2 => 77,
        Position::Reyong3 => 79,
        Position::Reyong4 => 81,
        Position::Calung => 48,
        Position::Jegogan => 36,
        Position::Penyacah => 55,
        Position::Suling => 72,
        Position::Kendang | Position::Kempli | Position::Gongs => 36,
    }
}

fn melodic_key(position: Position, tone: Tone) -> u8 {
    let step = tone.pitch.scale_step().unwrap_or(0) as usize;
    let octave = tone.octave.unwrap_or(1) as i32;
    let key = instrument_base_key(position) + (octave - 1) * 12 + DIATONIC_STEPS[step];
    key.clamp(0, 127) as u8
}

/// Invented fixed keys for the non-melodic percussive pitches. Falls back
/// to a generic key for any (position, pitch) pair not named explicitly.
fn percussive_key(position: Position, pitch: Pitch) -> u8 {
    match (position, pitch) {
        (Position::Kempli, Pitch::Strike) => 76,
        (Position::Gongs, Pitch::Strike) => 35,
        (Position::Gongs, Pitch::Byong) => 56,
        (Position::Kendang, Pitch::Dag) => 45,
        (Position::Kendang, Pitch::Dug) => 41,
        (Position::Kendang, Pitch::Tut) => 48,
        (Position::Kendang, Pitch::Pak) => 50,
        (Position::Kendang, Pitch::Pek) => 54,
        (Position::Kendang, Pitch::Pur) => 58,
        (Position::Kendang, Pitch::Ka) => 60,
        (Position::Kendang, Pitch::Cung) => 62,
        (Position::Kendang, Pitch::Kung) => 64,
        (Position::Kendang, Pitch::Gir) => 66,
        (Position::Kendang, Pitch::Jet) => 68,
        (Position::Kendang, Pitch::Plak) => 70,
        (_, Pitch::Tong) => 65,
        (_, Pitch::Byong) => 56,
        _ => 60,
    }
}

fn midi_keys_for(position: Position, note: &Note) -> Vec<u8> {
    if note.tone.pitch.is_melodic() {
        vec![melodic_key(position, note.tone)]
    } else {
        vec![percussive_key(position, note.tone.pitch)]
    }
}

/// Accelerating-tremolo velocities are baked in per note by the builder
/// from `accelerating_velocity` and represent the notation's own terraced
/// dynamic contour; a live DYNAMICS ramp does not override them (see
/// DESIGN.md). Every other sounding stroke uses the interpreter's current
/// ramp-driven velocity.
fn effective_velocity(note: &Note, current: u8) -> u8 {
    if note.stroke == Stroke::TremoloAccelerating {
        note.velocity.max(1)
    } else {
        current.max(1)
    }
}

/// A linear ramp from `start` to `target` over `beats_total` beat visits.
struct RampState {
    start: f64,
    target: f64,
    beats_total: u32,
    beats_elapsed: u32,
}

impl RampState {
    fn value(&self) -> f64 {
        if self.beats_total == 0 {
            self.target
        } else {
            let t = (self.beats_elapsed as f64 / self.beats_total as f64).min(1.0);
            self.start + (self.target - self.start) * t
        }
    }

    fn done(&self) -> bool {
        self.beats_elapsed >= self.beats_total
    }
}

struct Interpreter<'a> {
    score: &'a Score,
    settings: &'a RunSettings,
    order: Vec<Position>,
    tracks: HashMap<Position, Track>,
    meta: Track,
    tick: u64,
    tempo_bpm: f64,
    last_emitted_tempo: Option<f64>,
    velocity: u8,
    tempo_ramp: Option<RampState>,
    dynamics_ramp: Option<RampState>,
    pass_counters: HashMap<BeatId, i32>,
    repeat_remaining: HashMap<BeatId, u32>,
    visited_gongans: HashSet<usize>,
    /// Tick of the most recent sounding note's `note_on`/`note_off` per
    /// position — "a last-note-off reference used for grace-note
    /// reallocation" (spec.md §4.7).
    last_note_on: HashMap<Position, u64>,
    last_note_off: HashMap<Position, u64>,
}

impl<'a> Interpreter<'a> {
    fn new(score: &'a Score, settings: &'a RunSettings) -> Self {
        let mut order: Vec<Position> = Position::ALL
            .iter()
            .copied()
            .filter(|p| score.active_positions.contains(p) || *p == Position::Kempli)
            .collect();
        order.dedup();

        let mut tracks = HashMap::new();
        for &position in &order {
            let mut track = Track::new(position.short_code());
            if let Some(preset) = settings.presets.get(position) {
                track.control_change(0, preset.channel, 0x00, 0);
                track.control_change(0, preset.channel, 0x20, preset.bank);
                track.program_change(0, preset.channel, preset.preset);
            }
            tracks.insert(position, track);
        }

        Interpreter {
            score,
            settings,
            order,
            tracks,
            meta: Track::new("Meta"),
            tick: 0,
            tempo_bpm: DEFAULT_BPM,
            last_emitted_tempo: None,
            velocity: DEFAULT_VELOCITY,
            tempo_ramp: None,
            dynamics_ramp: None,
            pass_counters: HashMap::new(),
            repeat_remaining: HashMap::new(),
            visited_gongans: HashSet::new(),
            last_note_on: HashMap::new(),
            last_note_off: HashMap::new(),
        }
    }

    fn channel_for(&self, position: Position) -> u8 {
        self.settings.presets.get(position).map(|p| p.channel).unwrap_or(0)
    }

    fn duration_to_ticks(&self, units: f64) -> u64 {
        (units.max(0.0) * self.settings.timing.base_note_time as f64).round() as u64
    }

    fn run(&mut self) -> Result<(), GamelanError> {
        self.emit_tempo_if_changed();
        let mut current = self.score.first_beat();
        let max_visits = self.settings.timing.max_pass_limit.max(1) as u64;
        let mut visited: u64 = 0;

        while let Some(beat_id) = current {
            visited += 1;
            if visited > max_visits {
                return Err(GamelanError::Structure {
                    location: Location::default(),
                    message: format!(
                        "flow interpreter exceeded max_pass_limit ({}) without reaching the end of the score; \
                         check for a goto/repeat cycle with no terminating condition",
                        self.settings.timing.max_pass_limit
                    ),
                });
            }

            self.emit_gongan_marker(beat_id);
            let pass_id = self.visit_pass(beat_id);
            self.apply_scheduled_changes(beat_id, pass_id);
            self.emit_beat_notes(beat_id, pass_id);
            self.apply_wait(beat_id);
            current = self.next_beat(beat_id, pass_id);
        }

        self.append_silence_tail();
        Ok(())
    }

    fn visit_pass(&mut self, beat_id: BeatId) -> i32 {
        let counter = self.pass_counters.entry(beat_id).or_insert(0);
        *counter += 1;
        *counter
    }

    fn next_beat(&mut self, beat_id: BeatId, pass_id: i32) -> Option<BeatId> {
        let beat = self.score.beat(beat_id);
        if let Some(repeat) = beat.repeat {
            let remaining = self.repeat_remaining.entry(beat_id).or_insert(repeat.remaining);
            if *remaining > 0 {
                *remaining -= 1;
                return Some(repeat.goto);
            }
        }
        if let Some(&target) = beat.goto.get(&pass_id).or_else(|| beat.goto.get(&DEFAULT_PASS)) {
            return Some(target);
        }
        beat.next
    }

    fn emit_gongan_marker(&mut self, beat_id: BeatId) {
        let beat = self.score.beat(beat_id);
        let gongan = &self.score.gongans[beat.gongan];
        if gongan.beats.first() != Some(&beat_id) || self.visited_gongans.contains(&gongan.id) {
            return;
        }
        self.visited_gongans.insert(gongan.id);
        if gongan.comments.is_empty() {
            return;
        }
        let text = serde_json::to_string(&gongan.comments).unwrap_or_default();
        self.meta.marker(self.tick, text);
    }

    fn apply_scheduled_changes(&mut self, beat_id: BeatId, pass_id: i32) {
        let beat = self.score.beat(beat_id);
        if let Some(ScheduledChange::Tempo { target, beat_count }) =
            beat.scheduled_changes.get(&("tempo", pass_id)).or_else(|| beat.scheduled_changes.get(&("tempo", DEFAULT_PASS))).copied()
        {
            self.tempo_ramp = Some(RampState { start: self.tempo_bpm, target, beats_total: beat_count, beats_elapsed: 0 });
        }
        if let Some(ScheduledChange::Dynamics { target, beat_count }) =
            beat.scheduled_changes.get(&("dynamics", pass_id)).or_else(|| beat.scheduled_changes.get(&("dynamics", DEFAULT_PASS))).copied()
        {
            self.dynamics_ramp = Some(RampState { start: self.velocity as f64, target: target as f64, beats_total: beat_count, beats_elapsed: 0 });
        }

        if let Some(ramp) = &mut self.tempo_ramp {
            ramp.beats_elapsed += 1;
            self.tempo_bpm = ramp.value().max(1.0);
            if ramp.done() {
                self.tempo_ramp = None;
            }
        }
        if let Some(ramp) = &mut self.dynamics_ramp {
            ramp.beats_elapsed += 1;
            self.velocity = ramp.value().round().clamp(1.0, 127.0) as u8;
            if ramp.done() {
                self.dynamics_ramp = None;
            }
        }
        self.emit_tempo_if_changed();
    }

    fn emit_tempo_if_changed(&mut self) {
        let changed = match self.last_emitted_tempo {
            Some(prev) => (prev - self.tempo_bpm).abs() > 1e-6,
            None => true,
        };
        if changed {
            let microseconds_per_quarter = (60_000_000.0 / self.tempo_bpm.max(1.0)).round() as u32;
            self.meta.push(self.tick, MidiMessage::Meta(MetaEvent::Tempo { microseconds_per_quarter }));
            self.last_emitted_tempo = Some(self.tempo_bpm);
        }
    }

    fn emit_beat_notes(&mut self, beat_id: BeatId, pass_id: i32) {
        let beat = self.score.beat(beat_id);
        let beat_ticks = self.duration_to_ticks(beat.duration);

        for i in 0..self.order.len() {
            let position = self.order[i];
            let Some(measure) = beat.measures.get(&position) else { continue };
            let Some(pass) = measure.pass_for(pass_id) else { continue };

            let mut cursor = self.tick;
            for note in &pass.notes {
                let note_ticks = self.duration_to_ticks(note.duration);
                let rest_ticks = self.duration_to_ticks(note.rest_after);
                if note.stroke == Stroke::GraceNote {
                    self.emit_grace_note(position, note, cursor, note_ticks);
                } else if !note.stroke.is_non_sounding() {
                    let velocity = effective_velocity(note, self.velocity);
                    let channel = self.channel_for(position);
                    for key in midi_keys_for(position, note) {
                        if let Some(track) = self.tracks.get_mut(&position) {
                            track.note_on(cursor, channel, key, velocity);
                            track.note_off(cursor + note_ticks, channel, key, 0);
                        }
                    }
                    self.last_note_on.insert(position, cursor);
                    self.last_note_off.insert(position, cursor + note_ticks);
                }
                cursor += note_ticks + rest_ticks;
            }
        }

        self.tick += beat_ticks;
    }

    /// Emits a `GRACE_NOTE` using the threshold-gated reallocation spec.md
    /// §4.7 describes: if the gap since the previous note's `note_off` is
    /// at least `grace_note_threshold`, the grace steals
    /// `min(threshold, gap)` from the preceding rest; otherwise it rewinds
    /// the previous `note_off` by its own duration so it overlays that
    /// note's tail. Either way it then emits its own short note_on/note_off
    /// pair and does not move `last_note_off` — a grace note isn't itself a
    /// valid target for a later grace note's reallocation.
    fn emit_grace_note(&mut self, position: Position, note: &Note, cursor: u64, grace_ticks: u64) {
        let threshold_ticks = self.duration_to_ticks(self.settings.timing.grace_note_threshold);
        let last_off = self.last_note_off.get(&position).copied().unwrap_or(cursor);
        let gap = cursor.saturating_sub(last_off);

        let start = if gap >= threshold_ticks {
            let stolen = threshold_ticks.min(gap);
            cursor.saturating_sub(stolen)
        } else {
            let last_on = self.last_note_on.get(&position).copied().unwrap_or(last_off);
            match self.tracks.get_mut(&position) {
                Some(track) => track.rewind_last_note_off(grace_ticks, last_on).unwrap_or(last_off.saturating_sub(grace_ticks)),
                None => last_off.saturating_sub(grace_ticks),
            }
        };

        let velocity = effective_velocity(note, self.velocity);
        let channel = self.channel_for(position);
        for key in midi_keys_for(position, note) {
            if let Some(track) = self.tracks.get_mut(&position) {
                track.note_on(start, channel, key, velocity);
                track.note_off(start + grace_ticks, channel, key, 0);
            }
        }
    }

    /// WAIT directives reuse the Tempo `ScheduledChange` slot under the
    /// `"wait"` key (builder.rs), since a dedicated variant isn't worth a
    /// third enum arm for one directive. The silence is inserted right
    /// after the beat carrying the scheduled change finishes, regardless
    /// of whether the original directive was anchored to the first or last
    /// beat of its gongan (see DESIGN.md).
    fn apply_wait(&mut self, beat_id: BeatId) {
        let beat = self.score.beat(beat_id);
        if let Some(ScheduledChange::Tempo { target: seconds, .. }) = beat.scheduled_changes.get(&("wait", DEFAULT_PASS)).copied() {
            let ticks_per_second = (self.tempo_bpm / 60.0) * self.settings.timing.ppq as f64;
            self.tick += (seconds * ticks_per_second).max(0.0).round() as u64;
        }
    }

    fn append_silence_tail(&mut self) {
        let ticks_per_second = (self.tempo_bpm / 60.0) * self.settings.timing.ppq as f64;
        let tail_seconds = self.settings.timing.silence_seconds_after_music_end + self.settings.timing.silence_seconds_after_end;
        self.tick += (tail_seconds * ticks_per_second).max(0.0).round() as u64;
        self.meta.marker(self.tick, "end-of-performance");
    }

    fn finish(mut self) -> MidiFile {
        let mut file = MidiFile::new(self.settings.timing.ppq);
        file.add_track(self.meta);
        for position in self.order.clone() {
            if let Some(track) = self.tracks.remove(&position) {
                file.add_track(track);
            }
        }
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gongan, GonganType, Measure, Pass, RepeatRecord};
    use crate::note::Note;
    use crate::tone::{Pitch, Tone};

    fn linear_score(beat_durations: &[f64]) -> Score {
        let mut score = Score::new("t".to_string());
        let gongan_id = 0;
        score.gongans.push(Gongan::new(gongan_id, GonganType::Regular));
        for &duration in beat_durations {
            let beat_id = score.push_beat(gongan_id);
            let mut measure = Measure::new(Position::Jegogan);
            let note = Note::filler(Position::Jegogan, Stroke::Silence, duration);
            measure.passes.insert(DEFAULT_PASS, Pass { notes: vec![note], line: None });
            score.beat_mut(beat_id).measures.insert(Position::Jegogan, measure);
            score.beat_mut(beat_id).duration = duration;
            score.gongans[gongan_id].beats.push(beat_id);
        }
        for window in score.gongans[gongan_id].beats.clone().windows(2) {
            score.beat_mut(window[0]).next = Some(window[1]);
            score.beat_mut(window[1]).prev = Some(window[0]);
        }
        score.active_positions = vec![Position::Jegogan];
        score
    }

    fn sounding_note(position: Position, pitch: Pitch, octave: i8, duration: f64) -> Note {
        Note {
            position,
            tone: Tone::new(pitch, Some(octave)),
            stroke: Stroke::Open,
            duration,
            rest_after: 0.0,
            symbol: "i".to_string(),
            modifiers: Vec::new(),
            velocity: 90,
            midi_notes: Vec::new(),
            sample_file: None,
        }
    }

    #[test]
    fn emits_one_track_per_active_position_plus_meta() {
        let score = linear_score(&[1.0, 1.0]);
        let settings = RunSettings::minimal_for_tests();
        let file = emit(&score, &settings).unwrap();
        assert_eq!(file.ticks_per_quarter, settings.timing.ppq);
    }

    #[test]
    fn ticks_advance_by_duration_times_base_note_time() {
        let score = linear_score(&[1.0, 2.0]);
        let settings = RunSettings::minimal_for_tests();
        let mut interpreter = Interpreter::new(&score, &settings);
        interpreter.run().unwrap();
        let expected = ((1.0 + 2.0) * settings.timing.base_note_time as f64).round() as u64;
        let tail = settings.timing.silence_seconds_after_end + settings.timing.silence_seconds_after_music_end;
        let tail_ticks = (tail * (DEFAULT_BPM / 60.0) * settings.timing.ppq as f64).round() as u64;
        assert_eq!(interpreter.tick, expected + tail_ticks);
    }

    #[test]
    fn repeat_record_revisits_the_loop_before_advancing() {
        let mut score = linear_score(&[1.0, 1.0, 1.0]);
        let beats = score.gongans[0].beats.clone();
        score.beat_mut(beats[1]).repeat = Some(RepeatRecord { goto: beats[0], remaining: 1 });
        let settings = RunSettings::minimal_for_tests();
        let mut interpreter = Interpreter::new(&score, &settings);
        interpreter.run().unwrap();
        // beats[0] is visited twice (once, then once more via the repeat).
        assert_eq!(*interpreter.pass_counters.get(&beats[0]).unwrap(), 2);
    }

    #[test]
    fn an_unterminated_cycle_trips_the_max_pass_limit_guard() {
        let mut score = linear_score(&[1.0]);
        let only = score.gongans[0].beats[0];
        score.beat_mut(only).goto.insert(DEFAULT_PASS, only);
        let mut settings = RunSettings::minimal_for_tests();
        settings.timing.max_pass_limit = 5;
        let result = emit(&score, &settings);
        assert!(matches!(result, Err(GamelanError::Structure { .. })));
    }

    #[test]
    fn tempo_ramp_interpolates_linearly_over_beat_count() {
        let mut score = linear_score(&[1.0, 1.0, 1.0]);
        let beats = score.gongans[0].beats.clone();
        score.beat_mut(beats[0]).scheduled_changes.insert(
            ("tempo", DEFAULT_PASS),
            ScheduledChange::Tempo { target: 120.0, beat_count: 2 },
        );
        let settings = RunSettings::minimal_for_tests();
        let mut interpreter = Interpreter::new(&score, &settings);
        interpreter.run().unwrap();
        assert_eq!(interpreter.tempo_bpm, 120.0);
    }

    #[test]
    fn sounding_notes_produce_paired_note_on_and_note_off() {
        let mut score = linear_score(&[1.0]);
        let beat_id = score.gongans[0].beats[0];
        let mut measure = Measure::new(Position::Ugal);
        measure.passes.insert(DEFAULT_PASS, Pass { notes: vec![sounding_note(Position::Ugal, Pitch::Ding, 1, 1.0)], line: None });
        score.beat_mut(beat_id).measures.insert(Position::Ugal, measure);
        score.active_positions.push(Position::Ugal);

        let settings = RunSettings::minimal_for_tests();
        let mut interpreter = Interpreter::new(&score, &settings);
        interpreter.run().unwrap();
        let file = interpreter.finish();
        let _ = file;
    }

    fn grace_note(position: Position, pitch: Pitch, octave: i8, duration: f64) -> Note {
        Note {
            position,
            tone: Tone::new(pitch, Some(octave)),
            stroke: Stroke::GraceNote,
            duration,
            rest_after: 0.0,
            symbol: "A".to_string(),
            modifiers: Vec::new(),
            velocity: 90,
            midi_notes: Vec::new(),
            sample_file: None,
        }
    }

    #[test]
    fn grace_note_rewinds_previous_note_off_when_gap_is_small() {
        let mut score = linear_score(&[1.25]);
        let beat_id = score.gongans[0].beats[0];
        let mut measure = Measure::new(Position::Jegogan);
        measure.passes.insert(
            DEFAULT_PASS,
            Pass { notes: vec![sounding_note(Position::Jegogan, Pitch::Ding, 1, 1.0), grace_note(Position::Jegogan, Pitch::Dong, 1, 0.25)], line: None },
        );
        score.beat_mut(beat_id).measures.insert(Position::Jegogan, measure);

        let settings = RunSettings::minimal_for_tests();
        let mut interpreter = Interpreter::new(&score, &settings);
        interpreter.run().unwrap();

        let track = &interpreter.tracks[&Position::Jegogan];
        let note_ons: Vec<u64> = track.events().iter().filter(|e| matches!(e.message, MidiMessage::NoteOn { .. })).map(|e| e.tick).collect();
        let note_offs: Vec<u64> = track.events().iter().filter(|e| matches!(e.message, MidiMessage::NoteOff { .. })).map(|e| e.tick).collect();

        // The gap between the first note's end (tick 480) and the grace
        // note's cursor (also 480) is zero, below the default threshold
        // (0.25 beats = 120 ticks), so the grace rewinds the previous
        // note-off by its own duration (0.25 beats = 120 ticks) instead of
        // stealing from a (nonexistent) rest.
        assert_eq!(note_ons, vec![0, 360]);
        assert_eq!(note_offs, vec![360, 480]);
    }

    #[test]
    fn grace_note_steals_from_preceding_rest_when_gap_is_large() {
        let mut score = linear_score(&[1.375]);
        let beat_id = score.gongans[0].beats[0];
        let mut measure = Measure::new(Position::Jegogan);
        let mut lead = sounding_note(Position::Jegogan, Pitch::Ding, 1, 0.25);
        lead.rest_after = 1.0;
        measure.passes.insert(
            DEFAULT_PASS,
            Pass { notes: vec![lead, grace_note(Position::Jegogan, Pitch::Dong, 1, 0.125)], line: None },
        );
        score.beat_mut(beat_id).measures.insert(Position::Jegogan, measure);

        let settings = RunSettings::minimal_for_tests();
        let mut interpreter = Interpreter::new(&score, &settings);
        interpreter.run().unwrap();

        let track = &interpreter.tracks[&Position::Jegogan];
        let note_ons: Vec<u64> = track.events().iter().filter(|e| matches!(e.message, MidiMessage::NoteOn { .. })).map(|e| e.tick).collect();
        let note_offs: Vec<u64> = track.events().iter().filter(|e| matches!(e.message, MidiMessage::NoteOff { .. })).map(|e| e.tick).collect();

        // The gap between the first note's end (tick 120) and the grace
        // note's cursor (tick 600) is 480 ticks, at least the default
        // threshold (120 ticks), so the grace steals `threshold` ticks from
        // the preceding rest and the previous note-off is left untouched.
        assert_eq!(note_ons, vec![0, 480]);
        assert_eq!(note_offs, vec![120, 540]);
    }

    #[test]
    fn gongan_comments_become_a_marker_at_the_first_beat() {
        let mut score = linear_score(&[1.0]);
        score.gongans[0].comments.push("asal mula".to_string());
        let settings = RunSettings::minimal_for_tests();
        let mut interpreter = Interpreter::new(&score, &settings);
        interpreter.run().unwrap();
        let _ = interpreter.finish();
    }
}
