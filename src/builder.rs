//! # ScoreBuilder (Stage B, part 2)
//!
//! Transposes resolved staves into the beat graph, casts raw symbol text
//! into typed [`Note`]s, and elaborates shorthand notation into fully
//! explicit measures. This is the largest single stage in the pipeline:
//! turning raw tokens into a fully elaborated `Score` is most of the work.

use crate::error::{Diagnostics, GamelanError, Location};
use crate::grammar::RawGongan;
use crate::metadata::{self, KempliStatus, MetaData, Scope};
use crate::model::{
    BeatId, Gongan, GonganType, Measure, Pass, PendingGoto, RepeatRecord, Score, ScheduledChange, DEFAULT_PASS,
};
use crate::note::{Note, ValidNoteEntry};
use crate::position::Position;
use crate::rules;
use crate::settings::{FontEntry, Modifier, RuleKind, RunSettings};
use crate::tags::{self, ResolvedStave};
use crate::tone::{Pitch, Stroke, Tone};
use std::collections::HashMap;

/// Builds the full [`Score`] from the grammar stage's raw gongans.
pub fn build(raw_gongans: Vec<RawGongan>, settings: &RunSettings) -> (Score, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut score = Score::new(String::new());
    let mut score_level_metadata: Vec<MetaData> = Vec::new();

    for raw_gongan in &raw_gongans {
        let gongan_id = raw_gongan.id;
        let resolved_staves = tags::resolve_staves(&raw_gongan.staves, gongan_id, settings, &mut diagnostics);

        let mut bound_metadata: Vec<MetaData> = raw_gongan
            .metadata
            .iter()
            .filter_map(|raw| {
                let location = Location { gongan: Some(gongan_id), beat: None, position: None, line: Some(raw.line) };
                metadata::bind(raw, settings, &location, &mut diagnostics)
            })
            .collect();
        bound_metadata.sort_by_key(MetaData::priority);

        let kind = bound_metadata
            .iter()
            .find_map(|m| match m {
                MetaData::Gongan { kind, .. } => Some(*kind),
                _ => None,
            })
            .unwrap_or(GonganType::Regular);

        let beat_count = resolved_staves.iter().map(|s| s.measures.len()).max().unwrap_or(1).max(1);
        let mut gongan = Gongan::new(gongan_id, kind);
        gongan.comments = raw_gongan.comments.clone();

        let mut beat_ids = Vec::with_capacity(beat_count);
        for _ in 0..beat_count {
            beat_ids.push(score.push_beat(gongan_id));
        }
        gongan.beats = beat_ids.clone();

        for group in group_staves_by_source(&resolved_staves) {
            let positions: Vec<Position> = group.iter().map(|s| s.position).collect();
            let rule = if group.len() > 1 { Some(rules::select_rule(&positions)) } else { None };
            let primary = group[0];

            for stave in &group {
                if !score.active_positions.contains(&stave.position) {
                    score.active_positions.push(stave.position);
                }
            }

            let passes: Vec<i32> = primary.passes.clone().unwrap_or_else(|| vec![DEFAULT_PASS]);
            for (beat_index, symbols) in primary.measures.iter().enumerate() {
                let beat_id = beat_ids[beat_index];
                let primary_location = Location {
                    gongan: Some(gongan_id),
                    beat: Some(beat_index),
                    position: Some(primary.position),
                    line: Some(primary.line),
                };
                let primary_notes = cast_symbols(symbols, primary.position, settings, &primary_location, &mut diagnostics);
                insert_measure(&mut score, beat_id, primary.position, &passes, primary_notes.clone(), primary.line);

                for stave in group.iter().skip(1) {
                    let rule = rule.expect("groups of size > 1 always select a rule");
                    let secondary_location = Location {
                        gongan: Some(gongan_id),
                        beat: Some(beat_index),
                        position: Some(stave.position),
                        line: Some(stave.line),
                    };
                    let derived = derive_secondary_notes(&primary_notes, rule, stave.position, settings, &secondary_location, &mut diagnostics);
                    insert_measure(&mut score, beat_id, stave.position, &passes, derived, stave.line);
                }
            }
        }

        for beat_id in &beat_ids {
            score.beat_mut(*beat_id).recompute_duration();
        }

        bind_metadata_to_gongan(&mut gongan, &beat_ids, &bound_metadata, &mut score, gongan_id, &mut diagnostics);

        for item in &bound_metadata {
            if item.scope() == Scope::Score {
                score_level_metadata.push(item.clone());
            }
        }
        gongan.metadata = bound_metadata;

        score.gongans.push(gongan);
    }

    link_beats(&mut score);
    apply_score_level_metadata(&mut score, &score_level_metadata, &mut diagnostics);
    fill_missing_measures(&mut score, settings);
    expand_shorthand_pokok(&mut score, settings);
    realign_beat_at_end(&mut score, settings);
    resolve_grace_notes(&mut score, settings, &mut diagnostics);
    resolve_sequences(&mut score, &mut diagnostics);
    apply_octavate(&mut score, settings, &mut diagnostics);

    (score, diagnostics)
}

/// Groups a gongan's resolved staves by the raw stave line they came from
///,
/// preserving the order the raw staves appeared in. The first member of
/// each group is its primary position; later members are derived from it
/// via [`rules::select_rule`] rather than cast independently.
fn group_staves_by_source(staves: &[ResolvedStave]) -> Vec<Vec<&ResolvedStave>> {
    let mut groups: Vec<Vec<&ResolvedStave>> = Vec::new();
    let mut index_of: HashMap<usize, usize> = HashMap::new();
    for stave in staves {
        let idx = *index_of.entry(stave.group).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[idx].push(stave);
    }
    groups
}

/// Derives a secondary position's notes from the primary position's already
/// cast notes via the selected rule. Non-sounding notes
/// (extensions, silences, kempli strikes) are carried over unchanged; a
/// melodic note the rule cannot place anywhere in the secondary position's
/// valid-note table is reported and falls back to the primary's own tone.
fn derive_secondary_notes(
    primary_notes: &[Note],
    rule: RuleKind,
    position: Position,
    settings: &RunSettings,
    location: &Location,
    diagnostics: &mut Diagnostics,
) -> Vec<Note> {
    let valid_notes: &[ValidNoteEntry] = settings.valid_notes.get(position);
    primary_notes
        .iter()
        .map(|note| {
            if note.stroke.is_non_sounding() {
                let mut derived = note.clone();
                derived.position = position;
                return derived;
            }
            match rules::apply_rule(rule, note.tone, note.stroke, note.duration, valid_notes) {
                Some(tone) => Note {
                    position,
                    tone,
                    stroke: note.stroke,
                    duration: note.duration,
                    rest_after: note.rest_after,
                    symbol: note.symbol.clone(),
                    modifiers: note.modifiers.clone(),
                    velocity: note.velocity,
                    midi_notes: Vec::new(),
                    sample_file: None,
                },
                None => {
                    diagnostics.error(GamelanError::Range {
                        location: location.clone(),
                        message: format!("rule {rule:?} has no valid derived tone for {position} from {:?}", note.tone),
                    });
                    let mut derived = note.clone();
                    derived.position = position;
                    derived
                }
            }
        })
        .collect()
}

/// Installs `notes` as the measure for `position` at `beat_id` across every
/// listed pass id, creating the measure if this is its first stave.
fn insert_measure(score: &mut Score, beat_id: BeatId, position: Position, passes: &[i32], notes: Vec<Note>, line: usize) {
    let beat = score.beat_mut(beat_id);
    let measure = beat.measures.entry(position).or_insert_with(|| Measure::new(position));
    for &pass_id in passes {
        measure.passes.insert(pass_id, Pass { notes: notes.clone(), line: Some(line) });
    }
}

/// Orders the arena's beats into one doubly-linked chain across all
/// gongans: `Beat.prev`/`next` form a list whose head is (gongan 1, beat 1)
/// and whose tail's `next` is `None`.
fn link_beats(score: &mut Score) {
    let all_beats: Vec<BeatId> = score.gongans.iter().flat_map(|g| g.beats.iter().copied()).collect();
    for window in all_beats.windows(2) {
        let (a, b) = (window[0], window[1]);
        score.beat_mut(a).next = Some(b);
        score.beat_mut(b).prev = Some(a);
    }
}

fn bind_metadata_to_gongan(
    gongan: &mut Gongan,
    beat_ids: &[BeatId],
    metadata: &[MetaData],
    score: &mut Score,
    gongan_id: usize,
    diagnostics: &mut Diagnostics,
) {
    for item in metadata {
        if item.scope() == Scope::Score {
            continue;
        }
        apply_one_metadata(item, beat_ids, score, gongan_id, diagnostics);
    }
}

fn apply_score_level_metadata(score: &mut Score, items: &[MetaData], diagnostics: &mut Diagnostics) {
    let gongan_count = score.gongans.len();
    for gongan_index in 0..gongan_count {
        let beat_ids = score.gongans[gongan_index].beats.clone();
        for item in items {
            apply_one_metadata(item, &beat_ids, score, gongan_index, diagnostics);
        }
    }
}

fn apply_one_metadata(item: &MetaData, beat_ids: &[BeatId], score: &mut Score, gongan_id: usize, diagnostics: &mut Diagnostics) {
    let location = Location { gongan: Some(gongan_id), beat: None, position: None, line: None };
    match item {
        MetaData::Label { name, beat, .. } => {
            let index = beat.map(|b| b.saturating_sub(1)).unwrap_or(0).min(beat_ids.len().saturating_sub(1));
            if let Some(&beat_id) = beat_ids.get(index) {
                if score.flow.labels.insert(name.clone(), beat_id).is_some() {
                    diagnostics.error(GamelanError::Resolution {
                        location,
                        message: format!("label {name:?} is defined more than once"),
                    });
                } else {
                    resolve_pending_gotos_for(score, name, diagnostics);
                }
            }
        }
        MetaData::Goto { label, from_beat, passes, .. } => {
            let index = from_beat.map(|b| b.saturating_sub(1)).unwrap_or(beat_ids.len().saturating_sub(1));
            if let Some(&from) = beat_ids.get(index) {
                if let Some(&target) = score.flow.labels.get(label) {
                    install_goto(score, from, target, passes);
                } else {
                    score.flow.pending_gotos.push(PendingGoto { label: label.clone(), from_beat: from, passes: passes.clone() });
                }
            }
        }
        MetaData::Repeat { count, .. } => {
            if let (Some(&first), Some(&last)) = (beat_ids.first(), beat_ids.last()) {
                score.beat_mut(last).repeat = Some(RepeatRecord { goto: first, remaining: count.saturating_sub(1) });
            }
        }
        MetaData::Sequence { labels, .. } => {
            score.flow.sequences.push(labels.clone());
        }
        MetaData::Tempo { value, first_beat, beat_count, passes, .. } => {
            schedule_change(score, beat_ids, *first_beat, *beat_count, passes, ScheduledChangeKind::Tempo(*value));
        }
        MetaData::Dynamics { value, first_beat, beat_count, passes, .. } => {
            schedule_change(score, beat_ids, *first_beat, *beat_count, passes, ScheduledChangeKind::Dynamics(*value));
        }
        MetaData::Kempli { status, beats, .. } => {
            let targets = target_beats(beat_ids, beats);
            for beat_id in targets {
                score.beat_mut(beat_id).has_kempli_beat = *status == KempliStatus::On;
            }
        }
        MetaData::Suppress { positions, beats, passes, .. } => {
            let targets = target_beats(beat_ids, beats);
            for beat_id in targets {
                let duration = score.beat(beat_id).duration;
                let beat = score.beat_mut(beat_id);
                for position in positions {
                    let measure = beat.measures.entry(*position).or_insert_with(|| Measure::new(*position));
                    let pass_ids: Vec<i32> = passes.clone().unwrap_or_else(|| vec![DEFAULT_PASS]);
                    for pass_id in pass_ids {
                        measure.passes.insert(pass_id, Pass { notes: vec![Note::filler(*position, Stroke::Extension, duration)], line: None });
                    }
                }
            }
        }
        MetaData::Wait { seconds, after, .. } => {
            if let Some(&beat_id) = if *after { beat_ids.last() } else { beat_ids.first() } {
                score.beat_mut(beat_id).scheduled_changes.insert(("wait", DEFAULT_PASS), ScheduledChange::Tempo { target: *seconds, beat_count: 0 });
            }
        }
        MetaData::Validation { beats, ignore, .. } => {
            let targets = target_beats(beat_ids, beats);
            for beat_id in targets {
                score.beat_mut(beat_id).validation_ignore.extend(ignore.iter().copied());
            }
        }
        MetaData::Gongan { .. } | MetaData::Part { .. } | MetaData::Comment { .. } | MetaData::Octavate { .. } => {}
    }
}

enum ScheduledChangeKind {
    Tempo(f64),
    Dynamics(u8),
}

fn schedule_change(score: &mut Score, beat_ids: &[BeatId], first_beat: usize, beat_count: u32, passes: &[i32], kind: ScheduledChangeKind) {
    let index = first_beat.saturating_sub(1).min(beat_ids.len().saturating_sub(1));
    let Some(&beat_id) = beat_ids.get(index) else { return };
    let key_name = match kind {
        ScheduledChangeKind::Tempo(_) => "tempo",
        ScheduledChangeKind::Dynamics(_) => "dynamics",
    };
    let change = match kind {
        ScheduledChangeKind::Tempo(target) => ScheduledChange::Tempo { target, beat_count },
        ScheduledChangeKind::Dynamics(target) => ScheduledChange::Dynamics { target, beat_count },
    };
    let pass_key = passes.first().copied().unwrap_or(DEFAULT_PASS);
    score.beat_mut(beat_id).scheduled_changes.insert((key_name, pass_key), change);
}

fn target_beats(beat_ids: &[BeatId], beats: &Option<Vec<usize>>) -> Vec<BeatId> {
    match beats {
        None => beat_ids.to_vec(),
        Some(list) => list.iter().filter_map(|&b| beat_ids.get(b.saturating_sub(1)).copied()).collect(),
    }
}

fn install_goto(score: &mut Score, from: BeatId, target: BeatId, passes: &[i32]) {
    if passes.is_empty() {
        score.beat_mut(from).goto.insert(DEFAULT_PASS, target);
    } else {
        for &pass in passes {
            score.beat_mut(from).goto.insert(pass, target);
        }
    }
}

fn resolve_pending_gotos_for(score: &mut Score, label: &str, diagnostics: &mut Diagnostics) {
    let target = match score.flow.labels.get(label) {
        Some(&beat_id) => beat_id,
        None => return,
    };
    let mut remaining = Vec::new();
    let pending = std::mem::take(&mut score.flow.pending_gotos);
    for goto in pending {
        if goto.label == label {
            install_goto(score, goto.from_beat, target, &goto.passes);
        } else {
            remaining.push(goto);
        }
    }
    score.flow.pending_gotos = remaining;
    let _ = diagnostics;
}

/// Expands one raw symbol sequence into typed notes, including inline
/// tremolo expansion. Grace-note
/// duration stealing and octave selection happen afterward, across the
/// whole score, in [`resolve_grace_notes`].
fn cast_symbols(
    symbols: &[String],
    position: Position,
    settings: &RunSettings,
    location: &Location,
    diagnostics: &mut Diagnostics,
) -> Vec<Note> {
    let mut notes = Vec::new();
    for symbol in symbols {
        match cast_one_symbol(symbol, position, settings, location, diagnostics) {
            Some(mut expanded) => notes.append(&mut expanded),
            None => {}
        }
    }
    notes
}

fn canonical_modifiers(symbol: &str) -> (char, Vec<char>) {
    let mut chars = symbol.chars();
    let base = chars.next().unwrap_or('.');
    let mut modifiers: Vec<char> = chars.collect();
    modifiers.sort_by_key(|c| crate::settings::FontTable::canonical_modifier_order(*c));
    (base, modifiers)
}

fn cast_one_symbol(
    symbol: &str,
    position: Position,
    settings: &RunSettings,
    location: &Location,
    diagnostics: &mut Diagnostics,
) -> Option<Vec<Note>> {
    let (base, modifiers) = canonical_modifiers(symbol);
    let Some(&FontEntry { pitch, mut octave, mut stroke, mut duration, rest_after }) = settings.font.base_symbols.get(&base) else {
        diagnostics.error(GamelanError::Symbol {
            location: location.clone(),
            message: format!("unknown character {base:?} in symbol {symbol:?}"),
        });
        return None;
    };

    for &modifier_char in &modifiers {
        match settings.font.modifiers.get(&modifier_char) {
            Some(Modifier::OctaveUp) => octave = octave.map(|o| o + 1),
            Some(Modifier::OctaveDown) => octave = octave.map(|o| o - 1),
            Some(Modifier::Abbreviated) => stroke = Stroke::Abbreviated,
            Some(Modifier::Muted) => stroke = Stroke::Muted,
            Some(Modifier::Half) => duration /= 2.0,
            Some(Modifier::Quarter) => duration /= 4.0,
            Some(Modifier::Tremolo) => stroke = Stroke::Tremolo,
            Some(Modifier::TremoloAccelerating) => stroke = Stroke::TremoloAccelerating,
            Some(Modifier::GraceBefore(_)) | None => {
                diagnostics.error(GamelanError::Symbol {
                    location: location.clone(),
                    message: format!("illegal modifier {modifier_char:?} in symbol {symbol:?}"),
                });
                return None;
            }
        }
    }

    let tone = Tone::new(pitch, octave);

    if stroke.is_tremolo() {
        return Some(expand_tremolo(tone, stroke, duration, position, settings, symbol, modifiers));
    }

    if stroke.is_non_sounding() {
        return Some(vec![Note::filler(position, stroke, duration)]);
    }

    let valid_notes = settings.valid_notes.get(position);
    match Note::cast(position, tone, stroke, duration, rest_after, symbol.to_string(), modifiers, 0, valid_notes, location.clone()) {
        Ok(note) => Some(vec![note]),
        Err(err) => {
            diagnostics.error(err);
            None
        }
    }
}

/// Replaces a TREMOLO/TREMOLO_ACCELERATING symbol with its expansion into
/// several shorter notes. Plain TREMOLO divides the parent duration into
/// `round(duration * tremolo_notes_per_quarter)` equal notes;
/// TREMOLO_ACCELERATING follows the configured pattern/velocity arrays,
/// carrying the pattern's velocity explicitly (0 elsewhere signals
/// "inherit the flow interpreter's current dynamics").
fn expand_tremolo(tone: Tone, stroke: Stroke, duration: f64, position: Position, settings: &RunSettings, symbol: &str, modifiers: Vec<char>) -> Vec<Note> {
    let mut notes = Vec::new();
    if stroke == Stroke::Tremolo {
        let n = (duration * settings.timing.tremolo_notes_per_quarter).round().max(1.0) as usize;
        let each = duration / n as f64;
        for _ in 0..n {
            notes.push(Note {
                position,
                tone,
                stroke: Stroke::Tremolo,
                duration: each,
                rest_after: 0.0,
                symbol: symbol.to_string(),
                modifiers: modifiers.clone(),
                velocity: 0,
                midi_notes: Vec::new(),
                sample_file: None,
            });
        }
    } else {
        let pattern = &settings.timing.accelerating_pattern;
        let velocities = &settings.timing.accelerating_velocity;
        let mut remaining = duration;
        let mut i = 0;
        while remaining > 1e-9 && i < pattern.len() * 8 {
            let idx = i % pattern.len();
            let this_duration = pattern[idx].min(remaining);
            let velocity = velocities.get(idx).copied().unwrap_or(90);
            notes.push(Note {
                position,
                tone,
                stroke: Stroke::TremoloAccelerating,
                duration: this_duration,
                rest_after: 0.0,
                symbol: symbol.to_string(),
                modifiers: modifiers.clone(),
                velocity: velocity.max(1),
                midi_notes: Vec::new(),
                sample_file: None,
            });
            remaining -= this_duration;
            i += 1;
        }
    }
    notes
}

/// Default-fills every beat's missing positions and installs the KEMPLI
/// pulse.
fn fill_missing_measures(score: &mut Score, settings: &RunSettings) {
    let mut positions_to_fill = score.active_positions.clone();
    if !positions_to_fill.contains(&Position::Kempli) {
        positions_to_fill.push(Position::Kempli);
    }
    let mut last_stroke: HashMap<Position, Stroke> = HashMap::new();
    let mut sounded_in_gongan: HashMap<(usize, Position), bool> = HashMap::new();
    let gongan_kinds: HashMap<usize, GonganType> = score.gongans.iter().map(|g| (g.id, g.kind)).collect();

    let all_beats: Vec<BeatId> = score.gongans.iter().flat_map(|g| g.beats.iter().copied()).collect();
    for beat_id in all_beats {
        let gongan_id = score.beat(beat_id).gongan;
        let duration = score.beat(beat_id).duration.max(1.0);
        let has_kempli_beat = score.beat(beat_id).has_kempli_beat && gongan_kinds.get(&gongan_id) == Some(&GonganType::Regular);

        for &position in &positions_to_fill {
            let beat = score.beat_mut(beat_id);
            let already_present = beat.measures.contains_key(&position);
            if already_present {
                if let Some(last) = beat.measures[&position].passes.get(&DEFAULT_PASS).and_then(|p| p.notes.last()) {
                    last_stroke.insert(position, last.stroke);
                }
                sounded_in_gongan.insert((gongan_id, position), true);
                continue;
            }

            if position == Position::Kempli {
                if !has_kempli_beat {
                    continue;
                }
                let mut notes = vec![Note::cast(
                    Position::Kempli,
                    Tone::new(Pitch::Strike, None),
                    Stroke::Muted,
                    1.0,
                    0.0,
                    "+".to_string(),
                    Vec::new(),
                    0,
                    settings.valid_notes.get(Position::Kempli),
                    Location::default(),
                )
                .unwrap_or_else(|_| Note::filler(Position::Kempli, Stroke::Extension, 1.0))];
                if duration > 1.0 {
                    notes.push(Note::filler(Position::Kempli, Stroke::Extension, duration - 1.0));
                }
                let mut measure = Measure::new(Position::Kempli);
                measure.passes.insert(DEFAULT_PASS, Pass { notes, line: None });
                score.beat_mut(beat_id).measures.insert(Position::Kempli, measure);
                continue;
            }

            let never_sounded = !*sounded_in_gongan.get(&(gongan_id, position)).unwrap_or(&false);
            let previous_was_silence = last_stroke.get(&position).copied() == Some(Stroke::Silence);
            let stroke = if previous_was_silence || never_sounded { Stroke::Silence } else { Stroke::Extension };
            let mut measure = Measure::new(position);
            measure.passes.insert(DEFAULT_PASS, Pass { notes: vec![Note::filler(position, stroke, duration)], line: None });
            score.beat_mut(beat_id).measures.insert(position, measure);
            last_stroke.insert(position, stroke);
        }
        score.beat_mut(beat_id).recompute_duration();
    }
}

/// Pads shorthand-set measures out to the beat's duration with EXTENSION
/// rests.
fn expand_shorthand_pokok(score: &mut Score, settings: &RunSettings) {
    let shorthand: Vec<Position> = settings.shorthand_positions.clone();
    let beat_at_end = settings.timing.beat_at_end;
    let all_beats: Vec<BeatId> = score.gongans.iter().flat_map(|g| g.beats.iter().copied()).collect();
    for beat_id in all_beats {
        let duration = score.beat(beat_id).duration;
        let beat = score.beat_mut(beat_id);
        for position in &shorthand {
            let Some(measure) = beat.measures.get_mut(position) else { continue };
            let Some(pass) = measure.passes.get_mut(&DEFAULT_PASS) else { continue };
            let current = pass.total_duration();
            let remainder = duration - current;
            if remainder > 1e-9 {
                let filler = Note::filler(*position, Stroke::Extension, remainder);
                if beat_at_end {
                    pass.notes.insert(0, filler);
                } else {
                    pass.notes.push(filler);
                }
            }
        }
    }
}

/// Shifts one unit of duration from the end of every beat to the start of
/// the next. Every note is conceptually the anacrusis of the following
/// beat, so the cascade is uniform across the whole score: the first beat
/// has nothing to receive from a predecessor, so it gains a leading
/// SILENCE unit instead; the final beat's shifted-out unit has nowhere to
/// land, so a new trailing beat is appended to hold it. Runs before
/// SEQUENCE resolution — see DESIGN.md for why that ordering was chosen.
fn realign_beat_at_end(score: &mut Score, settings: &RunSettings) {
    if !settings.timing.beat_at_end {
        return;
    }

    let mut positions: Vec<Position> = score.active_positions.clone();
    if !positions.contains(&Position::Kempli) {
        positions.push(Position::Kempli);
    }

    let all_beats: Vec<BeatId> = score.gongans.iter().flat_map(|g| g.beats.iter().copied()).collect();
    let Some(&last_original_beat) = all_beats.last() else { return };

    let mut carry: HashMap<Position, Vec<Note>> =
        positions.iter().map(|&p| (p, vec![Note::filler(p, Stroke::Silence, 1.0)])).collect();

    for &beat_id in &all_beats {
        for &position in &positions {
            let incoming = carry.remove(&position).unwrap_or_default();
            if incoming.is_empty() {
                continue;
            }
            let beat = score.beat_mut(beat_id);
            let measure = beat.measures.entry(position).or_insert_with(|| Measure::new(position));
            let pass = measure.passes.entry(DEFAULT_PASS).or_default();
            for note in incoming.into_iter().rev() {
                pass.notes.insert(0, note);
            }
        }

        let mut outgoing: HashMap<Position, Vec<Note>> = HashMap::new();
        for &position in &positions {
            let beat = score.beat_mut(beat_id);
            let taken = beat
                .measures
                .get_mut(&position)
                .and_then(|m| m.passes.get_mut(&DEFAULT_PASS))
                .map(|pass| take_trailing_duration(&mut pass.notes, 1.0))
                .unwrap_or_default();
            outgoing.insert(position, taken);
        }
        score.beat_mut(beat_id).recompute_duration();
        carry = outgoing;
    }

    let gongan_id = score.gongans.last().expect("build() always creates at least one gongan").id;
    let new_beat_id = score.push_beat(gongan_id);
    for &position in &positions {
        let notes = carry.remove(&position).unwrap_or_default();
        let mut measure = Measure::new(position);
        measure.passes.insert(DEFAULT_PASS, Pass { notes, line: None });
        score.beat_mut(new_beat_id).measures.insert(position, measure);
    }
    score.beat_mut(new_beat_id).recompute_duration();
    score.beat_mut(last_original_beat).next = Some(new_beat_id);
    score.beat_mut(new_beat_id).prev = Some(last_original_beat);
    if let Some(last_gongan) = score.gongans.last_mut() {
        last_gongan.beats.push(new_beat_id);
    }
}

/// Removes `amount` worth of trailing duration from `notes`, splitting the
/// last note if it straddles the cut, and returns the removed tail in its
/// original order so the caller can prepend it to the next beat.
fn take_trailing_duration(notes: &mut Vec<Note>, amount: f64) -> Vec<Note> {
    let mut remaining = amount;
    let mut carried: Vec<Note> = Vec::new();
    while remaining > 1e-9 {
        let Some(last) = notes.last_mut() else { break };
        let last_total = last.total_duration();
        if last_total <= remaining + 1e-9 {
            remaining -= last_total;
            carried.insert(0, notes.pop().expect("notes.last_mut() just returned Some"));
            continue;
        }

        let mut take = remaining;
        let from_rest = take.min(last.rest_after);
        last.rest_after -= from_rest;
        take -= from_rest;
        if take > 1e-9 {
            last.duration = (last.duration - take).max(0.0);
            let stroke = if last.stroke.is_non_sounding() { last.stroke } else { Stroke::Extension };
            carried.insert(
                0,
                Note {
                    position: last.position,
                    tone: last.tone,
                    stroke,
                    duration: take,
                    rest_after: from_rest,
                    symbol: last.symbol.clone(),
                    modifiers: last.modifiers.clone(),
                    velocity: last.velocity,
                    midi_notes: Vec::new(),
                    sample_file: None,
                },
            );
        } else if from_rest > 1e-9 {
            carried.insert(0, Note::filler(last.position, Stroke::Silence, from_rest));
        }
        remaining = 0.0;
    }
    carried
}

/// Grace-note duration stealing and octave selection. Runs after every
/// measure is in place so a grace note at the start of a beat can steal
/// from the previous beat — possibly in the previous gongan.
fn resolve_grace_notes(score: &mut Score, settings: &RunSettings, diagnostics: &mut Diagnostics) {
    let _ = settings;
    for gongan_index in 0..score.gongans.len() {
        let beat_ids = score.gongans[gongan_index].beats.clone();
        for &beat_id in &beat_ids {
            let positions: Vec<Position> = score.beat(beat_id).measures.keys().copied().collect();
            for position in positions {
                resolve_grace_notes_in_measure(score, beat_id, position, diagnostics);
            }
        }
    }
}

fn resolve_grace_notes_in_measure(score: &mut Score, beat_id: BeatId, position: Position, diagnostics: &mut Diagnostics) {
    let note_count = score
        .beat(beat_id)
        .measures
        .get(&position)
        .and_then(|m| m.passes.get(&DEFAULT_PASS))
        .map(|p| p.notes.len())
        .unwrap_or(0);

    for i in 0..note_count {
        let (is_grace, grace_duration, follower_tone) = {
            let beat = score.beat(beat_id);
            let pass = beat.measures[&position].passes.get(&DEFAULT_PASS).unwrap();
            let note = &pass.notes[i];
            if note.stroke != Stroke::GraceNote {
                continue;
            }
            let follower = pass.notes.get(i + 1).map(|n| n.tone);
            (true, note.duration, follower)
        };
        if !is_grace {
            continue;
        }

        let mut remaining = grace_duration;
        if i > 0 {
            steal_from_note_at(score, beat_id, position, i - 1, &mut remaining);
            score.beat_mut(beat_id).recompute_duration();
        } else if let Some(prev_beat) = previous_beat_with_measure(score, beat_id, position) {
            // Crosses into the previous beat (possibly the previous gongan).
            steal_from_last_note(score, prev_beat, position, &mut remaining);
            score.beat_mut(prev_beat).recompute_duration();
            score.beat_mut(beat_id).recompute_duration();
        } else if note_count > 1 {
            // No previous gongan to steal from: shorten the following note
            // instead.
            steal_from_note_at(score, beat_id, position, i + 1, &mut remaining);
            score.beat_mut(beat_id).recompute_duration();
        }

        if let Some(follower) = follower_tone {
            let grace_pitch = score.beat(beat_id).measures[&position].passes[&DEFAULT_PASS].notes[i].tone.pitch;
            let best_octave = best_grace_octave(grace_pitch, follower);
            let beat = score.beat_mut(beat_id);
            let pass = beat.measures.get_mut(&position).unwrap().passes.get_mut(&DEFAULT_PASS).unwrap();
            pass.notes[i].tone = Tone::new(pass.notes[i].tone.pitch, Some(best_octave));
        } else {
            diagnostics.info(&Location { gongan: Some(score.beat(beat_id).gongan), beat: None, position: Some(position), line: None }, "grace note has no following melodic note to target");
        }
    }
}

/// Searches octaves {-1, 0, +1} relative to the following note for the one
/// minimizing the scale-step distance between `grace_pitch` at that octave
/// and the follower, tie-breaking toward the lower octave. See DESIGN.md
/// for the reasoning behind the tie-break.
fn best_grace_octave(grace_pitch: Pitch, follower: Tone) -> i8 {
    let follower_octave = follower.octave.unwrap_or(1);
    let mut best = follower_octave;
    let mut best_distance = i32::MAX;
    for delta in [-1, 0, 1] {
        let candidate_octave = follower_octave + delta;
        let candidate = Tone::new(grace_pitch, Some(candidate_octave));
        if let Some(distance) = candidate.scale_step_distance(follower) {
            let distance = distance.abs();
            if distance < best_distance || (distance == best_distance && candidate_octave < best) {
                best_distance = distance;
                best = candidate_octave;
            }
        }
    }
    best
}

fn steal_from_note_at(score: &mut Score, beat_id: BeatId, position: Position, index: usize, remaining: &mut f64) {
    let beat = score.beat_mut(beat_id);
    let pass = beat.measures.get_mut(&position).unwrap().passes.get_mut(&DEFAULT_PASS).unwrap();
    let note = &mut pass.notes[index];
    let from_rest = remaining.min(note.rest_after);
    note.rest_after -= from_rest;
    *remaining -= from_rest;
    if *remaining > 1e-9 {
        let from_duration = remaining.min(note.duration);
        note.duration = (note.duration - from_duration).max(0.0);
        *remaining -= from_duration;
    }
}

fn steal_from_last_note(score: &mut Score, beat_id: BeatId, position: Position, remaining: &mut f64) {
    let Some(index) = score
        .beat(beat_id)
        .measures
        .get(&position)
        .and_then(|m| m.passes.get(&DEFAULT_PASS))
        .map(|p| p.notes.len().saturating_sub(1))
    else {
        return;
    };
    steal_from_note_at(score, beat_id, position, index, remaining);
}

fn previous_beat_with_measure(score: &Score, beat_id: BeatId, position: Position) -> Option<BeatId> {
    let mut current = score.beat(beat_id).prev;
    while let Some(id) = current {
        if score.beat(id).measures.contains_key(&position) {
            return Some(id);
        }
        current = score.beat(id).prev;
    }
    None
}

/// Installs gotos for each SEQUENCE directive, walking its label list and
/// linking the last beat of each referenced gongan to the first beat of
/// the next.
fn resolve_sequences(score: &mut Score, diagnostics: &mut Diagnostics) {
    let sequences = score.flow.sequences.clone();
    for labels in sequences {
        let mut used_pass = 100i32;
        for pair in labels.windows(2) {
            let (from_label, to_label) = (&pair[0], &pair[1]);
            let (Some(&from_target_beat), Some(&to_beat)) = (score.flow.labels.get(from_label), score.flow.labels.get(to_label)) else {
                diagnostics.error(GamelanError::Resolution {
                    location: Location::default(),
                    message: format!("SEQUENCE references unresolved label {from_label:?} or {to_label:?}"),
                });
                continue;
            };
            let gongan_of_beat = score.beat(from_target_beat).gongan;
            let Some(last_beat) = score.gongans[gongan_of_beat].beats.last().copied() else { continue };
            used_pass += 1;
            score.beat_mut(last_beat).goto.insert(used_pass, to_beat);
        }
    }
}

/// Shifts every note of the named position in the gongan by the given
/// octave delta, reporting a range error when the shift leaves the
/// instrument's valid-note table (see DESIGN.md for why out-of-range
/// errors rather than logging and keeping the original note).
fn apply_octavate(score: &mut Score, settings: &RunSettings, diagnostics: &mut Diagnostics) {
    let gongans: Vec<(usize, Vec<MetaData>)> = score.gongans.iter().map(|g| (g.id, g.metadata.clone())).collect();
    for (gongan_id, metadata) in gongans {
        for item in &metadata {
            let MetaData::Octavate { position, octaves, .. } = item else { continue };
            let beat_ids = score.gongans[gongan_id].beats.clone();
            for beat_id in beat_ids {
                let Some(measure) = score.beat_mut(beat_id).measures.get_mut(position) else { continue };
                for pass in measure.passes.values_mut() {
                    for note in &mut pass.notes {
                        if note.stroke.is_non_sounding() {
                            continue;
                        }
                        let Some(octave) = note.tone.octave else { continue };
                        let new_octave = octave + *octaves as i8;
                        let valid_notes = settings.valid_notes.get(*position);
                        let in_range = valid_notes.iter().any(|e| e.pitch == note.tone.pitch && e.octave == Some(new_octave) && e.stroke == note.stroke);
                        if in_range {
                            note.tone = Tone::new(note.tone.pitch, Some(new_octave));
                        } else {
                            diagnostics.error(GamelanError::Range {
                                location: Location { gongan: Some(gongan_id), beat: None, position: Some(*position), line: None },
                                message: format!("OCTAVATE({octaves}) moves {:?} octave {octave} out of range", note.tone.pitch),
                            });
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar;

    #[test]
    fn minimum_score_builds_two_positions() {
        let settings = RunSettings::minimal_for_tests();
        let (raw, diags) = grammar::parse("pemade_polos\tioeu\n");
        assert!(!diags.has_errors());
        let (score, diags) = build(raw, &settings);
        assert!(!diags.has_errors(), "{:?}", diags.errors());
        assert!(score.active_positions.contains(&Position::PemadePolos));
        let first = score.first_beat().unwrap();
        let measure = &score.beat(first).measures[&Position::PemadePolos];
        let notes = &measure.passes[&DEFAULT_PASS].notes;
        assert_eq!(notes.len(), 4);
        let kempli = &score.beat(first).measures[&Position::Kempli];
        assert_eq!(kempli.passes[&DEFAULT_PASS].notes[0].stroke, Stroke::Muted);
    }

    #[test]
    fn shorthand_pokok_pads_to_beat_duration() {
        let settings = RunSettings::minimal_for_tests();
        let (raw, _) = grammar::parse("pemade_polos\tioeu\npemade_sangsih\tioeu\njegogan\to\n");
        let (score, diags) = build(raw, &settings);
        assert!(!diags.has_errors(), "{:?}", diags.errors());
        let first = score.first_beat().unwrap();
        let measure = &score.beat(first).measures[&Position::Jegogan];
        let notes = &measure.passes[&DEFAULT_PASS].notes;
        let total: f64 = notes.iter().map(Note::total_duration).sum();
        assert_eq!(total, score.beat(first).duration);
        assert_eq!(notes[0].stroke, Stroke::Open);
        assert!(notes[1..].iter().all(|n| n.stroke == Stroke::Extension));
    }

    #[test]
    fn unison_gangsa_stave_derives_sangsih_via_kempyung() {
        let settings = RunSettings::minimal_for_tests();
        let (raw, diags) = grammar::parse("gangsa\to\n");
        assert!(!diags.has_errors(), "{:?}", diags.errors());
        let (score, diags) = build(raw, &settings);
        assert!(!diags.has_errors(), "{:?}", diags.errors());
        let first = score.first_beat().unwrap();
        let polos = &score.beat(first).measures[&Position::PemadePolos].passes[&DEFAULT_PASS].notes[0];
        let sangsih = &score.beat(first).measures[&Position::PemadeSangsih].passes[&DEFAULT_PASS].notes[0];
        assert_ne!(polos.tone, sangsih.tone);
        assert_eq!(sangsih.tone, rules::kempyung_of(polos.tone).unwrap());
    }

    #[test]
    fn beat_at_end_creates_leading_silence_and_trailing_kempli_beat() {
        let mut settings = RunSettings::minimal_for_tests();
        settings.timing.beat_at_end = true;
        let raw = vec![RawGongan { id: 0, line: 1, ..Default::default() }];
        let (score, diags) = build(raw, &settings);
        assert!(!diags.has_errors(), "{:?}", diags.errors());

        assert_eq!(score.beats.len(), 2);
        let first = score.first_beat().unwrap();
        let leading_notes = &score.beat(first).measures[&Position::Kempli].passes[&DEFAULT_PASS].notes;
        assert!(leading_notes.iter().all(|n| n.stroke == Stroke::Silence));

        let second = score.beat(first).next.unwrap();
        let trailing_notes = &score.beat(second).measures[&Position::Kempli].passes[&DEFAULT_PASS].notes;
        assert_eq!(trailing_notes[0].stroke, Stroke::Muted);
        assert!(score.beat(second).next.is_none());
        assert_eq!(score.gongans[0].beats.len(), 2);
    }

    #[test]
    fn grace_note_steals_from_preceding_note() {
        let mut settings = RunSettings::minimal_for_tests();
        settings.font.base_symbols.insert('A', FontEntry { pitch: Pitch::Ding, octave: Some(1), stroke: Stroke::GraceNote, duration: 0.25, rest_after: 0.0 });
        let (raw, _) = grammar::parse("pemade_polos\tAa\n");
        let (score, diags) = build(raw, &settings);
        assert!(!diags.has_errors(), "{:?}", diags.errors());
        let first = score.first_beat().unwrap();
        let measure = &score.beat(first).measures[&Position::PemadePolos];
        let notes = &measure.passes[&DEFAULT_PASS].notes;
        assert_eq!(notes[0].stroke, Stroke::GraceNote);
        // 'a' (dang, octave 1) follows; ding's nearest octave to dang@1 is
        // octave 2 (scale-step distance 2), closer than octave 1 (distance
        // 5) or octave 0 (distance 12).
        assert_eq!(notes[0].tone, Tone::new(Pitch::Ding, Some(2)));
        // The grace stole its own duration (0.25) from the following note,
        // since this is the beat's only measure: no previous note in the
        // beat and no previous gongan to steal from.
        assert_eq!(notes[1].duration, 0.75);
        assert_eq!(notes[1].rest_after, 0.0);
    }

    #[test]
    fn grace_note_at_start_of_beat_steals_from_previous_beat() {
        // Built directly from the model, bypassing `build()`'s default
        // Kempli measure, so each beat's duration is unambiguous: exactly
        // one position sounds per beat.
        let settings = RunSettings::minimal_for_tests();
        let mut score = Score::new("t".to_string());
        score.gongans.push(Gongan::new(0, GonganType::Regular));
        let first = score.push_beat(0);
        let second = score.push_beat(0);
        score.beat_mut(first).next = Some(second);
        score.beat_mut(second).prev = Some(first);
        score.gongans[0].beats = vec![first, second];

        fn note(position: Position, pitch: Pitch, stroke: Stroke, duration: f64) -> Note {
            Note {
                position,
                tone: Tone::new(pitch, Some(1)),
                stroke,
                duration,
                rest_after: 0.0,
                symbol: String::new(),
                modifiers: Vec::new(),
                velocity: 90,
                midi_notes: Vec::new(),
                sample_file: None,
            }
        }

        let dung = note(Position::PemadePolos, Pitch::Dung, Stroke::Open, 1.0);
        let mut first_measure = Measure::new(Position::PemadePolos);
        first_measure.passes.insert(DEFAULT_PASS, Pass { notes: vec![dung], line: None });
        score.beat_mut(first).measures.insert(Position::PemadePolos, first_measure);
        score.beat_mut(first).recompute_duration();

        let grace = note(Position::PemadePolos, Pitch::Ding, Stroke::GraceNote, 0.25);
        let dang = note(Position::PemadePolos, Pitch::Dang, Stroke::Open, 1.0);
        let mut second_measure = Measure::new(Position::PemadePolos);
        second_measure.passes.insert(DEFAULT_PASS, Pass { notes: vec![grace, dang], line: None });
        score.beat_mut(second).measures.insert(Position::PemadePolos, second_measure);
        score.beat_mut(second).recompute_duration();

        let mut diagnostics = Diagnostics::new();
        resolve_grace_notes(&mut score, &settings, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.errors());

        let first_notes = &score.beat(first).measures[&Position::PemadePolos].passes[&DEFAULT_PASS].notes;
        // The last (only) note of the first beat ('dung') donated the
        // grace's duration (0.25) since the grace opens the second beat.
        assert_eq!(first_notes[0].duration, 0.75);
        assert_eq!(first_notes[0].rest_after, 0.0);

        let second_notes = &score.beat(second).measures[&Position::PemadePolos].passes[&DEFAULT_PASS].notes;
        assert_eq!(second_notes[0].stroke, Stroke::GraceNote);
        assert_eq!(second_notes[0].tone, Tone::new(Pitch::Ding, Some(2)));

        // Stealing across the beat boundary must update both beats' cached
        // durations, or downstream tick accounting overlaps into the next
        // beat.
        let first_total: f64 = first_notes.iter().map(Note::total_duration).sum();
        assert_eq!(score.beat(first).duration, first_total);
        assert_eq!(score.beat(first).duration, 0.75);
    }
}
