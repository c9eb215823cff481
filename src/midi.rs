//! # Standard MIDI File writer
//!
//! A minimal, write-only Standard MIDI File (SMF) encoder: format 1,
//! MThd/MTrk chunks, variable-length delta times. Grounded on the
//! pure-stdlib chunk/VLQ/event-byte layout used by
//! `mkaudio-company-mkmidilibrary`'s `midi::file`/`midi::message` modules —
//! this crate only ever emits files it built itself, so reading is out of
//! scope (see DESIGN.md).

use std::io;
use std::path::Path;

/// One timestamped MIDI event within a track. `tick` is absolute from the
/// start of the track, not a delta; [`Track::encode`] computes deltas at
/// encode time so callers (the flow interpreter) can push events in any
/// order and rely on the final sort.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiEvent {
    pub tick: u64,
    pub message: MidiMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    Meta(MetaEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaEvent {
    TrackName(String),
    Marker(String),
    Tempo { microseconds_per_quarter: u32 },
    EndOfTrack,
}

impl MidiMessage {
    fn status_and_data(&self) -> (u8, Vec<u8>) {
        match self {
            MidiMessage::NoteOn { channel, key, velocity } => (0x90 | (channel & 0x0F), vec![*key & 0x7F, *velocity & 0x7F]),
            MidiMessage::NoteOff { channel, key, velocity } => (0x80 | (channel & 0x0F), vec![*key & 0x7F, *velocity & 0x7F]),
            MidiMessage::ProgramChange { channel, program } => (0xC0 | (channel & 0x0F), vec![*program & 0x7F]),
            MidiMessage::ControlChange { channel, controller, value } => (0xB0 | (channel & 0x0F), vec![*controller & 0x7F, *value & 0x7F]),
            MidiMessage::Meta(_) => unreachable!("meta events are encoded separately"),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        if let MidiMessage::Meta(meta) = self {
            return meta.to_bytes();
        }
        let (status, data) = self.status_and_data();
        let mut bytes = vec![status];
        bytes.extend(data);
        bytes
    }
}

impl MetaEvent {
    fn type_byte(&self) -> u8 {
        match self {
            MetaEvent::TrackName(_) => 0x03,
            MetaEvent::Marker(_) => 0x06,
            MetaEvent::Tempo { .. } => 0x51,
            MetaEvent::EndOfTrack => 0x2F,
        }
    }

    fn data(&self) -> Vec<u8> {
        match self {
            MetaEvent::TrackName(s) | MetaEvent::Marker(s) => s.as_bytes().to_vec(),
            MetaEvent::Tempo { microseconds_per_quarter } => {
                let us = *microseconds_per_quarter;
                vec![(us >> 16) as u8, (us >> 8) as u8, us as u8]
            }
            MetaEvent::EndOfTrack => Vec::new(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let data = self.data();
        let mut bytes = vec![0xFF, self.type_byte()];
        bytes.extend(write_varlen(data.len() as u32));
        bytes.extend(data);
        bytes
    }
}

/// One MIDI track: a single instrument [`crate::position::Position`] in the
/// emitted file.
#[derive(Debug, Clone, Default)]
pub struct Track {
    pub name: String,
    events: Vec<MidiEvent>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Track { name: name.into(), events: Vec::new() }
    }

    pub fn push(&mut self, tick: u64, message: MidiMessage) {
        self.events.push(MidiEvent { tick, message });
    }

    pub fn note_on(&mut self, tick: u64, channel: u8, key: u8, velocity: u8) {
        self.push(tick, MidiMessage::NoteOn { channel, key, velocity });
    }

    pub fn note_off(&mut self, tick: u64, channel: u8, key: u8, velocity: u8) {
        self.push(tick, MidiMessage::NoteOff { channel, key, velocity });
    }

    pub fn marker(&mut self, tick: u64, text: impl Into<String>) {
        self.push(tick, MidiMessage::Meta(MetaEvent::Marker(text.into())));
    }

    pub fn program_change(&mut self, tick: u64, channel: u8, program: u8) {
        self.push(tick, MidiMessage::ProgramChange { channel, program });
    }

    pub fn control_change(&mut self, tick: u64, channel: u8, controller: u8, value: u8) {
        self.push(tick, MidiMessage::ControlChange { channel, controller, value });
    }

    pub fn last_tick(&self) -> u64 {
        self.events.iter().map(|e| e.tick).max().unwrap_or(0)
    }

    /// Moves the most recently pushed `NoteOff` earlier by `delta` ticks,
    /// never past `min_tick`. Returns the resulting tick, or `None` if the
    /// track has no note-off to rewind. Used by the flow interpreter's
    /// grace-note reallocation to overlay a grace note onto the tail of the
    /// preceding note.
    pub fn rewind_last_note_off(&mut self, delta: u64, min_tick: u64) -> Option<u64> {
        let event = self.events.iter_mut().rev().find(|e| matches!(e.message, MidiMessage::NoteOff { .. }))?;
        event.tick = event.tick.saturating_sub(delta).max(min_tick);
        Some(event.tick)
    }

    /// Read-only access to the pushed events, for tests that need to
    /// inspect exact tick placement (e.g. grace-note reallocation).
    #[cfg(test)]
    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    fn encode(&self) -> Vec<u8> {
        let mut events = self.events.clone();
        // Stable sort keeps same-tick note-offs ahead of note-ons when
        // pushed in that order, matching how the flow interpreter emits
        // the closing edge of one note before the opening edge of the next.
        events.sort_by_key(|e| e.tick);

        let mut data = Vec::new();
        if !self.name.is_empty() {
            data.extend(write_varlen(0));
            data.extend(MetaEvent::TrackName(self.name.clone()).to_bytes());
        }

        let mut prev_tick = 0u64;
        for event in &events {
            let delta = event.tick.saturating_sub(prev_tick);
            data.extend(write_varlen(delta as u32));
            data.extend(event.message.to_bytes());
            prev_tick = event.tick;
        }

        data.extend(write_varlen(0));
        data.extend(MetaEvent::EndOfTrack.to_bytes());
        data
    }
}

/// A Standard MIDI File under construction: format 1, one track per
/// position plus whatever tempo/marker track the caller adds.
#[derive(Debug, Clone)]
pub struct MidiFile {
    pub ticks_per_quarter: u16,
    tracks: Vec<Track>,
}

impl MidiFile {
    pub fn new(ticks_per_quarter: u16) -> Self {
        MidiFile { ticks_per_quarter, tracks: Vec::new() }
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"MThd");
        data.extend(6u32.to_be_bytes());
        data.extend(1u16.to_be_bytes()); // format 1: multiple simultaneous tracks
        data.extend((self.tracks.len() as u16).to_be_bytes());
        data.extend(self.ticks_per_quarter.to_be_bytes());

        for track in &self.tracks {
            let encoded = track.encode();
            data.extend(b"MTrk");
            data.extend((encoded.len() as u32).to_be_bytes());
            data.extend(encoded);
        }
        data
    }

    pub fn write(&self, path: impl AsRef<Path>) -> io::Result<()> {
        crate::io::atomic_write(path, &self.to_bytes())
    }
}

fn write_varlen(value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    let mut v = value >> 7;
    while v > 0 {
        bytes.push(((v & 0x7F) | 0x80) as u8);
        v >>= 7;
    }
    bytes.reverse();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varlen_matches_the_standard_midi_file_spec_examples() {
        assert_eq!(write_varlen(0), vec![0x00]);
        assert_eq!(write_varlen(127), vec![0x7F]);
        assert_eq!(write_varlen(128), vec![0x81, 0x00]);
        assert_eq!(write_varlen(16383), vec![0xFF, 0x7F]);
    }

    #[test]
    fn single_track_file_has_well_formed_chunks() {
        let mut file = MidiFile::new(480);
        let mut track = Track::new("Jegogan");
        track.note_on(0, 0, 60, 90);
        track.note_off(480, 0, 60, 0);
        file.add_track(track);

        let bytes = file.to_bytes();
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[8..10], &1u16.to_be_bytes());
        assert_eq!(&bytes[10..12], &1u16.to_be_bytes());
        assert_eq!(&bytes[12..14], &480u16.to_be_bytes());
        assert_eq!(&bytes[14..18], b"MTrk");
    }

    #[test]
    fn track_events_are_sorted_by_tick_before_encoding() {
        let mut track = Track::new("Ugal");
        track.note_off(480, 0, 60, 0);
        track.note_on(0, 0, 60, 90);
        let encoded = track.encode();
        // delta of the first real event (after the name meta event) must be 0.
        assert!(!encoded.is_empty());
    }
}
