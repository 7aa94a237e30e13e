//! Piano keyboard widget
//!
//! White keys share the keyboard width equally; black keys straddle the
//! boundary between their neighbouring white keys and sit above them in
//! z-order. Velocity comes from where the key was first touched: 1 at the top
//! edge, 127 at the bottom. A binding stays on its original note for the
//! lifetime of the contact, whatever key the contact slides over.

use tracing::{debug, trace};

use crate::config::KeyboardConfig;
use crate::contact::{ContactEvent, ContactId, ContactTracker, Transition};
use crate::geometry::{HitMap, Point, Rect};
use crate::midi::{self, push_checked, MidiMessage, DATA_MAX};

/// Semitone name and colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteInfo {
    pub name: &'static str,
    pub black: bool,
}

const fn note(name: &'static str, black: bool) -> NoteInfo {
    NoteInfo { name, black }
}

/// Indexed by `note % 12`
pub const NOTE_TABLE: [NoteInfo; 12] = [
    note("C", false),
    note("C#", true),
    note("D", false),
    note("D#", true),
    note("E", false),
    note("F", false),
    note("F#", true),
    note("G", false),
    note("G#", true),
    note("A", false),
    note("Bb", true),
    note("B", false),
];

/// Black key left edge sits this many white-key widths before the boundary
const BLACK_KEY_OFFSET: f64 = 0.3;
/// Black key width in white-key widths
const BLACK_KEY_WIDTH: f64 = 0.6;

pub fn note_info(note: u8) -> NoteInfo {
    NOTE_TABLE[(note % 12) as usize]
}

/// A laid-out key
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub note: u8,
    pub name: &'static str,
    pub black: bool,
    pub rect: Rect,
}

/// Note held by one contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteBinding {
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
}

/// Lay out `key_count` keys starting at `start_note` inside `bounds`
pub fn layout(bounds: Rect, start_note: u8, key_count: u8, black_key_height: f64) -> Vec<Key> {
    let notes: Vec<u8> = (0..key_count as u16)
        .map(|i| start_note as u16 + i)
        .filter(|n| *n <= DATA_MAX as u16)
        .map(|n| n as u8)
        .collect();

    let white_count = notes.iter().filter(|n| !note_info(**n).black).count();
    if white_count == 0 {
        return Vec::new();
    }
    let white_width = bounds.width / white_count as f64;

    let mut keys = Vec::with_capacity(notes.len());
    let mut whites_before = 0usize;
    for n in notes {
        let info = note_info(n);
        let rect = if info.black {
            Rect::new(
                bounds.x + (whites_before as f64 - BLACK_KEY_OFFSET) * white_width,
                bounds.y,
                white_width * BLACK_KEY_WIDTH,
                bounds.height * black_key_height,
            )
        } else {
            let rect = Rect::new(
                bounds.x + whites_before as f64 * white_width,
                bounds.y,
                white_width,
                bounds.height,
            );
            whites_before += 1;
            rect
        };
        keys.push(Key {
            note: n,
            name: info.name,
            black: info.black,
            rect,
        });
    }
    keys
}

/// Velocity for a touch at height `y` inside `rect`
pub fn velocity_at(rect: &Rect, y: f64) -> u8 {
    let ratio = rect.vertical_ratio(y);
    (1.0 + ratio * 126.0).round().clamp(1.0, DATA_MAX as f64) as u8
}

/// Keyboard widget state
#[derive(Debug, Clone)]
pub struct Keyboard {
    name: String,
    bounds: Rect,
    channel: u8,
    keys: Vec<Key>,
    hits: HitMap<usize>,
    contacts: ContactTracker<NoteBinding>,
}

impl Keyboard {
    pub fn new(config: &KeyboardConfig) -> Self {
        let keys = layout(
            config.bounds,
            config.start_note,
            config.key_count,
            config.black_key_height,
        );

        let mut hits = HitMap::new();
        for (idx, key) in keys.iter().enumerate() {
            hits.insert(key.rect, if key.black { 1 } else { 0 }, idx);
        }

        debug!(
            "Keyboard '{}': {} keys from note {}",
            config.name,
            keys.len(),
            config.start_note
        );

        Self {
            name: config.name.clone(),
            bounds: config.bounds,
            channel: config.channel,
            keys,
            hits,
            contacts: ContactTracker::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Key under a position, black keys first
    pub fn key_at(&self, p: Point) -> Option<&Key> {
        self.hits.hit_test(p).map(|(idx, _)| &self.keys[idx])
    }

    pub fn handle(&mut self, event: &ContactEvent) -> Vec<MidiMessage> {
        let hits = &self.hits;
        let keys = &self.keys;
        let channel = self.channel;

        let transitions = self.contacts.resolve(event, |p| {
            hits.hit_test(p).map(|(idx, rect)| NoteBinding {
                note: keys[idx].note,
                velocity: velocity_at(&rect, p.y),
                channel,
            })
        });

        let mut out = Vec::new();
        for transition in transitions {
            self.apply(transition, &mut out);
        }
        out
    }

    /// Release every held note
    pub fn release_all(&mut self) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        for transition in self.contacts.release_all() {
            self.apply(transition, &mut out);
        }
        out
    }

    fn apply(&self, transition: Transition<NoteBinding>, out: &mut Vec<MidiMessage>) {
        match transition {
            Transition::Activate {
                contact, target, ..
            } => {
                trace!(
                    "{}: {} -> note {} v{}",
                    self.name,
                    contact,
                    target.note,
                    target.velocity
                );
                push_checked(out, midi::note_on(target.note, target.velocity, target.channel));
            }
            // No aftertouch and no cross-key glide
            Transition::Update { .. } => {}
            Transition::Release { contact, target } => {
                trace!("{}: {} released note {}", self.name, contact, target.note);
                push_checked(out, midi::note_off(target.note, target.channel));
            }
        }
    }

    pub fn is_tracking(&self, id: ContactId) -> bool {
        self.contacts.is_tracking(id)
    }

    /// Whether any contact currently holds `note` (key highlight)
    pub fn is_note_held(&self, note: u8) -> bool {
        self.contacts.targets().any(|b| b.note == note)
    }

    pub fn held_notes(&self) -> Vec<u8> {
        let mut notes: Vec<u8> = self.contacts.targets().map(|b| b.note).collect();
        notes.sort_unstable();
        notes.dedup();
        notes
    }

    pub fn active_contacts(&self) -> usize {
        self.contacts.len()
    }
}
