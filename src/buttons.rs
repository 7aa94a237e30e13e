//! Discrete button panel
//!
//! Each panel owns its buttons plus the state they share: the active member
//! of every exclusive group, loop latches and transport flash deadlines.
//!
//! Interaction modes:
//! - momentary: note on while held, note off on release
//! - exclusive: press toggles; activating a member first turns off the
//!   previously active member of its group
//! - latched: every press flips a boolean sent as CC 127/0
//! - sysex / transport: every press fires a fixed message and flashes

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::{ButtonAction, ButtonPanelConfig};
use crate::contact::{ContactEvent, ContactId, ContactTracker, Transition};
use crate::geometry::{HitMap, Rect};
use crate::midi::{self, push_checked, MidiMessage};

/// One laid-out button
#[derive(Debug, Clone)]
pub struct Button {
    pub label: String,
    pub rect: Rect,
    pub action: ButtonAction,
}

/// Button panel state
#[derive(Debug, Clone)]
pub struct ButtonPanel {
    name: String,
    bounds: Rect,
    channel: u8,
    flash: Duration,
    buttons: Vec<Button>,
    hits: HitMap<usize>,
    contacts: ContactTracker<usize>,
    /// Group name -> index of the active member
    exclusive: HashMap<String, usize>,
    latches: Vec<bool>,
    flash_until: Vec<Option<Instant>>,
}

impl ButtonPanel {
    pub fn new(config: &ButtonPanelConfig) -> Self {
        let buttons: Vec<Button> = config
            .buttons
            .iter()
            .map(|b| Button {
                label: b.label.clone(),
                rect: b.bounds,
                action: b.action.clone(),
            })
            .collect();

        let mut hits = HitMap::new();
        for (idx, button) in buttons.iter().enumerate() {
            hits.insert(button.rect, 0, idx);
        }

        debug!("Button panel '{}': {} buttons", config.name, buttons.len());

        Self {
            name: config.name.clone(),
            bounds: union(buttons.iter().map(|b| b.rect)),
            channel: config.channel,
            flash: Duration::from_millis(config.flash_ms),
            latches: vec![false; buttons.len()],
            flash_until: vec![None; buttons.len()],
            buttons,
            hits,
            contacts: ContactTracker::new(),
            exclusive: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Smallest rectangle covering every button
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn handle(&mut self, event: &ContactEvent) -> Vec<MidiMessage> {
        let hits = &self.hits;
        let transitions = self
            .contacts
            .resolve(event, |p| hits.hit_test(p).map(|(idx, _)| idx));

        let mut out = Vec::new();
        for transition in transitions {
            match transition {
                Transition::Activate { target, .. } => self.press(target, event.timestamp, &mut out),
                Transition::Update { .. } => {}
                Transition::Release { target, .. } => self.release(target, &mut out),
            }
        }
        out
    }

    /// Release every held contact. Exclusive members and latches keep their state.
    pub fn release_all(&mut self) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        for transition in self.contacts.release_all() {
            if let Transition::Release { target, .. } = transition {
                self.release(target, &mut out);
            }
        }
        out
    }

    /// Turn off every active exclusive member and latch, in button order
    pub fn clear_held_state(&mut self) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        for idx in 0..self.buttons.len() {
            match &self.buttons[idx].action {
                ButtonAction::Exclusive { note, group, .. } if self.exclusive.get(group) == Some(&idx) => {
                    push_checked(&mut out, midi::note_off(*note, self.channel));
                }
                ButtonAction::Latched { controller } if self.latches[idx] => {
                    push_checked(&mut out, midi::control_change(*controller, 0, self.channel));
                    self.latches[idx] = false;
                }
                _ => {}
            }
        }
        self.exclusive.clear();
        out
    }

    fn press(&mut self, idx: usize, now: Instant, out: &mut Vec<MidiMessage>) {
        let Some(button) = self.buttons.get(idx) else {
            return;
        };
        trace!("{}: press '{}'", self.name, button.label);

        match button.action.clone() {
            ButtonAction::Momentary { note, velocity } => {
                push_checked(out, midi::note_on(note, velocity, self.channel));
            }
            ButtonAction::Exclusive {
                note,
                velocity,
                group,
            } => self.toggle_exclusive(idx, note, velocity, group, out),
            ButtonAction::Latched { controller } => {
                let latched = !self.latches[idx];
                self.latches[idx] = latched;
                debug!("{}: '{}' latched={}", self.name, button.label, latched);
                push_checked(
                    out,
                    midi::control_change(controller, if latched { 127 } else { 0 }, self.channel),
                );
                self.flash_until[idx] = Some(now + self.flash);
            }
            ButtonAction::Sysex { bytes } => {
                out.push(midi::sysex(&bytes));
                self.flash_until[idx] = Some(now + self.flash);
            }
            ButtonAction::Transport { command } => {
                out.push(midi::sysex(&midi::mmc_command(command.code())));
                self.flash_until[idx] = Some(now + self.flash);
            }
        }
    }

    fn release(&mut self, idx: usize, out: &mut Vec<MidiMessage>) {
        if let Some(Button {
            action: ButtonAction::Momentary { note, .. },
            ..
        }) = self.buttons.get(idx)
        {
            push_checked(out, midi::note_off(*note, self.channel));
        }
    }

    /// Deactivation of the previous member always precedes activation of the new one
    fn toggle_exclusive(
        &mut self,
        idx: usize,
        note: u8,
        velocity: u8,
        group: String,
        out: &mut Vec<MidiMessage>,
    ) {
        match self.exclusive.get(&group).copied() {
            Some(active) if active == idx => {
                push_checked(out, midi::note_off(note, self.channel));
                self.exclusive.remove(&group);
                debug!("{}: group '{}' cleared", self.name, group);
            }
            previous => {
                if let Some(prev_note) = previous.and_then(|p| self.exclusive_note(p)) {
                    push_checked(out, midi::note_off(prev_note, self.channel));
                }
                push_checked(out, midi::note_on(note, velocity, self.channel));
                debug!(
                    "{}: group '{}' -> '{}'",
                    self.name, group, self.buttons[idx].label
                );
                self.exclusive.insert(group, idx);
            }
        }
    }

    fn exclusive_note(&self, idx: usize) -> Option<u8> {
        match self.buttons.get(idx)?.action {
            ButtonAction::Exclusive { note, .. } => Some(note),
            _ => None,
        }
    }

    /// Label of the active member of `group`
    pub fn active_member(&self, group: &str) -> Option<&str> {
        self.exclusive
            .get(group)
            .and_then(|idx| self.buttons.get(*idx))
            .map(|b| b.label.as_str())
    }

    pub fn is_latched(&self, idx: usize) -> bool {
        self.latches.get(idx).copied().unwrap_or(false)
    }

    /// Visual "active" indication for a button at `now`
    pub fn is_lit(&self, idx: usize, now: Instant) -> bool {
        let Some(button) = self.buttons.get(idx) else {
            return false;
        };
        let flashing = self.flash_until[idx].is_some_and(|until| now < until);

        match &button.action {
            ButtonAction::Momentary { .. } => self.contacts.targets().any(|t| *t == idx),
            ButtonAction::Exclusive { group, .. } => self.exclusive.get(group) == Some(&idx),
            ButtonAction::Latched { .. } => self.latches[idx] || flashing,
            ButtonAction::Sysex { .. } | ButtonAction::Transport { .. } => flashing,
        }
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.buttons.iter().position(|b| b.label == label)
    }

    pub fn is_tracking(&self, id: ContactId) -> bool {
        self.contacts.is_tracking(id)
    }

    pub fn active_contacts(&self) -> usize {
        self.contacts.len()
    }
}

fn union(rects: impl Iterator<Item = Rect>) -> Rect {
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for r in rects {
        bounds = Some(match bounds {
            None => (r.x, r.y, r.right(), r.bottom()),
            Some((l, t, rt, b)) => (l.min(r.x), t.min(r.y), rt.max(r.right()), b.max(r.bottom())),
        });
    }
    bounds
        .map(|(l, t, r, b)| Rect::new(l, t, r - l, b - t))
        .unwrap_or_default()
}
