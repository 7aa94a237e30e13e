//! Vertical slider widget
//!
//! Two flavours:
//! - **spring-back**: 14-bit pitch bend, rests at center (8192) and snaps back
//!   there when released
//! - **unidirectional**: 7-bit control change, rests at the bottom (value 0)
//!
//! Position is a ratio of the track height, 0.0 at the top edge and 1.0 at the
//! bottom; the top is the maximum value. Emission is rate limited per slider.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::SliderConfig;
use crate::contact::{ContactEvent, ContactId, ContactPhase, ContactTracker, Transition};
use crate::geometry::Rect;
use crate::midi::{self, push_checked, MidiMessage, DATA_MAX, PITCH_BEND_MAX};

/// Minimum-interval gate between emissions
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    /// Whether a send at `now` is allowed. Timestamps older than the last
    /// send count as zero elapsed time.
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Record a send, never moving the stamp backwards
    pub fn stamp(&mut self, now: Instant) {
        self.last_sent = Some(match self.last_sent {
            Some(last) if last > now => last,
            _ => now,
        });
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }
}

/// Slider widget state
#[derive(Debug, Clone)]
pub struct Slider {
    name: String,
    bounds: Rect,
    spring_back: bool,
    controller: u8,
    channel: u8,
    ratio: f64,
    last_value: Option<u16>,
    throttle: Throttle,
    contacts: ContactTracker<()>,
}

impl Slider {
    pub fn new(config: &SliderConfig) -> Self {
        let mut slider = Self {
            name: config.name.clone(),
            bounds: config.bounds,
            spring_back: config.spring_back,
            controller: config.controller,
            channel: config.channel,
            ratio: 0.0,
            last_value: None,
            throttle: Throttle::new(Duration::from_millis(config.throttle_ms)),
            contacts: ContactTracker::new(),
        };
        slider.ratio = slider.rest_ratio();
        slider
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn is_spring_back(&self) -> bool {
        self.spring_back
    }

    pub fn rest_ratio(&self) -> f64 {
        if self.spring_back {
            0.5
        } else {
            1.0
        }
    }

    /// Current thumb position
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Value last put on the wire
    pub fn last_value(&self) -> Option<u16> {
        self.last_value
    }

    /// Wire value for a position: 14-bit when spring-back, else 7-bit
    pub fn value_for(&self, ratio: f64) -> u16 {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            self.rest_ratio()
        };
        let max = if self.spring_back {
            PITCH_BEND_MAX
        } else {
            DATA_MAX as u16
        };
        ((1.0 - ratio) * max as f64).round().clamp(0.0, max as f64) as u16
    }

    /// Messages that announce the resting state when the surface comes up.
    /// Only the unidirectional slider announces itself.
    pub fn initial_messages(&mut self) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        if !self.spring_back {
            self.ratio = self.rest_ratio();
            self.encode_current(&mut out);
        }
        out
    }

    pub fn handle(&mut self, event: &ContactEvent) -> Vec<MidiMessage> {
        // One driving contact at a time: a new start takes the slider over
        if event.phase == ContactPhase::Start && self.bounds.contains(event.position) {
            let previous: Vec<ContactId> = self.contacts.contacts().collect();
            for id in previous {
                trace!("{}: contact {} superseded", self.name, id);
                self.contacts.forget(id);
            }
        }

        let bounds = self.bounds;
        let transitions = self
            .contacts
            .resolve(event, |p| bounds.contains(p).then_some(()));

        let mut out = Vec::new();
        for transition in transitions {
            match transition {
                Transition::Activate { position, .. } | Transition::Update { position, .. } => {
                    if !position.y.is_finite() {
                        trace!("{}: ignoring non-finite position", self.name);
                        continue;
                    }
                    self.ratio = self.bounds.vertical_ratio(position.y);
                    if self.throttle.is_open(event.timestamp) {
                        self.encode_current(&mut out);
                        self.throttle.stamp(event.timestamp);
                    } else {
                        trace!("{}: throttled at ratio {:.3}", self.name, self.ratio);
                    }
                }
                Transition::Release { contact, .. } => {
                    debug!("{}: released by {}", self.name, contact);
                    self.release(&mut out);
                }
            }
        }
        out
    }

    /// Release the driving contact, if any
    pub fn release_all(&mut self) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        if !self.contacts.release_all().is_empty() {
            self.release(&mut out);
        }
        out
    }

    /// Spring-back sliders snap to center and always send it. The snap
    /// leaves the throttle alone so the next touch is never delayed by it.
    fn release(&mut self, out: &mut Vec<MidiMessage>) {
        if self.spring_back {
            self.ratio = self.rest_ratio();
            self.encode_current(out);
        }
    }

    fn encode_current(&mut self, out: &mut Vec<MidiMessage>) {
        let value = self.value_for(self.ratio);
        let message = if self.spring_back {
            midi::pitch_bend(value, self.channel)
        } else {
            midi::control_change(self.controller, value.min(DATA_MAX as u16) as u8, self.channel)
        };
        self.last_value = Some(value);
        push_checked(out, message);
    }

    pub fn is_tracking(&self, id: ContactId) -> bool {
        self.contacts.is_tracking(id)
    }

    pub fn active_contacts(&self) -> usize {
        self.contacts.len()
    }
}
