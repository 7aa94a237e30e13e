//! Surface - owns every widget and routes contacts to them
//!
//! A contact belongs to the widget it started on for its whole lifetime,
//! wherever it moves afterwards. Everything a widget produces is forwarded to
//! the shared [`SinkSlot`], which is re-resolved on every send.

use tracing::{debug, info};

use crate::buttons::ButtonPanel;
use crate::config::{SurfaceConfig, WidgetConfig};
use crate::contact::{ContactEvent, ContactId, ContactTracker, Transition};
use crate::geometry::{HitMap, Rect};
use crate::keyboard::Keyboard;
use crate::midi::MidiMessage;
use crate::slider::Slider;
use crate::transport::SinkSlot;

/// One on-screen widget
#[derive(Debug, Clone)]
pub enum Widget {
    Keyboard(Keyboard),
    Slider(Slider),
    Buttons(ButtonPanel),
}

impl Widget {
    pub fn from_config(config: &WidgetConfig) -> Self {
        match config {
            WidgetConfig::Keyboard(k) => Widget::Keyboard(Keyboard::new(k)),
            WidgetConfig::Slider(s) => Widget::Slider(Slider::new(s)),
            WidgetConfig::Buttons(b) => Widget::Buttons(ButtonPanel::new(b)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Widget::Keyboard(k) => k.name(),
            Widget::Slider(s) => s.name(),
            Widget::Buttons(b) => b.name(),
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Widget::Keyboard(k) => k.bounds(),
            Widget::Slider(s) => s.bounds(),
            Widget::Buttons(b) => b.bounds(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Widget::Keyboard(_) => "keyboard",
            Widget::Slider(_) => "slider",
            Widget::Buttons(_) => "buttons",
        }
    }

    pub fn handle(&mut self, event: &ContactEvent) -> Vec<MidiMessage> {
        match self {
            Widget::Keyboard(k) => k.handle(event),
            Widget::Slider(s) => s.handle(event),
            Widget::Buttons(b) => b.handle(event),
        }
    }

    /// Release every contact-scoped binding
    pub fn release_all(&mut self) -> Vec<MidiMessage> {
        match self {
            Widget::Keyboard(k) => k.release_all(),
            Widget::Slider(s) => s.release_all(),
            Widget::Buttons(b) => b.release_all(),
        }
    }

    pub fn is_tracking(&self, id: ContactId) -> bool {
        match self {
            Widget::Keyboard(k) => k.is_tracking(id),
            Widget::Slider(s) => s.is_tracking(id),
            Widget::Buttons(b) => b.is_tracking(id),
        }
    }

    pub fn active_contacts(&self) -> usize {
        match self {
            Widget::Keyboard(k) => k.active_contacts(),
            Widget::Slider(s) => s.active_contacts(),
            Widget::Buttons(b) => b.active_contacts(),
        }
    }
}

/// All widgets of one layout plus contact ownership
pub struct Surface {
    widgets: Vec<Widget>,
    hits: HitMap<usize>,
    owners: ContactTracker<usize>,
    sink: SinkSlot,
    release_on_focus_loss: bool,
}

impl Surface {
    pub fn new(config: &SurfaceConfig, sink: SinkSlot) -> Self {
        let mut surface = Self {
            widgets: Vec::new(),
            hits: HitMap::new(),
            owners: ContactTracker::new(),
            sink,
            release_on_focus_loss: config.safety.release_on_focus_loss,
        };
        surface.build(config);
        surface
    }

    fn build(&mut self, config: &SurfaceConfig) {
        self.widgets = config.widgets.iter().map(Widget::from_config).collect();

        // Later widgets are stacked above earlier ones
        self.hits = HitMap::new();
        for (idx, widget) in self.widgets.iter().enumerate() {
            self.hits.insert(widget.bounds(), idx as i32, idx);
        }
        self.release_on_focus_loss = config.safety.release_on_focus_loss;

        info!("Surface ready with {} widgets", self.widgets.len());
    }

    /// Send the resting state of widgets that announce one
    pub fn announce(&mut self) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        for widget in &mut self.widgets {
            if let Widget::Slider(slider) = widget {
                out.extend(slider.initial_messages());
            }
        }
        self.sink.send_all(&out);
        out
    }

    /// Route one contact event, send and return whatever it produced
    pub fn handle(&mut self, event: &ContactEvent) -> Vec<MidiMessage> {
        let hits = &self.hits;
        let transitions = self
            .owners
            .resolve(event, |p| hits.hit_test(p).map(|(idx, _)| idx));

        let mut out = Vec::new();
        for transition in transitions {
            match transition {
                Transition::Activate {
                    contact,
                    target,
                    position,
                } => {
                    let start = ContactEvent::start(contact, position, event.timestamp);
                    out.extend(self.forward(target, contact, &start));
                }
                Transition::Update {
                    contact,
                    target,
                    position,
                } => {
                    let moved = ContactEvent::moved(contact, position, event.timestamp);
                    out.extend(self.forward(target, contact, &moved));
                }
                Transition::Release { contact, target } => {
                    let end = ContactEvent::end(contact, event.timestamp);
                    if let Some(widget) = self.widgets.get_mut(target) {
                        out.extend(widget.handle(&end));
                    }
                }
            }
        }

        self.sink.send_all(&out);
        out
    }

    /// Hand an event to its owning widget. Ownership is dropped as soon as
    /// the widget stops tracking the contact (missed every target inside it,
    /// or taken over by another contact).
    fn forward(&mut self, target: usize, contact: ContactId, event: &ContactEvent) -> Vec<MidiMessage> {
        let Some(widget) = self.widgets.get_mut(target) else {
            self.owners.forget(contact);
            return Vec::new();
        };

        let out = widget.handle(event);
        if !widget.is_tracking(contact) {
            self.owners.forget(contact);
        }
        out
    }

    /// The input source lost focus
    pub fn focus_lost(&mut self) -> Vec<MidiMessage> {
        if self.release_on_focus_loss {
            self.release_all()
        } else {
            debug!("Focus lost, release sweep disabled");
            Vec::new()
        }
    }

    /// Release every contact-scoped binding on every widget.
    ///
    /// Exclusive group members and latches are held state and stay as they are.
    pub fn release_all(&mut self) -> Vec<MidiMessage> {
        self.owners.release_all();

        let mut out = Vec::new();
        for widget in &mut self.widgets {
            out.extend(widget.release_all());
        }

        if !out.is_empty() {
            info!("Released {} held binding(s)", out.len());
        }
        self.sink.send_all(&out);
        out
    }

    /// Replace the layout.
    ///
    /// Everything the old widgets left sounding at the receiver is turned off
    /// first: held bindings, active exclusive members and latches. The new
    /// widgets then announce their resting state.
    pub fn apply_config(&mut self, config: &SurfaceConfig) -> Vec<MidiMessage> {
        let mut out = self.release_all();

        let mut cleared = Vec::new();
        for widget in &mut self.widgets {
            if let Widget::Buttons(panel) = widget {
                cleared.extend(panel.clear_held_state());
            }
        }
        self.sink.send_all(&cleared);
        out.extend(cleared);

        self.build(config);
        out.extend(self.announce());
        out
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn widget(&self, name: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.name() == name)
    }

    /// Contacts currently owned by some widget
    pub fn active_contacts(&self) -> usize {
        self.owners.len()
    }

    pub fn sink(&self) -> &SinkSlot {
        &self.sink
    }
}

#[cfg(test)]
mod tests;
