//! Contact lifecycle tracking
//!
//! Every widget owns a [`ContactTracker`] that binds active contact
//! identifiers to whatever the widget drives (a note, a button, the widget
//! itself). Raw start/move/end/cancel events are resolved into
//! activate/update/release transitions; events for untracked contacts are
//! dropped silently.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::trace;

use crate::geometry::Point;

/// Identifier of one physical contact, unique among active contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactId(pub u64);

impl ContactId {
    /// The pointer device. Touch identifiers never reach this value.
    pub const MOUSE: ContactId = ContactId(u64::MAX);
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ContactId::MOUSE {
            write!(f, "mouse")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Contact lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// One event from the input source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub id: ContactId,
    pub phase: ContactPhase,
    /// Ignored for End and Cancel
    pub position: Point,
    pub timestamp: Instant,
}

impl ContactEvent {
    pub fn start(id: ContactId, position: Point, timestamp: Instant) -> Self {
        Self {
            id,
            phase: ContactPhase::Start,
            position,
            timestamp,
        }
    }

    pub fn moved(id: ContactId, position: Point, timestamp: Instant) -> Self {
        Self {
            id,
            phase: ContactPhase::Move,
            position,
            timestamp,
        }
    }

    pub fn end(id: ContactId, timestamp: Instant) -> Self {
        Self {
            id,
            phase: ContactPhase::End,
            position: Point::default(),
            timestamp,
        }
    }

    pub fn cancel(id: ContactId, timestamp: Instant) -> Self {
        Self {
            id,
            phase: ContactPhase::Cancel,
            position: Point::default(),
            timestamp,
        }
    }
}

/// Logical transition produced for a widget
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T> {
    Activate {
        contact: ContactId,
        target: T,
        position: Point,
    },
    Update {
        contact: ContactId,
        target: T,
        position: Point,
    },
    Release {
        contact: ContactId,
        target: T,
    },
}

/// Registry of active contacts for one widget instance
#[derive(Debug, Clone)]
pub struct ContactTracker<T> {
    bindings: HashMap<ContactId, T>,
}

impl<T: Clone> ContactTracker<T> {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Resolve any event. `hit` is only consulted for Start.
    pub fn resolve<F>(&mut self, event: &ContactEvent, hit: F) -> Vec<Transition<T>>
    where
        F: FnOnce(Point) -> Option<T>,
    {
        match event.phase {
            ContactPhase::Start => self.on_start(event.id, event.position, hit),
            ContactPhase::Move => self.on_move(event.id, event.position).into_iter().collect(),
            ContactPhase::End => self.on_end(event.id).into_iter().collect(),
            ContactPhase::Cancel => self.on_cancel(event.id).into_iter().collect(),
        }
    }

    /// Start a contact.
    ///
    /// If the identifier is still bound (its end was never delivered), the
    /// stale binding is released before the new one is activated. A position
    /// that hits nothing leaves the contact untracked.
    pub fn on_start<F>(&mut self, id: ContactId, position: Point, hit: F) -> Vec<Transition<T>>
    where
        F: FnOnce(Point) -> Option<T>,
    {
        let mut transitions = Vec::with_capacity(2);

        if let Some(stale) = self.bindings.remove(&id) {
            trace!("Contact {} restarted while bound, releasing stale binding", id);
            transitions.push(Transition::Release {
                contact: id,
                target: stale,
            });
        }

        match hit(position) {
            Some(target) => {
                self.bindings.insert(id, target.clone());
                transitions.push(Transition::Activate {
                    contact: id,
                    target,
                    position,
                });
            }
            None => trace!("Contact {} missed every target", id),
        }

        transitions
    }

    pub fn on_move(&mut self, id: ContactId, position: Point) -> Option<Transition<T>> {
        self.bindings.get(&id).map(|target| Transition::Update {
            contact: id,
            target: target.clone(),
            position,
        })
    }

    pub fn on_end(&mut self, id: ContactId) -> Option<Transition<T>> {
        self.bindings
            .remove(&id)
            .map(|target| Transition::Release { contact: id, target })
    }

    /// Cancellation releases exactly like an end
    pub fn on_cancel(&mut self, id: ContactId) -> Option<Transition<T>> {
        self.on_end(id)
    }

    /// Drop a binding without producing a release
    pub fn forget(&mut self, id: ContactId) -> Option<T> {
        self.bindings.remove(&id)
    }

    /// Release every binding, ordered by contact identifier
    pub fn release_all(&mut self) -> Vec<Transition<T>> {
        let mut drained: Vec<(ContactId, T)> = self.bindings.drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
            .into_iter()
            .map(|(contact, target)| Transition::Release { contact, target })
            .collect()
    }

    pub fn get(&self, id: ContactId) -> Option<&T> {
        self.bindings.get(&id)
    }

    pub fn is_tracking(&self, id: ContactId) -> bool {
        self.bindings.contains_key(&id)
    }

    pub fn contacts(&self) -> impl Iterator<Item = ContactId> + '_ {
        self.bindings.keys().copied()
    }

    pub fn targets(&self) -> impl Iterator<Item = &T> + '_ {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<T: Clone> Default for ContactTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}
