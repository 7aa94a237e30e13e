//! Touch Surface - touch-driven virtual MIDI control surface
//!
//! Translates multi-touch and pointer contacts on on-screen widgets (piano
//! keyboards, sliders, pattern and transport buttons) into MIDI wire messages.

pub mod buttons;
pub mod cli;
pub mod config;
pub mod contact;
pub mod device;
pub mod geometry;
pub mod keyboard;
pub mod midi;
pub mod slider;
pub mod surface;
pub mod transport;

pub use config::SurfaceConfig;
pub use contact::{ContactEvent, ContactId, ContactPhase};
pub use midi::{CodecError, MidiMessage};
pub use surface::{Surface, Widget};
pub use transport::{ConnectionStatus, MidiSink, SinkSlot};
