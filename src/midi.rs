//! MIDI codec and message types
//!
//! Builds the outbound wire messages the surface produces. Constructors are
//! checked: any parameter outside its MIDI range is rejected with
//! [`CodecError::OutOfRange`] instead of being masked into range, so callers
//! clamp first and the bytes on the wire always mean what the widget computed.

use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Highest 7-bit data value
pub const DATA_MAX: u8 = 127;

/// Highest 14-bit pitch bend value
pub const PITCH_BEND_MAX: u16 = 16383;

/// Pitch bend rest position
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Highest channel number (channels are 0-based on the wire)
pub const CHANNEL_MAX: u8 = 15;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{field} {value} out of range ({min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

fn check(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), CodecError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CodecError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Outbound MIDI messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127)
    NoteOff { channel: u8, note: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive, kept verbatim including the F0/F7 framing
    SysEx { data: Vec<u8> },
}

/// Build a Note On
pub fn note_on(note: u8, velocity: u8, channel: u8) -> Result<MidiMessage, CodecError> {
    check("note", note.into(), 0, DATA_MAX.into())?;
    check("velocity", velocity.into(), 1, DATA_MAX.into())?;
    check("channel", channel.into(), 0, CHANNEL_MAX.into())?;
    Ok(MidiMessage::NoteOn {
        channel,
        note,
        velocity,
    })
}

/// Build a Note Off (always sent with release velocity 0)
pub fn note_off(note: u8, channel: u8) -> Result<MidiMessage, CodecError> {
    check("note", note.into(), 0, DATA_MAX.into())?;
    check("channel", channel.into(), 0, CHANNEL_MAX.into())?;
    Ok(MidiMessage::NoteOff { channel, note })
}

/// Build a Control Change
pub fn control_change(controller: u8, value: u8, channel: u8) -> Result<MidiMessage, CodecError> {
    check("controller", controller.into(), 0, DATA_MAX.into())?;
    check("value", value.into(), 0, DATA_MAX.into())?;
    check("channel", channel.into(), 0, CHANNEL_MAX.into())?;
    Ok(MidiMessage::ControlChange {
        channel,
        cc: controller,
        value,
    })
}

/// Build a 14-bit Pitch Bend
pub fn pitch_bend(value: u16, channel: u8) -> Result<MidiMessage, CodecError> {
    check("pitch bend", value.into(), 0, PITCH_BEND_MAX.into())?;
    check("channel", channel.into(), 0, CHANNEL_MAX.into())?;
    Ok(MidiMessage::PitchBend { channel, value })
}

/// Wrap raw System Exclusive bytes.
///
/// Passthrough only: framing is the caller's responsibility.
pub fn sysex(data: &[u8]) -> MidiMessage {
    MidiMessage::SysEx {
        data: data.to_vec(),
    }
}

/// MIDI Machine Control command addressed to all devices (`F0 7F 7F 06 cmd F7`)
pub fn mmc_command(command: u8) -> Vec<u8> {
    vec![0xF0, 0x7F, 0x7F, 0x06, command & 0x7F, 0xF7]
}

impl MidiMessage {
    /// Parse one of the supported outbound messages from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        if status == 0xF0 {
            return match data.last() {
                Some(0xF7) => Some(MidiMessage::SysEx {
                    data: data.to_vec(),
                }),
                _ => None,
            };
        }

        if data.len() < 3 || status < 0x80 {
            return None;
        }

        let channel = status & 0x0F;
        let d1 = data[1] & 0x7F;
        let d2 = data[2] & 0x7F;

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff { channel, note: d1 }),
            // Note On with velocity 0 = Note Off
            0x90 if d2 == 0 => Some(MidiMessage::NoteOff { channel, note: d1 }),
            0x90 => Some(MidiMessage::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: d1,
                value: d2,
            }),
            0xE0 => Some(MidiMessage::PitchBend {
                channel,
                value: ((d2 as u16) << 7) | d1 as u16,
            }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note } => vec![0x80 | channel, note, 0],
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | channel, note, velocity],
            MidiMessage::ControlChange { channel, cc, value } => vec![0xB0 | channel, cc, value],
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | channel, lsb, msb]
            }
            MidiMessage::SysEx { ref data } => data.clone(),
        }
    }

    /// Get the channel for channel messages (0-15), None for SysEx
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(channel),
            MidiMessage::SysEx { .. } => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note } => {
                write!(f, "NoteOff ch:{} n:{}", channel + 1, note)
            }
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => write!(f, "SysEx {} bytes", data.len()),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append a checked message; a rejected one is logged and dropped
pub(crate) fn push_checked(out: &mut Vec<MidiMessage>, message: Result<MidiMessage, CodecError>) {
    match message {
        Ok(m) => out.push(m),
        Err(e) => warn!("Dropping message: {}", e),
    }
}
