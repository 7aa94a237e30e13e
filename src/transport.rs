//! Output transport
//!
//! Widgets never talk to a port directly. Everything they produce is handed to
//! a [`SinkSlot`], which forwards it to whichever [`MidiSink`] is currently
//! selected. With no sink selected messages are dropped; a failed send is
//! logged and dropped too. Nothing is buffered or retried.

use anyhow::{anyhow, Result};
use midir::MidiOutputConnection;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::midi::{format_hex, MidiMessage};

/// Destination for encoded MIDI bytes
pub trait MidiSink: Send {
    /// Port or sink name shown in status output
    fn name(&self) -> &str;

    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Output connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A sink is selected
    Connected { port: String },
    /// Nothing selected, messages are dropped
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected { port } => write!(f, "connected to '{}'", port),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Shared handle to the currently selected sink
#[derive(Clone, Default)]
pub struct SinkSlot {
    inner: Arc<Mutex<Option<Box<dyn MidiSink>>>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selected sink
    pub fn select(&self, sink: Box<dyn MidiSink>) {
        info!("Output selected: {}", sink.name());
        *self.inner.lock() = Some(sink);
    }

    pub fn clear(&self) {
        if let Some(old) = self.inner.lock().take() {
            info!("Output deselected: {}", old.name());
        }
    }

    pub fn selected_name(&self) -> Option<String> {
        self.inner.lock().as_ref().map(|s| s.name().to_string())
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.selected_name() {
            Some(port) => ConnectionStatus::Connected { port },
            None => ConnectionStatus::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Fire-and-forget send
    pub fn send(&self, message: &MidiMessage) {
        let mut guard = self.inner.lock();
        let Some(sink) = guard.as_mut() else {
            trace!("No output selected, dropping {}", message);
            return;
        };

        let data = message.encode();
        match sink.send(&data) {
            Ok(()) => debug!("Sent: {} | {}", format_hex(&data), message),
            Err(e) => debug!("Send to '{}' failed, dropping {}: {:#}", sink.name(), message, e),
        }
    }

    pub fn send_all(&self, messages: &[MidiMessage]) {
        for message in messages {
            self.send(message);
        }
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSlot")
            .field("selected", &self.selected_name())
            .finish()
    }
}

/// Hardware or virtual port opened through midir
pub struct MidirSink {
    port_name: String,
    conn: MidiOutputConnection,
}

impl MidirSink {
    pub fn new(port_name: String, conn: MidiOutputConnection) -> Self {
        Self { port_name, conn }
    }
}

impl MidiSink for MidirSink {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.conn
            .send(bytes)
            .map_err(|e| anyhow!("Failed to send MIDI message: {}", e))
    }
}

/// Logs every message instead of sending it (`--dry-run`)
#[derive(Debug, Default)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match MidiMessage::parse(bytes) {
            Some(message) => info!("MIDI {} | {}", format_hex(bytes), message),
            None => info!("MIDI {}", format_hex(bytes)),
        }
        Ok(())
    }
}

/// Records everything sent; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    name: String,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sent: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl MidiSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl MidiSink for FailingSink {
        fn name(&self) -> &str {
            "broken"
        }

        fn send(&mut self, _bytes: &[u8]) -> Result<()> {
            Err(anyhow!("port vanished"))
        }
    }

    fn note() -> MidiMessage {
        MidiMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 90,
        }
    }

    #[test]
    fn test_send_without_sink_is_dropped() {
        let slot = SinkSlot::new();
        slot.send(&note());
        assert_eq!(slot.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_send_reaches_selected_sink() {
        let slot = SinkSlot::new();
        let sink = MemorySink::new("IAC Bus 1");
        slot.select(Box::new(sink.clone()));

        slot.send(&note());
        assert_eq!(sink.sent(), vec![vec![0x90, 60, 90]]);
        assert_eq!(
            slot.status(),
            ConnectionStatus::Connected {
                port: "IAC Bus 1".to_string()
            }
        );
    }

    #[test]
    fn test_failed_send_is_swallowed() {
        let slot = SinkSlot::new();
        slot.select(Box::new(FailingSink));
        slot.send(&note());
        assert!(slot.is_connected());
    }

    #[test]
    fn test_clear_stops_delivery() {
        let slot = SinkSlot::new();
        let sink = MemorySink::new("a");
        slot.select(Box::new(sink.clone()));
        slot.clear();
        slot.send(&note());
        assert!(sink.sent().is_empty());
        assert_eq!(slot.selected_name(), None);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(
            ConnectionStatus::Connected { port: "X".into() }.to_string(),
            "connected to 'X'"
        );
    }
}
