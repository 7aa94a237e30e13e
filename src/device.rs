//! Output device discovery and selection
//!
//! Port enumeration goes through midir. Selection is recomputed on every
//! rescan so a device that is unplugged and plugged back in is picked up
//! again without a restart.

use anyhow::{anyhow, Context, Result};
use midir::MidiOutput;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::transport::{ConnectionStatus, MidirSink, SinkSlot};

/// midir client name
pub const CLIENT_NAME: &str = "Touch-Surface";

/// List available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output client")?;

    let mut port_names = Vec::new();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            port_names.push(name);
        }
    }

    Ok(port_names)
}

/// Case-insensitive substring match, first hit wins
pub fn find_output_port<'a>(available: &'a [String], pattern: &str) -> Option<&'a str> {
    let pattern = pattern.to_lowercase();
    available
        .iter()
        .find(|name| name.to_lowercase().contains(&pattern))
        .map(String::as_str)
}

/// Result of a bounded readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T> {
    Ready(T),
    Unavailable { attempts: u32 },
}

/// Call `f` up to `attempts` times, `interval` apart, until it succeeds
pub async fn probe<T, F, Fut>(attempts: u32, interval: Duration, mut f: F) -> Readiness<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=attempts {
        match f().await {
            Ok(value) => {
                debug!("Ready after {} attempt(s)", attempt);
                return Readiness::Ready(value);
            }
            Err(e) => {
                debug!("Readiness attempt {}/{} failed: {:#}", attempt, attempts, e);
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    Readiness::Unavailable { attempts }
}

/// Wait until the MIDI subsystem can enumerate output ports
pub async fn wait_for_output(attempts: u32, interval: Duration) -> Readiness<Vec<String>> {
    probe(attempts, interval, || async { list_output_ports() }).await
}

/// What a rescan decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Keep,
    Connect(String),
    Disconnect,
}

/// Pick the output port after an enumeration.
///
/// The current port is kept while it exists. Otherwise the preferred pattern
/// wins, then a sole available port. With no candidate a current selection
/// is dropped.
pub fn choose_port(current: Option<&str>, preferred: Option<&str>, available: &[String]) -> Selection {
    if let Some(current) = current {
        if available.iter().any(|p| p == current) {
            return Selection::Keep;
        }
    }

    let candidate = preferred
        .and_then(|pattern| find_output_port(available, pattern))
        .or_else(|| match available {
            [only] => Some(only.as_str()),
            _ => None,
        });

    match (candidate, current) {
        (Some(port), _) => Selection::Connect(port.to_string()),
        (None, Some(_)) => Selection::Disconnect,
        (None, None) => Selection::Keep,
    }
}

/// Keeps a [`SinkSlot`] pointed at a live output port
pub struct DeviceSelector {
    slot: SinkSlot,
    preferred: Option<String>,
}

impl DeviceSelector {
    pub fn new(slot: SinkSlot, preferred: Option<String>) -> Self {
        Self { slot, preferred }
    }

    pub fn set_preferred(&mut self, preferred: Option<String>) {
        self.preferred = preferred;
    }

    /// Re-enumerate ports and update the selection
    pub fn refresh(&mut self) -> Result<ConnectionStatus> {
        let available = list_output_ports()?;
        let current = self.slot.selected_name();

        match choose_port(current.as_deref(), self.preferred.as_deref(), &available) {
            Selection::Keep => {}
            Selection::Connect(port) => {
                if let Err(e) = self.connect(&port) {
                    warn!("Failed to open output '{}': {:#}", port, e);
                    self.slot.clear();
                }
            }
            Selection::Disconnect => {
                info!("Output '{}' disappeared", current.unwrap_or_default());
                self.slot.clear();
            }
        }

        Ok(self.slot.status())
    }

    fn connect(&self, port_name: &str) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output client")?;

        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Output port '{}' not found", port_name))?;

        info!("Connecting to output port: {}", port_name);

        let conn = midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to connect to output port: {}", e))?;

        self.slot
            .select(Box::new(MidirSink::new(port_name.to_string(), conn)));
        Ok(())
    }
}
