//! Line-oriented input source: interactive REPL and script replay
//!
//! One command per line:
//!
//! ```text
//! down <id|mouse> <x> <y>     contact start
//! move <id|mouse> <x> <y>     contact move
//! up <id|mouse>               contact end
//! cancel <id|mouse>           contact cancel
//! blur                        input focus lost
//! wait <ms>                   pause (scripts)
//! status | ports | help | quit
//! ```

use anyhow::{bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::contact::{ContactEvent, ContactId, ContactPhase};
use crate::geometry::Point;
use crate::midi::{format_hex, MidiMessage};
use crate::surface::{Surface, Widget};

const PROMPT: &str = "surface> ";

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Contact {
        phase: ContactPhase,
        id: ContactId,
        position: Point,
    },
    FocusLost,
    Wait(Duration),
    Status,
    Ports,
    Help,
    Quit,
}

impl Command {
    /// Stamp a contact command into an event
    pub fn to_event(&self, now: Instant) -> Option<ContactEvent> {
        match *self {
            Command::Contact {
                phase,
                id,
                position,
            } => Some(ContactEvent {
                id,
                phase,
                position,
                timestamp: now,
            }),
            _ => None,
        }
    }
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    let args = &parts[1..];

    let command = match parts[0].to_lowercase().as_str() {
        "down" | "move" => {
            let phase = if parts[0].eq_ignore_ascii_case("down") {
                ContactPhase::Start
            } else {
                ContactPhase::Move
            };
            let [id, x, y] = args else {
                bail!("Usage: {} <id|mouse> <x> <y>", parts[0]);
            };
            Command::Contact {
                phase,
                id: parse_contact(id)?,
                position: Point::new(parse_coord(x)?, parse_coord(y)?),
            }
        }
        "up" | "cancel" => {
            let phase = if parts[0].eq_ignore_ascii_case("up") {
                ContactPhase::End
            } else {
                ContactPhase::Cancel
            };
            let [id] = args else {
                bail!("Usage: {} <id|mouse>", parts[0]);
            };
            Command::Contact {
                phase,
                id: parse_contact(id)?,
                position: Point::default(),
            }
        }
        "blur" => Command::FocusLost,
        "wait" => {
            let [ms] = args else {
                bail!("Usage: wait <ms>");
            };
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("Invalid duration '{}'", ms))?;
            Command::Wait(Duration::from_millis(ms))
        }
        "status" => Command::Status,
        "ports" => Command::Ports,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("Unknown command '{}' (try 'help')", other),
    };

    Ok(Some(command))
}

fn parse_contact(s: &str) -> Result<ContactId> {
    if s.eq_ignore_ascii_case("mouse") {
        return Ok(ContactId::MOUSE);
    }
    let id: u64 = s
        .parse()
        .with_context(|| format!("Invalid contact id '{}'", s))?;
    if ContactId(id) == ContactId::MOUSE {
        bail!("Contact id {} is reserved for the mouse", id);
    }
    Ok(ContactId(id))
}

fn parse_coord(s: &str) -> Result<f64> {
    let v: f64 = s
        .parse()
        .with_context(|| format!("Invalid coordinate '{}'", s))?;
    if !v.is_finite() {
        bail!("Coordinate '{}' must be finite", s);
    }
    Ok(v)
}

/// Read every line of a script file
pub async fn read_script(path: &str) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script: {}", path))?;
    Ok(contents.lines().map(str::to_string).collect())
}

/// Run the blocking rustyline editor on a detached thread, forwarding lines.
/// The channel closes on EOF, Ctrl-C or when the receiver goes away.
pub fn spawn_repl(tx: mpsc::Sender<String>) -> JoinHandle<Result<()>> {
    thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                warn!("REPL unavailable, no interactive input: {}", e);
                return Err(e.into());
            }
        };

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    debug!("REPL read error: {}", e);
                    break;
                }
            }
        }

        Ok(())
    })
}

pub fn print_help() {
    println!("\n{}", "Commands:".bold());
    println!("  {}  contact start", "down <id|mouse> <x> <y>".cyan());
    println!("  {}  contact move", "move <id|mouse> <x> <y>".cyan());
    println!("  {}            contact end", "up <id|mouse>".cyan());
    println!("  {}        contact cancel", "cancel <id|mouse>".cyan());
    println!("  {}                     release held bindings", "blur".cyan());
    println!("  {}                pause", "wait <ms>".cyan());
    println!("  {}", "status | ports | quit".cyan());
}

/// Show what a command produced
pub fn print_messages(messages: &[MidiMessage]) {
    for message in messages {
        println!(
            "  {} {}",
            format_hex(&message.encode()).as_str().yellow(),
            message.to_string().as_str().dimmed()
        );
    }
}

pub fn print_ports(ports: &[String], selected: Option<&str>) {
    println!("\n{}", "=== MIDI Output Ports ===".bold().cyan());
    if ports.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (idx, port) in ports.iter().enumerate() {
        let marker = if Some(port.as_str()) == selected {
            "[SELECTED]".green()
        } else {
            "".normal()
        };
        println!("  {}: {} {}", idx, port, marker);
    }
}

pub fn print_status(surface: &Surface, now: Instant) {
    println!("\n{}", "=== Surface ===".bold().cyan());
    println!("  Output: {}", surface.sink().status().to_string().as_str().green());
    println!("  Active contacts: {}", surface.active_contacts());

    for widget in surface.widgets() {
        let detail = match widget {
            Widget::Keyboard(k) => format!("held {:?}", k.held_notes()),
            Widget::Slider(s) => match s.last_value() {
                Some(v) => format!("value {}", v),
                None => "idle".to_string(),
            },
            Widget::Buttons(b) => {
                let lit: Vec<&str> = b
                    .buttons()
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| b.is_lit(*idx, now))
                    .map(|(_, button)| button.label.as_str())
                    .collect();
                format!("lit {:?}", lit)
            }
        };
        println!(
            "  {} {} {}",
            widget.name().yellow(),
            format!("({})", widget.kind()).as_str().dimmed(),
            detail
        );
    }
}
