//! Configuration management for the touch surface
//!
//! Handles loading, parsing, validation and hot-reloading of the YAML layout
//! file. A missing file falls back to the built-in layout.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::geometry::Rect;
use crate::midi::{CHANNEL_MAX, DATA_MAX};

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurfaceConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default = "default_widgets")]
    pub widgets: Vec<WidgetConfig>,
}

/// Output device selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Case-insensitive substring of the preferred output port name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    #[serde(default = "default_readiness_interval")]
    pub readiness_interval_ms: u64,
    /// How often the port list is re-enumerated for hot-plug
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_ms: u64,
}

/// Stuck-note mitigation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub release_on_focus_loss: bool,
}

/// One on-screen widget
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetConfig {
    Keyboard(KeyboardConfig),
    Slider(SliderConfig),
    Buttons(ButtonPanelConfig),
}

/// Piano keyboard
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyboardConfig {
    pub name: String,
    pub bounds: Rect,
    pub start_note: u8,
    pub key_count: u8,
    #[serde(default)]
    pub channel: u8,
    /// Fraction of the keyboard height covered by black keys
    #[serde(default = "default_black_key_height")]
    pub black_key_height: f64,
}

/// Vertical slider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SliderConfig {
    pub name: String,
    pub bounds: Rect,
    /// Bidirectional pitch bend returning to center on release
    #[serde(default)]
    pub spring_back: bool,
    /// Controller used when not spring-back
    #[serde(default = "default_controller")]
    pub controller: u8,
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "default_throttle")]
    pub throttle_ms: u64,
}

/// A panel of discrete buttons sharing exclusive-group and latch state
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ButtonPanelConfig {
    pub name: String,
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "default_flash")]
    pub flash_ms: u64,
    pub buttons: Vec<ButtonConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ButtonConfig {
    pub label: String,
    pub bounds: Rect,
    pub action: ButtonAction,
}

/// What a button does when pressed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ButtonAction {
    /// Note on while held, note off on release
    Momentary {
        note: u8,
        #[serde(default = "default_velocity")]
        velocity: u8,
    },
    /// Toggle; at most one active member per group
    Exclusive {
        note: u8,
        #[serde(default = "default_velocity")]
        velocity: u8,
        group: String,
    },
    /// Each press flips a boolean sent as CC 127/0
    Latched { controller: u8 },
    /// Fire a fixed System Exclusive message per press
    Sysex { bytes: Vec<u8> },
    /// Fire an MMC transport command per press
    Transport { command: MmcCommand },
}

/// MIDI Machine Control transport commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MmcCommand {
    Stop,
    Play,
    FastForward,
    Rewind,
    Record,
    Pause,
}

impl MmcCommand {
    pub fn code(self) -> u8 {
        match self {
            MmcCommand::Stop => 0x01,
            MmcCommand::Play => 0x02,
            MmcCommand::FastForward => 0x04,
            MmcCommand::Rewind => 0x05,
            MmcCommand::Record => 0x06,
            MmcCommand::Pause => 0x09,
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            output_port: None,
            readiness_attempts: default_readiness_attempts(),
            readiness_interval_ms: default_readiness_interval(),
            rescan_interval_ms: default_rescan_interval(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            release_on_focus_loss: true,
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            midi: MidiConfig::default(),
            safety: SafetyConfig::default(),
            widgets: default_widgets(),
        }
    }
}

impl SurfaceConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise use the built-in layout
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path).await
        } else {
            info!("No config at {}, using built-in layout", path);
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: SurfaceConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.widgets.is_empty() {
            anyhow::bail!("At least one widget must be defined");
        }

        let mut names = HashSet::new();
        for widget in &self.widgets {
            let name = widget.name();
            if name.is_empty() {
                anyhow::bail!("Widget name cannot be empty");
            }
            if !names.insert(name) {
                anyhow::bail!("Duplicate widget name '{}'", name);
            }
            widget
                .validate()
                .with_context(|| format!("Invalid widget '{}'", name))?;
        }

        Ok(())
    }
}

impl WidgetConfig {
    pub fn name(&self) -> &str {
        match self {
            WidgetConfig::Keyboard(k) => &k.name,
            WidgetConfig::Slider(s) => &s.name,
            WidgetConfig::Buttons(b) => &b.name,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            WidgetConfig::Keyboard(k) => {
                validate_rect(&k.bounds)?;
                validate_channel(k.channel)?;
                if k.key_count == 0 {
                    anyhow::bail!("key_count must be at least 1");
                }
                let last = k.start_note as u16 + k.key_count as u16 - 1;
                if last > DATA_MAX as u16 {
                    anyhow::bail!(
                        "Key range {}..={} exceeds note 127",
                        k.start_note,
                        last
                    );
                }
                if !(k.black_key_height > 0.0 && k.black_key_height <= 1.0) {
                    anyhow::bail!(
                        "black_key_height {} must be within (0, 1]",
                        k.black_key_height
                    );
                }
            }
            WidgetConfig::Slider(s) => {
                validate_rect(&s.bounds)?;
                validate_channel(s.channel)?;
                validate_data("controller", s.controller)?;
            }
            WidgetConfig::Buttons(panel) => {
                validate_channel(panel.channel)?;
                if panel.buttons.is_empty() {
                    anyhow::bail!("A button panel needs at least one button");
                }
                for button in &panel.buttons {
                    validate_rect(&button.bounds)
                        .and_then(|_| button.action.validate())
                        .with_context(|| format!("Invalid button '{}'", button.label))?;
                }
            }
        }
        Ok(())
    }
}

impl ButtonAction {
    fn validate(&self) -> Result<()> {
        match self {
            ButtonAction::Momentary { note, velocity }
            | ButtonAction::Exclusive { note, velocity, .. } => {
                validate_data("note", *note)?;
                if *velocity == 0 || *velocity > DATA_MAX {
                    anyhow::bail!("velocity {} must be 1-127", velocity);
                }
                if let ButtonAction::Exclusive { group, .. } = self {
                    if group.is_empty() {
                        anyhow::bail!("Exclusive group name cannot be empty");
                    }
                }
            }
            ButtonAction::Latched { controller } => validate_data("controller", *controller)?,
            ButtonAction::Sysex { bytes } => {
                if bytes.len() < 2 || bytes.first() != Some(&0xF0) || bytes.last() != Some(&0xF7) {
                    anyhow::bail!("SysEx bytes must start with 0xF0 and end with 0xF7");
                }
                if bytes[1..bytes.len() - 1].iter().any(|b| *b > DATA_MAX) {
                    anyhow::bail!("SysEx payload bytes must be 7-bit");
                }
            }
            ButtonAction::Transport { .. } => {}
        }
        Ok(())
    }
}

fn validate_rect(rect: &Rect) -> Result<()> {
    if rect.is_empty() || !(rect.x.is_finite() && rect.y.is_finite()) {
        anyhow::bail!("bounds {:?} must have a positive width and height", rect);
    }
    Ok(())
}

fn validate_channel(channel: u8) -> Result<()> {
    if channel > CHANNEL_MAX {
        anyhow::bail!("channel {} must be 0-15", channel);
    }
    Ok(())
}

fn validate_data(field: &str, value: u8) -> Result<()> {
    if value > DATA_MAX {
        anyhow::bail!("{} {} must be 0-127", field, value);
    }
    Ok(())
}

/// Built-in layout on a 1280x800 canvas
pub fn default_widgets() -> Vec<WidgetConfig> {
    const PATTERNS: [(&str, u8); 12] = [
        ("C", 24),
        ("C#", 25),
        ("D", 26),
        ("D#", 27),
        ("E", 28),
        ("F", 29),
        ("F#", 30),
        ("G", 31),
        ("G#", 32),
        ("A", 33),
        ("Bb", 34),
        ("B", 35),
    ];

    let patterns = PATTERNS
        .iter()
        .enumerate()
        .map(|(i, &(label, note))| {
            let action = if note <= 31 {
                ButtonAction::Exclusive {
                    note,
                    velocity: default_velocity(),
                    group: "pink".to_string(),
                }
            } else {
                ButtonAction::Momentary {
                    note,
                    velocity: default_velocity(),
                }
            };
            ButtonConfig {
                label: label.to_string(),
                bounds: Rect::new(20.0 + i as f64 * 70.0, 20.0, 60.0, 60.0),
                action,
            }
        })
        .collect();

    let transport_actions = [
        ("Rewind", ButtonAction::Transport { command: MmcCommand::Rewind }),
        ("Forward", ButtonAction::Transport { command: MmcCommand::FastForward }),
        ("Stop", ButtonAction::Transport { command: MmcCommand::Stop }),
        ("Play", ButtonAction::Transport { command: MmcCommand::Play }),
        ("Pause", ButtonAction::Transport { command: MmcCommand::Pause }),
        ("Record", ButtonAction::Transport { command: MmcCommand::Record }),
        ("Loop", ButtonAction::Latched { controller: 117 }),
    ];
    let transport = transport_actions
        .into_iter()
        .enumerate()
        .map(|(i, (label, action))| ButtonConfig {
            label: label.to_string(),
            bounds: Rect::new(900.0 + i as f64 * 52.0, 20.0, 46.0, 60.0),
            action,
        })
        .collect();

    vec![
        WidgetConfig::Buttons(ButtonPanelConfig {
            name: "patterns".to_string(),
            channel: 0,
            flash_ms: default_flash(),
            buttons: patterns,
        }),
        WidgetConfig::Buttons(ButtonPanelConfig {
            name: "transport".to_string(),
            channel: 0,
            flash_ms: default_flash(),
            buttons: transport,
        }),
        WidgetConfig::Slider(SliderConfig {
            name: "pitch".to_string(),
            bounds: Rect::new(20.0, 100.0, 60.0, 680.0),
            spring_back: true,
            controller: default_controller(),
            channel: 0,
            throttle_ms: default_throttle(),
        }),
        WidgetConfig::Slider(SliderConfig {
            name: "mod".to_string(),
            bounds: Rect::new(100.0, 100.0, 60.0, 680.0),
            spring_back: false,
            controller: default_controller(),
            channel: 0,
            throttle_ms: default_throttle(),
        }),
        WidgetConfig::Keyboard(KeyboardConfig {
            name: "upper".to_string(),
            bounds: Rect::new(180.0, 100.0, 1080.0, 330.0),
            start_note: 60,
            key_count: 25,
            channel: 0,
            black_key_height: default_black_key_height(),
        }),
        WidgetConfig::Keyboard(KeyboardConfig {
            name: "lower".to_string(),
            bounds: Rect::new(180.0, 450.0, 1080.0, 330.0),
            start_note: 36,
            key_count: 25,
            channel: 0,
            black_key_height: default_black_key_height(),
        }),
    ]
}

// Default value functions
fn default_true() -> bool { true }
fn default_readiness_attempts() -> u32 { 10 }
fn default_readiness_interval() -> u64 { 500 }
fn default_rescan_interval() -> u64 { 1000 }
fn default_black_key_height() -> f64 { 0.6 }
fn default_controller() -> u8 { 1 }
fn default_throttle() -> u64 { 15 }
fn default_flash() -> u64 { 150 }
fn default_velocity() -> u8 { 100 }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_layout_is_valid() {
        let config = SurfaceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.widgets.len(), 6);
        assert!(config.safety.release_on_focus_loss);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = SurfaceConfig::from_yaml("{}").unwrap();
        assert_eq!(config.widgets.len(), 6);
        assert_eq!(config.midi.readiness_attempts, 10);
        assert_eq!(config.midi.readiness_interval_ms, 500);
    }

    #[test]
    fn test_parse_widgets() {
        let yaml = r#"
midi:
  output_port: "IAC"
widgets:
  - type: keyboard
    name: keys
    bounds: { x: 0, y: 0, width: 700, height: 200 }
    start_note: 48
    key_count: 13
  - type: slider
    name: bend
    bounds: { x: 710, y: 0, width: 40, height: 200 }
    spring_back: true
  - type: buttons
    name: pads
    buttons:
      - label: A
        bounds: { x: 0, y: 210, width: 50, height: 50 }
        action: { mode: exclusive, note: 24, group: pink }
      - label: Play
        bounds: { x: 60, y: 210, width: 50, height: 50 }
        action: { mode: transport, command: play }
      - label: Loop
        bounds: { x: 120, y: 210, width: 50, height: 50 }
        action: { mode: latched, controller: 117 }
"#;
        let config = SurfaceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.midi.output_port.as_deref(), Some("IAC"));
        assert_eq!(config.widgets.len(), 3);

        match &config.widgets[0] {
            WidgetConfig::Keyboard(k) => {
                assert_eq!(k.start_note, 48);
                assert_eq!(k.black_key_height, 0.6);
            }
            other => panic!("expected keyboard, got {:?}", other),
        }
        match &config.widgets[1] {
            WidgetConfig::Slider(s) => {
                assert!(s.spring_back);
                assert_eq!(s.throttle_ms, 15);
            }
            other => panic!("expected slider, got {:?}", other),
        }
        match &config.widgets[2] {
            WidgetConfig::Buttons(b) => {
                assert_eq!(
                    b.buttons[0].action,
                    ButtonAction::Exclusive {
                        note: 24,
                        velocity: 100,
                        group: "pink".to_string()
                    }
                );
                assert_eq!(
                    b.buttons[1].action,
                    ButtonAction::Transport {
                        command: MmcCommand::Play
                    }
                );
            }
            other => panic!("expected buttons, got {:?}", other),
        }
    }

    #[test]
    fn test_key_range_past_127_rejected() {
        let yaml = r#"
widgets:
  - type: keyboard
    name: keys
    bounds: { x: 0, y: 0, width: 700, height: 200 }
    start_note: 120
    key_count: 13
"#;
        assert!(SurfaceConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_bad_channel_rejected() {
        let yaml = r#"
widgets:
  - type: slider
    name: s
    bounds: { x: 0, y: 0, width: 10, height: 100 }
    channel: 16
"#;
        assert!(SurfaceConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unframed_sysex_rejected() {
        let yaml = r#"
widgets:
  - type: buttons
    name: t
    buttons:
      - label: X
        bounds: { x: 0, y: 0, width: 10, height: 10 }
        action: { mode: sysex, bytes: [0x7F, 0x06, 0x02] }
"#;
        assert!(SurfaceConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = SurfaceConfig::default();
        let first = config.widgets[0].clone();
        config.widgets.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mmc_codes() {
        assert_eq!(MmcCommand::Rewind.code(), 0x05);
        assert_eq!(MmcCommand::FastForward.code(), 0x04);
        assert_eq!(MmcCommand::Stop.code(), 0x01);
        assert_eq!(MmcCommand::Play.code(), 0x02);
        assert_eq!(MmcCommand::Pause.code(), 0x09);
        assert_eq!(MmcCommand::Record.code(), 0x06);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("surface.yaml");
        let path = path.to_string_lossy().to_string();

        SurfaceConfig::default().save(&path).await?;
        let loaded = SurfaceConfig::load(&path).await?;
        assert_eq!(loaded.widgets.len(), 6);
        assert_eq!(loaded.widgets[4].name(), "upper");

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_default() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("absent.yaml");
        let config = SurfaceConfig::load_or_default(&path.to_string_lossy()).await?;
        assert_eq!(config.widgets.len(), 6);
        Ok(())
    }
}
