//! Touch Surface - virtual MIDI control surface
//!
//! Feeds contact events from a REPL or a script into the surface and sends
//! the resulting MIDI to an output port.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use touch_surface::cli::{self, Command};
use touch_surface::config::{ConfigWatcher, SurfaceConfig};
use touch_surface::device::{self, DeviceSelector, Readiness};
use touch_surface::transport::{LogSink, SinkSlot};
use touch_surface::Surface;

/// Touch Surface - virtual MIDI keyboards, sliders and transport buttons
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "surface.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output port name (case-insensitive substring), overrides the config
    #[arg(short, long, env = "TOUCH_SURFACE_PORT")]
    port: Option<String>,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// Replay events from a file instead of starting the REPL
    #[arg(long)]
    script: Option<String>,

    /// Log outgoing bytes instead of opening a port
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting Touch Surface v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        let ports = device::list_output_ports()?;
        cli::print_ports(&ports, None);
        return Ok(());
    }

    let config = SurfaceConfig::load_or_default(&args.config).await?;
    info!("Configuration file: {}", args.config);

    let mut watcher = if Path::new(&args.config).exists() {
        match ConfigWatcher::new(args.config.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Hot reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let slot = SinkSlot::new();
    let mut selector = if args.dry_run {
        slot.select(Box::new(LogSink));
        None
    } else {
        connect_output(&config, args.port.clone(), slot.clone()).await
    };

    let mut surface = Surface::new(&config, slot.clone());
    surface.announce();

    let (tx, mut lines) = mpsc::channel::<String>(64);
    match args.script.clone() {
        Some(path) => {
            let script = cli::read_script(&path).await?;
            info!("Replaying {} lines from {}", script.len(), path);
            tokio::spawn(async move {
                for line in script {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        None => {
            println!("{}", "Type 'help' for commands".dimmed());
            let _ = cli::spawn_repl(tx);
        }
    }

    let rescan_every = Duration::from_millis(config.midi.rescan_interval_ms.max(100));
    let mut rescan = tokio::time::interval(rescan_every);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    debug!("Input closed");
                    break;
                };
                match cli::parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => run_command(command, &mut surface, &slot).await,
                    Ok(None) => {}
                    Err(e) => println!("{} {:#}", "error:".red(), e),
                }
            }
            Some(new_config) = next_reload(&mut watcher) => {
                let released = surface.apply_config(&new_config);
                cli::print_messages(&released);
                if args.port.is_none() {
                    if let Some(selector) = selector.as_mut() {
                        selector.set_preferred(new_config.midi.output_port.clone());
                    }
                }
                info!("Layout rebuilt from {}", args.config);
            }
            _ = rescan.tick() => {
                if let Some(selector) = selector.as_mut() {
                    match selector.refresh() {
                        Ok(status) => debug!("Output {}", status),
                        Err(e) => debug!("Port rescan failed: {:#}", e),
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    // Never leave notes hanging on the way out
    surface.release_all();

    info!("Touch Surface shutdown complete");
    Ok(())
}

async fn connect_output(
    config: &SurfaceConfig,
    port_override: Option<String>,
    slot: SinkSlot,
) -> Option<DeviceSelector> {
    let attempts = config.midi.readiness_attempts.max(1);
    let interval = Duration::from_millis(config.midi.readiness_interval_ms);

    match device::wait_for_output(attempts, interval).await {
        Readiness::Ready(ports) => {
            debug!("Found {} MIDI output ports", ports.len());
            let preferred = port_override.or_else(|| config.midi.output_port.clone());
            let mut selector = DeviceSelector::new(slot, preferred);
            match selector.refresh() {
                Ok(status) => info!("Output {}", status),
                Err(e) => warn!("Port scan failed: {:#}", e),
            }
            Some(selector)
        }
        Readiness::Unavailable { attempts } => {
            warn!(
                "MIDI output unavailable after {} attempts, running without output",
                attempts
            );
            None
        }
    }
}

async fn run_command(command: Command, surface: &mut Surface, slot: &SinkSlot) {
    match command {
        Command::Contact { .. } => {
            if let Some(event) = command.to_event(Instant::now()) {
                cli::print_messages(&surface.handle(&event));
            }
        }
        Command::FocusLost => cli::print_messages(&surface.focus_lost()),
        Command::Wait(duration) => tokio::time::sleep(duration).await,
        Command::Status => cli::print_status(surface, Instant::now()),
        Command::Ports => match device::list_output_ports() {
            Ok(ports) => cli::print_ports(&ports, slot.selected_name().as_deref()),
            Err(e) => println!("{} {:#}", "error:".red(), e),
        },
        Command::Help => cli::print_help(),
        Command::Quit => {}
    }
}

async fn next_reload(watcher: &mut Option<ConfigWatcher>) -> Option<SurfaceConfig> {
    match watcher {
        Some(w) => w.next_config().await,
        None => std::future::pending().await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
