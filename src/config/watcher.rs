//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::SurfaceConfig;

/// Config watcher that monitors file changes and sends reload notifications
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<SurfaceConfig>,
}

impl ConfigWatcher {
    /// Watch an existing config file. Only successfully validated reloads are delivered.
    pub fn new(config_path: String) -> Result<Self> {
        let (tx, rx) = mpsc::channel(10);

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();
        let watched_path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_)) => {
                    debug!("Config file modified: {:?}", event.paths);

                    let config_path = watched_path.clone();
                    let tx = tx.clone();

                    runtime_handle.spawn(async move {
                        // Debounce: wait a bit for file writes to complete
                        tokio::time::sleep(Duration::from_millis(100)).await;

                        match SurfaceConfig::load(&config_path).await {
                            Ok(new_config) => {
                                info!("Configuration reloaded successfully");
                                if let Err(e) = tx.send(new_config).await {
                                    error!("Failed to send config update: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("Failed to reload config (keeping old config): {:#}", e);
                            }
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => error!("Watch error: {}", e),
            }
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        info!("Config file watcher started for: {}", config_path);

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next config update
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<SurfaceConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    #[ignore = "requires filesystem change notifications"]
    async fn test_config_watcher_delivers_reload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("surface.yaml");

        let initial = r#"
widgets:
  - type: slider
    name: bend
    bounds: { x: 0, y: 0, width: 40, height: 200 }
    spring_back: true
"#;
        fs::write(&config_path, initial)?;

        let mut watcher = ConfigWatcher::new(config_path.to_string_lossy().to_string())?;

        let modified = r#"
widgets:
  - type: slider
    name: modwheel
    bounds: { x: 0, y: 0, width: 40, height: 200 }
"#;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, modified)?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config())
            .await?
            .context("watcher closed before delivering a reload")?;
        assert_eq!(new_config.widgets[0].name(), "modwheel");

        Ok(())
    }

    #[tokio::test]
    async fn test_watching_missing_file_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("absent.yaml");

        let result = ConfigWatcher::new(config_path.to_string_lossy().to_string());
        assert!(result.is_err());

        Ok(())
    }
}
