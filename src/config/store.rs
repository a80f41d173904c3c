//! Persistence for the application configuration.

use super::AppConfig;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Configuration filename inside the app config directory
const CONFIG_FILENAME: &str = "config.json";

/// Configuration store backed by a single JSON file.
///
/// Loads always pass through `validate_and_repair`, so callers never see a
/// configuration without the reserved `General` category and `original_name`
/// variable.
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a store at the default platform location
    /// (`~/.config/parafile/config.json` on Linux).
    pub fn new() -> Result<Self, String> {
        let dir = dirs::config_dir()
            .ok_or_else(|| "Could not determine config directory".to_string())?
            .join("parafile");
        Ok(Self::with_dir(dir))
    }

    /// Create a store rooted at an explicit directory (used by tests)
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            config_path: dir.join(CONFIG_FILENAME),
        }
    }

    /// Load the configuration, repairing it on the way in. A missing or
    /// unreadable file yields the repaired default configuration.
    pub fn load(&self) -> AppConfig {
        let config = match File::open(&self.config_path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader::<_, AppConfig>(reader) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!(
                            "[Config] Failed to parse {}: {}. Using defaults.",
                            self.config_path.display(),
                            e
                        );
                        AppConfig::default()
                    }
                }
            }
            Err(_) => AppConfig::default(),
        };

        config.validate_and_repair()
    }

    /// Save the configuration atomically (temp file, fsync, rename).
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let temp_path = self.config_path.with_extension("tmp");

        let file = File::create(&temp_path)
            .map_err(|e| format!("Failed to create temp file: {}", e))?;

        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        writer.flush().map_err(|e| format!("Failed to flush: {}", e))?;

        writer
            .get_ref()
            .sync_all()
            .map_err(|e| format!("Failed to sync: {}", e))?;

        fs::rename(&temp_path, &self.config_path)
            .map_err(|e| format!("Failed to rename: {}", e))?;

        Ok(())
    }
}
