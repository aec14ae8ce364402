//! Configuration persistence for the flashcards app.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;
use crate::storage::DeckRepository;

/// Application configuration that persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the deck files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decks_dir: Option<PathBuf>,

    /// Memory model parameters.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("srl")
            .join("config.toml")
    }

    /// Load config from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from disk, returning default if file doesn't exist.
    /// Scheduler parameters are validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .scheduler
            .validate()
            .with_context(|| format!("Invalid scheduler settings in {:?}", path))?;

        Ok(config)
    }

    /// Save config to disk.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = self.to_toml()?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Deck directory, falling back to the platform data directory.
    pub fn decks_dir(&self) -> PathBuf {
        self.decks_dir
            .clone()
            .unwrap_or_else(DeckRepository::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.scheduler.request_retention, 0.9);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "decks_dir = \"/tmp/decks\"\n\n[scheduler]\nrequest_retention = 0.85\nenable_fuzz = true\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.decks_dir(), PathBuf::from("/tmp/decks"));
        assert_eq!(config.scheduler.request_retention, 0.85);
        assert!(config.scheduler.enable_fuzz);
        assert!(config.scheduler.enable_short_term);
        assert_eq!(config.scheduler.maximum_interval, 36500.0);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\nweights = [1.0, 2.0]\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let config = Config {
            decks_dir: Some(PathBuf::from("/data/decks")),
            scheduler: SchedulerConfig {
                maximum_interval: 365.0,
                ..SchedulerConfig::default()
            },
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
