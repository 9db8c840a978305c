//! User configuration.
//!
//! Loaded from `~/.config/vft/config.toml`. Every field has a default and
//! a missing or unreadable file silently falls back to those defaults, so
//! the tool works with no setup at all.

use std::fs;
use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::vital::CellPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Row interval in seconds used when `--interval` is omitted.
    pub default_interval: f64,
    /// Cell policy used when `--policy` is omitted.
    pub default_policy: String,
    /// Where batch exports land when `--out` is omitted.
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_interval: 1.0,
            default_policy: CellPolicy::FirstWins.name().to_string(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Path of the config file, if a config directory exists on this
    /// platform.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vft").join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing or malformed. A malformed file is reported but never fatal.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        let Ok(raw) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// The configured default policy, or first-wins if the value does not
    /// parse.
    pub fn policy(&self) -> CellPolicy {
        self.default_policy.parse().unwrap_or_default()
    }
}
