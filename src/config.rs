//! Configuration system
//!
//! TOML configuration for the `vdesk` tool: logging, protocol binding
//! limits and the simulated compositor's starting layout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};

use vdesk_core::{MANAGER_INTERFACE, SUPPORTED_VERSION};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Protocol binding settings
    pub protocol: ProtocolConfig,

    /// Simulated compositor settings
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::find_config_file);

        match config_path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {:?}", path);
                Self::load_from(&path)
            },
            Some(path) => {
                warn!("Config file not found at {:?}, using defaults", path);
                Ok(Self::default())
            },
            None => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            },
        }
    }

    /// Parse and validate the file at `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Find the configuration file
    fn find_config_file() -> Option<PathBuf> {
        // Check in order of preference
        let candidates = [
            // XDG config
            dirs::config_dir().map(|p| p.join("vdesk/config.toml")),
            // Home directory
            dirs::home_dir().map(|p| p.join(".config/vdesk/config.toml")),
            // Legacy locations
            dirs::home_dir().map(|p| p.join(".vdesk/config.toml")),
            // System-wide
            Some(PathBuf::from("/etc/vdesk/config.toml")),
        ];

        candidates.into_iter().flatten().find(|p| p.exists())
    }

    /// Generate default configuration as a string
    pub fn default_config_string() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<()> {
        self.general.level()?;
        if self.protocol.max_version == 0 {
            anyhow::bail!("protocol.max_version must be at least 1");
        }
        if self.protocol.max_version > SUPPORTED_VERSION {
            warn!(
                "protocol.max_version {} exceeds supported version {}, clamping",
                self.protocol.max_version, SUPPORTED_VERSION
            );
        }
        if self.simulation.initial_desktops == 0 {
            anyhow::bail!("simulation.initial_desktops must be at least 1");
        }
        Ok(())
    }
}

/// General settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn or error
    pub log_level: String,

    /// Print every manager and desktop notification
    pub print_notifications: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            print_notifications: true,
        }
    }
}

impl GeneralConfig {
    pub fn level(&self) -> Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", self.log_level))
    }
}

/// Protocol binding settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Interface name of the manager global
    pub interface: String,

    /// Highest interface version to bind
    pub max_version: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            interface: MANAGER_INTERFACE.to_string(),
            max_version: SUPPORTED_VERSION,
        }
    }
}

impl ProtocolConfig {
    pub fn effective_version(&self) -> u32 {
        self.max_version.min(SUPPORTED_VERSION)
    }
}

/// Simulated compositor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Desktops the compositor starts with
    pub initial_desktops: usize,

    /// Rows the desktops are laid out in
    pub rows: u32,

    /// Prefix for generated desktop names
    pub name_prefix: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_desktops: 4,
            rows: 2,
            name_prefix: "Desktop".to_string(),
        }
    }
}
