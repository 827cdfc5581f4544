//! Configuration management for qr-attendance.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::HashSet;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::roster::ColumnNames;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "qr-attendance";

/// Default roster file name.
const ROSTER_FILE_NAME: &str = "roster.csv";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `QRATTEND_`)
/// 2. TOML config file at `~/.config/qr-attendance/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Roster file configuration.
    pub roster: RosterConfig,
    /// Roster column names.
    pub columns: ColumnNames,
    /// Logging configuration.
    pub log: LogConfig,
}

/// Roster file configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Path to the roster CSV.
    /// Defaults to `~/.local/share/qr-attendance/roster.csv`
    pub path: Option<PathBuf>,
    /// Take an exclusive lock on the roster while it is open for marking.
    pub lock: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append log events to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: None, // Will be resolved to default at runtime
            lock: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(&config_file))
                .merge(Env::prefixed("QRATTEND_").split("_")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a column name is empty or two roles share a
    /// column.
    pub fn validate(&self) -> Result<()> {
        let columns = [
            ("registration", &self.columns.registration),
            ("name", &self.columns.name),
            ("email", &self.columns.email),
            ("attendance", &self.columns.attendance),
        ];

        let mut seen = HashSet::new();
        for (role, column) in columns {
            if column.trim().is_empty() {
                return Err(Error::ConfigValidation {
                    message: format!("columns.{role} must not be empty"),
                });
            }
            if !seen.insert(column.as_str()) {
                return Err(Error::ConfigValidation {
                    message: format!("columns.{role} reuses column '{column}'"),
                });
            }
        }

        Ok(())
    }

    /// Get the roster path, resolving defaults if not set.
    #[must_use]
    pub fn roster_path(&self) -> PathBuf {
        self.roster
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(ROSTER_FILE_NAME))
    }
}
