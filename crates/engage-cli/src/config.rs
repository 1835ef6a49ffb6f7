//! Configuration loading and management.

use std::path::{Path, PathBuf};

use engage_core::{ConfigurationError, EngagementConfig, EngagementSettings};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the activity database.
    pub database_path: PathBuf,
    /// Directory the CSV tables are written to.
    pub output_dir: PathBuf,
    /// Size of the course worker pool. Defaults to two thirds of the cores.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Session and allocation parameters.
    #[serde(default)]
    pub engagement: EngagementSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("engage.db"),
            output_dir: PathBuf::from("."),
            workers: None,
            engagement: EngagementSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // ENGAGE_ENGAGEMENT__SESSION_GAP_MINUTES=45 sets engagement.session_gap_minutes
        figment = figment.merge(Env::prefixed("ENGAGE_").split("__"));

        figment.extract()
    }

    /// Validates the engagement parameters.
    pub fn engagement_config(&self) -> Result<EngagementConfig, ConfigurationError> {
        EngagementConfig::new(&self.engagement)
    }
}

/// Returns the platform-specific config directory for engage.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("engage"))
}

/// Returns the platform-specific data directory for engage.
///
/// On Linux: `~/.local/share/engage`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("engage"))
}
