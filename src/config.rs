use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::card::CardVersion;

/// Top-level configuration for the chara-card tools.
///
/// Controls how cards are written back into images and how directory scans
/// are run.
///
/// # Loading
///
/// ```rust,no_run
/// use chara_card::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.write.backup_originals = false;
/// config.scan.threads = 4;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Card and XMP write behavior.
    pub write: WriteConfig,
    /// Directory scan and hashing behavior.
    pub scan: ScanConfig,
}

/// Output behavior when modifying image files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Schema used when the caller does not pick one.
    pub default_version: CardVersion,
    /// If `true`, create a `.bak` copy before the first modification of a file.
    pub backup_originals: bool,
    /// If `true`, build the new bytes but leave files untouched.
    pub dry_run: bool,
}

/// Directory scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Hashing worker threads; `0` uses every available core.
    pub threads: usize,
    /// Follow symbolic links while walking directories.
    pub follow_links: bool,
    /// Project the scanned files are registered under.
    pub project_id: i64,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            default_version: CardVersion::V2,
            backup_originals: true,
            dry_run: false,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            follow_links: true,
            project_id: 1,
        }
    }
}

impl Config {
    /// Resolve the config file path, next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}
