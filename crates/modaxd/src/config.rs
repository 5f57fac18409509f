//! Configuration management for modaxd.
//!
//! Loads settings from /etc/modax/config.toml or uses defaults. Every path
//! is overridable so tests can point the whole engine at a temp directory.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use modax_shared::DEFAULT_READY_TIMEOUT_MS;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/modax/config.toml";

/// Store layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Read-only directories scanned for preinstalled module packages
    #[serde(default = "default_preinstalled_dirs")]
    pub preinstalled_dirs: Vec<PathBuf>,

    /// Writable area for updated packages and materialized views
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where per-module linker configuration artifacts are written
    #[serde(default = "default_linker_config_dir")]
    pub linker_config_dir: PathBuf,
}

fn default_preinstalled_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/vendor/modules")]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/modax")
}

fn default_linker_config_dir() -> PathBuf {
    PathBuf::from("/etc/modax/linkerconfig")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            preinstalled_dirs: default_preinstalled_dirs(),
            data_dir: default_data_dir(),
            linker_config_dir: default_linker_config_dir(),
        }
    }
}

/// Service coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Fixed deadline for the module ready flag after an activation change.
    /// Elapsing is a hard failure, not a retry trigger.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,
}

fn default_ready_timeout() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: default_ready_timeout(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub services: ServiceConfig,

    /// Version of the running platform, matched against candidate
    /// `required_platform_version` at admission time
    #[serde(default = "default_platform_version")]
    pub platform_version: String,
}

fn default_platform_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            services: ServiceConfig::default(),
            platform_version: default_platform_version(),
        }
    }
}

impl Config {
    /// Load config from file, or return defaults
    pub fn load() -> Self {
        Self::load_from_path(Path::new(CONFIG_PATH)).unwrap_or_else(|e| {
            warn!("Config not found, using defaults: {}", e);
            Config::default()
        })
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Writable area holding updated package content, one directory per
    /// recorded version (`<name>@<version_code>`)
    pub fn active_dir(&self) -> PathBuf {
        self.store.data_dir.join("active")
    }

    /// Scratch area for stage-and-rename writes into the data dir
    pub fn staging_dir(&self) -> PathBuf {
        self.store.data_dir.join("staging")
    }

    /// Stable per-module view directory; the activation path of module `m`
    /// is `<view_dir>/m` regardless of which version backs it
    pub fn view_dir(&self) -> PathBuf {
        self.store.data_dir.join("modules")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.platform_version, "1.0");
        assert_eq!(config.services.ready_timeout_ms, 5_000);
        assert_eq!(
            config.store.preinstalled_dirs,
            vec![PathBuf::from("/vendor/modules")]
        );
        assert_eq!(config.active_dir(), PathBuf::from("/var/lib/modax/active"));
    }

    #[test]
    fn test_parse_toml_partial() {
        let toml_str = r#"
platform_version = "2.1"

[store]
data_dir = "/tmp/modax-data"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.platform_version, "2.1");
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/modax-data"));
        // Defaults for missing fields
        assert_eq!(config.services.ready_timeout_ms, 5_000);
        assert_eq!(
            config.store.linker_config_dir,
            PathBuf::from("/etc/modax/linkerconfig")
        );
    }

    #[test]
    fn test_derived_dirs_follow_data_dir() {
        let mut config = Config::default();
        config.store.data_dir = PathBuf::from("/x");
        assert_eq!(config.active_dir(), PathBuf::from("/x/active"));
        assert_eq!(config.staging_dir(), PathBuf::from("/x/staging"));
        assert_eq!(config.view_dir(), PathBuf::from("/x/modules"));
    }
}
