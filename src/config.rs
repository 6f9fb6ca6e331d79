use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sourced::manager::ManagerConfig;
use sourced::pool::PoolConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub pool: PoolSection,
    pub catalog: CatalogConfig,
    pub startup: StartupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sourced")
                .join("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub core_size: usize,
    pub max_size: usize,
    pub grow_delay_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            core_size: 2,
            max_size: 16,
            grow_delay_ms: 1000,
            idle_timeout_ms: 300000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub views_dir: Option<PathBuf>,
    pub renames_file: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let base = dirs::config_dir().map(|d| d.join("sourced"));
        Self {
            views_dir: base.as_ref().map(|d| d.join("views")),
            renames_file: base.map(|d| d.join("renames.yml")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub start_all: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self { start_all: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            pool: PoolSection::default(),
            catalog: CatalogConfig::default(),
            startup: StartupConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_name("sourced-pool")
            .with_size(self.pool.core_size, self.pool.max_size)
            .with_grow_delay(Duration::from_millis(self.pool.grow_delay_ms))
            .with_idle_timeout(Duration::from_millis(self.pool.idle_timeout_ms))
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::default().with_pool(self.pool_config())
    }
}
