mod types;

pub use types::*;

use crate::error::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".ch_backup"))
        .unwrap_or_else(|| PathBuf::from(".ch_backup"))
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn load() -> Result<AppConfig> {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!("Config file not found at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }

    info!("Loading configuration from {:?}", path);
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    validate(&config)?;
    Ok(config)
}

pub fn save_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating config directory: {:?}", parent);
            fs::create_dir_all(parent)?;
        }
    }

    let contents = toml::to_string_pretty(config)?;
    fs::write(path, contents)?;
    info!("Configuration saved to {:?}", path);
    Ok(())
}

fn validate(config: &AppConfig) -> Result<()> {
    if let Some(encryption) = &config.encryption {
        if encryption.key.is_some() == encryption.passphrase.is_some() {
            return Err(BackupError::Config(
                "[encryption] needs exactly one of `key` or `passphrase`".to_string(),
            ));
        }
    }
    if config.database.data_root_strip_segments == 0 {
        return Err(BackupError::Config(
            "database.data_root_strip_segments must be at least 1".to_string(),
        ));
    }
    if config.backup.sentinel_suffix.is_empty() {
        return Err(BackupError::Config(
            "backup.sentinel_suffix must not be empty".to_string(),
        ));
    }
    Ok(())
}
