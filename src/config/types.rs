use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    ClickHouse,
}

impl std::fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseEngine::ClickHouse => write!(f, "ClickHouse"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: DatabaseEngine,
    pub url: String,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub data_root: Option<PathBuf>,
    pub data_root_strip_segments: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: DatabaseEngine::ClickHouse,
            url: "http://localhost:8123".to_string(),
            username: "default".to_string(),
            password: String::new(),
            database: None,
            data_root: None,
            data_root_strip_segments: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageKind {
    Filesystem { root: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(flatten)]
    pub kind: StorageKind,
    #[serde(default = "default_storage_prefix")]
    pub prefix: String,
}

fn default_storage_prefix() -> String {
    "basebackups_005".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Filesystem {
                root: PathBuf::from("backups"),
            },
            prefix: default_storage_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    Zstd,
    Gzip,
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionMethod::Zstd => write!(f, "zstd"),
            CompressionMethod::Gzip => write!(f, "gzip"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub method: CompressionMethod,
    pub level: Option<i32>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Zstd,
            level: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub key: Option<String>,
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalDeltaConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub sentinel_suffix: String,
    pub tolerate_upload_failures: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            sentinel_suffix: "_backup_stop_sentinel.json".to_string(),
            tolerate_upload_failures: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub encryption: Option<EncryptionConfig>,
    #[serde(default)]
    pub wal_delta: Option<WalDeltaConfig>,
    #[serde(default)]
    pub backup: BackupConfig,
}
