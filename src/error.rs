use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BackupError {
    Config(String),
    Database(String),
    Snapshot(String),
    Compression(String),
    Encryption(String),
    Upload(String),
    Storage(String),
    Io(io::Error),
    Serialization(String),
    Cancelled,
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BackupError::Database(msg) => write!(f, "Database error: {}", msg),
            BackupError::Snapshot(msg) => write!(f, "Snapshot error: {}", msg),
            BackupError::Compression(msg) => write!(f, "Compression error: {}", msg),
            BackupError::Encryption(msg) => write!(f, "Encryption error: {}", msg),
            BackupError::Upload(msg) => write!(f, "Upload error: {}", msg),
            BackupError::Storage(msg) => write!(f, "Storage error: {}", msg),
            BackupError::Io(err) => write!(f, "IO error: {}", err),
            BackupError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            BackupError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<toml::de::Error> for BackupError {
    fn from(err: toml::de::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for BackupError {
    fn from(err: toml::ser::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<clickhouse::error::Error> for BackupError {
    fn from(err: clickhouse::error::Error) -> Self {
        BackupError::Database(err.to_string())
    }
}

impl From<zip::result::ZipError> for BackupError {
    fn from(err: zip::result::ZipError) -> Self {
        BackupError::Compression(err.to_string())
    }
}

impl From<walkdir::Error> for BackupError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io_err) => BackupError::Io(io_err),
            None => BackupError::Io(io::Error::new(
                io::ErrorKind::Other,
                "filesystem loop while walking directory",
            )),
        }
    }
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            BackupError::Cancelled
        } else {
            BackupError::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
