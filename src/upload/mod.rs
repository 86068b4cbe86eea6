mod archive;
mod chain;
mod uploader;
mod wal_delta;

pub use archive::{archive_directory, zip_directory};
pub use chain::{compress_and_encrypt, sanitize_path, CancellableReader, NamedReader};
pub use uploader::Uploader;
pub use wal_delta::{is_wal_filename, DeltaFileManager, DeltaRecord, DeltaRecorder, WalDeltaRecordingReader};

use crate::compression::create_compressor;
use crate::config::AppConfig;
use crate::crypto::create_crypter;
use crate::error::Result;
use crate::storage::create_folder;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn configure_uploader(config: &AppConfig, token: CancellationToken) -> Result<Uploader> {
    let folder = create_folder(&config.storage);
    let compressor = create_compressor(&config.compression);
    let crypter = create_crypter(config.encryption.as_ref())?;
    let delta_file_manager = config
        .wal_delta
        .as_ref()
        .map(|c| Arc::new(DeltaFileManager::new(c.directory.clone())));

    info!(
        prefix = %config.storage.prefix,
        compression = %compressor.name(),
        encrypted = crypter.is_some(),
        "Configured uploader"
    );

    let uploader = Uploader::new(compressor, folder, delta_file_manager)
        .with_crypter(crypter)
        .with_cancellation(token);
    if config.storage.prefix.is_empty() {
        Ok(uploader)
    } else {
        Ok(uploader.into_sub_folder(&config.storage.prefix))
    }
}
