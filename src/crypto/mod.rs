mod stream;

pub use stream::StreamCrypter;

use crate::compression::BoxedReader;
use crate::config::EncryptionConfig;
use crate::error::{BackupError, Result};
use sha2::{Digest, Sha256};
use std::io;
use std::sync::Arc;

pub trait Crypter: Send + Sync {
    fn encrypt(&self, input: BoxedReader) -> io::Result<BoxedReader>;
    fn decrypt(&self, input: BoxedReader) -> io::Result<BoxedReader>;
}

pub fn create_crypter(config: Option<&EncryptionConfig>) -> Result<Option<Arc<dyn Crypter>>> {
    let Some(config) = config else {
        return Ok(None);
    };
    let key = match (&config.key, &config.passphrase) {
        (Some(hex_key), None) => decode_key(hex_key)?,
        (None, Some(passphrase)) => derive_key(passphrase),
        _ => {
            return Err(BackupError::Config(
                "encryption needs exactly one of `key` or `passphrase`".to_string(),
            ))
        }
    };
    Ok(Some(Arc::new(StreamCrypter::new(key))))
}

fn decode_key(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| BackupError::Encryption(format!("invalid hex key: {}", e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        BackupError::Encryption(format!("key must be 32 bytes, got {}", b.len()))
    })
}

fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}
