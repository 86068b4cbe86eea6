mod codecs;

pub use codecs::{GzipCompressor, ZstdCompressor};

use crate::config::{CompressionConfig, CompressionMethod};
use std::io::{self, Read};
use std::sync::Arc;

pub type BoxedReader = Box<dyn Read + Send>;

pub trait Compressor: Send + Sync {
    fn compress(&self, input: BoxedReader) -> io::Result<BoxedReader>;
    fn decompress(&self, input: BoxedReader) -> io::Result<BoxedReader>;
    fn file_extension(&self) -> &'static str;
    fn name(&self) -> &'static str;
}

pub fn create_compressor(config: &CompressionConfig) -> Arc<dyn Compressor> {
    match config.method {
        CompressionMethod::Zstd => Arc::new(ZstdCompressor::new(config.level)),
        CompressionMethod::Gzip => Arc::new(GzipCompressor::new(config.level)),
    }
}
