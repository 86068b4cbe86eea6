use super::{BoxedReader, Compressor};
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io;

const ZSTD_DEFAULT_LEVEL: i32 = 3;

pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: Option<i32>) -> Self {
        Self {
            level: level.unwrap_or(ZSTD_DEFAULT_LEVEL),
        }
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, input: BoxedReader) -> io::Result<BoxedReader> {
        let encoder = zstd::stream::read::Encoder::new(input, self.level)?;
        Ok(Box::new(encoder))
    }

    fn decompress(&self, input: BoxedReader) -> io::Result<BoxedReader> {
        let decoder = zstd::stream::read::Decoder::new(input)?;
        Ok(Box::new(decoder))
    }

    fn file_extension(&self) -> &'static str {
        "zst"
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    pub fn new(level: Option<i32>) -> Self {
        let level = match level {
            Some(l) => Compression::new(l.clamp(0, 9) as u32),
            None => Compression::default(),
        };
        Self { level }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, input: BoxedReader) -> io::Result<BoxedReader> {
        Ok(Box::new(GzEncoder::new(input, self.level)))
    }

    fn decompress(&self, input: BoxedReader) -> io::Result<BoxedReader> {
        Ok(Box::new(GzDecoder::new(input)))
    }

    fn file_extension(&self) -> &'static str {
        "gz"
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}
