use crate::compression::{BoxedReader, Compressor};
use crate::crypto::Crypter;
use std::io::{self, Read};
use tokio_util::sync::CancellationToken;

pub struct NamedReader {
    name: String,
    reader: BoxedReader,
}

impl NamedReader {
    pub fn new<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    pub fn from_boxed(name: impl Into<String>, reader: BoxedReader) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_parts(self) -> (String, BoxedReader) {
        (self.name, self.reader)
    }
}

impl Read for NamedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

pub fn compress_and_encrypt(
    input: BoxedReader,
    compressor: &dyn Compressor,
    crypter: Option<&dyn Crypter>,
) -> io::Result<BoxedReader> {
    let compressed = compressor.compress(input)?;
    match crypter {
        Some(crypter) => crypter.encrypt(compressed),
        None => Ok(compressed),
    }
}

pub struct CancellableReader<R> {
    inner: R,
    token: CancellationToken,
}

impl<R: Read> CancellableReader<R> {
    pub fn new(inner: R, token: CancellationToken) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "upload cancelled"));
        }
        self.inner.read(buf)
    }
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/')
}

pub fn sanitize_path(path: &str) -> String {
    path.trim_start_matches('/')
        .chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect()
}
