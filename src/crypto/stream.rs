//! XChaCha20-Poly1305 in the STREAM construction.
//!
//! Layout: a 19 byte random nonce prefix, then sealed segments of
//! `SEGMENT_SIZE` plaintext bytes each (the final one may be shorter, or
//! empty). The final segment carries the "last block" flag, so a truncated
//! object fails to decrypt instead of silently yielding a prefix.

use super::Crypter;
use crate::compression::BoxedReader;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::{DecryptorBE32, EncryptorBE32};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305};
use rand::RngCore;
use std::io::{self, Read};

const SEGMENT_SIZE: usize = 64 * 1024;
const TAG_SIZE: usize = 16;
const NONCE_PREFIX_SIZE: usize = 19;

pub struct StreamCrypter {
    key: [u8; 32],
}

impl StreamCrypter {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

impl Crypter for StreamCrypter {
    fn encrypt(&self, input: BoxedReader) -> io::Result<BoxedReader> {
        let mut prefix = [0u8; NONCE_PREFIX_SIZE];
        rand::thread_rng().fill_bytes(&mut prefix);
        let encryptor = EncryptorBE32::from_aead(self.cipher(), GenericArray::from_slice(&prefix));
        Ok(Box::new(EncryptingReader {
            inner: input,
            encryptor: Some(encryptor),
            out: prefix.to_vec(),
            pos: 0,
            plain: Vec::with_capacity(SEGMENT_SIZE),
            carry: None,
        }))
    }

    fn decrypt(&self, input: BoxedReader) -> io::Result<BoxedReader> {
        Ok(Box::new(DecryptingReader {
            inner: input,
            cipher: Some(self.cipher()),
            decryptor: None,
            out: Vec::new(),
            pos: 0,
            sealed: Vec::with_capacity(SEGMENT_SIZE + TAG_SIZE),
            carry: None,
            done: false,
        }))
    }
}

// A one byte probe tells a full final segment from a full intermediate one.
fn fill_segment<R: Read>(
    inner: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
    carry: &mut Option<u8>,
) -> io::Result<bool> {
    buf.clear();
    if let Some(b) = carry.take() {
        buf.push(b);
    }
    let wanted = (limit - buf.len()) as u64;
    inner.by_ref().take(wanted).read_to_end(buf)?;
    if buf.len() < limit {
        return Ok(true);
    }
    let mut probe = Vec::with_capacity(1);
    inner.by_ref().take(1).read_to_end(&mut probe)?;
    match probe.first() {
        Some(b) => {
            *carry = Some(*b);
            Ok(false)
        }
        None => Ok(true),
    }
}

fn drain(out: &[u8], pos: &mut usize, buf: &mut [u8]) -> usize {
    let n = (out.len() - *pos).min(buf.len());
    buf[..n].copy_from_slice(&out[*pos..*pos + n]);
    *pos += n;
    n
}

struct EncryptingReader {
    inner: BoxedReader,
    encryptor: Option<EncryptorBE32<XChaCha20Poly1305>>,
    out: Vec<u8>,
    pos: usize,
    plain: Vec<u8>,
    carry: Option<u8>,
}

impl Read for EncryptingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.out.len() {
                return Ok(drain(&self.out, &mut self.pos, buf));
            }
            if self.encryptor.is_none() {
                return Ok(0);
            }
            let last = fill_segment(&mut self.inner, &mut self.plain, SEGMENT_SIZE, &mut self.carry)?;
            let sealed = if last {
                match self.encryptor.take() {
                    Some(encryptor) => encryptor.encrypt_last(self.plain.as_slice()),
                    None => return Ok(0),
                }
            } else {
                match self.encryptor.as_mut() {
                    Some(encryptor) => encryptor.encrypt_next(self.plain.as_slice()),
                    None => return Ok(0),
                }
            };
            self.out = sealed.map_err(|_| io::Error::new(io::ErrorKind::Other, "segment encryption failed"))?;
            self.pos = 0;
        }
    }
}

struct DecryptingReader {
    inner: BoxedReader,
    cipher: Option<XChaCha20Poly1305>,
    decryptor: Option<DecryptorBE32<XChaCha20Poly1305>>,
    out: Vec<u8>,
    pos: usize,
    sealed: Vec<u8>,
    carry: Option<u8>,
    done: bool,
}

impl DecryptingReader {
    fn start(&mut self) -> io::Result<()> {
        let Some(cipher) = self.cipher.take() else {
            return Ok(());
        };
        let mut prefix = [0u8; NONCE_PREFIX_SIZE];
        self.inner.read_exact(&mut prefix).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                io::Error::new(io::ErrorKind::InvalidData, "encrypted stream is missing its header")
            }
            _ => e,
        })?;
        self.decryptor = Some(DecryptorBE32::from_aead(cipher, GenericArray::from_slice(&prefix)));
        Ok(())
    }
}

impl Read for DecryptingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.start()?;
        loop {
            if self.pos < self.out.len() {
                return Ok(drain(&self.out, &mut self.pos, buf));
            }
            if self.done {
                return Ok(0);
            }
            let last = fill_segment(
                &mut self.inner,
                &mut self.sealed,
                SEGMENT_SIZE + TAG_SIZE,
                &mut self.carry,
            )?;
            let opened = if last {
                self.done = true;
                match self.decryptor.take() {
                    Some(decryptor) => decryptor.decrypt_last(self.sealed.as_slice()),
                    None => return Ok(0),
                }
            } else {
                match self.decryptor.as_mut() {
                    Some(decryptor) => decryptor.decrypt_next(self.sealed.as_slice()),
                    None => return Ok(0),
                }
            };
            self.out = opened.map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "encrypted segment failed authentication")
            })?;
            self.pos = 0;
        }
    }
}
