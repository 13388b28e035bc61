//! Running SHA-1 over every frame byte in one direction.
//!
//! [`DigestWriter`] and [`DigestReader`] wrap the transport so that
//! nothing can reach (or leave) the wire without passing through the
//! accumulator. The trailing digest itself is written/read through the
//! inner stream, bypassing the hash.

use crate::core::frame::DIGEST_SIZE;
use sha1::{Digest, Sha1};
use std::io::{self, Read, Write};

/// Incremental SHA-1 over a message
#[derive(Clone, Default)]
pub struct DigestAccumulator {
    hasher: Sha1,
    bytes_fed: u64,
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.bytes_fed += bytes.len() as u64;
    }

    /// Digest of everything fed so far. Does not reset the state.
    pub fn finish(&self) -> [u8; DIGEST_SIZE] {
        self.hasher.clone().finalize().into()
    }

    /// Total number of bytes fed
    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }
}

impl std::fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAccumulator")
            .field("bytes_fed", &self.bytes_fed)
            .finish()
    }
}

/// Writer that hashes everything written through it
pub struct DigestWriter<W> {
    inner: W,
    digest: DigestAccumulator,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: DigestAccumulator::new(),
        }
    }

    pub fn digest(&self) -> &DigestAccumulator {
        &self.digest
    }

    /// Write the accumulated digest straight to the inner writer and flush.
    ///
    /// Returns the inner writer and the number of hashed bytes.
    pub fn finish(mut self) -> io::Result<(W, u64)> {
        let digest = self.digest.finish();
        self.inner.write_all(&digest)?;
        self.inner.flush()?;
        Ok((self.inner, self.digest.bytes_fed()))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.feed(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that hashes everything read through it
pub struct DigestReader<R> {
    inner: R,
    digest: DigestAccumulator,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            digest: DigestAccumulator::new(),
        }
    }

    pub fn digest(&self) -> &DigestAccumulator {
        &self.digest
    }

    /// Read the transmitted digest from the inner reader without hashing it
    pub fn read_trailer(&mut self) -> io::Result<[u8; DIGEST_SIZE]> {
        let mut trailer = [0u8; DIGEST_SIZE];
        self.inner.read_exact(&mut trailer)?;
        Ok(trailer)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.feed(&buf[..n]);
        Ok(n)
    }
}
