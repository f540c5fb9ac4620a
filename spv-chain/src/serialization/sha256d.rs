//! Double-SHA-256, computed incrementally over a `std::io::Write` sink.
//!
//! Header and transaction hashing both need "hash the bytes I'm about to
//! serialize anyway" without a second allocation-and-copy pass, so callers
//! write directly into a [`Writer`] and call [`Writer::finish`] instead of
//! serializing to a `Vec<u8>` and hashing that afterwards.

use sha2::{Digest, Sha256};
use std::io;

/// An `io::Write` sink that hashes everything written to it with SHA-256,
/// applied twice (`SHA256(SHA256(x))`), the convention Bitcoin uses for
/// block and transaction ids.
#[derive(Default)]
pub struct Writer(Sha256);

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Consume the writer and return the double-SHA-256 digest.
    pub fn finish(self) -> [u8; 32] {
        let first = self.0.finalize();
        let second = Sha256::digest(&first[..]);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second[..]);
        out
    }
}

/// Convenience one-shot double-SHA-256 over an in-memory buffer.
pub fn dbl_sha256(bytes: &[u8]) -> [u8; 32] {
    let mut w = Writer::default();
    io::Write::write_all(&mut w, bytes).expect("writing to a Sha256 writer is infallible");
    w.finish()
}

/// The first four bytes of a double-SHA-256 digest, used as the
/// network-message checksum (§4.A `network_message`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Checksum {
        let digest = dbl_sha256(bytes);
        let mut out = [0u8; 4];
        out.copy_from_slice(&digest[..4]);
        Checksum(out)
    }
}
