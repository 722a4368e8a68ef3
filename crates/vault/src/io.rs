// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Stream adapters that hash whatever passes through them

use crate::digest::HashingAccumulator;
use std::io::{self, Read, Write};

/// Fill `buf` from `reader`, stopping early only at end of stream.
/// Returns the number of bytes read; zero means the stream is exhausted.
pub fn read_chunk<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reader that hashes the bytes it yields
pub struct HashingReader<R> {
    inner: R,
    hasher: HashingAccumulator,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: HashingAccumulator::new(),
        }
    }

    pub fn into_parts(self) -> (R, HashingAccumulator) {
        (self.inner, self.hasher)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Writer that hashes the bytes it accepts
pub struct HashingWriter<W> {
    inner: W,
    hasher: HashingAccumulator,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: HashingAccumulator::new(),
        }
    }

    pub fn into_parts(self) -> (W, HashingAccumulator) {
        (self.inner, self.hasher)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // Only what the inner writer accepted
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digests;
    use std::io::Cursor;

    /// Yields at most three bytes per read
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_read_chunk_fills_across_short_reads() {
        let mut r = Trickle(Cursor::new(b"0123456789".to_vec()));
        let mut buf = [0u8; 8];
        assert_eq!(read_chunk(&mut r, &mut buf).unwrap(), 8);
        assert_eq!(&buf, b"01234567");
        assert_eq!(read_chunk(&mut r, &mut buf).unwrap(), 2);
        assert_eq!(read_chunk(&mut r, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_hashing_adapters() {
        let mut reader = HashingReader::new(Cursor::new(b"hello".to_vec()));
        let mut writer = HashingWriter::new(Vec::new());
        let _ = io::copy(&mut reader, &mut writer).unwrap();

        let (_, read_hash) = reader.into_parts();
        let (out, write_hash) = writer.into_parts();
        assert_eq!(out, b"hello");
        assert_eq!(read_hash.finish(), Digests::of(b"hello"));
        assert_eq!(write_hash.finish(), Digests::of(b"hello"));
    }
}
