// ncm-core - NCM container decoder
// Copyright (C) 2025 ncm-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Fail-closed reads over the container byte stream
//!
//! Every fixed field and length-prefixed section is consumed byte-for-byte.
//! A stream that ends early yields `TruncatedContainer` naming the section,
//! never a short buffer; any other I/O failure is passed through as
//! `SourceReadError`.

use crate::error::{NcmError, Result};
use std::io::{self, Read};

/// Sequential reader tracking the absolute stream position
pub struct SectionReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> SectionReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read a fixed-width field
    pub fn read_array<const N: usize>(&mut self, section: &'static str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        let filled = fill_window(&mut self.inner, &mut buf)?;
        self.position += filled as u64;
        if filled < N {
            return Err(NcmError::truncated(section, N as u64, filled as u64));
        }
        Ok(buf)
    }

    /// Read a little-endian u32 length field
    pub fn read_u32_le(&mut self, section: &'static str) -> Result<u32> {
        self.read_array::<4>(section).map(u32::from_le_bytes)
    }

    /// Read exactly `len` bytes
    ///
    /// The buffer grows with the data actually delivered, so a corrupted
    /// length cannot force a huge up-front allocation.
    pub fn read_vec(&mut self, section: &'static str, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(1 << 20));
        (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        if buf.len() < len {
            return Err(NcmError::truncated(section, len as u64, buf.len() as u64));
        }
        Ok(buf)
    }

    /// Read a 4-byte little-endian length followed by that many bytes
    pub fn read_length_prefixed(&mut self, section: &'static str) -> Result<Vec<u8>> {
        let len = self.read_u32_le(section)?;
        self.read_vec(section, len as usize)
    }

    /// Consume and discard `len` bytes
    pub fn skip(&mut self, section: &'static str, len: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        self.position += skipped;
        if skipped < len {
            return Err(NcmError::truncated(section, len, skipped));
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for SectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// Fill `buf` as far as the stream allows
///
/// Returns fewer bytes than `buf.len()` only at end of stream, so callers
/// that window the payload get full windows everywhere but the tail.
pub(crate) fn fill_window<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
