//! Wire format handling
//!
//! This module contains the bounded little-endian writer used to lay out
//! transmit buffers, plus small wire-format utilities (alignment, the
//! CRC32 used for the legacy WEP/TKIP integrity check value).

use crate::{Result, TxError};

/// Transmit buffer size, sized for every header variant plus a maximum
/// MSDU with encryption overhead.
pub const TX_BUFFER_SIZE: usize = 2900;

/// Bounded append-only writer over a fixed byte area.
///
/// All multi-byte writes are little-endian; the few big-endian fields in
/// the wire format (SNAP ethertype, CCMP MIC pseudo-header) are written
/// as explicit byte slices by their builders.
#[derive(Debug, Clone)]
pub struct WireWriter {
    data: Vec<u8>,
    write_pos: usize,
}

impl WireWriter {
    /// Create a writer over a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            write_pos: 0,
        }
    }

    /// Current write position.
    pub fn position(&self) -> usize {
        self.write_pos
    }

    /// Remaining space.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.write_pos
    }

    /// Zero the buffer and rewind.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.write_pos = 0;
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.write_pos]
    }

    /// Mutable view of the bytes written so far, for in-place encryption.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.write_pos]
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.remaining() < data.len() {
            return Err(TxError::BufferFull);
        }
        self.data[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    /// Advance over `count` bytes, leaving them zero. Used for reserved
    /// words and for slots patched later (MAC header, MIC pseudo-header).
    pub fn write_zeros(&mut self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(TxError::BufferFull);
        }
        self.data[self.write_pos..self.write_pos + count].fill(0);
        self.write_pos += count;
        Ok(())
    }

    /// Overwrite already-written bytes at `offset`.
    pub fn patch(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        if offset + data.len() > self.write_pos {
            return Err(TxError::InvalidParameter(
                "patch beyond written region".to_string(),
            ));
        }
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Overwrite a little-endian u16 at `offset`.
    pub fn patch_u16_le(&mut self, offset: usize, value: u16) -> Result<()> {
        self.patch(offset, &value.to_le_bytes())
    }
}

/// Align `size` up to `alignment` (a power of two).
pub fn align_size(size: usize, alignment: usize) -> usize {
    (size + alignment - 1) & !(alignment - 1)
}

/// Padding needed after a MAC header of `len` bytes so the IV region
/// starts on a 4-byte boundary.
pub fn dword_pad(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Reflected CRC32 (polynomial 0xEDB88320), complemented.
///
/// Matches the WEP/TKIP integrity check value: the ICV appended to a
/// payload is this function applied to the plaintext, little-endian.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xedb8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}
