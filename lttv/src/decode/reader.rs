//! Little-endian cursor over a trace sub-buffer's bytes.
//!
//! Traces are always read in their own declared byte order in the original;
//! this engine only targets little-endian traces (the overwhelming common
//! case for the architectures in `examples/original_source`), so byte
//! swapping is left out rather than built and never exercised.

use crate::domain::errors::DecodeError;

pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::CorruptBlockHeader {
                buf_size: n as u32,
                remaining: self.remaining() as u64,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("len checked")))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("len checked")))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("len checked")))
    }

    /// Read a NUL-terminated string, advancing past (and excluding) the NUL.
    pub fn read_cstr(&mut self) -> Result<String, DecodeError> {
        let rel = self.data[self.pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::CorruptBlockHeader { buf_size: 0, remaining: self.remaining() as u64 })?;
        let bytes = self.take(rel + 1)?;
        Ok(String::from_utf8_lossy(&bytes[..bytes.len() - 1]).into_owned())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.take(n)
    }
}
