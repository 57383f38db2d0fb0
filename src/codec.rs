//! Little-endian primitives for the `.bin` layout.

use crate::error::{IndexError, Result};

pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| IndexError::corrupt(format!("truncated while reading {what}")))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.read_bytes(1, what)?[0])
    }

    pub(crate) fn read_u64(&mut self, what: &str) -> Result<u64> {
        let mut array = [0u8; 8];
        array.copy_from_slice(self.read_bytes(8, what)?);
        Ok(u64::from_le_bytes(array))
    }

    /// Reads a length prefix and checks that at least `len * unit` bytes
    /// follow, so a corrupt count cannot trigger a huge allocation.
    pub(crate) fn read_len(&mut self, unit: usize, what: &str) -> Result<usize> {
        let len = self.read_u64(what)?;
        let len = usize::try_from(len)
            .map_err(|_| IndexError::corrupt(format!("{what} does not fit in memory")))?;
        if len.saturating_mul(unit) > self.remaining() {
            return Err(IndexError::corrupt(format!(
                "{what} of {len} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(len)
    }
}

pub(crate) fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub(crate) fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
