//! Random-access byte stores backing verification reads.

use crate::error::{IndexError, Result};
use crate::offsets::OffsetEntry;
use std::path::{Path, PathBuf};

pub trait ByteStore: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exactly `length` bytes starting at `start`, or `OutOfBounds`.
    fn read(&self, start: u64, length: u64) -> Result<&[u8]>;

    fn read_entry(&self, entry: OffsetEntry) -> Result<&[u8]> {
        self.read(entry.start, entry.length)
    }
}

/// Byte store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for MemoryStore {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for MemoryStore {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}

impl ByteStore for MemoryStore {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, start: u64, length: u64) -> Result<&[u8]> {
        slice_checked(&self.bytes, start, length)
    }
}

/// Record file read fully into memory when opened.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| IndexError::io(&path, e))?;
        Ok(Self { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ByteStore for FileStore {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, start: u64, length: u64) -> Result<&[u8]> {
        slice_checked(&self.bytes, start, length)
    }
}

fn slice_checked(bytes: &[u8], start: u64, length: u64) -> Result<&[u8]> {
    let store_len = bytes.len() as u64;
    let out_of_bounds = || IndexError::OutOfBounds {
        start,
        length,
        store_len,
    };
    let end = start
        .checked_add(length)
        .filter(|&end| end <= store_len)
        .ok_or_else(out_of_bounds)?;
    Ok(&bytes[start as usize..end as usize])
}
