use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

/// Exact byte range of a key's text inside its shard's record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub start: u64,
    pub length: u64,
}

impl OffsetEntry {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }
}

/// Offset entries indexed by rank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OffsetTable {
    entries: Vec<OffsetEntry>,
}

impl OffsetTable {
    pub fn from_entries(entries: Vec<OffsetEntry>) -> Self {
        Self { entries }
    }

    #[inline]
    pub fn get(&self, rank: u64) -> Option<OffsetEntry> {
        usize::try_from(rank)
            .ok()
            .and_then(|r| self.entries.get(r))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[OffsetEntry] {
        &self.entries
    }

    /// Writes one `start,length` line per rank.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        for entry in &self.entries {
            writer.serialize(entry)?;
        }
        writer
            .flush()
            .map_err(|e| IndexError::io("<offset table>", e))?;
        Ok(())
    }

    pub fn read_csv<R: Read>(input: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(input);
        let mut entries = Vec::new();
        for row in reader.deserialize::<OffsetEntry>() {
            let entry = row.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                IndexError::corrupt(format!("offset table line {line}: {e}"))
            })?;
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| IndexError::io(path, e))?;
        self.write_csv(std::io::BufWriter::new(file))
            .map_err(|e| with_path(e, path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| IndexError::io(path, e))?;
        Self::read_csv(std::io::BufReader::new(file)).map_err(|e| with_path(e, path))
    }
}

fn with_path(err: IndexError, path: &Path) -> IndexError {
    match err {
        IndexError::Io { source, .. } => IndexError::io(path, source),
        IndexError::CorruptData(detail) => {
            IndexError::corrupt(format!("{}: {detail}", path.display()))
        }
        other => other,
    }
}
