//! Key extraction from delimited record files.
//!
//! A record file starts with a header row. Every following record
//! contributes its first field as a key, together with the exact byte range
//! of that field inside the file.

use crate::error::{IndexError, Result};
use crate::offsets::OffsetEntry;
use std::io::BufRead;
use std::path::Path;

/// Keys of one shard in encounter order, with their byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardKeys {
    pub keys: Vec<Vec<u8>>,
    pub offsets: Vec<OffsetEntry>,
}

impl ShardKeys {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub fn extract_keys(bytes: &[u8]) -> Result<ShardKeys> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let mut record = csv::ByteRecord::new();
    let mut out = ShardKeys::default();

    while reader.read_byte_record(&mut record)? {
        let (pos, line) = record
            .position()
            .map(|p| (p.byte(), p.line()))
            .unwrap_or((0, 0));
        let key = match record.get(0) {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(IndexError::Record {
                    line,
                    detail: "record has no key".into(),
                })
            }
        };
        let start = locate_key(bytes, pos as usize, key).ok_or_else(|| IndexError::Record {
            line,
            detail: format!(
                "key '{}' is not stored verbatim",
                String::from_utf8_lossy(key)
            ),
        })?;
        out.offsets
            .push(OffsetEntry::new(start as u64, key.len() as u64));
        out.keys.push(key.to_vec());
    }
    Ok(out)
}

/// Start of `key` in `bytes` for a record that begins at `pos`. The reader
/// may report a position before skipped blank lines, and a quoted key starts
/// one byte after its record.
fn locate_key(bytes: &[u8], pos: usize, key: &[u8]) -> Option<usize> {
    let mut start = pos;
    while matches!(bytes.get(start), Some(b'\n' | b'\r')) {
        start += 1;
    }
    if bytes.get(start) == Some(&b'"') {
        start += 1;
    }
    (bytes.get(start..start.checked_add(key.len())?) == Some(key)).then_some(start)
}

pub fn extract_keys_from_file(path: &Path) -> Result<(ShardKeys, Vec<u8>)> {
    let bytes = std::fs::read(path).map_err(|e| IndexError::io(path, e))?;
    let keys = extract_keys(&bytes).map_err(|e| match e {
        IndexError::Record { line, detail } => IndexError::Record {
            line,
            detail: format!("{}: {detail}", path.display()),
        },
        IndexError::Io { source, .. } => IndexError::io(path, source),
        other => other,
    })?;
    Ok((keys, bytes))
}

/// Candidate keys, one per line, trailing `\r` dropped. A blank line is
/// the empty key, so answers stay aligned with the input lines.
pub fn read_candidates(path: &Path) -> Result<Vec<Vec<u8>>> {
    let file = std::fs::File::open(path).map_err(|e| IndexError::io(path, e))?;
    let mut out = Vec::new();
    for line in std::io::BufReader::new(file).split(b'\n') {
        let mut line = line.map_err(|e| IndexError::io(path, e))?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        out.push(line);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_ranges(bytes: &[u8], keys: &ShardKeys) {
        for (key, entry) in keys.keys.iter().zip(&keys.offsets) {
            let start = entry.start as usize;
            assert_eq!(&bytes[start..start + entry.length as usize], &key[..]);
        }
    }

    #[test]
    fn offsets_bound_the_key_exactly() {
        let bytes = b"oci,citing,cited\n0201-02,10.1/a,10.1/b\n0201-03,10.1/c,10.1/d\n";
        let keys = extract_keys(bytes).unwrap();
        assert_eq!(keys.keys, vec![b"0201-02".to_vec(), b"0201-03".to_vec()]);
        assert_eq!(
            keys.offsets,
            vec![OffsetEntry::new(17, 7), OffsetEntry::new(39, 7)]
        );
        check_ranges(bytes, &keys);
    }

    #[test]
    fn crlf_quotes_and_blank_lines_are_handled() {
        let bytes = b"oci,x\r\n\"02-1\",a\r\n\r\n02-2,b\r\n03-3";
        let keys = extract_keys(bytes).unwrap();
        assert_eq!(keys.len(), 3);
        check_ranges(bytes, &keys);
    }

    #[test]
    fn header_only_file_has_no_keys() {
        assert!(extract_keys(b"oci,citing\n").unwrap().is_empty());
        assert!(extract_keys(b"").unwrap().is_empty());
    }

    #[test]
    fn escaped_quote_key_is_a_record_error() {
        let err = extract_keys(b"oci\n\"a\"\"b\",x\n").unwrap_err();
        assert!(matches!(err, IndexError::Record { .. }));
    }

    #[test]
    fn blank_candidate_lines_keep_their_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.txt");
        std::fs::write(&path, "10.1/a\n\n10.1/b\r\n").unwrap();
        let candidates = read_candidates(&path).unwrap();
        assert_eq!(
            candidates,
            vec![b"10.1/a".to_vec(), Vec::new(), b"10.1/b".to_vec()]
        );
    }

    #[test]
    fn empty_key_is_a_record_error() {
        let err = extract_keys(b"oci,x\n,y\n").unwrap_err();
        assert!(matches!(err, IndexError::Record { line: 2, .. }));
    }
}
