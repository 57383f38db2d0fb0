//! Per-shard index: an MPHF plus the offset table ordered by rank.

use crate::config::BuildConfig;
use crate::error::{IndexError, Result};
use crate::mphf::{Builder, Mphf};
use crate::offsets::{OffsetEntry, OffsetTable};
use crate::store::ByteStore;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const MPHF_EXTENSION: &str = "bin";
pub const OFFSETS_EXTENSION: &str = "csv";

/// `<dir>/<name>.bin` and `<dir>/<name>.csv`.
pub fn shard_paths(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{name}.{MPHF_EXTENSION}")),
        dir.join(format!("{name}.{OFFSETS_EXTENSION}")),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardIndex {
    name: String,
    mphf: Mphf,
    offsets: OffsetTable,
}

impl ShardIndex {
    /// Builds the index for one shard. `offsets[i]` is the byte range of
    /// `keys[i]`; keys must be unique.
    pub fn build<K>(
        name: impl Into<String>,
        keys: &[K],
        offsets: &[OffsetEntry],
        cfg: &BuildConfig,
    ) -> Result<Self>
    where
        K: AsRef<[u8]> + Sync,
    {
        let name = name.into();
        if keys.len() != offsets.len() {
            return Err(IndexError::LengthMismatch {
                keys: keys.len(),
                offsets: offsets.len(),
            });
        }

        let started = Instant::now();
        let mphf = Builder::new().with_config(cfg.clone()).build(keys)?;
        debug!(
            "shard {name}: MPHF over {} keys built in {:.3}s",
            keys.len(),
            started.elapsed().as_secs_f64()
        );
        info!(
            "shard {name}: {} keys, {} levels, {} in fallback, {:.2} bits per element",
            keys.len(),
            mphf.level_count(),
            mphf.fallback_len(),
            mphf.bits_per_element()
        );

        let offsets = order_by_rank(&mphf, keys, offsets)?;
        Ok(Self {
            name,
            mphf,
            offsets,
        })
    }

    pub fn from_parts(name: impl Into<String>, mphf: Mphf, offsets: OffsetTable) -> Result<Self> {
        let name = name.into();
        if offsets.len() as u64 != mphf.len() {
            return Err(IndexError::corrupt(format!(
                "shard {name}: offset table has {} rows for {} keys",
                offsets.len(),
                mphf.len()
            )));
        }
        Ok(Self {
            name,
            mphf,
            offsets,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.mphf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mphf.is_empty()
    }

    pub fn mphf(&self) -> &Mphf {
        &self.mphf
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    /// Offset entry at the rank `key` hashes to. For a key that was not
    /// trained this points at some unrelated record.
    #[inline]
    pub fn candidate_entry(&self, key: &[u8]) -> Option<OffsetEntry> {
        let rank = self.mphf.lookup(key)?;
        self.offsets.get(rank)
    }

    /// True when `store` holds exactly `key` at the candidate's offset.
    pub fn contains(&self, key: &[u8], store: &dyn ByteStore) -> Result<bool> {
        match self.candidate_entry(key) {
            Some(entry) => Ok(store.read_entry(entry)? == key),
            None => Ok(false),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let (bin, csv) = shard_paths(dir, &self.name);
        self.mphf.save(&bin)?;
        self.offsets.save(&csv)?;
        debug!("shard {}: saved {} and {}", self.name, bin.display(), csv.display());
        Ok(())
    }

    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let (bin, csv) = shard_paths(dir, name);
        let mphf = Mphf::load(&bin)?;
        let offsets = OffsetTable::load(&csv)?;
        Self::from_parts(name, mphf, offsets)
    }
}

fn order_by_rank<K: AsRef<[u8]>>(
    mphf: &Mphf,
    keys: &[K],
    offsets: &[OffsetEntry],
) -> Result<OffsetTable> {
    let mut ordered = vec![OffsetEntry::default(); keys.len()];
    let mut filled = vec![false; keys.len()];
    for (key, &entry) in keys.iter().zip(offsets) {
        let rank = mphf
            .claimed_rank(key.as_ref())
            .filter(|&r| r < mphf.len())
            .ok_or_else(|| IndexError::corrupt("trained key has no rank"))? as usize;
        if std::mem::replace(&mut filled[rank], true) {
            return Err(IndexError::corrupt(format!("rank {rank} assigned twice")));
        }
        ordered[rank] = entry;
    }
    Ok(OffsetTable::from_entries(ordered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cfg() -> BuildConfig {
        BuildConfig::default().with_workers(2)
    }

    fn sample() -> (Vec<&'static str>, Vec<OffsetEntry>, MemoryStore) {
        let mut text = vec![b'.'; 40];
        let keys = vec!["10.1/a", "10.1/b", "10.1/c"];
        let offsets = vec![
            OffsetEntry::new(10, 6),
            OffsetEntry::new(20, 6),
            OffsetEntry::new(30, 6),
        ];
        for (k, o) in keys.iter().zip(&offsets) {
            let s = o.start as usize;
            text[s..s + k.len()].copy_from_slice(k.as_bytes());
        }
        (keys, offsets, MemoryStore::new(text))
    }

    #[test]
    fn offsets_follow_rank_order() {
        let (keys, offsets, _) = sample();
        let shard = ShardIndex::build("s", &keys, &offsets, &cfg()).unwrap();
        assert_eq!(shard.offsets().len(), 3);
        for (k, o) in keys.iter().zip(&offsets) {
            let rank = shard.mphf().lookup(k.as_bytes()).unwrap();
            assert_eq!(shard.offsets().get(rank), Some(*o));
        }
    }

    #[test]
    fn contains_verifies_stored_bytes() {
        let (keys, offsets, store) = sample();
        let shard = ShardIndex::build("s", &keys, &offsets, &cfg()).unwrap();
        for k in &keys {
            assert!(shard.contains(k.as_bytes(), &store).unwrap());
        }
        assert!(!shard.contains(b"10.1/z", &store).unwrap());
        assert!(!shard.contains(b"10.1/", &store).unwrap());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let (keys, offsets, _) = sample();
        let err = ShardIndex::build("s", &keys, &offsets[..2], &cfg()).unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { keys: 3, offsets: 2 }));
    }

    #[test]
    fn duplicate_keys_are_rejected_before_build() {
        let keys = ["k", "k"];
        let offsets = [OffsetEntry::new(0, 1), OffsetEntry::new(1, 1)];
        let err = ShardIndex::build("s", &keys, &offsets, &cfg()).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey(_)));
    }

    #[test]
    fn empty_shard_never_confirms() {
        let shard = ShardIndex::build::<&str>("empty", &[], &[], &cfg()).unwrap();
        let store = MemoryStore::from("anything");
        assert!(shard.is_empty());
        assert!(!shard.contains(b"anything", &store).unwrap());
    }

    #[test]
    fn mismatched_parts_are_corrupt() {
        let (keys, offsets, _) = sample();
        let shard = ShardIndex::build("s", &keys, &offsets, &cfg()).unwrap();
        let short = OffsetTable::from_entries(offsets[..1].to_vec());
        assert!(ShardIndex::from_parts("s", shard.mphf().clone(), short).is_err());
    }
}
