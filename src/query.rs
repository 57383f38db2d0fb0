//! Multi-shard membership queries with byte-level verification.
//!
//! Every shard ranks every candidate. A rank only says where a trained key
//! would live, so the referenced bytes are re-read and compared; a shard
//! confirms a candidate only on an exact match. Answers are OR-combined
//! across shards.

use crate::config::{QueryConfig, ShardFailurePolicy};
use crate::error::Result;
use crate::shard::ShardIndex;
use crate::store::ByteStore;
use log::{debug, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::fmt;

/// A shard index paired with the byte store its offsets point into.
pub struct LoadedShard {
    pub index: ShardIndex,
    pub store: Box<dyn ByteStore>,
}

impl LoadedShard {
    pub fn new(index: ShardIndex, store: impl ByteStore + 'static) -> Self {
        Self {
            index,
            store: Box::new(store),
        }
    }

    /// Per-candidate answers of this shard alone.
    pub fn matches<K: AsRef<[u8]>>(
        &self,
        batch: &[K],
        policy: ShardFailurePolicy,
    ) -> Result<Vec<bool>> {
        let mut out = Vec::with_capacity(batch.len());
        let mut failed = 0usize;
        for key in batch {
            let key = key.as_ref();
            let Some(entry) = self.index.candidate_entry(key) else {
                out.push(false);
                continue;
            };
            match self.store.read_entry(entry) {
                Ok(stored) => out.push(stored == key),
                Err(err) => match policy {
                    ShardFailurePolicy::FailFast => return Err(err),
                    ShardFailurePolicy::Skip => {
                        failed += 1;
                        out.push(false);
                    }
                },
            }
        }
        if failed > 0 {
            warn!(
                "shard {}: {failed} verification reads failed and were treated as misses",
                self.index.name()
            );
        }
        Ok(out)
    }
}

/// Per-candidate membership, in batch order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub found: Vec<bool>,
}

impl QueryResult {
    pub fn count(&self) -> usize {
        self.found.len()
    }

    pub fn found_count(&self) -> usize {
        self.found.iter().filter(|&&f| f).count()
    }

    /// Sticky OR: a candidate already found stays found.
    pub fn merge(&mut self, other: &[bool]) {
        if self.found.len() < other.len() {
            self.found.resize(other.len(), false);
        }
        for (acc, &hit) in self.found.iter_mut().zip(other) {
            *acc |= hit;
        }
    }

    /// `1,0,...` on one line, then the candidate count.
    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &hit) in self.found.iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            f.write_str(if hit { "1" } else { "0" })?;
        }
        write!(f, "\n{}", self.count())
    }
}

#[derive(Default)]
pub struct QueryEngine {
    shards: Vec<LoadedShard>,
    cfg: QueryConfig,
}

impl QueryEngine {
    pub fn new(cfg: QueryConfig) -> Self {
        Self {
            shards: Vec::new(),
            cfg,
        }
    }

    pub fn add_shard(&mut self, shard: LoadedShard) {
        self.shards.push(shard);
    }

    pub fn with_shard(mut self, index: ShardIndex, store: impl ByteStore + 'static) -> Self {
        self.add_shard(LoadedShard::new(index, store));
        self
    }

    pub fn shards(&self) -> &[LoadedShard] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn query<K>(&self, batch: &[K]) -> Result<QueryResult>
    where
        K: AsRef<[u8]> + Sync,
    {
        let policy = self.cfg.failure_policy;
        let per_shard = self.per_shard(batch, policy);

        let mut result = QueryResult {
            found: vec![false; batch.len()],
        };
        for (shard, answers) in self.shards.iter().zip(per_shard) {
            let answers = answers?;
            debug!(
                "shard {}: {} of {} candidates confirmed",
                shard.index.name(),
                answers.iter().filter(|&&h| h).count(),
                batch.len()
            );
            result.merge(&answers);
        }
        Ok(result)
    }

    #[cfg(feature = "parallel")]
    fn per_shard<K>(&self, batch: &[K], policy: ShardFailurePolicy) -> Vec<Result<Vec<bool>>>
    where
        K: AsRef<[u8]> + Sync,
    {
        self.shards
            .par_iter()
            .map(|shard| shard.matches(batch, policy))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn per_shard<K>(&self, batch: &[K], policy: ShardFailurePolicy) -> Vec<Result<Vec<bool>>>
    where
        K: AsRef<[u8]> + Sync,
    {
        self.shards
            .iter()
            .map(|shard| shard.matches(batch, policy))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::error::IndexError;
    use crate::offsets::OffsetEntry;
    use crate::store::MemoryStore;

    fn cfg() -> BuildConfig {
        BuildConfig::default().with_workers(2)
    }

    /// Shard whose store is the keys joined by newlines.
    fn shard(name: &str, keys: &[&str]) -> LoadedShard {
        let mut text = Vec::new();
        let mut offsets = Vec::new();
        for k in keys {
            offsets.push(OffsetEntry::new(text.len() as u64, k.len() as u64));
            text.extend_from_slice(k.as_bytes());
            text.push(b'\n');
        }
        let index = ShardIndex::build(name, keys, &offsets, &cfg()).unwrap();
        LoadedShard::new(index, MemoryStore::new(text))
    }

    #[test]
    fn results_are_or_combined_across_shards() {
        let mut engine = QueryEngine::default();
        engine.add_shard(shard("a", &["x1", "x2"]));
        engine.add_shard(shard("b", &["y1"]));
        let result = engine.query(&["x2", "y1", "z9"]).unwrap();
        assert_eq!(result.found, vec![true, true, false]);
        assert_eq!(result.found_count(), 2);
    }

    #[test]
    fn adding_shards_never_unsets_a_hit() {
        let mut engine = QueryEngine::default();
        engine.add_shard(shard("a", &["k1", "k2", "k3"]));
        let before = engine.query(&["k1", "k3", "nope"]).unwrap();
        engine.add_shard(shard("b", &["other1", "other2"]));
        engine.add_shard(shard("empty", &[]));
        let after = engine.query(&["k1", "k3", "nope"]).unwrap();
        for (b, a) in before.found.iter().zip(&after.found) {
            assert!(!b || *a);
        }
        assert_eq!(after.found, vec![true, true, false]);
    }

    #[test]
    fn report_lists_flags_then_count() {
        let result = QueryResult {
            found: vec![true, false, true],
        };
        assert_eq!(result.report(), "1,0,1\n3");
        assert_eq!(QueryResult::default().report(), "\n0");
    }

    #[test]
    fn no_shards_means_nothing_found() {
        let engine = QueryEngine::default();
        let result = engine.query(&["a", "b"]).unwrap();
        assert_eq!(result.found, vec![false, false]);
    }

    fn broken_shard() -> LoadedShard {
        // Offsets point past the end of a store that is too short.
        let keys = ["aaaa", "bbbb"];
        let offsets = [OffsetEntry::new(0, 4), OffsetEntry::new(100, 4)];
        let index = ShardIndex::build("broken", &keys, &offsets, &cfg()).unwrap();
        LoadedShard::new(index, MemoryStore::from("aaaa"))
    }

    #[test]
    fn out_of_bounds_read_fails_fast_by_default() {
        let mut engine = QueryEngine::default();
        engine.add_shard(broken_shard());
        let err = engine.query(&["aaaa", "bbbb"]).unwrap_err();
        assert!(matches!(err, IndexError::OutOfBounds { start: 100, .. }));
    }

    #[test]
    fn skip_policy_treats_bad_reads_as_misses() {
        let mut engine = QueryEngine::new(
            QueryConfig::default().with_failure_policy(ShardFailurePolicy::Skip),
        );
        engine.add_shard(broken_shard());
        engine.add_shard(shard("good", &["bbbb"]));
        let result = engine.query(&["aaaa", "bbbb"]).unwrap();
        assert_eq!(result.found, vec![true, true]);
    }
}
