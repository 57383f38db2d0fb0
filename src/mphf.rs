//! Minimal perfect hash function built level by level with bucket
//! retraction.
//!
//! Level `L` hashes every remaining key into a bit array of
//! `ceil(gamma * remaining)` buckets. A bucket hit by exactly one key keeps
//! its bit and finalizes that key; a bucket hit by two or more keys is voided
//! for all of them and they move on to level `L + 1`. Keys still unplaced
//! after `max_levels` go to a fallback table that stores them verbatim, so
//! construction always terminates.
//!
//! The rank of a key is the number of keys finalized at earlier levels plus
//! the number of set bits before its bucket in its own level.

use crate::bits::{AtomicBits, RankedBits};
use crate::build_hasher::{find_duplicate, KeyBuildHasher};
use crate::codec::{write_u64, write_u8, Cursor};
use crate::config::BuildConfig;
use crate::error::{IndexError, Result};
use crate::hash::{base_hash, hash_with_base, level_seed};
use hashbrown::HashMap;
use log::debug;
#[cfg(feature = "parallel")]
use log::warn;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::path::Path;

const MAGIC: &[u8; 4] = b"SMPH";
const FORMAT_VERSION: u8 = 1;
#[cfg(feature = "parallel")]
const PAR_MIN_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Level {
    seed: u64,
    /// Keys finalized at all earlier levels.
    rank_base: u64,
    bits: RankedBits,
}

/// Immutable MPHF over `n` keys. Every byte string gets a rank in `[0, n)`;
/// only the trained keys are guaranteed distinct ranks.
#[derive(Debug, Clone)]
pub struct Mphf {
    n: u64,
    seed: u64,
    levels: Vec<Level>,
    fallback: HashMap<Box<[u8]>, u64, KeyBuildHasher>,
}

impl Mphf {
    pub fn empty() -> Self {
        Self {
            n: 0,
            seed: 0,
            levels: Vec::new(),
            fallback: HashMap::default(),
        }
    }

    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    /// Rank of `key`. `None` only for an empty structure. Keys that were not
    /// trained still get a rank, so callers must verify the hit.
    #[inline]
    pub fn lookup(&self, key: &[u8]) -> Option<u64> {
        if self.n == 0 {
            return None;
        }
        let base = base_hash(key);
        if let Some(rank) = self.claimed_rank_with_base(key, base) {
            return Some(rank);
        }
        Some(hash_with_base(base, self.seed) % self.n)
    }

    /// Rank of `key` if some level or the fallback table claims it. Every
    /// trained key is claimed; an untrained key may be claimed too.
    #[inline]
    pub fn claimed_rank(&self, key: &[u8]) -> Option<u64> {
        self.claimed_rank_with_base(key, base_hash(key))
    }

    fn claimed_rank_with_base(&self, key: &[u8], base: u64) -> Option<u64> {
        for level in &self.levels {
            let pos = hash_with_base(base, level.seed) % level.bits.len();
            if level.bits.get(pos) {
                return Some(level.rank_base + level.bits.rank(pos));
            }
        }
        self.fallback.get(key).copied()
    }

    /// Storage of the structure in bits: level arrays with their rank
    /// samples, and the fallback entries.
    pub fn total_bit_size(&self) -> u64 {
        let levels: u64 = self.levels.iter().map(|l| l.bits.bit_size() + 128).sum();
        let fallback: u64 = self
            .fallback
            .keys()
            .map(|k| 128 + 8 * k.len() as u64)
            .sum();
        levels + fallback
    }

    pub fn bits_per_element(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.total_bit_size() as f64 / self.n as f64
    }

    /// Checks that `keys` map onto `[0, n)` with no repeats.
    pub fn verify<K: AsRef<[u8]>>(&self, keys: &[K]) -> bool {
        if keys.len() as u64 != self.n {
            return false;
        }
        let mut seen = vec![false; keys.len()];
        for key in keys {
            match self.claimed_rank(key.as_ref()) {
                Some(rank) if rank < self.n && !seen[rank as usize] => seen[rank as usize] = true,
                _ => return false,
            }
        }
        true
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(MAGIC);
        write_u8(out, FORMAT_VERSION);
        write_u64(out, self.n);
        write_u64(out, self.seed);
        write_u64(out, self.levels.len() as u64);
        for level in &self.levels {
            write_u64(out, level.seed);
            write_u64(out, level.rank_base);
            level.bits.write_to(out);
        }
        let mut fallback: Vec<(&[u8], u64)> =
            self.fallback.iter().map(|(k, &r)| (&k[..], r)).collect();
        fallback.sort_unstable_by_key(|&(_, r)| r);
        write_u64(out, fallback.len() as u64);
        for (key, rank) in fallback {
            write_u64(out, rank);
            write_u64(out, key.len() as u64);
            out.extend_from_slice(key);
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        if cursor.read_bytes(MAGIC.len(), "magic")? != MAGIC {
            return Err(IndexError::corrupt("not an MPHF file"));
        }
        let version = cursor.read_u8("version")?;
        if version != FORMAT_VERSION {
            return Err(IndexError::corrupt(format!(
                "unsupported MPHF format version {version}"
            )));
        }
        let n = cursor.read_u64("key count")?;
        let seed = cursor.read_u64("seed")?;
        let level_len = cursor.read_len(16, "level count")?;
        let mut levels = Vec::with_capacity(level_len);
        let mut expected_base = 0u64;
        for _ in 0..level_len {
            let seed = cursor.read_u64("level seed")?;
            let rank_base = cursor.read_u64("level rank base")?;
            let bits = RankedBits::read_from(&mut cursor)?;
            if rank_base != expected_base || bits.is_empty() {
                return Err(IndexError::corrupt("level rank bases are inconsistent"));
            }
            expected_base += bits.count_ones();
            levels.push(Level {
                seed,
                rank_base,
                bits,
            });
        }
        let fallback_len = cursor.read_len(16, "fallback count")?;
        if expected_base + fallback_len as u64 != n {
            return Err(IndexError::corrupt(format!(
                "levels and fallback hold {} keys, header says {n}",
                expected_base + fallback_len as u64
            )));
        }
        let mut fallback = HashMap::with_capacity_and_hasher(fallback_len, KeyBuildHasher::default());
        for i in 0..fallback_len {
            let rank = cursor.read_u64("fallback rank")?;
            let len = cursor.read_len(1, "fallback key length")?;
            let key = cursor.read_bytes(len, "fallback key")?;
            if rank != expected_base + i as u64 {
                return Err(IndexError::corrupt("fallback ranks are not dense"));
            }
            if fallback.insert(key.into(), rank).is_some() {
                return Err(IndexError::corrupt("fallback key repeated"));
            }
        }
        if cursor.remaining() != 0 {
            return Err(IndexError::corrupt("trailing bytes after MPHF"));
        }
        Ok(Self {
            n,
            seed,
            levels,
            fallback,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()).map_err(|e| IndexError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| IndexError::io(path, e))?;
        Self::from_bytes(&bytes)
    }
}

impl PartialEq for Mphf {
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n
            && self.seed == other.seed
            && self.levels == other.levels
            && self.fallback == other.fallback
    }
}

pub struct Builder {
    cfg: BuildConfig,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            cfg: BuildConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: BuildConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Build the MPHF. Rejects repeated keys.
    pub fn build<K>(self, keys: &[K]) -> Result<Mphf>
    where
        K: AsRef<[u8]> + Sync,
    {
        if let Some(dup) = find_duplicate(keys) {
            return Err(IndexError::DuplicateKey(
                String::from_utf8_lossy(dup).into_owned(),
            ));
        }
        self.build_unique(keys)
    }

    /// Build the MPHF. Assumes **unique** keys (skips duplicate checks).
    pub fn build_unique<K>(self, keys: &[K]) -> Result<Mphf>
    where
        K: AsRef<[u8]> + Sync,
    {
        self.cfg.validate()?;
        if keys.is_empty() {
            return Ok(Mphf::empty());
        }
        let mphf = run_with_workers(self.cfg.workers, || build_levels(keys, &self.cfg));
        debug_assert!(mphf.verify(keys), "MPHF is not a bijection over its keys");
        Ok(mphf)
    }
}

#[cfg(feature = "parallel")]
fn run_with_workers<T, F>(workers: usize, f: F) -> T
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(f),
        Err(err) => {
            warn!("could not start {workers} build workers ({err}), using the global pool");
            f()
        }
    }
}

#[cfg(not(feature = "parallel"))]
fn run_with_workers<T, F>(_workers: usize, f: F) -> T
where
    F: FnOnce() -> T,
{
    f()
}

fn build_levels<K>(keys: &[K], cfg: &BuildConfig) -> Mphf
where
    K: AsRef<[u8]> + Sync,
{
    let n = keys.len() as u64;
    let bases = base_hashes(keys);
    let mut remaining: Vec<usize> = (0..keys.len()).collect();
    let mut levels = Vec::new();
    let mut rank_base = 0u64;

    while !remaining.is_empty() && levels.len() < cfg.max_levels {
        let level_idx = levels.len();
        let seed = level_seed(cfg.seed, level_idx);
        let size = ((cfg.gamma * remaining.len() as f64).ceil() as u64).max(1);

        let claimed = AtomicBits::new(size);
        let collided = AtomicBits::new(size);
        claim_buckets(&bases, &remaining, seed, &claimed, &collided);

        // Every claim for this level is visible here; void the collisions.
        let words: Vec<u64> = claimed
            .into_words()
            .into_iter()
            .zip(collided.into_words())
            .map(|(c, x)| c & !x)
            .collect();
        let bits = RankedBits::from_words(words, size);
        let placed = bits.count_ones();

        remaining = unplaced_keys(&bases, &remaining, seed, &bits);
        debug!(
            "level {level_idx}: {size} buckets, {placed} keys placed, {} deferred",
            remaining.len()
        );
        levels.push(Level {
            seed,
            rank_base,
            bits,
        });
        rank_base += placed;
    }

    let mut fallback =
        HashMap::with_capacity_and_hasher(remaining.len(), KeyBuildHasher::default());
    if !remaining.is_empty() {
        debug!(
            "{} keys left after {} levels go to the fallback table",
            remaining.len(),
            levels.len()
        );
    }
    for (i, &idx) in remaining.iter().enumerate() {
        fallback.insert(Box::from(keys[idx].as_ref()), rank_base + i as u64);
    }

    Mphf {
        n,
        seed: cfg.seed,
        levels,
        fallback,
    }
}

fn base_hashes<K>(keys: &[K]) -> Vec<u64>
where
    K: AsRef<[u8]> + Sync,
{
    #[cfg(feature = "parallel")]
    {
        keys.par_iter()
            .with_min_len(PAR_MIN_LEN)
            .map(|k| base_hash(k.as_ref()))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        keys.iter().map(|k| base_hash(k.as_ref())).collect()
    }
}

fn claim_buckets(
    bases: &[u64],
    remaining: &[usize],
    seed: u64,
    claimed: &AtomicBits,
    collided: &AtomicBits,
) {
    let size = claimed.len();
    let claim = |&idx: &usize| {
        let pos = hash_with_base(bases[idx], seed) % size;
        if claimed.test_and_set(pos) {
            collided.test_and_set(pos);
        }
    };
    #[cfg(feature = "parallel")]
    remaining
        .par_iter()
        .with_min_len(PAR_MIN_LEN)
        .for_each(claim);
    #[cfg(not(feature = "parallel"))]
    remaining.iter().for_each(claim);
}

fn unplaced_keys(bases: &[u64], remaining: &[usize], seed: u64, bits: &RankedBits) -> Vec<usize> {
    let size = bits.len();
    let unplaced = |&&idx: &&usize| !bits.get(hash_with_base(bases[idx], seed) % size);
    #[cfg(feature = "parallel")]
    {
        remaining
            .par_iter()
            .with_min_len(PAR_MIN_LEN)
            .filter(unplaced)
            .copied()
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        remaining.iter().filter(unplaced).copied().collect()
    }
}
