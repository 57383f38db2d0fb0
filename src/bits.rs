//! Bit arrays with constant-time rank, plus the atomic variant used while a
//! level is being filled.

use crate::codec::{write_u64, Cursor};
use crate::error::{IndexError, Result};
use std::sync::atomic::{AtomicU64, Ordering};

const WORDS_PER_BLOCK: usize = 8;
const BITS_PER_BLOCK: usize = WORDS_PER_BLOCK * 64;

/// Immutable bit array with a sampled rank table: `blocks[b]` holds the
/// number of set bits before bit `b * 512`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedBits {
    len: u64,
    words: Box<[u64]>,
    blocks: Box<[u64]>,
}

impl RankedBits {
    pub fn from_words(words: Vec<u64>, len: u64) -> Self {
        debug_assert_eq!(words.len(), word_count(len));
        let blocks = build_blocks(&words);
        Self {
            len,
            words: words.into_boxed_slice(),
            blocks: blocks.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, pos: u64) -> bool {
        let pos = pos as usize;
        (self.words[pos >> 6] >> (pos & 63)) & 1 == 1
    }

    /// Number of set bits strictly before `pos`.
    #[inline]
    pub fn rank(&self, pos: u64) -> u64 {
        let pos = pos as usize;
        let word = pos >> 6;
        let block = pos / BITS_PER_BLOCK;
        let mut r = self.blocks[block];
        for w in &self.words[block * WORDS_PER_BLOCK..word] {
            r += w.count_ones() as u64;
        }
        let mask = (1u64 << (pos & 63)) - 1;
        r + (self.words[word] & mask).count_ones() as u64
    }

    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Storage in bits, rank samples included.
    pub fn bit_size(&self) -> u64 {
        ((self.words.len() + self.blocks.len()) * 64) as u64
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        write_u64(out, self.len);
        write_u64(out, self.words.len() as u64);
        for &w in self.words.iter() {
            write_u64(out, w);
        }
        write_u64(out, self.blocks.len() as u64);
        for &b in self.blocks.iter() {
            write_u64(out, b);
        }
    }

    pub(crate) fn read_from(cursor: &mut Cursor<'_>) -> Result<Self> {
        let len = cursor.read_u64("bit length")?;
        let word_len = cursor.read_len(8, "bit words")?;
        if word_len != word_count(len) {
            return Err(IndexError::corrupt(format!(
                "{word_len} words cannot hold {len} bits"
            )));
        }
        let mut words = Vec::with_capacity(word_len);
        for _ in 0..word_len {
            words.push(cursor.read_u64("bit word")?);
        }
        let block_len = cursor.read_len(8, "rank blocks")?;
        if block_len != word_len.div_ceil(WORDS_PER_BLOCK).max(1) {
            return Err(IndexError::corrupt("rank table size does not match bit array"));
        }
        let mut blocks = Vec::with_capacity(block_len);
        for _ in 0..block_len {
            blocks.push(cursor.read_u64("rank block")?);
        }
        if blocks != build_blocks(&words) {
            return Err(IndexError::corrupt("rank table does not match bit array"));
        }
        Ok(Self {
            len,
            words: words.into_boxed_slice(),
            blocks: blocks.into_boxed_slice(),
        })
    }
}

/// Bit array shared between workers while a level is claimed.
pub struct AtomicBits {
    len: u64,
    words: Vec<AtomicU64>,
}

impl AtomicBits {
    pub fn new(len: u64) -> Self {
        let words = (0..word_count(len)).map(|_| AtomicU64::new(0)).collect();
        Self { len, words }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sets the bit and reports whether it was already set.
    #[inline]
    pub fn test_and_set(&self, pos: u64) -> bool {
        let pos = pos as usize;
        let mask = 1u64 << (pos & 63);
        self.words[pos >> 6].fetch_or(mask, Ordering::Relaxed) & mask != 0
    }

    #[inline]
    pub fn get(&self, pos: u64) -> bool {
        let pos = pos as usize;
        let mask = 1u64 << (pos & 63);
        self.words[pos >> 6].load(Ordering::Relaxed) & mask != 0
    }

    pub fn into_words(self) -> Vec<u64> {
        self.words.into_iter().map(AtomicU64::into_inner).collect()
    }
}

#[inline]
fn word_count(len: u64) -> usize {
    (len as usize).div_ceil(64)
}

fn build_blocks(words: &[u64]) -> Vec<u64> {
    let mut blocks = Vec::with_capacity(words.len().div_ceil(WORDS_PER_BLOCK).max(1));
    let mut acc = 0u64;
    for chunk in words.chunks(WORDS_PER_BLOCK) {
        blocks.push(acc);
        acc += chunk.iter().map(|w| w.count_ones() as u64).sum::<u64>();
    }
    if blocks.is_empty() {
        blocks.push(0);
    }
    blocks
}
