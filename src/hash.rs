//! Seeded 64-bit hash family over byte strings.
//!
//! `hash(key, seed)` is wyhash of the key XORed with the seed and pushed
//! through a splitmix64 finalizer. Without the finalizer two keys that agree
//! modulo a power of two would agree for every seed.

/// Hash of `key` under `seed`.
#[inline(always)]
pub fn hash(key: &[u8], seed: u64) -> u64 {
    hash_with_base(base_hash(key), seed)
}

/// Seed-independent part of [`hash`]. Computed once per key when a key is
/// hashed under many seeds.
#[inline(always)]
pub fn base_hash(key: &[u8]) -> u64 {
    wyhash::wyhash(key, 0)
}

#[inline(always)]
pub fn hash_with_base(base: u64, seed: u64) -> u64 {
    splitmix64(base ^ seed)
}

/// Seed for construction level `level` derived from the build seed.
#[inline]
pub fn level_seed(seed: u64, level: usize) -> u64 {
    splitmix64(seed ^ (level as u64).wrapping_mul(0xD6E8_FD9D_50E9_4A4D))
}

#[inline(always)]
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
