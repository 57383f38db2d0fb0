use std::hash::{BuildHasherDefault, Hasher};

/// `Hasher` for maps and sets keyed by raw key bytes. Routes the bytes
/// through the crate's hash family instead of SipHash.
#[derive(Default)]
pub struct KeyHasher {
    state: u64,
}

impl Hasher for KeyHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.state = crate::hash::hash(bytes, self.state);
    }

    #[inline]
    fn write_usize(&mut self, n: usize) {
        // Length prefix written by `Hash for [u8]`.
        self.state ^= crate::hash::splitmix64(n as u64);
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }
}

pub type KeyBuildHasher = BuildHasherDefault<KeyHasher>;

pub type KeySet<'a> = hashbrown::HashSet<&'a [u8], KeyBuildHasher>;

/// Returns the first key that appears twice, if any.
pub fn find_duplicate<K: AsRef<[u8]>>(keys: &[K]) -> Option<&[u8]> {
    let mut seen = KeySet::with_capacity_and_hasher(keys.len(), KeyBuildHasher::default());
    keys.iter().map(|k| k.as_ref()).find(|&k| !seen.insert(k))
}
