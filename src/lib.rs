//! shardex: sharded MPHF indexes for exact membership over huge key sets.
//!
//! - Build once per shard on a set of **unique** keys with known byte ranges.
//! - O(1)-ish lookups: key -> rank in `[0..n)` -> byte range in the shard.
//! - Every hit is verified against the stored bytes, so untrained keys never
//!   come back as members.

pub mod bits;
mod build_hasher;
pub mod catalog;
mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod logging;
pub mod mphf;
pub mod offsets;
pub mod query;
pub mod records;
pub mod shard;
pub mod store;

pub use catalog::{build_directory, open_directory, ShardSummary};
pub use config::{BuildConfig, QueryConfig, ShardFailurePolicy};
pub use error::{IndexError, Result};
pub use mphf::{Builder, Mphf};
pub use offsets::{OffsetEntry, OffsetTable};
pub use query::{LoadedShard, QueryEngine, QueryResult};
pub use records::{extract_keys, ShardKeys};
pub use shard::ShardIndex;
pub use store::{ByteStore, FileStore, MemoryStore};
