//! Directory-level build and load: one shard per record file.

use crate::config::{BuildConfig, QueryConfig, ShardFailurePolicy};
use crate::error::{IndexError, Result};
use crate::query::{LoadedShard, QueryEngine};
use crate::records::extract_keys_from_file;
use crate::shard::ShardIndex;
use crate::store::FileStore;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const RECORD_EXTENSION: &str = "csv";

/// Summary of one built shard.
#[derive(Debug, Clone)]
pub struct ShardSummary {
    pub name: String,
    pub keys: u64,
    pub levels: usize,
    pub fallback: usize,
    pub bits_per_element: f64,
    pub seconds: f64,
}

/// Record files of `dir`, sorted by name.
pub fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IndexError::InvalidConfig(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| IndexError::io(dir, e))? {
        let path = entry.map_err(|e| IndexError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Shard identifier of a record file: its file stem.
pub fn shard_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| {
            IndexError::InvalidConfig(format!("'{}' has no file name", path.display()))
        })
}

/// Builds an index for every record file in `input` and writes the shard
/// files to `output`, which is created if missing. A record file that cannot
/// be indexed aborts the build, or is skipped under
/// [`ShardFailurePolicy::Skip`].
pub fn build_directory(
    input: &Path,
    output: &Path,
    cfg: &BuildConfig,
) -> Result<Vec<ShardSummary>> {
    cfg.validate()?;
    let files = record_files(input)?;
    ensure_distinct_dirs(input, output)?;
    std::fs::create_dir_all(output).map_err(|e| IndexError::io(output, e))?;

    let mut summaries = Vec::with_capacity(files.len());
    for path in &files {
        info!("processing {}", path.display());
        match build_shard(path, output, cfg) {
            Ok(summary) => {
                info!("shard {} written in {:.3}s", summary.name, summary.seconds);
                summaries.push(summary);
            }
            Err(err) if cfg.failure_policy == ShardFailurePolicy::Skip => {
                warn!("skipping record file {}: {err}", path.display());
            }
            Err(err) => return Err(err),
        }
    }
    if summaries.len() < files.len() {
        warn!("{} of {} record files skipped", files.len() - summaries.len(), files.len());
    }
    Ok(summaries)
}

fn build_shard(path: &Path, output: &Path, cfg: &BuildConfig) -> Result<ShardSummary> {
    let started = Instant::now();
    let name = shard_name(path)?;
    let (keys, _bytes) = extract_keys_from_file(path)?;
    let shard = ShardIndex::build(&name, &keys.keys, &keys.offsets, cfg)?;
    shard.save(output)?;
    Ok(ShardSummary {
        name,
        keys: shard.len(),
        levels: shard.mphf().level_count(),
        fallback: shard.mphf().fallback_len(),
        bits_per_element: shard.mphf().bits_per_element(),
        seconds: started.elapsed().as_secs_f64(),
    })
}

/// Loads the shard index of every record file in `records` from `indexes`
/// and pairs it with the record bytes.
pub fn open_directory(records: &Path, indexes: &Path, cfg: QueryConfig) -> Result<QueryEngine> {
    if !indexes.is_dir() {
        return Err(IndexError::InvalidConfig(format!(
            "'{}' is not a directory",
            indexes.display()
        )));
    }
    let policy = cfg.failure_policy;
    let mut engine = QueryEngine::new(cfg);
    for path in record_files(records)? {
        match open_shard(&path, indexes) {
            Ok(shard) => engine.add_shard(shard),
            Err(err) if policy == ShardFailurePolicy::Skip => {
                warn!("skipping shard {}: {err}", path.display());
            }
            Err(err) => return Err(err),
        }
    }
    info!("loaded {} shards", engine.len());
    Ok(engine)
}

fn open_shard(record_path: &Path, indexes: &Path) -> Result<LoadedShard> {
    let name = shard_name(record_path)?;
    let index = ShardIndex::load(indexes, &name)?;
    let store = FileStore::open(record_path)?;
    Ok(LoadedShard::new(index, store))
}

fn ensure_distinct_dirs(input: &Path, output: &Path) -> Result<()> {
    let same = match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same {
        return Err(IndexError::InvalidConfig(
            "output directory must differ from the record directory".into(),
        ));
    }
    Ok(())
}
