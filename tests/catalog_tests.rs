//! Directory-level build and lookup over record files.

use anyhow::Result;
use std::fs;
use tempfile::tempdir;

use shardex::{
    build_directory, open_directory, BuildConfig, IndexError, QueryConfig, ShardFailurePolicy,
};

fn cfg() -> BuildConfig {
    BuildConfig::default().with_workers(2)
}

const SHARD_A: &str = "oci,citing,cited\n\
020-1,10.1/a,10.1/b\n\
020-2,10.1/c,10.1/d\n\
020-3,10.1/e,10.1/f\n";

const SHARD_B: &str = "oci,citing,cited\r\n\
030-1,10.2/a,10.2/b\r\n\
\"030-2\",10.2/c,10.2/d\r\n";

#[test]
fn build_then_lookup_across_record_files() -> Result<()> {
    let records = tempdir()?;
    let indexes = tempdir()?;
    fs::write(records.path().join("a.csv"), SHARD_A)?;
    fs::write(records.path().join("b.csv"), SHARD_B)?;
    fs::write(records.path().join("notes.txt"), "ignored")?;

    let out = indexes.path().join("mphf");
    let summaries = build_directory(records.path(), &out, &cfg())?;
    let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(summaries[0].keys, 3);
    assert_eq!(summaries[1].keys, 2);
    for name in ["a", "b"] {
        assert!(out.join(format!("{name}.bin")).is_file());
        assert!(out.join(format!("{name}.csv")).is_file());
    }

    let engine = open_directory(records.path(), &out, QueryConfig::default())?;
    assert_eq!(engine.len(), 2);
    let result = engine.query(&["020-2", "030-2", "030-1", "020-9", "10.1/a"])?;
    assert_eq!(result.report(), "1,1,1,0,0\n5");
    Ok(())
}

#[test]
fn output_inside_records_dir_is_rejected() -> Result<()> {
    let records = tempdir()?;
    fs::write(records.path().join("a.csv"), SHARD_A)?;
    let err = build_directory(records.path(), records.path(), &cfg()).unwrap_err();
    assert!(matches!(err, IndexError::InvalidConfig(_)));
    assert!(!records.path().join("a.bin").exists());
    Ok(())
}

#[test]
fn missing_input_directory_is_a_config_error() {
    let err = build_directory(
        std::path::Path::new("/no/such/records"),
        std::path::Path::new("/tmp/never-written"),
        &cfg(),
    )
    .unwrap_err();
    assert!(matches!(err, IndexError::InvalidConfig(_)));
}

#[test]
fn missing_shard_index_fails_fast_or_is_skipped() -> Result<()> {
    let records = tempdir()?;
    let indexes = tempdir()?;
    fs::write(records.path().join("a.csv"), SHARD_A)?;
    build_directory(records.path(), indexes.path(), &cfg())?;
    // A record file without a built index.
    fs::write(records.path().join("b.csv"), SHARD_B)?;

    let err = open_directory(records.path(), indexes.path(), QueryConfig::default());
    assert!(matches!(err, Err(IndexError::Io { .. })));

    let engine = open_directory(
        records.path(),
        indexes.path(),
        QueryConfig::default().with_failure_policy(ShardFailurePolicy::Skip),
    )?;
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.query(&["020-1", "030-1"])?.found, vec![true, false]);
    Ok(())
}

#[test]
fn duplicate_keys_in_a_record_file_abort_the_build() -> Result<()> {
    let records = tempdir()?;
    let indexes = tempdir()?;
    fs::write(
        records.path().join("dup.csv"),
        "oci,citing\n020-1,a\n020-1,b\n",
    )?;
    let err = build_directory(records.path(), indexes.path(), &cfg()).unwrap_err();
    assert!(matches!(err, IndexError::DuplicateKey(k) if k == "020-1"));
    assert!(!indexes.path().join("dup.bin").exists());
    Ok(())
}

#[test]
fn broken_record_files_abort_or_are_skipped() -> Result<()> {
    let records = tempdir()?;
    let indexes = tempdir()?;
    fs::write(records.path().join("a.csv"), SHARD_A)?;
    // Record without a key on line 2.
    fs::write(records.path().join("broken.csv"), "oci,citing\n,10.9/x\n")?;
    fs::write(records.path().join("dup.csv"), "oci\n040-1\n040-1\n")?;

    let err = build_directory(records.path(), indexes.path(), &cfg()).unwrap_err();
    assert!(matches!(err, IndexError::Record { line: 2, .. }));

    let summaries = build_directory(
        records.path(),
        indexes.path(),
        &cfg().with_failure_policy(ShardFailurePolicy::Skip),
    )?;
    let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a"]);
    assert!(!indexes.path().join("broken.bin").exists());
    assert!(!indexes.path().join("dup.bin").exists());

    let engine = open_directory(
        records.path(),
        indexes.path(),
        QueryConfig::default().with_failure_policy(ShardFailurePolicy::Skip),
    )?;
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.query(&["020-3", "040-1"])?.report(), "1,0\n2");
    Ok(())
}
