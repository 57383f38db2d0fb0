use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use shardex::config::{DEFAULT_GAMMA, DEFAULT_MAX_LEVELS};
use shardex::logging::init_logger;
use shardex::records::read_candidates;
use shardex::{build_directory, open_directory, BuildConfig, QueryConfig, ShardFailurePolicy};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "shardex")]
#[command(about = "Build and query sharded minimal perfect hash indexes")]
#[command(version)]
struct Cli {
    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one index per record file
    Build {
        /// Directory holding the record files (*.csv)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving <shard>.bin and <shard>.csv
        #[arg(short, long)]
        output: PathBuf,

        /// Worker threads used during construction
        #[arg(short, long)]
        workers: Option<usize>,

        /// Bit array over-provisioning per level (1.0 to 100.0)
        #[arg(short, long, default_value_t = DEFAULT_GAMMA)]
        gamma: f64,

        /// Levels tried before keys go to the fallback table
        #[arg(long, default_value_t = DEFAULT_MAX_LEVELS)]
        max_levels: usize,

        /// Skip record files that cannot be indexed instead of failing
        #[arg(long)]
        skip_broken_shards: bool,
    },

    /// Check candidate keys against every shard
    Lookup {
        /// File with one candidate key per line
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding the shard indexes
        #[arg(short, long)]
        mphf: PathBuf,

        /// Directory holding the record files the indexes were built from
        #[arg(short, long)]
        records: PathBuf,

        /// Skip shards that cannot be loaded or read instead of failing
        #[arg(long)]
        skip_broken_shards: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Commands::Build {
            input,
            output,
            workers,
            gamma,
            max_levels,
            skip_broken_shards,
        } => {
            if !input.is_dir() {
                bail!("the input must be a valid directory: {}", input.display());
            }
            let mut cfg = BuildConfig::default()
                .with_gamma(gamma)
                .with_max_levels(max_levels)
                .with_failure_policy(failure_policy(skip_broken_shards));
            if let Some(workers) = workers {
                cfg = cfg.with_workers(workers);
            }
            let started = Instant::now();
            let summaries = build_directory(&input, &output, &cfg)
                .with_context(|| format!("building indexes from {}", input.display()))?;
            let keys: u64 = summaries.iter().map(|s| s.keys).sum();
            info!(
                "built {} shards over {keys} keys in {:.2} minutes",
                summaries.len(),
                started.elapsed().as_secs_f64() / 60.0
            );
        }
        Commands::Lookup {
            input,
            mphf,
            records,
            skip_broken_shards,
        } => {
            if !input.is_file() {
                bail!("the input parameter must be a valid file: {}", input.display());
            }
            let started = Instant::now();
            let candidates = read_candidates(&input)
                .with_context(|| format!("reading candidates from {}", input.display()))?;
            let engine = open_directory(
                &records,
                &mphf,
                QueryConfig::default().with_failure_policy(failure_policy(skip_broken_shards)),
            )
            .context("loading shard indexes")?;
            let result = engine.query(&candidates).context("querying shards")?;
            println!("{result}");
            info!(
                "{} of {} candidates found in {:.3}s",
                result.found_count(),
                result.count(),
                started.elapsed().as_secs_f64()
            );
        }
    }
    Ok(())
}

fn failure_policy(skip_broken_shards: bool) -> ShardFailurePolicy {
    if skip_broken_shards {
        ShardFailurePolicy::Skip
    } else {
        ShardFailurePolicy::FailFast
    }
}
