use crate::error::{IndexError, Result};

/// Lowest bits/key is reached with gamma = 1.0; larger values build and
/// query faster. 2.0 gives roughly 3.7 bits per key.
pub const DEFAULT_GAMMA: f64 = 2.0;
/// Past this the first level's bit array outgrows any realistic memory.
pub const MAX_GAMMA: f64 = 100.0;
pub const DEFAULT_MAX_LEVELS: usize = 25;
pub const DEFAULT_SEED: u64 = 0xC0FF_EE00_D15E_A5E;

/// MPHF construction parameters.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Bit array over-provisioning per level, in `[1.0, MAX_GAMMA]`.
    pub gamma: f64,
    /// Worker threads used to claim buckets within a level.
    pub workers: usize,
    /// Levels tried before the remaining keys go to the fallback table.
    pub max_levels: usize,
    /// Base seed; level seeds are derived from it.
    pub seed: u64,
    /// What a directory build does with a record file it cannot index.
    pub failure_policy: ShardFailurePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            workers: detect_workers(),
            max_levels: DEFAULT_MAX_LEVELS,
            seed: DEFAULT_SEED,
            failure_policy: ShardFailurePolicy::default(),
        }
    }
}

impl BuildConfig {
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_failure_policy(mut self, policy: ShardFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1.0..=MAX_GAMMA).contains(&self.gamma) {
            return Err(IndexError::InvalidConfig(format!(
                "gamma must be between 1.0 and {MAX_GAMMA}, got {}",
                self.gamma
            )));
        }
        if self.workers == 0 {
            return Err(IndexError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.max_levels == 0 {
            return Err(IndexError::InvalidConfig(
                "max_levels must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// What a query does when a shard's byte store cannot serve a read, and what
/// a directory build does with a record file it cannot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardFailurePolicy {
    /// Abort the whole query with the error.
    #[default]
    FailFast,
    /// Log the failure and count the shard as not confirming the candidate.
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    pub failure_policy: ShardFailurePolicy,
}

impl QueryConfig {
    pub fn with_failure_policy(mut self, policy: ShardFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

fn detect_workers() -> usize {
    if let Some(v) = std::env::var_os("SHARDEX_WORKERS") {
        if let Ok(parsed) = v.to_string_lossy().parse::<usize>() {
            return parsed.max(1);
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        BuildConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let base = BuildConfig::default();
        assert!(base.clone().with_gamma(0.5).validate().is_err());
        assert!(base.clone().with_gamma(f64::NAN).validate().is_err());
        assert!(base.clone().with_gamma(f64::INFINITY).validate().is_err());
        assert!(base.clone().with_gamma(1e30).validate().is_err());
        assert!(base.clone().with_gamma(MAX_GAMMA).validate().is_ok());
        assert!(base.clone().with_workers(0).validate().is_err());
        assert!(base.clone().with_max_levels(0).validate().is_err());
        assert!(base.with_gamma(1.0).validate().is_ok());
    }
}
