//! Config for the query coordinator.

use std::num::NonZeroUsize;

/// CLI config for fanning queries out across shards.
#[derive(Debug, Clone, Copy, Default, clap::Parser)]
pub struct CoordinatorConfig {
    /// Set the maximum number of shards whose series are discovered
    /// concurrently by a single query.
    ///
    /// Defaults to the number of logical cores on the system.
    #[clap(
        long = "query-shard-concurrency",
        env = "INFLUXDB3_QUERY_SHARD_CONCURRENCY",
        action
    )]
    pub shard_concurrency: Option<NonZeroUsize>,
}

impl CoordinatorConfig {
    /// The configured shard concurrency, or the number of logical cores.
    pub fn shard_concurrency(&self) -> NonZeroUsize {
        self.shard_concurrency.unwrap_or_else(|| {
            NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    #[test]
    fn test_default() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.shard_concurrency, None);
        assert_eq!(config.shard_concurrency().get(), num_cpus::get().max(1));
    }

    #[test]
    fn test_shard_concurrency() {
        let config =
            CoordinatorConfig::try_parse_from(["server", "--query-shard-concurrency", "3"])
                .unwrap();
        assert_eq!(config.shard_concurrency().get(), 3);

        assert!(
            CoordinatorConfig::try_parse_from(["server", "--query-shard-concurrency", "0"])
                .is_err()
        );
    }
}
