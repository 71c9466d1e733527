use crate::config::ClusterConfig;
use crate::core::{BootstrapError, Result, StoragePaths};
use crate::poller::ReadinessPoller;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref REPLICA_SET_NAME: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

/// Validated view of a [`ClusterConfig`].
///
/// Construction is the only place the odd-membership rule is enforced; every
/// other component takes a topology and can rely on it.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    config: ClusterConfig,
    poller: ReadinessPoller,
}

impl ClusterTopology {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;

        for (field, name) in [
            ("shard_replica_set_name", &config.shard_replica_set_name),
            ("config_replica_set_name", &config.config_replica_set_name),
        ] {
            if !REPLICA_SET_NAME.is_match(name) {
                return Err(BootstrapError::InvalidConfig(format!(
                    "{} '{}' may only contain letters, digits, '_', '-' and '.'",
                    field, name
                )));
            }
        }
        if config.shard_replica_set_name == config.config_replica_set_name {
            return Err(BootstrapError::InvalidConfig(format!(
                "shard and config replica sets cannot share the name '{}'",
                config.shard_replica_set_name
            )));
        }

        let poller = ReadinessPoller::new(config.poll_interval, config.readiness_timeout)?;
        Ok(Self { config, poller })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.config.shard_count
    }

    pub fn shard_port(&self) -> u16 {
        self.config.shard_port
    }

    pub fn config_port(&self) -> u16 {
        self.config.config_port
    }

    pub fn shard_replica_set_name(&self) -> &str {
        &self.config.shard_replica_set_name
    }

    pub fn config_replica_set_name(&self) -> &str {
        &self.config.config_replica_set_name
    }

    /// Poller carrying the configured interval and budget.
    pub fn poller(&self) -> ReadinessPoller {
        self.poller
    }

    /// Stable environment name for a shard index.
    pub fn environment_name(&self, index: usize) -> String {
        format!("{}_{}", self.config.environment_name_prefix, index)
    }

    /// Per-node daemon directories, unique for each environment name.
    pub fn storage_paths(&self, environment_name: &str) -> StoragePaths {
        StoragePaths {
            data: format!(
                "{}_{}",
                self.config.data_dir.trim_end_matches('/'),
                environment_name
            ),
            config: format!(
                "{}_{}",
                self.config.config_dir.trim_end_matches('/'),
                environment_name
            ),
        }
    }

    /// Iterates shard indices in provisioning order.
    pub fn indices(&self) -> std::ops::Range<usize> {
        0..self.config.shard_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_even_and_small_counts() {
        for count in [0, 1, 2, 4, 10] {
            let err = ClusterTopology::new(ClusterConfig::new().shard_count(count)).unwrap_err();
            assert!(matches!(err, BootstrapError::InvalidConfig(_)));
        }
        assert_eq!(
            ClusterTopology::new(ClusterConfig::new().shard_count(5))
                .unwrap()
                .shard_count(),
            5
        );
    }

    #[test]
    fn test_rejects_bad_replica_set_names() {
        let quoted = ClusterConfig::new().replica_set_names("rs'); db.dropDatabase(); ('", "cfg");
        assert!(ClusterTopology::new(quoted).is_err());

        let shared = ClusterConfig::new().replica_set_names("same", "same");
        assert!(ClusterTopology::new(shared).is_err());
    }

    #[test]
    fn test_naming_and_storage_paths() {
        let topology = ClusterTopology::new(ClusterConfig::default()).unwrap();
        assert_eq!(topology.environment_name(2), "shard_2");

        let paths = topology.storage_paths("shard_2");
        assert_eq!(paths.data, "/mnt/data/db_shard_2");
        assert_eq!(paths.config, "/mnt/data/configdb_shard_2");
        assert_eq!(topology.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
