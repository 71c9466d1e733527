use crate::core::{BootstrapError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cluster bootstrap configuration
///
/// Every value the bootstrap needs is carried here and passed explicitly
/// into each component. Defaults reproduce a three-node local cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Provisioning backend host
    pub backend_host: String,

    /// Provisioning backend port
    pub backend_port: u16,

    /// Number of nodes; must be odd and at least 3
    pub shard_count: usize,

    /// In-node data directory prefix for the shard servers
    pub data_dir: String,

    /// In-node data directory prefix for the config servers
    pub config_dir: String,

    pub shard_port: u16,

    pub config_port: u16,

    pub shard_replica_set_name: String,

    pub config_replica_set_name: String,

    /// Image every environment is started from
    pub image: String,

    /// Backend template used to create environments
    pub environment_template: String,

    /// Environments are named `<prefix>_<index>`
    pub environment_name_prefix: String,

    /// Node-local storage pool holding the persistent volumes
    pub storage_pool: String,

    /// Name of the macvlan interface inside each environment
    pub nic_name: String,

    pub server_binary: String,

    pub shell_binary: String,

    pub shard_log_path: String,

    pub config_log_path: String,

    /// Script file used to initiate the shard replica set
    pub shard_init_script: String,

    /// Script file used to initiate the config replica set
    pub config_init_script: String,

    /// Delay between readiness probes
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,

    /// Budget for each readiness wait
    #[serde(with = "duration_ms", rename = "readiness_timeout_ms")]
    pub readiness_timeout: Duration,
}

impl ClusterConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            backend_host: "192.168.122.89".to_string(),
            backend_port: 6600,
            shard_count: 3,
            data_dir: "/mnt/data/db/".to_string(),
            config_dir: "/mnt/data/configdb/".to_string(),
            shard_port: 27019,
            config_port: 27018,
            shard_replica_set_name: "shard-replica-set".to_string(),
            config_replica_set_name: "config-replica".to_string(),
            image: "https://hub.gig.tech/ekaterina_evdokimova_1/ubuntu-16.04-mongodb.flist"
                .to_string(),
            environment_template: "github.com/zero-os/0-templates/container/0.0.1".to_string(),
            environment_name_prefix: "shard".to_string(),
            storage_pool: "zos-cache".to_string(),
            nic_name: "stoffel".to_string(),
            server_binary: "mongod".to_string(),
            shell_binary: "mongo".to_string(),
            shard_log_path: "/tmp/shard".to_string(),
            config_log_path: "/tmp/conf".to_string(),
            shard_init_script: "/tmp/replserv.js".to_string(),
            config_init_script: "/tmp/confserv.js".to_string(),
            poll_interval: Duration::from_secs(1),
            readiness_timeout: Duration::from_secs(100),
        }
    }

    /// Set the number of nodes
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Set the provisioning backend endpoint
    pub fn backend(mut self, host: &str, port: u16) -> Self {
        self.backend_host = host.to_string();
        self.backend_port = port;
        self
    }

    pub fn data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn config_dir(mut self, dir: &str) -> Self {
        self.config_dir = dir.to_string();
        self
    }

    pub fn shard_port(mut self, port: u16) -> Self {
        self.shard_port = port;
        self
    }

    pub fn config_port(mut self, port: u16) -> Self {
        self.config_port = port;
        self
    }

    /// Set both replica set names
    pub fn replica_set_names(mut self, shard: &str, config: &str) -> Self {
        self.shard_replica_set_name = shard.to_string();
        self.config_replica_set_name = config.to_string();
        self
    }

    pub fn image(mut self, image: &str) -> Self {
        self.image = image.to_string();
        self
    }

    pub fn environment_name_prefix(mut self, prefix: &str) -> Self {
        self.environment_name_prefix = prefix.to_string();
        self
    }

    /// Set readiness polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set readiness timeout budget
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            BootstrapError::Io(format!("cannot read config '{}': {}", path.display(), err))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| BootstrapError::InvalidConfig(err.to_string()))
    }

    /// Backend endpoint as `host:port`
    pub fn backend_endpoint(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.shard_count % 2 == 0 {
            return Err(BootstrapError::InvalidConfig(format!(
                "shard_count must be odd, got {}",
                self.shard_count
            )));
        }
        if self.shard_count < 3 {
            return Err(BootstrapError::InvalidConfig(format!(
                "shard_count must be >= 3, got {}",
                self.shard_count
            )));
        }

        if self.shard_port == 0 || self.config_port == 0 {
            return Err(BootstrapError::InvalidConfig(
                "ports must be non-zero".to_string(),
            ));
        }
        if self.shard_port == self.config_port {
            return Err(BootstrapError::InvalidConfig(format!(
                "shard_port and config_port must differ, both are {}",
                self.shard_port
            )));
        }

        for (field, value) in [
            ("data_dir", &self.data_dir),
            ("config_dir", &self.config_dir),
            ("environment_name_prefix", &self.environment_name_prefix),
            ("storage_pool", &self.storage_pool),
            ("server_binary", &self.server_binary),
            ("shell_binary", &self.shell_binary),
            ("shard_init_script", &self.shard_init_script),
            ("config_init_script", &self.config_init_script),
        ] {
            if value.trim().is_empty() {
                return Err(BootstrapError::InvalidConfig(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        if self.data_dir.trim_end_matches('/') == self.config_dir.trim_end_matches('/') {
            return Err(BootstrapError::InvalidConfig(
                "data_dir and config_dir must differ".to_string(),
            ));
        }
        if self.shard_init_script == self.config_init_script {
            return Err(BootstrapError::InvalidConfig(
                "shard_init_script and config_init_script must differ".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(BootstrapError::InvalidConfig(
                "poll_interval must be > 0".to_string(),
            ));
        }
        if self.readiness_timeout < self.poll_interval {
            return Err(BootstrapError::InvalidConfig(
                "readiness_timeout cannot be shorter than poll_interval".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
