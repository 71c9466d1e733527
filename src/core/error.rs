use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Ambiguous network interface: {0}")]
    AmbiguousNetworkInterface(String),

    #[error("Provisioning failure: {0}")]
    ProvisioningFailure(String),

    #[error("Address resolution for node {node} timed out after {attempts} attempts ({waited:?})")]
    AddressResolutionTimeout {
        node: usize,
        attempts: u32,
        waited: Duration,
    },

    #[error("Command '{command}' failed: {stderr}\n{data}")]
    CommandExecutionFailure {
        command: String,
        stderr: String,
        data: String,
    },

    #[error("Replica set '{replica_set}' initiation failed: {stderr}\n{data}")]
    ReplicaSetInitiationFailed {
        replica_set: String,
        stderr: String,
        data: String,
    },

    #[error(
        "Replica set '{replica_set}' initiation timed out after {attempts} attempts ({waited:?}): {last_error}"
    )]
    ReplicaSetInitiationTimeout {
        replica_set: String,
        attempts: u32,
        waited: Duration,
        last_error: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

impl From<std::io::Error> for BootstrapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
