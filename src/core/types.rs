use super::{BootstrapError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

/// One row of the host routing table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteEntry {
    pub device: String,
    #[serde(default)]
    pub gateway: Option<String>,
}

impl RouteEntry {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            gateway: None,
        }
    }

    pub fn with_gateway(device: impl Into<String>, gateway: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            gateway: Some(gateway.into()),
        }
    }

    /// Returns true if the route carries a non-empty gateway.
    pub fn has_gateway(&self) -> bool {
        self.gateway
            .as_deref()
            .is_some_and(|gw| !gw.trim().is_empty())
    }
}

/// Opaque reference to a provisioned execution environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EnvironmentHandle {
    pub name: String,
    pub id: String,
}

/// A host directory bind-mounted into an environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Macvlan,
}

/// Network attachment requested for an environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub kind: NetworkKind,
    /// Host device the attachment is parented on.
    pub parent: String,
    pub name: String,
    pub dhcp: bool,
}

/// Everything the backend needs to find or create one environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentRequest {
    pub name: String,
    pub template: String,
    pub image: String,
    pub mounts: Vec<Mount>,
    pub nics: Vec<NetworkAttachment>,
}

/// In-node storage locations for the two database daemons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoragePaths {
    pub data: String,
    pub config: String,
}

/// A provisioned cluster node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub index: usize,
    pub name: String,
    pub handle: EnvironmentHandle,
    pub address: Option<IpAddr>,
    pub storage: StoragePaths,
}

impl Node {
    /// Returns the resolved address, failing if resolution has not happened yet.
    pub fn require_address(&self) -> Result<IpAddr> {
        self.address.ok_or_else(|| {
            BootstrapError::InvalidState(format!(
                "node {} ('{}') has no resolved address",
                self.index, self.name
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Success,
    Error,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Success => write!(f, "SUCCESS"),
            ExecutionState::Error => write!(f, "ERROR"),
        }
    }
}

/// Outcome of a command executed inside a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub state: ExecutionState,
    pub stdout: String,
    pub stderr: String,
    pub data: String,
}

impl ExecutionResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            state: ExecutionState::Success,
            stdout: stdout.into(),
            stderr: String::new(),
            data: String::new(),
        }
    }

    pub fn error(stderr: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            state: ExecutionState::Error,
            stdout: String::new(),
            stderr: stderr.into(),
            data: data.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == ExecutionState::Success
    }

    /// Converts a non-SUCCESS result into `CommandExecutionFailure`.
    pub fn check(self, command: &str) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(BootstrapError::CommandExecutionFailure {
            command: command.to_string(),
            stderr: self.stderr,
            data: self.data,
        })
    }
}
