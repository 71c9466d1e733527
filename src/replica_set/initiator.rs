use super::spec::ReplicaSetSpec;
use crate::backend::NodeShell;
use crate::command::shell_script_command;
use crate::core::{BootstrapError, ExecutionResult, Node, Result};
use crate::poller::{PollOutcome, Readiness, ReadinessPoller};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

lazy_static! {
    /// Shell output meaning the daemon is not accepting connections yet.
    static ref CONNECTION_REFUSAL: Regex =
        Regex::new(r"(?i)connection refused|couldn't connect|connect failed|econnrefused").unwrap();
}

/// Record of a successful initiation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitiationOutcome {
    pub replica_set: String,
    pub coordinator: usize,
    pub port: u16,
    pub attempts: u32,
    pub stdout: String,
}

/// Issues the one-time initiation command for a replica set.
pub struct ReplicaSetInitiator {
    shell: Arc<dyn NodeShell>,
    poller: ReadinessPoller,
    shell_binary: String,
}

impl ReplicaSetInitiator {
    pub fn new(
        shell: Arc<dyn NodeShell>,
        poller: ReadinessPoller,
        shell_binary: impl Into<String>,
    ) -> Self {
        Self {
            shell,
            poller,
            shell_binary: shell_binary.into(),
        }
    }

    /// Writes the initiation script to `node` and runs it against `port`.
    ///
    /// `node` must be member 0 of `spec`. Connection refusals are retried
    /// within the poll budget; any other failed execution aborts at once.
    pub async fn initiate(
        &self,
        node: &Node,
        port: u16,
        spec: &ReplicaSetSpec,
        script_path: &str,
    ) -> Result<InitiationOutcome> {
        Self::check_coordinator(node, port, spec)?;

        let script = spec.render_initiate_script()?;
        self.shell.remove_file(&node.handle, script_path).await?;
        self.shell
            .write_file(&node.handle, script_path, &script)
            .await?;

        let command = shell_script_command(&self.shell_binary, port, script_path);
        info!(
            replica_set = %spec.name,
            coordinator = node.index,
            members = spec.members.len(),
            command = %command,
            "initiating replica set"
        );

        let shell = &self.shell;
        let handle = &node.handle;
        let command = &command;
        let replica_set = spec.name.as_str();
        let outcome = self
            .poller
            .wait_until(replica_set, |_| async move {
                let result = shell.execute(handle, command).await?;
                classify(replica_set, result)
            })
            .await?;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                info!(replica_set = %spec.name, attempts, "replica set initiated");
                Ok(InitiationOutcome {
                    replica_set: spec.name.clone(),
                    coordinator: node.index,
                    port,
                    attempts,
                    stdout: value.stdout,
                })
            }
            PollOutcome::TimedOut {
                attempts,
                elapsed,
                last_reason,
            } => {
                warn!(replica_set = %spec.name, attempts, "replica set initiation timed out");
                Err(BootstrapError::ReplicaSetInitiationTimeout {
                    replica_set: spec.name.clone(),
                    attempts,
                    waited: elapsed,
                    last_error: last_reason.unwrap_or_default(),
                })
            }
        }
    }

    fn check_coordinator(node: &Node, port: u16, spec: &ReplicaSetSpec) -> Result<()> {
        let Some(coordinator) = spec.coordinator() else {
            return Err(BootstrapError::InvalidState(format!(
                "replica set '{}' has no members",
                spec.name
            )));
        };

        let address = node.require_address()?;
        if coordinator.id != node.index || coordinator.host != address {
            return Err(BootstrapError::InvalidState(format!(
                "replica set '{}' must be initiated from member 0 ({}), not node {} ({})",
                spec.name,
                coordinator.host_port(),
                node.index,
                address
            )));
        }
        if spec.members.iter().any(|member| member.port != port) {
            return Err(BootstrapError::InvalidState(format!(
                "replica set '{}' members do not listen on port {}",
                spec.name, port
            )));
        }
        Ok(())
    }
}

fn classify(replica_set: &str, result: ExecutionResult) -> Result<Readiness<ExecutionResult>> {
    if result.is_success() {
        return Ok(Readiness::Ready(result));
    }
    if CONNECTION_REFUSAL.is_match(&result.stderr) || CONNECTION_REFUSAL.is_match(&result.stdout) {
        let reason = if result.stderr.trim().is_empty() {
            result.stdout
        } else {
            result.stderr
        };
        return Ok(Readiness::NotReady(reason.trim().to_string()));
    }
    Err(BootstrapError::ReplicaSetInitiationFailed {
        replica_set: replica_set.to_string(),
        stderr: result.stderr,
        data: result.data,
    })
}
