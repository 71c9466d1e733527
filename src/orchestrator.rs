use crate::backend::{NodeShell, ProvisioningBackend};
use crate::command::{ServerLaunch, ServerRole};
use crate::config::ClusterConfig;
use crate::core::{BootstrapError, Node, Result};
use crate::provisioner::NodeProvisioner;
use crate::replica_set::{InitiationOutcome, ReplicaSetInitiator, ReplicaSetSpec};
use crate::topology::ClusterTopology;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

/// Bootstrap phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    ValidateTopology,
    ProvisionNodes,
    AwaitNodeAddresses,
    LaunchProcesses,
    InitiateConfigReplicaSet,
    InitiateShardReplicaSet,
}

impl BootstrapPhase {
    pub const ALL: [BootstrapPhase; 6] = [
        BootstrapPhase::ValidateTopology,
        BootstrapPhase::ProvisionNodes,
        BootstrapPhase::AwaitNodeAddresses,
        BootstrapPhase::LaunchProcesses,
        BootstrapPhase::InitiateConfigReplicaSet,
        BootstrapPhase::InitiateShardReplicaSet,
    ];

    /// The phase that follows, or `None` after the last one.
    pub fn next(self) -> Option<Self> {
        let position = Self::ALL.iter().position(|phase| *phase == self)?;
        Self::ALL.get(position + 1).copied()
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapPhase::ValidateTopology => "validate-topology",
            BootstrapPhase::ProvisionNodes => "provision-nodes",
            BootstrapPhase::AwaitNodeAddresses => "await-node-addresses",
            BootstrapPhase::LaunchProcesses => "launch-processes",
            BootstrapPhase::InitiateConfigReplicaSet => "initiate-config-replica-set",
            BootstrapPhase::InitiateShardReplicaSet => "initiate-shard-replica-set",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BootstrapState {
    /// The given phase runs on the next step.
    Pending { phase: BootstrapPhase },
    Ready,
    Failed { phase: BootstrapPhase, error: String },
}

impl BootstrapState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BootstrapState::Pending { .. })
    }
}

/// What a bootstrap run did, filled in as phases complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub run_id: Uuid,
    pub backend: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_phases: Vec<BootstrapPhase>,
    pub nodes: Vec<Node>,
    pub config_replica_set: Option<ReplicaSetSpec>,
    pub shard_replica_set: Option<ReplicaSetSpec>,
    pub initiations: Vec<InitiationOutcome>,
}

/// Drives a cluster from "nothing provisioned" to two initiated replica sets.
///
/// Phases run strictly in order. The first failing phase moves the
/// orchestrator to [`BootstrapState::Failed`] and nothing already created is
/// torn down.
pub struct Orchestrator {
    config: ClusterConfig,
    shell: Arc<dyn NodeShell>,
    provisioner: NodeProvisioner,
    topology: Option<ClusterTopology>,
    nodes: Vec<Node>,
    state: BootstrapState,
    report: BootstrapReport,
}

impl Orchestrator {
    pub fn new(
        config: ClusterConfig,
        backend: Arc<dyn ProvisioningBackend>,
        shell: Arc<dyn NodeShell>,
    ) -> Self {
        let report = BootstrapReport {
            run_id: Uuid::new_v4(),
            backend: config.backend_endpoint(),
            started_at: Utc::now(),
            finished_at: None,
            completed_phases: Vec::new(),
            nodes: Vec::new(),
            config_replica_set: None,
            shard_replica_set: None,
            initiations: Vec::new(),
        };
        Self {
            config,
            provisioner: NodeProvisioner::new(backend, Arc::clone(&shell)),
            shell,
            topology: None,
            nodes: Vec::new(),
            state: BootstrapState::Pending {
                phase: BootstrapPhase::ValidateTopology,
            },
            report,
        }
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn report(&self) -> &BootstrapReport {
        &self.report
    }

    /// Runs every remaining phase and returns the final report.
    pub async fn run(&mut self) -> Result<BootstrapReport> {
        let span = info_span!(
            "bootstrap",
            run_id = %self.report.run_id,
            backend = %self.report.backend
        );
        self.run_to_completion().instrument(span).await
    }

    async fn run_to_completion(&mut self) -> Result<BootstrapReport> {
        loop {
            if self.step().await? == BootstrapState::Ready {
                return Ok(self.report.clone());
            }
        }
    }

    /// Runs exactly one phase and returns the resulting state.
    pub async fn step(&mut self) -> Result<BootstrapState> {
        let phase = match &self.state {
            BootstrapState::Pending { phase } => *phase,
            finished => {
                return Err(BootstrapError::InvalidState(format!(
                    "bootstrap has already finished: {:?}",
                    finished
                )));
            }
        };

        info!(%phase, "entering phase");
        if let Err(err) = self.run_phase(phase).await {
            error!(%phase, error = %err, "bootstrap aborted");
            self.state = BootstrapState::Failed {
                phase,
                error: err.to_string(),
            };
            self.report.nodes = self.nodes.clone();
            self.report.finished_at = Some(Utc::now());
            return Err(err);
        }

        self.report.completed_phases.push(phase);
        self.report.nodes = self.nodes.clone();
        self.state = match phase.next() {
            Some(next) => BootstrapState::Pending { phase: next },
            None => {
                self.report.finished_at = Some(Utc::now());
                info!("both replica sets initiated");
                BootstrapState::Ready
            }
        };
        Ok(self.state.clone())
    }

    async fn run_phase(&mut self, phase: BootstrapPhase) -> Result<()> {
        match phase {
            BootstrapPhase::ValidateTopology => {
                self.topology = Some(ClusterTopology::new(self.config.clone())?);
                Ok(())
            }
            BootstrapPhase::ProvisionNodes => {
                let topology = self.topology.as_ref().ok_or_else(|| {
                    BootstrapError::InvalidState("topology has not been validated".to_string())
                })?;
                self.provisioner
                    .provision_into(topology, &mut self.nodes)
                    .await
            }
            BootstrapPhase::AwaitNodeAddresses => self.await_node_addresses().await,
            BootstrapPhase::LaunchProcesses => self.launch_processes().await,
            BootstrapPhase::InitiateConfigReplicaSet => {
                self.initiate_replica_set(ServerRole::Config).await
            }
            BootstrapPhase::InitiateShardReplicaSet => {
                self.initiate_replica_set(ServerRole::Shard).await
            }
        }
    }

    fn topology(&self) -> Result<&ClusterTopology> {
        self.topology.as_ref().ok_or_else(|| {
            BootstrapError::InvalidState("topology has not been validated".to_string())
        })
    }

    async fn await_node_addresses(&mut self) -> Result<()> {
        let poller = self.topology()?.poller();
        for node in self.nodes.iter_mut() {
            let address = self.provisioner.resolve_address(node, &poller).await?;
            info!(node = node.index, env = %node.name, %address, "node address assigned");
        }
        Ok(())
    }

    /// Starts both daemons on every node without waiting for them.
    async fn launch_processes(&mut self) -> Result<()> {
        let config = &self.config;
        for node in &self.nodes {
            let address = node.require_address()?;
            let launches = [
                ServerLaunch {
                    role: ServerRole::Shard,
                    replica_set: &config.shard_replica_set_name,
                    db_path: &node.storage.data,
                    bind_address: address,
                    port: config.shard_port,
                    log_path: &config.shard_log_path,
                },
                ServerLaunch {
                    role: ServerRole::Config,
                    replica_set: &config.config_replica_set_name,
                    db_path: &node.storage.config,
                    bind_address: address,
                    port: config.config_port,
                    log_path: &config.config_log_path,
                },
            ];

            for launch in launches {
                let command = launch.command(&config.server_binary);
                self.shell
                    .spawn(&node.handle, &command)
                    .await?
                    .check(&command.render())?;
                info!(node = node.index, role = %launch.role, port = launch.port, "daemon started");
            }
        }
        Ok(())
    }

    async fn initiate_replica_set(&mut self, role: ServerRole) -> Result<()> {
        let topology = self.topology()?;
        let config = topology.config();
        let (name, port, script_path) = match role {
            ServerRole::Config => (
                &config.config_replica_set_name,
                config.config_port,
                &config.config_init_script,
            ),
            ServerRole::Shard => (
                &config.shard_replica_set_name,
                config.shard_port,
                &config.shard_init_script,
            ),
        };

        let spec = ReplicaSetSpec::from_nodes(name.as_str(), &self.nodes, port)?;
        let coordinator = self.nodes.first().ok_or_else(|| {
            BootstrapError::InvalidState("no nodes have been provisioned".to_string())
        })?;

        let initiator = ReplicaSetInitiator::new(
            Arc::clone(&self.shell),
            topology.poller(),
            config.shell_binary.as_str(),
        );
        let outcome = initiator
            .initiate(coordinator, port, &spec, script_path)
            .await?;

        match role {
            ServerRole::Config => self.report.config_replica_set = Some(spec),
            ServerRole::Shard => self.report.shard_replica_set = Some(spec),
        }
        self.report.initiations.push(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut phase = BootstrapPhase::ValidateTopology;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen, BootstrapPhase::ALL.to_vec());
        assert_eq!(BootstrapPhase::InitiateShardReplicaSet.next(), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(BootstrapState::Ready.is_terminal());
        assert!(
            BootstrapState::Failed {
                phase: BootstrapPhase::ProvisionNodes,
                error: "boom".to_string()
            }
            .is_terminal()
        );
        assert!(
            !BootstrapState::Pending {
                phase: BootstrapPhase::LaunchProcesses
            }
            .is_terminal()
        );
    }
}
