// ============================================================================
// shardboot Library
// ============================================================================

pub mod backend;
pub mod command;
pub mod config;
pub mod core;
pub mod orchestrator;
pub mod poller;
pub mod provisioner;
pub mod replica_set;
pub mod topology;

// Re-export main types for convenience
pub use backend::{BackendCall, InMemoryBackend, NodeShell, ProvisioningBackend};
pub use command::{CommandLine, ServerLaunch, ServerRole};
pub use config::ClusterConfig;
pub use crate::core::{
    BootstrapError, EnvironmentHandle, EnvironmentRequest, ExecutionResult, ExecutionState, Node,
    Result, RouteEntry, StoragePaths,
};
pub use orchestrator::{BootstrapPhase, BootstrapReport, BootstrapState, Orchestrator};
pub use poller::{PollOutcome, Readiness, ReadinessPoller};
pub use provisioner::{NodeProvisioner, select_gateway_route};
pub use replica_set::{InitiationOutcome, ReplicaSetInitiator, ReplicaSetMember, ReplicaSetSpec};
pub use topology::ClusterTopology;

use std::sync::Arc;

// ============================================================================
// Entry points
// ============================================================================

/// Bootstraps a cluster end to end.
///
/// Equivalent to building an [`Orchestrator`] and calling
/// [`Orchestrator::run`].
///
/// # Examples
///
/// ```
/// use shardboot::{ClusterConfig, InMemoryBackend, bootstrap};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = Arc::new(InMemoryBackend::new());
/// let report = bootstrap(ClusterConfig::default(), backend.clone(), backend).await?;
///
/// assert_eq!(report.nodes.len(), 3);
/// assert_eq!(report.initiations.len(), 2);
/// # Ok(())
/// # }
/// ```
pub async fn bootstrap(
    config: ClusterConfig,
    backend: Arc<dyn ProvisioningBackend>,
    shell: Arc<dyn NodeShell>,
) -> Result<BootstrapReport> {
    Orchestrator::new(config, backend, shell).run().await
}

/// Result of a dry run against the in-memory backend.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Simulation {
    pub state: BootstrapState,
    pub report: BootstrapReport,
    pub calls: Vec<BackendCall>,
}

/// Runs the whole bootstrap against an [`InMemoryBackend`].
///
/// Failures are captured in the returned state instead of being returned as
/// errors, so the calls made up to the failure can still be inspected.
pub async fn simulate(config: ClusterConfig, backend: InMemoryBackend) -> Simulation {
    let backend = Arc::new(backend);
    let mut orchestrator = Orchestrator::new(config, backend.clone(), backend.clone());
    // The failure is recorded in the orchestrator state.
    let _ = orchestrator.run().await;

    Simulation {
        state: orchestrator.state().clone(),
        report: orchestrator.report().clone(),
        calls: backend.calls().await,
    }
}
