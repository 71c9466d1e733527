use crate::backend::{NodeShell, ProvisioningBackend};
use crate::core::{
    BootstrapError, EnvironmentRequest, Mount, NetworkAttachment, NetworkKind, Node, Result,
    RouteEntry,
};
use crate::poller::{PollOutcome, Readiness, ReadinessPoller};
use crate::topology::ClusterTopology;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Picks the single gateway route used as the macvlan parent.
///
/// Zero or several candidates is an error: choosing among gateways would
/// make the topology depend on routing-table order.
pub fn select_gateway_route(routes: &[RouteEntry]) -> Result<&RouteEntry> {
    let candidates = routes
        .iter()
        .filter(|route| route.has_gateway())
        .collect::<Vec<_>>();

    match candidates.as_slice() {
        [route] => Ok(*route),
        [] => Err(BootstrapError::AmbiguousNetworkInterface(
            "no route with a gateway found for the macvlan parent".to_string(),
        )),
        many => Err(BootstrapError::AmbiguousNetworkInterface(format!(
            "found multiple eligible interfaces for the macvlan parent: {}",
            many.iter()
                .map(|route| route.device.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn provisioning(context: String) -> impl FnOnce(BootstrapError) -> BootstrapError {
    move |err| match err {
        BootstrapError::ProvisioningFailure(message) => {
            BootstrapError::ProvisioningFailure(format!("{}: {}", context, message))
        }
        other => BootstrapError::ProvisioningFailure(format!("{}: {}", context, other)),
    }
}

/// Creates or reuses one environment per shard index.
pub struct NodeProvisioner {
    backend: Arc<dyn ProvisioningBackend>,
    shell: Arc<dyn NodeShell>,
}

impl NodeProvisioner {
    pub fn new(backend: Arc<dyn ProvisioningBackend>, shell: Arc<dyn NodeShell>) -> Self {
        Self { backend, shell }
    }

    /// Provisions every node in index order.
    ///
    /// The routing table is inspected once, before any environment is
    /// touched. Returned nodes have no address yet; see [`Self::resolve_address`].
    pub async fn provision(&self, topology: &ClusterTopology) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(topology.shard_count());
        self.provision_into(topology, &mut nodes).await?;
        Ok(nodes)
    }

    /// Like [`Self::provision`], but appends each node to `nodes` as soon as
    /// it is ready, so the nodes created before a failure are kept.
    pub async fn provision_into(
        &self,
        topology: &ClusterTopology,
        nodes: &mut Vec<Node>,
    ) -> Result<()> {
        nodes.clear();
        let routes = self
            .backend
            .route_list()
            .await
            .map_err(provisioning("route lookup".to_string()))?;
        let parent = select_gateway_route(&routes)?.device.clone();
        info!(parent = %parent, "selected macvlan parent interface");

        for index in topology.indices() {
            nodes.push(self.provision_node(topology, index, &parent).await?);
        }
        Ok(())
    }

    async fn provision_node(
        &self,
        topology: &ClusterTopology,
        index: usize,
        parent: &str,
    ) -> Result<Node> {
        let config = topology.config();
        let name = topology.environment_name(index);
        let storage = topology.storage_paths(&name);

        let volume = self
            .backend
            .ensure_volume(&config.storage_pool, &name)
            .await
            .map_err(provisioning(format!("volume for '{}'", name)))?;
        let data_source = volume.join(config.data_dir.trim_matches('/'));
        let config_source = volume.join(config.config_dir.trim_matches('/'));
        for dir in [&data_source, &config_source] {
            self.backend
                .make_host_directory(dir)
                .await
                .map_err(provisioning(format!("host directory {}", dir.display())))?;
        }

        let request = EnvironmentRequest {
            name: name.clone(),
            template: config.environment_template.clone(),
            image: config.image.clone(),
            mounts: vec![
                Mount {
                    source: data_source,
                    target: storage.data.clone(),
                },
                Mount {
                    source: config_source,
                    target: storage.config.clone(),
                },
            ],
            nics: vec![NetworkAttachment {
                kind: NetworkKind::Macvlan,
                parent: parent.to_string(),
                name: config.nic_name.clone(),
                dhcp: true,
            }],
        };

        let handle = self
            .backend
            .provision_environment(&request)
            .await
            .map_err(provisioning(format!("environment '{}'", name)))?;
        self.backend
            .install_environment(&handle)
            .await
            .map_err(provisioning(format!("install of '{}'", name)))?;

        for dir in [&storage.data, &storage.config] {
            self.shell
                .make_directory(&handle, dir)
                .await
                .map_err(provisioning(format!("directory {} in '{}'", dir, name)))?;
        }

        info!(node = index, env = %name, id = %handle.id, "environment provisioned");
        Ok(Node {
            index,
            name,
            handle,
            address: None,
            storage,
        })
    }

    /// Waits for the backend to assign `node` an address and records it.
    pub async fn resolve_address(
        &self,
        node: &mut Node,
        poller: &ReadinessPoller,
    ) -> Result<IpAddr> {
        let backend = &self.backend;
        let handle = &node.handle;
        let outcome = poller
            .wait_until(&node.name, |attempt| async move {
                backend
                    .resolve_address(handle)
                    .await
                    .map(|address| match address {
                        Some(address) => Readiness::Ready(address),
                        None => Readiness::NotReady(format!(
                            "no address assigned after {} lookups",
                            attempt
                        )),
                    })
            })
            .await?;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                debug!(node = node.index, address = %value, attempts, "address resolved");
                node.address = Some(value);
                Ok(value)
            }
            PollOutcome::TimedOut {
                attempts, elapsed, ..
            } => {
                warn!(node = node.index, env = %node.name, attempts, "address resolution timed out");
                Err(BootstrapError::AddressResolutionTimeout {
                    node: node.index,
                    attempts,
                    waited: elapsed,
                })
            }
        }
    }
}
