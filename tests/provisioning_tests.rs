use shardboot::core::{Mount, NetworkKind};
use shardboot::{
    BackendCall, BootstrapError, ClusterConfig, ClusterTopology, InMemoryBackend, NodeProvisioner,
    NodeShell, ReadinessPoller, ReplicaSetInitiator, ReplicaSetSpec,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn provisioner(backend: &Arc<InMemoryBackend>) -> NodeProvisioner {
    NodeProvisioner::new(backend.clone(), backend.clone())
}

fn topology() -> ClusterTopology {
    ClusterTopology::new(ClusterConfig::default()).unwrap()
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let backend = Arc::new(InMemoryBackend::new());
    let provisioner = provisioner(&backend);
    let topology = topology();

    let first = provisioner.provision(&topology).await.unwrap();
    let second = provisioner.provision(&topology).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        backend.environment_names().await,
        vec!["shard_0", "shard_1", "shard_2"]
    );

    let reused = backend
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::ProvisionEnvironment { reused, .. } => Some(reused),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(reused, vec![false, false, false, true, true, true]);
}

#[tokio::test]
async fn environments_get_storage_and_network() {
    let backend = Arc::new(InMemoryBackend::new());
    let nodes = provisioner(&backend).provision(&topology()).await.unwrap();

    assert_eq!(nodes.len(), 3);
    for (i, node) in nodes.iter().enumerate() {
        assert_eq!(node.index, i);
        assert_eq!(node.name, format!("shard_{}", i));
        assert!(node.address.is_none());
    }

    let request = backend.environment_request("shard_0").await.unwrap();
    assert_eq!(
        request.mounts,
        vec![
            Mount {
                source: PathBuf::from("/var/cache/zos-cache/shard_0/mnt/data/db"),
                target: "/mnt/data/db_shard_0".to_string(),
            },
            Mount {
                source: PathBuf::from("/var/cache/zos-cache/shard_0/mnt/data/configdb"),
                target: "/mnt/data/configdb_shard_0".to_string(),
            },
        ]
    );
    assert_eq!(request.nics.len(), 1);
    assert_eq!(request.nics[0].kind, NetworkKind::Macvlan);
    assert_eq!(request.nics[0].parent, "eth0");
    assert_eq!(request.nics[0].name, "stoffel");
    assert!(request.nics[0].dhcp);

    assert!(backend.is_installed("shard_0").await);
    assert_eq!(
        backend.directories("shard_0").await,
        vec!["/mnt/data/configdb_shard_0", "/mnt/data/db_shard_0"]
    );
    assert_eq!(backend.host_directories().await.len(), 6);
}

#[tokio::test]
async fn provisioning_failures_carry_the_environment_name() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.fail_provisioning("shard_1", "flist not reachable").await;

    let err = provisioner(&backend)
        .provision(&topology())
        .await
        .unwrap_err();
    match err {
        BootstrapError::ProvisioningFailure(message) => {
            assert!(message.contains("shard_1"), "unexpected message: {}", message);
            assert!(message.contains("flist not reachable"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(backend.environment_names().await, vec!["shard_0"]);
}

#[tokio::test(start_paused = true)]
async fn address_resolution_records_the_address() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.delay_address("shard_2", 5).await;
    let provisioner = provisioner(&backend);
    let mut nodes = provisioner.provision(&topology()).await.unwrap();

    let poller = ReadinessPoller::new(Duration::from_secs(1), Duration::from_secs(10)).unwrap();
    let address = provisioner
        .resolve_address(&mut nodes[2], &poller)
        .await
        .unwrap();

    assert_eq!(address.to_string(), "10.0.0.4");
    assert_eq!(nodes[2].address, Some(address));
}

#[tokio::test]
async fn initiation_must_come_from_member_zero() {
    let backend = Arc::new(InMemoryBackend::new());
    let provisioner = provisioner(&backend);
    let mut nodes = provisioner.provision(&topology()).await.unwrap();
    let poller = ReadinessPoller::default();
    for node in nodes.iter_mut() {
        provisioner.resolve_address(node, &poller).await.unwrap();
    }

    let spec = ReplicaSetSpec::from_nodes("config-replica", &nodes, 27018).unwrap();
    let initiator = ReplicaSetInitiator::new(backend.clone(), poller, "mongo");

    let err = initiator
        .initiate(&nodes[1], 27018, &spec, "/tmp/confserv.js")
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidState(_)));

    let err = initiator
        .initiate(&nodes[0], 27019, &spec, "/tmp/confserv.js")
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidState(_)));
    assert!(backend.executed_commands("shard_0").await.is_empty());

    let outcome = initiator
        .initiate(&nodes[0], 27018, &spec, "/tmp/confserv.js")
        .await
        .unwrap();
    assert_eq!(outcome.coordinator, 0);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        backend.executed_commands("shard_0").await,
        vec!["mongo --port 27018 /tmp/confserv.js"]
    );
}

#[tokio::test]
async fn stale_scripts_are_replaced() {
    let backend = Arc::new(InMemoryBackend::new());
    let provisioner = provisioner(&backend);
    let mut nodes = provisioner.provision(&topology()).await.unwrap();
    let poller = ReadinessPoller::default();
    for node in nodes.iter_mut() {
        provisioner.resolve_address(node, &poller).await.unwrap();
    }

    backend
        .write_file(&nodes[0].handle, "/tmp/confserv.js", "stale contents")
        .await
        .unwrap();

    let spec = ReplicaSetSpec::from_nodes("config-replica", &nodes, 27018).unwrap();
    ReplicaSetInitiator::new(backend.clone(), poller, "mongo")
        .initiate(&nodes[0], 27018, &spec, "/tmp/confserv.js")
        .await
        .unwrap();

    let script = backend
        .file_contents("shard_0", "/tmp/confserv.js")
        .await
        .unwrap();
    assert_eq!(script, spec.render_initiate_script().unwrap());

    let calls = backend.calls().await;
    let remove_at = calls
        .iter()
        .rposition(|c| matches!(c, BackendCall::RemoveFile { .. }))
        .unwrap();
    let write_at = calls
        .iter()
        .rposition(|c| matches!(c, BackendCall::WriteFile { .. }))
        .unwrap();
    assert!(remove_at < write_at);
}
