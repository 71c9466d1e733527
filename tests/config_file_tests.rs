use shardboot::{BootstrapError, ClusterConfig, ClusterTopology};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn config_file_loads_with_defaults_for_missing_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cluster.json");
    fs::write(
        &path,
        r#"{
            "backend_host": "10.1.1.1",
            "shard_count": 5,
            "shard_replica_set_name": "orders",
            "readiness_timeout_ms": 30000
        }"#,
    )
    .unwrap();

    let config = ClusterConfig::from_json_file(&path).unwrap();
    assert_eq!(config.backend_endpoint(), "10.1.1.1:6600");
    assert_eq!(config.shard_count, 5);
    assert_eq!(config.readiness_timeout, Duration::from_secs(30));
    assert_eq!(config.config_replica_set_name, "config-replica");

    let topology = ClusterTopology::new(config).unwrap();
    assert_eq!(topology.shard_replica_set_name(), "orders");
    assert_eq!(topology.poller().max_attempts(), 30);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = ClusterConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, BootstrapError::Io(_)), "unexpected error: {}", err);
}

#[test]
fn even_shard_count_in_file_fails_topology() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cluster.json");
    fs::write(&path, r#"{ "shard_count": 4 }"#).unwrap();

    let config = ClusterConfig::from_json_file(&path).unwrap();
    let err = ClusterTopology::new(config).unwrap_err();
    assert!(err.to_string().contains("odd"), "unexpected error: {}", err);
}

#[test]
fn written_default_config_reads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("default.json");
    fs::write(&path, ClusterConfig::default().to_json_pretty().unwrap()).unwrap();

    assert_eq!(
        ClusterConfig::from_json_file(&path).unwrap(),
        ClusterConfig::default()
    );
}
