use crate::core::{BootstrapError, Node, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// One member of a replica set, projected from a node and a port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaSetMember {
    pub id: usize,
    pub host: IpAddr,
    pub port: u16,
}

impl ReplicaSetMember {
    /// `host:port`, with IPv6 hosts bracketed.
    pub fn host_port(&self) -> String {
        SocketAddr::new(self.host, self.port).to_string()
    }
}

/// A named replica set and its members in provisioning order.
///
/// Member 0 is the coordinator: the only node allowed to issue the
/// initiation command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaSetSpec {
    pub name: String,
    pub members: Vec<ReplicaSetMember>,
}

#[derive(Serialize)]
struct InitiateDocument<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    members: Vec<InitiateMember>,
}

#[derive(Serialize)]
struct InitiateMember {
    #[serde(rename = "_id")]
    id: usize,
    host: String,
}

impl ReplicaSetSpec {
    /// Builds a spec from the full node list in provisioning order.
    ///
    /// Member ids are node indices, so `nodes[i].index` must equal `i`.
    pub fn from_nodes(name: impl Into<String>, nodes: &[Node], port: u16) -> Result<Self> {
        let name = name.into();
        if nodes.is_empty() {
            return Err(BootstrapError::InvalidState(format!(
                "replica set '{}' needs at least one node",
                name
            )));
        }

        let members = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| {
                if node.index != position {
                    return Err(BootstrapError::InvalidState(format!(
                        "replica set '{}' expects node {} at position {}, found node {}",
                        name, position, position, node.index
                    )));
                }
                Ok(ReplicaSetMember {
                    id: node.index,
                    host: node.require_address()?,
                    port,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { name, members })
    }

    pub fn coordinator(&self) -> Option<&ReplicaSetMember> {
        self.members.first()
    }

    /// Renders the initiation statement for the database shell.
    ///
    /// The configuration document is emitted through serde_json, so the name
    /// and hosts are always escaped and the output is byte-for-byte stable.
    pub fn render_initiate_script(&self) -> Result<String> {
        let document = InitiateDocument {
            id: &self.name,
            members: self
                .members
                .iter()
                .map(|member| InitiateMember {
                    id: member.id,
                    host: member.host_port(),
                })
                .collect(),
        };
        Ok(format!(
            "rs.initiate({})\n",
            serde_json::to_string_pretty(&document)?
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EnvironmentHandle, StoragePaths};
    use std::net::Ipv6Addr;

    fn node(index: usize, address: Option<IpAddr>) -> Node {
        Node {
            index,
            name: format!("shard_{}", index),
            handle: EnvironmentHandle {
                name: format!("shard_{}", index),
                id: format!("env-{}", index),
            },
            address,
            storage: StoragePaths {
                data: format!("/data_{}", index),
                config: format!("/config_{}", index),
            },
        }
    }

    fn nodes(count: usize) -> Vec<Node> {
        (0..count)
            .map(|i| node(i, Some(format!("10.0.0.{}", i + 2).parse().unwrap())))
            .collect()
    }

    #[test]
    fn test_members_follow_node_order() {
        let spec = ReplicaSetSpec::from_nodes("config-replica", &nodes(5), 27018).unwrap();
        assert_eq!(spec.members.len(), 5);
        for (i, member) in spec.members.iter().enumerate() {
            assert_eq!(member.id, i);
            assert_eq!(member.port, 27018);
        }
        assert_eq!(spec.coordinator().unwrap().host_port(), "10.0.0.2:27018");
    }

    #[test]
    fn test_unresolved_node_is_rejected() {
        let mut list = nodes(3);
        list[1].address = None;
        let err = ReplicaSetSpec::from_nodes("rs", &list, 1).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidState(_)));
    }

    #[test]
    fn test_member_ids_are_node_indices() {
        let mut reordered = nodes(3);
        reordered.swap(0, 2);
        let err = ReplicaSetSpec::from_nodes("rs", &reordered, 1).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidState(_)));

        let tail = nodes(3);
        assert!(ReplicaSetSpec::from_nodes("rs", &tail[1..], 1).is_err());
    }

    #[test]
    fn test_script_rendering() {
        let spec = ReplicaSetSpec::from_nodes("config-replica", &nodes(3), 27018).unwrap();
        let script = spec.render_initiate_script().unwrap();

        let expected = r#"rs.initiate({
  "_id": "config-replica",
  "members": [
    {
      "_id": 0,
      "host": "10.0.0.2:27018"
    },
    {
      "_id": 1,
      "host": "10.0.0.3:27018"
    },
    {
      "_id": 2,
      "host": "10.0.0.4:27018"
    }
  ]
})
"#;
        assert_eq!(script, expected);
        assert_eq!(script, spec.render_initiate_script().unwrap());
    }

    #[test]
    fn test_script_escapes_name_and_brackets_ipv6() {
        let spec = ReplicaSetSpec {
            name: "a\"b".to_string(),
            members: vec![ReplicaSetMember {
                id: 0,
                host: IpAddr::V6(Ipv6Addr::LOCALHOST),
                port: 27019,
            }],
        };
        let script = spec.render_initiate_script().unwrap();
        assert!(script.contains(r#""_id": "a\"b""#));
        assert!(script.contains(r#""host": "[::1]:27019""#));
    }
}
