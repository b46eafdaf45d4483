//! Persisted record shapes and the node role vocabulary.

use serde::Deserialize;
use serde::Serialize;

use fleetreg_proto::common::NodeRole as ProtoNodeRole;

/// TTL of the node lease anchoring all of a node's catalog entries.
/// Heartbeats are expected at half this.
pub const NODE_KEEPALIVE_TTL_SECS: u32 = 30;

/// OU marker for agent-role node certificates.
pub const AGENT_OU: &str = "agents";
/// OU marker for observer-role node certificates.
pub const OBSERVER_OU: &str = "observers";
/// OU marker for peer server certificates.
pub const PEER_OU: &str = "peers";

/// What a node is allowed to do, carried in its certificate OU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Agent,
    Observer,
}

impl NodeRole {
    pub fn as_ou(&self) -> &'static str {
        match self {
            NodeRole::Agent => AGENT_OU,
            NodeRole::Observer => OBSERVER_OU,
        }
    }

    pub fn from_ou(ou: &str) -> Option<Self> {
        match ou {
            AGENT_OU => Some(NodeRole::Agent),
            OBSERVER_OU => Some(NodeRole::Observer),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_ou())
    }
}

impl TryFrom<ProtoNodeRole> for NodeRole {
    type Error = crate::Error;

    fn try_from(role: ProtoNodeRole) -> Result<Self, Self::Error> {
        match role {
            ProtoNodeRole::Agent => Ok(NodeRole::Agent),
            ProtoNodeRole::Observer => Ok(NodeRole::Observer),
            ProtoNodeRole::Unspecified => Err(crate::Error::InvalidArgument(
                "node role must be agent or observer".into(),
            )),
        }
    }
}

impl From<NodeRole> for ProtoNodeRole {
    fn from(role: NodeRole) -> Self {
        match role {
            NodeRole::Agent => ProtoNodeRole::Agent,
            NodeRole::Observer => ProtoNodeRole::Observer,
        }
    }
}

/// The identity record under `nodes/{dc}/{name}`. Created once by the
/// admin plane, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub datacenter: String,
    pub location: String,
    pub role: NodeRole,
}
