//! # fleetreg-proto
//!
//! gRPC protocol definitions for the fleetreg service registry.
//!
//! Four services share one mTLS listener on every registry peer:
//!
//! - [`peer::peer_api_server::PeerApi`] - cluster membership and node
//!   administration, server-certificate clients only.
//! - [`node::node_api_server::NodeApi`] - credential renewal and
//!   heartbeat, any node certificate.
//! - [`agent::agent_api_server::AgentApi`] - catalog writes and
//!   discovery, agent-role certificates.
//! - [`observer::observer_api_server::ObserverApi`] - the per-datacenter
//!   catalog view, observer-role certificates.
//!
//! The message types double as the persisted catalog encoding: the
//! registry stores [`common::ServiceSpec`] values as JSON through their
//! serde derives, so wire shape and storage shape cannot drift apart.

pub mod common {
    tonic::include_proto!("fleetreg.common");
}

pub mod node {
    tonic::include_proto!("fleetreg.node");
}

pub mod agent {
    tonic::include_proto!("fleetreg.agent");
}

pub mod observer {
    tonic::include_proto!("fleetreg.observer");
}

pub mod peer {
    tonic::include_proto!("fleetreg.peer");
}

mod exts;
