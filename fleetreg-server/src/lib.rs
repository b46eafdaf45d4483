//! # fleetreg-server
//!
//! The registry peer. One process per peer:
//!
//! - binds the four API surfaces (peer, node, agent, observer) onto a
//!   single mTLS listener,
//! - executes every catalog mutation as a transaction against the
//!   replicated KV substrate, bound to the writing node's lease,
//! - answers hierarchical discovery queries and per-datacenter watch
//!   streams,
//! - derives the cluster CAs from the shared secret and issues every
//!   certificate the fleet uses.
//!
//! The data plane is generic over [`fleetreg_core::kv::KvEngine`]; the
//! [`substrate`] module provides the etcd production adaptor and an
//! in-memory engine with the same transactional semantics for tests.

mod builder;
pub mod catalog;
pub mod discover;
mod gateway;
mod identity;
mod lease;
mod peers;
mod registry;
mod state;
pub mod substrate;
mod watch;

pub use builder::*;
pub use gateway::start_gateway;
pub use gateway::start_gateway_with_incoming;
pub use identity::*;
pub use lease::*;
pub use peers::*;
pub use registry::*;
pub use state::*;
pub use watch::*;

#[cfg(test)]
mod catalog_test;
#[cfg(test)]
mod discover_test;
#[cfg(test)]
mod watch_test;
