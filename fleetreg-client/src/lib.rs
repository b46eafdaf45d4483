//! # fleetreg-client
//!
//! Node-side access to the registry for agents, observers and tooling
//! built on top of them.
//!
//! A [`NodeClient`] owns the pieces of node state the registry protocol
//! expects every node to maintain:
//!
//! - the client certificate, swapped under a lock when a `Config`
//!   response carries fresh credentials and rewritten on disk
//!   atomically,
//! - the registry endpoint list, cached in `{dir}/addrs` and folded
//!   into the connection pool whenever the registry reports a change,
//! - the background jobs: a configuration refresher and the heartbeat
//!   that keeps the node's lease alive.
//!
//! ```rust,ignore
//! let client = NodeClientBuilder::new("/var/lib/fleet-agent")
//!     .ca_file("/etc/fleet/ca.crt")
//!     .credential_files("/etc/fleet/node.crt", "/etc/fleet/node.key")
//!     .endpoints(vec!["10.0.0.1:2382".into()])
//!     .build()
//!     .await?;
//!
//! tokio::spawn(jobs::run_config_refresher(client.clone(), cancel.clone()));
//! tokio::spawn(jobs::run_heartbeat(client.clone(), cancel.clone()));
//! ```

mod builder;
mod client;
mod credentials;
mod endpoints;
mod error;
pub mod jobs;

pub use builder::*;
pub use client::*;
pub use credentials::*;
pub use endpoints::*;
pub use error::*;

#[cfg(test)]
mod credentials_test;
