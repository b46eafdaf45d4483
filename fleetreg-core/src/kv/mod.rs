//! The replicated KV substrate contract.
//!
//! The registry data plane is written against these traits, not against
//! a concrete store. `fleetreg-server` binds them to etcd in production
//! and to an in-memory engine in the test harness; both must provide the
//! same transactional semantics:
//!
//! - `txn` evaluates all compares against one snapshot and applies all
//!   success ops atomically.
//! - keys written with a lease disappear, cluster-wide, when that lease
//!   expires or is revoked.
//! - `watch_prefix` delivers every put/delete under the prefix,
//!   including lease-driven deletes, until the watcher is dropped.
//!
//! Reads are allowed to be served from a stale replica; discovery does
//! not require linearizability.

mod types;

pub use types::*;

use async_trait::async_trait;

use crate::KvError;

#[async_trait]
pub trait KvEngine: Send + Sync + 'static {
    /// Ordered scan. `limit == 0` means unlimited.
    async fn range(&self, req: RangeRequest) -> Result<Vec<KeyValue>, KvError>;

    /// Unconditional single-key write, no lease.
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KvError>;

    /// Conditional multi-op transaction. Returns whether the compares
    /// held and the success branch was applied.
    async fn txn(&self, req: TxnRequest) -> Result<TxnResponse, KvError>;

    /// Grants a new lease with the given TTL, returning its id.
    async fn lease_grant(&self, ttl_secs: i64) -> Result<i64, KvError>;

    /// Refreshes a live lease back to its full TTL.
    ///
    /// Fails with [`KvError::LeaseNotFound`] when the lease has already
    /// expired or been revoked.
    async fn lease_renew(&self, lease_id: i64) -> Result<(), KvError>;

    /// Revokes a lease, deleting every key attached to it.
    ///
    /// Fails with [`KvError::LeaseNotFound`] for an unknown lease;
    /// callers that treat revocation as cleanup ignore that case.
    async fn lease_revoke(&self, lease_id: i64) -> Result<(), KvError>;

    /// Opens a prefix watch. The subscription is released when the
    /// returned watcher is dropped.
    async fn watch_prefix(&self, prefix: Vec<u8>) -> Result<PrefixWatcher, KvError>;
}

/// Consensus membership surface, separate from the data plane because
/// only the peer-join path touches it.
#[async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    async fn member_add(
        &self,
        name: String,
        peer_urls: Vec<String>,
    ) -> Result<(), KvError>;

    async fn member_list(&self) -> Result<Vec<PeerMember>, KvError>;
}
