//! The node lease: one TTL'd handle per node that every one of its
//! catalog entries is written under. When the lease goes - revoked by a
//! reset or expired after missed heartbeats - the substrate deletes all
//! of the node's service keys cluster-wide.

use tracing::debug;
use tracing::warn;

use fleetreg_core::keys::node_lease_key;
use fleetreg_core::kv::Compare;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::kv::TxnOp;
use fleetreg_core::kv::TxnRequest;
use fleetreg_core::KvError;
use fleetreg_core::Result;
use fleetreg_core::NODE_KEEPALIVE_TTL_SECS;

/// Attempts before the optimistic loop gives up.
const LEASE_TXN_ATTEMPTS: usize = 5;

/// Returns the node's live lease, renewing it as a side effect, or
/// grants a fresh one. This is the serialization point that keeps two
/// concurrent registrations from the same node on one lease: the lease
/// key is written under a version guard (or a create guard when absent)
/// and losers of the race re-read and retry.
pub async fn get_node_lease<E: KvEngine>(
    kv: &E,
    datacenter: &str,
    name: &str,
) -> Result<i64> {
    let key = node_lease_key(datacenter, name);

    for _ in 0..LEASE_TXN_ATTEMPTS {
        let snapshot = kv
            .range(RangeRequest::single(key.clone()))
            .await?
            .into_iter()
            .next();

        if let Some(entry) = &snapshot {
            // An undecodable stored value means the previous write went
            // wrong; proceed as if no lease was allocated.
            if let Ok(lease_id) = serde_json::from_slice::<i64>(&entry.value) {
                // Renewal failure means the lease expired under us; a
                // fresh one gets granted below.
                if kv.lease_renew(lease_id).await.is_ok() {
                    return Ok(lease_id);
                }
            }
        }

        let lease_id = kv.lease_grant(i64::from(NODE_KEEPALIVE_TTL_SECS)).await?;

        let guard = match &snapshot {
            Some(entry) => Compare::VersionEq {
                key: key.clone(),
                version: entry.version,
            },
            None => Compare::CreateRevisionEq {
                key: key.clone(),
                revision: 0,
            },
        };

        let txn = TxnRequest {
            compares: vec![guard],
            success: vec![TxnOp::Put {
                key: key.clone(),
                value: serde_json::to_vec(&lease_id)
                    .map_err(fleetreg_core::SystemError::Json)?,
                lease: 0,
            }],
        };

        if kv.txn(txn).await?.succeeded {
            return Ok(lease_id);
        }

        debug!(datacenter, name, "node lease write raced, retrying");
    }

    warn!(datacenter, name, "node lease not settled after retries");
    Err(KvError::TooManyRetries(LEASE_TXN_ATTEMPTS).into())
}

/// Revokes the node's current lease, taking every service entry bound
/// to it down with it. A lease that is already gone counts as success.
pub async fn reset_node_lease<E: KvEngine>(
    kv: &E,
    datacenter: &str,
    name: &str,
) -> Result<()> {
    let key = node_lease_key(datacenter, name);

    let snapshot = kv
        .range(RangeRequest::single(key))
        .await?
        .into_iter()
        .next();

    let Some(entry) = snapshot else {
        return Ok(());
    };
    let Ok(lease_id) = serde_json::from_slice::<i64>(&entry.value) else {
        // Corrupt stored lease id: nothing to revoke, the TTL will
        // clean up whatever was attached to it.
        return Ok(());
    };

    match kv.lease_revoke(lease_id).await {
        Ok(()) | Err(KvError::LeaseNotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
