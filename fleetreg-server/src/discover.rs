//! Hierarchical service discovery.
//!
//! A query fans out from the most specific prefix the caller's locality
//! allows - instance, node, datacenter, location, global - padding the
//! result set up to [`MAX_DISCOVER_RESULTS`] at each widening step.
//! Supplying an explicit scope field pins it: no fallback is performed
//! through a pinned scope. Ordering relies on the substrate's natural
//! key order within a pass; narrower-scope entries always precede
//! broader ones.

use tracing::debug;

use fleetreg_core::keys::validate_segment;
use fleetreg_core::keys::ServicePrefixes;
use fleetreg_core::kv::KeyValue;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::NodeRecord;
use fleetreg_core::Result;
use fleetreg_proto::agent::DiscoverRequest;
use fleetreg_proto::common::ServiceSpec;

/// Upper bound on returned specs, shared by every scope pass.
pub const MAX_DISCOVER_RESULTS: usize = 3;

/// Entries found so far, keyed by primary key for de-duplication while
/// preserving narrow-to-wide arrival order.
type Found = Vec<(Vec<u8>, ServiceSpec)>;

pub async fn discover<E: KvEngine>(
    kv: &E,
    node: &NodeRecord,
    req: &DiscoverRequest,
) -> Result<Vec<ServiceSpec>> {
    validate_segment("service", &req.service)?;

    let location = req.location.as_deref().unwrap_or(&node.location);
    let datacenter = req.datacenter.as_deref().unwrap_or(&node.datacenter);
    let node_name = req.node.as_deref().unwrap_or(&node.name);

    let prefixes = ServicePrefixes::new(&req.service, location, datacenter, node_name);

    // The narrowest pass is authoritative: its errors surface.
    let initial = match &req.instance {
        Some(instance) => {
            let mut key = prefixes.node.clone();
            key.extend_from_slice(instance.as_bytes());
            kv.range(RangeRequest::single(key)).await?
        }
        None => {
            kv.range(RangeRequest::prefix(
                prefixes.node.clone(),
                MAX_DISCOVER_RESULTS as i64,
            ))
            .await?
        }
    };

    let mut found = Found::new();
    for entry in initial {
        let spec =
            serde_json::from_slice(&entry.value).map_err(fleetreg_core::SystemError::Json)?;
        found.push((entry.key, spec));
    }

    // Widening passes are best effort and skipped through pinned
    // scopes.
    if found.len() < MAX_DISCOVER_RESULTS && req.node.is_none() {
        debug!(service = %req.service, "widening discovery to datacenter scope");
        pad(kv, &mut found, &prefixes.datacenter).await;
    }
    if found.len() < MAX_DISCOVER_RESULTS && req.datacenter.is_none() {
        debug!(service = %req.service, "widening discovery to location scope");
        pad(kv, &mut found, &prefixes.location).await;
    }
    if found.len() < MAX_DISCOVER_RESULTS && req.location.is_none() {
        debug!(service = %req.service, "widening discovery to global scope");
        pad(kv, &mut found, &prefixes.service).await;
    }

    Ok(found.into_iter().map(|(_, spec)| spec).collect())
}

/// One widening pass: fetch up to the bound under `prefix` and add
/// entries not already present. Errors (including undecodable values)
/// leave the narrower results untouched.
async fn pad<E: KvEngine>(kv: &E, found: &mut Found, prefix: &[u8]) {
    let entries: Vec<KeyValue> = match kv
        .range(RangeRequest::prefix(prefix.to_vec(), MAX_DISCOVER_RESULTS as i64))
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            debug!("discovery widening pass failed: {e}");
            return;
        }
    };

    for entry in entries {
        if found.len() >= MAX_DISCOVER_RESULTS {
            break;
        }
        if found.iter().any(|(key, _)| *key == entry.key) {
            continue;
        }
        match serde_json::from_slice(&entry.value) {
            Ok(spec) => found.push((entry.key, spec)),
            Err(e) => {
                debug!("skipping undecodable catalog entry: {e}");
                return;
            }
        }
    }
}
