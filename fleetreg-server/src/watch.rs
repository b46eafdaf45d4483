//! The per-datacenter catalog view served to observers.
//!
//! The snapshot and the watch are not stitched through one consistent
//! cursor: an observer may see an update duplicating a snapshot entry
//! or a delete for a service it never saw, and is expected to apply
//! both idempotently.

use fleetreg_core::keys::dc_service_prefix;
use fleetreg_core::keys::parse_dc_service_key;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::kv::WatchEvent;
use fleetreg_core::Error;
use fleetreg_core::Result;
use fleetreg_proto::common::ServiceSpec;
use fleetreg_proto::observer::WatchDatacenterServicesResponse;

/// Everything currently registered in the datacenter, in index order.
pub async fn datacenter_snapshot<E: KvEngine>(
    kv: &E,
    datacenter: &str,
) -> Result<Vec<ServiceSpec>> {
    let entries = kv
        .range(RangeRequest::prefix(dc_service_prefix(datacenter), 0))
        .await?;

    entries
        .into_iter()
        .map(|entry| {
            serde_json::from_slice(&entry.value)
                .map_err(|e| fleetreg_core::SystemError::Json(e).into())
        })
        .collect()
}

/// Translates one substrate event into the wire notification.
///
/// Puts decode the stored spec; deletes only have the key left, so the
/// `(node, service, instance)` identity is parsed from its tail.
pub fn translate_event(event: WatchEvent) -> Result<WatchDatacenterServicesResponse> {
    match event {
        WatchEvent::Put(kv) => {
            let spec: ServiceSpec = serde_json::from_slice(&kv.value)
                .map_err(fleetreg_core::SystemError::Json)?;
            Ok(WatchDatacenterServicesResponse::update(spec))
        }
        WatchEvent::Delete { key } => {
            let tail = parse_dc_service_key(&key).ok_or_else(|| {
                Error::Internal(format!(
                    "malformed datacenter service key: {}",
                    String::from_utf8_lossy(&key)
                ))
            })?;
            Ok(WatchDatacenterServicesResponse::delete(
                tail.node,
                tail.service_name,
                tail.instance,
            ))
        }
    }
}
