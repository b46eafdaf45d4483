//! Catalog writes: registration and deregistration of service entries.
//!
//! Every entry lives at two keys - the service primary and the
//! per-datacenter index - written together in one transaction under the
//! node's lease, so the pair is created, overwritten and evicted as a
//! unit.

use std::net::IpAddr;

use tracing::info;

use fleetreg_core::keys::dc_service_key;
use fleetreg_core::keys::service_key;
use fleetreg_core::keys::validate_segment;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::TxnOp;
use fleetreg_core::kv::TxnRequest;
use fleetreg_core::Error;
use fleetreg_core::NodeRecord;
use fleetreg_core::Result;
use fleetreg_proto::agent::RegisterServiceRequest;
use fleetreg_proto::common::ServiceSpec;

use crate::get_node_lease;
use crate::reset_node_lease;

/// Registers (or overwrites) one service instance for the
/// authenticated node. The locality fields of the stored spec come from
/// the node record, never from the request, and an empty address list
/// is replaced by the caller's source address.
pub async fn register<E: KvEngine>(
    kv: &E,
    node: &NodeRecord,
    req: RegisterServiceRequest,
    source: Option<IpAddr>,
) -> Result<ServiceSpec> {
    validate_segment("service", &req.service)?;
    validate_segment("instance", &req.instance)?;

    let mut spec = ServiceSpec {
        service_name: req.service,
        instance: req.instance,
        location: node.location.clone(),
        datacenter: node.datacenter.clone(),
        node: node.name.clone(),
        addresses: req.addresses,
        ports: req.ports,
        metrics_port: req.metrics_port,
    };

    if spec.addresses.is_empty() {
        let source = source
            .ok_or_else(|| Error::Internal("caller source address unavailable".into()))?;
        spec.addresses = vec![source.to_string()];
    }

    let svc_key = service_key(
        &spec.service_name,
        &node.location,
        &node.datacenter,
        &node.name,
        &spec.instance,
    );
    let dc_svc_key = dc_service_key(
        &node.datacenter,
        &node.name,
        &spec.service_name,
        &spec.instance,
    );

    let value = serde_json::to_vec(&spec).map_err(fleetreg_core::SystemError::Json)?;

    let lease = get_node_lease(kv, &node.datacenter, &node.name).await?;

    let txn = TxnRequest {
        compares: vec![],
        success: vec![
            TxnOp::Put {
                key: svc_key,
                value: value.clone(),
                lease,
            },
            TxnOp::Put {
                key: dc_svc_key,
                value,
                lease,
            },
        ],
    };

    if !kv.txn(txn).await?.succeeded {
        return Err(Error::Internal("service registration rejected".into()));
    }

    info!(
        service = %spec.qualified_name(),
        node = %node.name,
        "service registered"
    );
    Ok(spec)
}

/// Removes one service instance from both indices. Deleting a pair that
/// does not exist succeeds and changes nothing.
pub async fn deregister<E: KvEngine>(
    kv: &E,
    node: &NodeRecord,
    service: &str,
    instance: &str,
) -> Result<()> {
    validate_segment("service", service)?;
    validate_segment("instance", instance)?;

    let txn = TxnRequest {
        compares: vec![],
        success: vec![
            TxnOp::Delete {
                key: service_key(
                    service,
                    &node.location,
                    &node.datacenter,
                    &node.name,
                    instance,
                ),
            },
            TxnOp::Delete {
                key: dc_service_key(&node.datacenter, &node.name, service, instance),
            },
        ],
    };

    if !kv.txn(txn).await?.succeeded {
        return Err(Error::Internal("service deregistration rejected".into()));
    }

    info!(service, instance, node = %node.name, "service deregistered");
    Ok(())
}

/// Drops the node's lease, evicting every service entry it registered.
pub async fn reset<E: KvEngine>(kv: &E, node: &NodeRecord) -> Result<()> {
    info!(node = %node.name, datacenter = %node.datacenter, "node reset");
    reset_node_lease(kv, &node.datacenter, &node.name).await
}
