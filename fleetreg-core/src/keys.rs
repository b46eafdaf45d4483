//! Catalog key grammar.
//!
//! All persistent state lives in one replicated ordered-key store under
//! `/`-delimited paths. Five namespaces:
//!
//! ```text
//! nodes/{dc}/{name}                              node identity records
//! node_lease/{dc}/{name}                         lease id anchoring a node's entries
//! svc/{service}/{location}/{dc}/{node}/{inst}    service primary
//! dcsvc/{dc}/{node}/{service}/{inst}             per-datacenter secondary index
//! peer_agent_api/{peer_name}                     advertised agent-API address
//! ```
//!
//! The primary key orders by service then locality, which is what the
//! hierarchical discovery fan-out ranges over; the secondary orders by
//! datacenter then node, which is what the observer watch and the
//! lease-eviction blast radius follow.

use crate::Error;

pub const SERVICE_NS: &str = "svc";
pub const DC_SERVICE_NS: &str = "dcsvc";
pub const NODES_NS: &str = "nodes";
pub const NODE_LEASE_NS: &str = "node_lease";
pub const PEER_AGENT_API_NS: &str = "peer_agent_api";

/// Rejects values that would break the `/`-delimited key grammar.
pub fn validate_segment(field: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{field} must not be empty")));
    }
    if value.contains('/') {
        return Err(Error::InvalidArgument(format!(
            "{field} must not contain '/'"
        )));
    }
    Ok(())
}

pub fn node_key(dc: &str, name: &str) -> Vec<u8> {
    format!("{NODES_NS}/{dc}/{name}").into_bytes()
}

pub fn node_lease_key(dc: &str, name: &str) -> Vec<u8> {
    format!("{NODE_LEASE_NS}/{dc}/{name}").into_bytes()
}

pub fn peer_agent_api_key(peer_name: &str) -> Vec<u8> {
    format!("{PEER_AGENT_API_NS}/{peer_name}").into_bytes()
}

pub fn service_key(
    service: &str,
    location: &str,
    dc: &str,
    node: &str,
    instance: &str,
) -> Vec<u8> {
    format!("{SERVICE_NS}/{service}/{location}/{dc}/{node}/{instance}").into_bytes()
}

pub fn dc_service_key(dc: &str, node: &str, service: &str, instance: &str) -> Vec<u8> {
    format!("{DC_SERVICE_NS}/{dc}/{node}/{service}/{instance}").into_bytes()
}

/// Prefix of every secondary-index key for one datacenter, trailing
/// slash included so `dc1` does not match `dc10`.
pub fn dc_service_prefix(dc: &str) -> Vec<u8> {
    format!("{DC_SERVICE_NS}/{dc}/").into_bytes()
}

/// The widening ladder for discovery, narrowest scope last.
pub struct ServicePrefixes {
    pub service: Vec<u8>,
    pub location: Vec<u8>,
    pub datacenter: Vec<u8>,
    pub node: Vec<u8>,
}

impl ServicePrefixes {
    pub fn new(service: &str, location: &str, dc: &str, node: &str) -> Self {
        let service_prefix = format!("{SERVICE_NS}/{service}/");
        let location_prefix = format!("{service_prefix}{location}/");
        let dc_prefix = format!("{location_prefix}{dc}/");
        let node_prefix = format!("{dc_prefix}{node}/");
        Self {
            service: service_prefix.into_bytes(),
            location: location_prefix.into_bytes(),
            datacenter: dc_prefix.into_bytes(),
            node: node_prefix.into_bytes(),
        }
    }
}

/// Identity parsed from the tail of a secondary-index key.
#[derive(Debug, PartialEq, Eq)]
pub struct DcServiceKeyTail {
    pub node: String,
    pub service_name: String,
    pub instance: String,
}

/// Parses `(node, service, instance)` out of a `dcsvc/...` key. Used by
/// the watch translator for delete events, whose values are gone.
pub fn parse_dc_service_key(key: &[u8]) -> Option<DcServiceKeyTail> {
    let key = std::str::from_utf8(key).ok()?;
    let mut tail = key.rsplit('/');
    let instance = tail.next()?;
    let service_name = tail.next()?;
    let node = tail.next()?;
    // At least the namespace and datacenter must remain in front.
    tail.next()?;
    Some(DcServiceKeyTail {
        node: node.to_string(),
        service_name: service_name.to_string(),
        instance: instance.to_string(),
    })
}

/// The exclusive upper bound covering every key with `prefix`: the
/// prefix with its last non-0xff byte incremented.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    for i in (0..end.len()).rev() {
        if end[i] < 0xff {
            end[i] += 1;
            end.truncate(i + 1);
            return end;
        }
    }
    // All 0xff: no upper bound exists, range to the end of keyspace.
    vec![0]
}
