//! Certificate-based identity resolution.
//!
//! The TLS layer has already verified the presented chain against the
//! cluster CAs; this module only reads identity out of the leaf and
//! checks it against the node catalog. A node certificate carries
//! exactly two OUs, `(role, datacenter)`, and CN = node name; peer
//! server certificates carry the single `peers` OU.

use std::net::IpAddr;

use tonic::Request;

use fleetreg_core::ca::parse_peer_certificate;
use fleetreg_core::ca::PeerCertIdentity;
use fleetreg_core::keys::node_key;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::AuthError;
use fleetreg_core::NodeRecord;
use fleetreg_core::NodeRole;
use fleetreg_core::Result;
use fleetreg_core::PEER_OU;

/// An authenticated node: the role its certificate claims plus its
/// catalog record.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub role: NodeRole,
    pub record: NodeRecord,
}

/// Reads the leaf certificate out of the TLS session.
pub fn presented_certificate<T>(req: &Request<T>) -> Result<PeerCertIdentity> {
    let certs = req.peer_certs().ok_or(AuthError::MissingCertificate)?;
    let der = certs.first().ok_or(AuthError::MissingCertificate)?;
    parse_peer_certificate(der.as_ref())
        .map_err(|e| AuthError::MalformedCertificate(e.to_string()).into())
}

/// The caller's source address, used when a registration carries no
/// addresses of its own.
pub fn source_ip<T>(req: &Request<T>) -> Option<IpAddr> {
    req.remote_addr().map(|addr| addr.ip())
}

/// Splits a node certificate subject into `(role, datacenter, name)`.
pub fn node_identity_fields(cert: &PeerCertIdentity) -> Result<(NodeRole, &str, &str)> {
    let [role_ou, datacenter] = cert.org_units.as_slice() else {
        return Err(AuthError::MalformedCertificate(
            "expected exactly two organizational units".into(),
        )
        .into());
    };

    let role = NodeRole::from_ou(role_ou).ok_or_else(|| {
        AuthError::MalformedCertificate(format!("unknown role OU {role_ou:?}"))
    })?;

    Ok((role, datacenter, &cert.common_name))
}

/// Resolves a node certificate to its catalog record. The record must
/// exist; a certificate for a never-added node is unauthenticated.
pub async fn authenticate_node<E: KvEngine>(
    kv: &E,
    cert: &PeerCertIdentity,
) -> Result<NodeIdentity> {
    let (role, datacenter, name) = node_identity_fields(cert)?;

    let kvs = kv
        .range(RangeRequest::single(node_key(datacenter, name)))
        .await?;
    let Some(entry) = kvs.into_iter().next() else {
        return Err(AuthError::UnknownNode {
            datacenter: datacenter.to_string(),
            name: name.to_string(),
        }
        .into());
    };

    let record: NodeRecord =
        serde_json::from_slice(&entry.value).map_err(fleetreg_core::SystemError::Json)?;

    Ok(NodeIdentity { role, record })
}

/// Agent-only endpoints re-check the OU before doing any work.
pub fn require_agent(identity: &NodeIdentity) -> Result<()> {
    if identity.role != NodeRole::Agent {
        return Err(AuthError::RoleMismatch {
            actual: identity.role.to_string(),
        }
        .into());
    }
    Ok(())
}

pub fn require_observer(identity: &NodeIdentity) -> Result<()> {
    if identity.role != NodeRole::Observer {
        return Err(AuthError::RoleMismatch {
            actual: identity.role.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Peer endpoints accept server certificates only: the single `peers`
/// OU, never a node role OU.
pub fn require_peer(cert: &PeerCertIdentity) -> Result<()> {
    if cert.org_units.len() != 1 || cert.org_units[0] != PEER_OU {
        return Err(AuthError::RoleMismatch {
            actual: cert.org_units.join("/"),
        }
        .into());
    }
    Ok(())
}
