//! Internal certificate authority.
//!
//! Two CAs hang off the cluster secret, both reproduced byte-identically
//! by every peer (Ed25519 keys are seeded from labeled derivations and
//! signing is deterministic, so independent peers mint the same DER):
//!
//! - the **root CA** signs per-peer server certificates; peers and the
//!   admin CLI authenticate with these.
//! - the **node CA** signs short-lived client certificates for agents
//!   and observers.
//!
//! A node certificate carries the full identity triple: CN is the node
//! name and the two OUs are `(role, datacenter)`, so a recipient can
//! derive identity from the certificate alone.

use rcgen::BasicConstraints;
use rcgen::Certificate;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::ExtendedKeyUsagePurpose;
use rcgen::IsCa;
use rcgen::KeyPair;
use rcgen::KeyUsagePurpose;
use rcgen::SerialNumber;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;
use time::OffsetDateTime;
use x509_parser::prelude::FromDer;
use x509_parser::prelude::X509Certificate;

use crate::secrets::ClusterSecret;
use crate::secrets::LABEL_NODE_CA;
use crate::secrets::LABEL_ROOT_CA;
use crate::CredentialError;
use crate::NodeRole;
use crate::PEER_OU;

/// Fixed SAN shared by every server certificate; clients pin this name
/// regardless of which peer answers.
pub const CLUSTER_SERVICE_NAME: &str = "registry.cluster.internal";

/// Node (agent/observer) client certificate lifetime.
pub const NODE_CERT_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Per-peer server certificate lifetime.
pub const SERVER_CERT_EXPIRY: Duration = Duration::from_secs(90 * 24 * 60 * 60);

const CA_EXPIRY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

const ORGANIZATION: &str = "fleetreg";

/// A freshly minted certificate with its private key, both PEM.
#[derive(Debug, Clone)]
pub struct CertifiedKey {
    pub cert_pem: String,
    pub key_pem: String,
}

pub struct CertAuthority {
    root_cert: Certificate,
    root_key: KeyPair,
    node_ca_cert: Certificate,
    node_ca_key: KeyPair,
}

impl CertAuthority {
    /// Derives both CAs from the cluster secret. Deterministic: peers
    /// holding the same secret build byte-identical CA certificates.
    pub fn derive(secret: &ClusterSecret) -> Result<Self, CredentialError> {
        let start = secret.created_at();
        let (root_cert, root_key) =
            build_ca(&secret.derive(LABEL_ROOT_CA, 32), start, "root")?;
        let (node_ca_cert, node_ca_key) =
            build_ca(&secret.derive(LABEL_NODE_CA, 32), start, "nodes")?;

        Ok(Self {
            root_cert,
            root_key,
            node_ca_cert,
            node_ca_key,
        })
    }

    pub fn root_cert_pem(&self) -> String {
        self.root_cert.pem()
    }

    pub fn root_key_pem(&self) -> String {
        self.root_key.serialize_pem()
    }

    pub fn node_ca_cert_pem(&self) -> String {
        self.node_ca_cert.pem()
    }

    pub fn node_ca_key_pem(&self) -> String {
        self.node_ca_key.serialize_pem()
    }

    /// Mints a server certificate for one peer, signed by the root CA.
    /// SANs are the peer's advertised hostnames plus the fixed cluster
    /// service name.
    pub fn create_server_cert(
        &self,
        peer_name: &str,
        advertised_hosts: &[String],
    ) -> Result<CertifiedKey, CredentialError> {
        let mut sans: Vec<String> = advertised_hosts.to_vec();
        if !sans.iter().any(|h| h == CLUSTER_SERVICE_NAME) {
            sans.push(CLUSTER_SERVICE_NAME.to_string());
        }

        let mut params = CertificateParams::new(sans).map_err(mint_err)?;
        let now = SystemTime::now();
        params.not_before = OffsetDateTime::from(now);
        params.not_after = OffsetDateTime::from(now + SERVER_CERT_EXPIRY);

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, ORGANIZATION);
        dn.push(DnType::OrganizationalUnitName, PEER_OU);
        dn.push(DnType::CommonName, peer_name);
        params.distinguished_name = dn;

        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let key = KeyPair::generate_for(&rcgen::PKCS_ED25519).map_err(mint_err)?;
        let cert = params
            .signed_by(&key, &self.root_cert, &self.root_key)
            .map_err(mint_err)?;

        Ok(CertifiedKey {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }

    /// The sole factory for node client certificates: CN = node name,
    /// OU = (role, datacenter), 7-day validity, signed by the node CA.
    pub fn create_node_cert(
        &self,
        datacenter: &str,
        name: &str,
        role: NodeRole,
    ) -> Result<CertifiedKey, CredentialError> {
        let mut params = CertificateParams::default();
        let now = SystemTime::now();
        params.not_before = OffsetDateTime::from(now);
        params.not_after = OffsetDateTime::from(now + NODE_CERT_EXPIRY);

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, ORGANIZATION);
        dn.push(DnType::OrganizationalUnitName, role.as_ou());
        dn.push(DnType::OrganizationalUnitName, datacenter);
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;

        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let key = KeyPair::generate_for(&rcgen::PKCS_ED25519).map_err(mint_err)?;
        let cert = params
            .signed_by(&key, &self.node_ca_cert, &self.node_ca_key)
            .map_err(mint_err)?;

        Ok(CertifiedKey {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}

fn build_ca(
    seed: &[u8],
    start: SystemTime,
    ou: &str,
) -> Result<(Certificate, KeyPair), CredentialError> {
    let key = keypair_from_seed(seed)?;

    let mut params = CertificateParams::default();
    params.not_before = OffsetDateTime::from(start);
    params.not_after = OffsetDateTime::from(start + CA_EXPIRY);
    // Fixed serial keeps the DER identical across peers.
    params.serial_number = Some(SerialNumber::from(vec![1u8]));

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, ORGANIZATION);
    dn.push(DnType::OrganizationalUnitName, ou);
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign];

    let cert = params.self_signed(&key).map_err(mint_err)?;
    Ok((cert, key))
}

/// Deterministic Ed25519 keypair from a 32-byte derivation.
fn keypair_from_seed(seed: &[u8]) -> Result<KeyPair, CredentialError> {
    use ed25519_dalek::pkcs8::EncodePrivateKey;

    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|_| CredentialError::Mint("CA seed must be 32 bytes".into()))?;
    let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
    let der = signing
        .to_pkcs8_der()
        .map_err(|e| CredentialError::Mint(e.to_string()))?;

    KeyPair::try_from(der.as_bytes()).map_err(mint_err)
}

fn mint_err(e: rcgen::Error) -> CredentialError {
    CredentialError::Mint(e.to_string())
}

/// Identity material read back out of a presented client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertIdentity {
    pub common_name: String,
    pub org_units: Vec<String>,
    pub not_after: SystemTime,
}

/// Parses CN, the ordered OU list and the expiry out of a DER
/// certificate. The TLS layer has already verified the chain; this only
/// reads identity fields.
pub fn parse_peer_certificate(der: &[u8]) -> Result<PeerCertIdentity, CredentialError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| CredentialError::Parse(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .ok_or_else(|| CredentialError::Parse("certificate has no CN".into()))?
        .to_string();

    let org_units = cert
        .subject()
        .iter_organizational_unit()
        .filter_map(|ou| ou.as_str().ok())
        .map(str::to_string)
        .collect();

    let ts = cert.validity().not_after.timestamp();
    let not_after = if ts >= 0 {
        UNIX_EPOCH + Duration::from_secs(ts as u64)
    } else {
        UNIX_EPOCH
    };

    Ok(PeerCertIdentity {
        common_name,
        org_units,
        not_after,
    })
}

/// Seconds until a certificate should be renewed: half its lifetime
/// before expiry. Negative means renewal is already due.
pub fn seconds_until_renewal(
    not_after: SystemTime,
    expiry: Duration,
    now: SystemTime,
) -> i64 {
    let not_after = not_after
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let now = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    not_after - now - (expiry.as_secs() / 2) as i64
}
