use std::time::Duration;
use std::time::SystemTime;

use super::ca::*;
use super::secrets::ClusterSecret;
use super::NodeRole;

#[test]
fn test_two_peers_derive_identical_cas() {
    let secret = ClusterSecret::generate();
    let token = secret.encode();

    let a = CertAuthority::derive(&secret).unwrap();
    let b = CertAuthority::derive(&ClusterSecret::decode(&token).unwrap()).unwrap();

    assert_eq!(a.root_cert_pem(), b.root_cert_pem());
    assert_eq!(a.root_key_pem(), b.root_key_pem());
    assert_eq!(a.node_ca_cert_pem(), b.node_ca_cert_pem());
    assert_eq!(a.node_ca_key_pem(), b.node_ca_key_pem());
}

#[test]
fn test_root_and_node_ca_differ() {
    let ca = CertAuthority::derive(&ClusterSecret::generate()).unwrap();
    assert_ne!(ca.root_cert_pem(), ca.node_ca_cert_pem());
}

#[test]
fn test_node_cert_carries_identity_triple() {
    let ca = CertAuthority::derive(&ClusterSecret::generate()).unwrap();
    let minted = ca.create_node_cert("dc1", "n1", NodeRole::Agent).unwrap();

    let der = pem_to_der(&minted.cert_pem);
    let identity = parse_peer_certificate(&der).unwrap();

    assert_eq!(identity.common_name, "n1");
    assert_eq!(identity.org_units, vec!["agents".to_string(), "dc1".to_string()]);

    let lifetime = identity
        .not_after
        .duration_since(SystemTime::now())
        .unwrap();
    assert!(lifetime <= NODE_CERT_EXPIRY);
    assert!(lifetime > NODE_CERT_EXPIRY - Duration::from_secs(3600));
}

#[test]
fn test_server_cert_has_cluster_service_name() {
    let ca = CertAuthority::derive(&ClusterSecret::generate()).unwrap();
    let minted = ca
        .create_server_cert("peer-a", &["10.1.2.3".to_string()])
        .unwrap();

    let identity = parse_peer_certificate(&pem_to_der(&minted.cert_pem)).unwrap();
    assert_eq!(identity.common_name, "peer-a");
    assert_eq!(identity.org_units, vec!["peers".to_string()]);
    assert!(minted.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
}

#[test]
fn test_renewal_schedule() {
    let now = SystemTime::now();
    let expiry = Duration::from_secs(7 * 24 * 3600);

    // Fresh certificate: next check lands halfway through its life.
    let fresh = seconds_until_renewal(now + expiry, expiry, now);
    assert_eq!(fresh, (expiry.as_secs() / 2) as i64);

    // Inside the final half-life: renewal is due.
    let due = seconds_until_renewal(now + Duration::from_secs(3600), expiry, now);
    assert!(due < 0);

    // Already expired.
    let expired = seconds_until_renewal(now - Duration::from_secs(10), expiry, now);
    assert!(expired < 0);
}

fn pem_to_der(pem: &str) -> Vec<u8> {
    let body: String = pem
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(body).unwrap()
}
