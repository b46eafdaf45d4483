//! Peer join and cluster membership.
//!
//! A joining peer calls `AddSelfPeer` on an existing peer's gateway,
//! which adds it to the consensus membership under the name in its
//! server certificate. After its own substrate reports ready, every
//! peer publishes the gateway address nodes should use, and `Config`
//! responses return the union of those addresses.

use tonic::transport::Certificate;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tracing::info;
use tracing::warn;

use fleetreg_core::ca::CertAuthority;
use fleetreg_core::ca::CertifiedKey;
use fleetreg_core::ca::CLUSTER_SERVICE_NAME;
use fleetreg_core::keys::peer_agent_api_key;
use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::Error;
use fleetreg_core::Result;
use fleetreg_proto::peer::peer_api_client::PeerApiClient;
use fleetreg_proto::peer::AddSelfPeerRequest;
use fleetreg_proto::peer::GetPeersRequest;
use fleetreg_proto::peer::PeerInfo;

/// Validates and registers a joining peer's advertised consensus URLs.
pub async fn add_self_peer<C: ClusterApi>(
    cluster: &C,
    peer_name: &str,
    urls: &[String],
) -> Result<()> {
    if urls.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one advertised URL must be set".into(),
        ));
    }
    for url in urls {
        let uri: Uri = url
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("malformed URL {url:?}")))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(Error::InvalidArgument(format!(
                "URL {url:?} must carry a scheme and host"
            )));
        }
    }

    info!(peer = peer_name, ?urls, "adding peer to consensus membership");
    cluster
        .member_add(peer_name.to_string(), urls.to_vec())
        .await?;
    Ok(())
}

/// Snapshot of the consensus membership in wire shape.
pub async fn get_peers<C: ClusterApi>(cluster: &C) -> Result<Vec<PeerInfo>> {
    let members = cluster.member_list().await?;
    Ok(members
        .into_iter()
        .map(|m| PeerInfo {
            id: m.id,
            name: m.name,
            peer_urls: m.peer_urls,
            client_urls: m.client_urls,
        })
        .collect())
}

/// Publishes this peer's gateway address for nodes to discover.
pub async fn publish_agent_api_addr<E: KvEngine>(
    kv: &E,
    peer_name: &str,
    advertise_host: &str,
) -> Result<()> {
    kv.put(
        peer_agent_api_key(peer_name),
        advertise_host.as_bytes().to_vec(),
    )
    .await?;
    Ok(())
}

/// Called by a starting peer when `join_url` is configured: announce
/// ourselves through an existing peer and fetch the membership we are
/// about to join. Join failure is not fatal - the caller retries by
/// restarting - so errors are reported, not unwound.
pub async fn join_cluster(
    ca: &CertAuthority,
    server_cert: &CertifiedKey,
    join_url: &str,
    advertise_urls: &[String],
) -> Result<Vec<PeerInfo>> {
    let channel = peer_channel(ca, server_cert, join_url).await?;
    let mut client = PeerApiClient::new(channel);

    client
        .add_self_peer(AddSelfPeerRequest {
            advertised_urls: advertise_urls.to_vec(),
        })
        .await
        .map_err(|e| Error::Internal(format!("join request failed: {e}")))?;

    let peers = client
        .get_peers(GetPeersRequest {})
        .await
        .map_err(|e| Error::Internal(format!("membership fetch failed: {e}")))?
        .into_inner()
        .peers;

    info!(count = peers.len(), "joined cluster");
    Ok(peers)
}

/// mTLS channel to another peer's gateway, authenticated with our
/// server certificate and pinned to the fixed cluster service name.
async fn peer_channel(
    ca: &CertAuthority,
    server_cert: &CertifiedKey,
    address: &str,
) -> Result<Channel> {
    let tls = ClientTlsConfig::new()
        .domain_name(CLUSTER_SERVICE_NAME)
        .ca_certificate(Certificate::from_pem(ca.root_cert_pem()))
        .identity(tonic::transport::Identity::from_pem(
            &server_cert.cert_pem,
            &server_cert.key_pem,
        ));

    let endpoint = Endpoint::from_shared(format!("https://{address}"))
        .map_err(|e| Error::InvalidArgument(format!("malformed join URL {address:?}: {e}")))?
        .tls_config(tls)
        .map_err(|e| Error::Internal(format!("TLS configuration rejected: {e}")))?;

    endpoint.connect().await.map_err(|e| {
        warn!("peer connection to {address} failed: {e}");
        Error::Internal(format!("peer connection failed: {e}"))
    })
}
