//! End-to-end scenarios over the real mTLS gateway: real certificates,
//! real TLS handshakes, all four services on one loopback listener.

mod common;

use tonic::Code;

use fleetreg_core::NodeRole;
use fleetreg_proto::agent::DiscoverRequest;
use fleetreg_proto::agent::RegisterServiceRequest;
use fleetreg_proto::agent::ResetRequest;
use fleetreg_proto::agent::DeregisterServiceRequest;
use fleetreg_proto::common::PortSpec;
use fleetreg_proto::node::node_api_client::NodeApiClient;
use fleetreg_proto::node::ConfigRequest;
use fleetreg_proto::node::HeartbeatRequest;
use fleetreg_proto::observer::watch_datacenter_services_response::Notification;
use fleetreg_proto::observer::GetDatacenterServicesRequest;
use fleetreg_proto::observer::WatchDatacenterServicesRequest;
use fleetreg_proto::peer::AddNodeRequest;
use fleetreg_proto::peer::GetNodeCredentialsRequest;

use common::TestCluster;

fn register_request(service: &str, instance: &str) -> RegisterServiceRequest {
    RegisterServiceRequest {
        service: service.into(),
        instance: instance.into(),
        addresses: vec![],
        ports: vec![PortSpec::new("http", 8080, "tcp")],
        metrics_port: 0,
    }
}

fn discover_request(service: &str) -> DiscoverRequest {
    DiscoverRequest {
        service: service.into(),
        location: None,
        datacenter: None,
        node: None,
        instance: None,
    }
}

#[tokio::test]
async fn test_register_then_discover_on_same_node() {
    let cluster = TestCluster::start().await;
    let creds = cluster.add_node("n1", "dc1", "eu", NodeRole::Agent).await;
    let mut agent = cluster.agent_client(&creds).await;

    agent.register(register_request("web", "a")).await.unwrap();

    let found = agent
        .discover(discover_request("web"))
        .await
        .unwrap()
        .into_inner()
        .services;

    assert_eq!(found.len(), 1);
    let spec = &found[0];
    assert_eq!(spec.service_name, "web");
    assert_eq!(spec.instance, "a");
    assert_eq!(spec.location, "eu");
    assert_eq!(spec.datacenter, "dc1");
    assert_eq!(spec.node, "n1");
    // Empty addresses were replaced with the caller's source address.
    assert_eq!(spec.addresses, vec!["127.0.0.1".to_string()]);
}

#[tokio::test]
async fn test_cross_scope_widening() {
    let cluster = TestCluster::start().await;

    for (name, dc) in [("n1", "dc1"), ("n2", "dc2")] {
        let creds = cluster.add_node(name, dc, "eu", NodeRole::Agent).await;
        let mut agent = cluster.agent_client(&creds).await;
        agent
            .register(register_request("web", &format!("inst-{name}")))
            .await
            .unwrap();
    }

    let third = cluster.add_node("n3", "dc3", "eu", NodeRole::Agent).await;
    let mut agent = cluster.agent_client(&third).await;
    let found = agent
        .discover(discover_request("web"))
        .await
        .unwrap()
        .into_inner()
        .services;

    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn test_reset_cleans_the_catalog() {
    let cluster = TestCluster::start().await;
    let creds = cluster.add_node("n1", "dc1", "eu", NodeRole::Agent).await;
    let mut agent = cluster.agent_client(&creds).await;

    agent.register(register_request("web", "a")).await.unwrap();
    agent.reset(ResetRequest {}).await.unwrap();

    let found = agent
        .discover(discover_request("web"))
        .await
        .unwrap()
        .into_inner()
        .services;
    assert!(found.is_empty());

    // Both indices are gone, not just hidden from discovery.
    use fleetreg_core::kv::KvEngine;
    use fleetreg_core::kv::RangeRequest;
    assert!(cluster
        .kv
        .range(RangeRequest::prefix(b"svc/".to_vec(), 0))
        .await
        .unwrap()
        .is_empty());
    assert!(cluster
        .kv
        .range(RangeRequest::prefix(b"dcsvc/".to_vec(), 0))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_observer_watch_sees_register_and_deregister() {
    let cluster = TestCluster::start().await;
    let observer_creds = cluster
        .add_node("obs1", "dc1", "eu", NodeRole::Observer)
        .await;
    let agent_creds = cluster.add_node("n1", "dc1", "eu", NodeRole::Agent).await;

    let mut observer = cluster.observer_client(&observer_creds).await;
    let mut stream = observer
        .watch_datacenter_services(WatchDatacenterServicesRequest {})
        .await
        .unwrap()
        .into_inner();

    let mut agent = cluster.agent_client(&agent_creds).await;
    agent.register(register_request("web", "a")).await.unwrap();

    match stream.message().await.unwrap().unwrap().notification.unwrap() {
        Notification::Update(update) => {
            let spec = update.service.unwrap();
            assert_eq!(spec.service_name, "web");
            assert_eq!(spec.instance, "a");
        }
        other => panic!("expected update, got {other:?}"),
    }

    agent
        .deregister(DeregisterServiceRequest {
            service: "web".into(),
            instance: "a".into(),
        })
        .await
        .unwrap();

    match stream.message().await.unwrap().unwrap().notification.unwrap() {
        Notification::Delete(delete) => {
            assert_eq!(delete.node, "n1");
            assert_eq!(delete.service_name, "web");
            assert_eq!(delete.instance, "a");
        }
        other => panic!("expected delete, got {other:?}"),
    }
}

#[tokio::test]
async fn test_observer_snapshot_is_dc_scoped() {
    let cluster = TestCluster::start().await;

    for (name, dc) in [("n1", "dc1"), ("n2", "dc2")] {
        let creds = cluster.add_node(name, dc, "eu", NodeRole::Agent).await;
        let mut agent = cluster.agent_client(&creds).await;
        agent.register(register_request("web", "a")).await.unwrap();
    }

    let observer_creds = cluster
        .add_node("obs1", "dc1", "eu", NodeRole::Observer)
        .await;
    let mut observer = cluster.observer_client(&observer_creds).await;

    let services = observer
        .get_datacenter_services(GetDatacenterServicesRequest {})
        .await
        .unwrap()
        .into_inner()
        .services;

    assert_eq!(services.len(), 1);
    assert_eq!(services[0].datacenter, "dc1");
}

#[tokio::test]
async fn test_role_and_identity_enforcement() {
    let cluster = TestCluster::start().await;

    // Agent certificates cannot use the observer surface.
    let agent_creds = cluster.add_node("n1", "dc1", "eu", NodeRole::Agent).await;
    let mut observer = cluster.observer_client(&agent_creds).await;
    let status = observer
        .get_datacenter_services(GetDatacenterServicesRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // Observer certificates cannot register services.
    let observer_creds = cluster
        .add_node("obs1", "dc1", "eu", NodeRole::Observer)
        .await;
    let mut agent = cluster.agent_client(&observer_creds).await;
    let status = agent
        .register(register_request("web", "a"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // A certificate minted outside the admin plane (node never added)
    // authenticates at the TLS layer but not at the catalog.
    let ghost = cluster
        .state
        .ca
        .create_node_cert("dc1", "ghost", fleetreg_core::NodeRole::Agent)
        .unwrap();
    let mut agent = cluster.agent_client(&ghost).await;
    let status = agent
        .register(register_request("web", "a"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // Node certificates cannot reach the admin plane.
    let mut peer_api =
        fleetreg_proto::peer::peer_api_client::PeerApiClient::new(
            cluster.node_channel(&agent_creds).await,
        );
    let status = peer_api
        .get_peers(fleetreg_proto::peer::GetPeersRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn test_concurrent_add_node_is_first_writer_wins() {
    let cluster = TestCluster::start().await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..50 {
        let mut client = cluster.peer_client().await;
        tasks.spawn(async move {
            client
                .add_node(AddNodeRequest {
                    name: "dup".into(),
                    datacenter: "dc1".into(),
                    location: "eu".into(),
                    role: fleetreg_proto::common::NodeRole::Agent.into(),
                })
                .await
        });
    }

    let results = tasks.join_all().await;
    let (created, conflicted): (Vec<_>, Vec<_>) =
        results.into_iter().partition(|r| r.is_ok());

    assert_eq!(created.len(), 1);
    assert_eq!(conflicted.len(), 49);
    for error in conflicted {
        assert_eq!(error.unwrap_err().code(), Code::AlreadyExists);
    }
}

#[tokio::test]
async fn test_heartbeat_before_register_creates_the_lease() {
    let cluster = TestCluster::start().await;
    let creds = cluster.add_node("n1", "dc1", "eu", NodeRole::Agent).await;

    let mut node_api = NodeApiClient::new(cluster.node_channel(&creds).await);
    node_api.heartbeat(HeartbeatRequest {}).await.unwrap();

    use fleetreg_core::kv::KvEngine;
    use fleetreg_core::kv::RangeRequest;
    let lease = cluster
        .kv
        .range(RangeRequest::single(
            fleetreg_core::keys::node_lease_key("dc1", "n1"),
        ))
        .await
        .unwrap();
    assert_eq!(lease.len(), 1);
}

#[tokio::test]
async fn test_config_reports_addresses_and_schedule() {
    let cluster = TestCluster::start().await;
    let creds = cluster.add_node("n1", "dc1", "eu", NodeRole::Agent).await;

    fleetreg_server::publish_agent_api_addr(cluster.kv.as_ref(), "peer-a", "127.0.0.1:2382")
        .await
        .unwrap();

    let mut node_api = NodeApiClient::new(cluster.node_channel(&creds).await);
    let response = node_api.config(ConfigRequest {}).await.unwrap().into_inner();

    assert_eq!(response.registry_addrs, vec!["127.0.0.1:2382".to_string()]);
    assert_eq!(response.heartbeat_period_seconds, 15);
    // A freshly minted certificate is not rotated.
    assert!(response.certificate.is_none());
    assert!(response.renew_period_seconds > 0);
}

#[tokio::test]
async fn test_reissued_credentials_still_authenticate() {
    let cluster = TestCluster::start().await;
    cluster.add_node("n1", "dc1", "eu", NodeRole::Agent).await;

    // Out-of-band rotation through the admin plane.
    let reissued = cluster
        .peer_client()
        .await
        .get_node_credentials(GetNodeCredentialsRequest {
            name: "n1".into(),
            datacenter: "dc1".into(),
        })
        .await
        .unwrap()
        .into_inner();

    let creds = fleetreg_core::ca::CertifiedKey {
        cert_pem: String::from_utf8(reissued.certificate).unwrap(),
        key_pem: String::from_utf8(reissued.key).unwrap(),
    };
    let mut agent = cluster.agent_client(&creds).await;
    agent.register(register_request("web", "a")).await.unwrap();

    // Unknown nodes get nothing reissued.
    let status = cluster
        .peer_client()
        .await
        .get_node_credentials(GetNodeCredentialsRequest {
            name: "ghost".into(),
            datacenter: "dc1".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_add_self_peer_validates_urls() {
    let cluster = TestCluster::start().await;
    let mut peer_api = cluster.peer_client().await;

    let status = peer_api
        .add_self_peer(fleetreg_proto::peer::AddSelfPeerRequest {
            advertised_urls: vec![],
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = peer_api
        .add_self_peer(fleetreg_proto::peer::AddSelfPeerRequest {
            advertised_urls: vec!["not a url".into()],
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    peer_api
        .add_self_peer(fleetreg_proto::peer::AddSelfPeerRequest {
            advertised_urls: vec!["https://10.0.0.2:2380".into()],
        })
        .await
        .unwrap();

    let peers = peer_api
        .get_peers(fleetreg_proto::peer::GetPeersRequest {})
        .await
        .unwrap()
        .into_inner()
        .peers;
    assert_eq!(peers.len(), 1);
    // Membership is named after the certificate CN, not the request.
    assert_eq!(peers[0].name, "peer-a");
}
