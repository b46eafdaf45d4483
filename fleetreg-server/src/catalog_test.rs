use std::net::IpAddr;

use fleetreg_core::keys::dc_service_key;
use fleetreg_core::keys::service_key;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::NodeRecord;
use fleetreg_core::NodeRole;
use fleetreg_proto::agent::RegisterServiceRequest;
use fleetreg_proto::common::PortSpec;

use crate::catalog;
use crate::substrate::MemKv;

fn agent_record() -> NodeRecord {
    NodeRecord {
        name: "n1".into(),
        datacenter: "dc1".into(),
        location: "eu".into(),
        role: NodeRole::Agent,
    }
}

fn web_request() -> RegisterServiceRequest {
    RegisterServiceRequest {
        service: "web".into(),
        instance: "a".into(),
        addresses: vec![],
        ports: vec![PortSpec::new("http", 8080, "tcp")],
        metrics_port: 9100,
    }
}

fn source() -> Option<IpAddr> {
    Some("10.0.0.5".parse().unwrap())
}

#[tokio::test]
async fn test_register_stamps_identity_and_source_address() {
    let kv = MemKv::new();
    let node = agent_record();

    let spec = catalog::register(&kv, &node, web_request(), source())
        .await
        .unwrap();

    assert_eq!(spec.location, "eu");
    assert_eq!(spec.datacenter, "dc1");
    assert_eq!(spec.node, "n1");
    assert_eq!(spec.addresses, vec!["10.0.0.5".to_string()]);

    // Both index keys exist, carry the same value and the same lease.
    let primary = kv
        .range(RangeRequest::single(service_key("web", "eu", "dc1", "n1", "a")))
        .await
        .unwrap();
    let secondary = kv
        .range(RangeRequest::single(dc_service_key("dc1", "n1", "web", "a")))
        .await
        .unwrap();
    assert_eq!(primary.len(), 1);
    assert_eq!(secondary.len(), 1);
    assert_eq!(primary[0].value, secondary[0].value);
    assert_eq!(primary[0].lease, secondary[0].lease);
    assert_ne!(primary[0].lease, 0);
}

#[tokio::test]
async fn test_register_keeps_explicit_addresses() {
    let kv = MemKv::new();
    let node = agent_record();

    let mut req = web_request();
    req.addresses = vec!["192.168.1.10".into(), "fd00::10".into()];
    let spec = catalog::register(&kv, &node, req, source()).await.unwrap();

    assert_eq!(
        spec.addresses,
        vec!["192.168.1.10".to_string(), "fd00::10".to_string()]
    );
}

#[tokio::test]
async fn test_register_twice_overwrites_single_pair() {
    let kv = MemKv::new();
    let node = agent_record();

    catalog::register(&kv, &node, web_request(), source())
        .await
        .unwrap();
    let mut second = web_request();
    second.metrics_port = 9200;
    catalog::register(&kv, &node, second, source()).await.unwrap();

    let primaries = kv
        .range(RangeRequest::prefix(b"svc/".to_vec(), 0))
        .await
        .unwrap();
    let secondaries = kv
        .range(RangeRequest::prefix(b"dcsvc/".to_vec(), 0))
        .await
        .unwrap();
    assert_eq!(primaries.len(), 1);
    assert_eq!(secondaries.len(), 1);

    let stored: fleetreg_proto::common::ServiceSpec =
        serde_json::from_slice(&primaries[0].value).unwrap();
    assert_eq!(stored.metrics_port, 9200);
}

#[tokio::test]
async fn test_register_rejects_malformed_names() {
    let kv = MemKv::new();
    let node = agent_record();

    let mut req = web_request();
    req.service = "we/b".into();
    assert!(catalog::register(&kv, &node, req, source()).await.is_err());

    let mut req = web_request();
    req.instance = String::new();
    assert!(catalog::register(&kv, &node, req, source()).await.is_err());
}

#[tokio::test]
async fn test_deregister_removes_both_keys_and_is_idempotent() {
    let kv = MemKv::new();
    let node = agent_record();

    catalog::register(&kv, &node, web_request(), source())
        .await
        .unwrap();
    catalog::deregister(&kv, &node, "web", "a").await.unwrap();

    assert!(kv
        .range(RangeRequest::prefix(b"svc/".to_vec(), 0))
        .await
        .unwrap()
        .is_empty());
    assert!(kv
        .range(RangeRequest::prefix(b"dcsvc/".to_vec(), 0))
        .await
        .unwrap()
        .is_empty());

    // Deleting the nonexistent pair again succeeds and changes nothing.
    catalog::deregister(&kv, &node, "web", "a").await.unwrap();
    catalog::deregister(&kv, &node, "ghost", "x").await.unwrap();
}

#[tokio::test]
async fn test_reset_evicts_everything_the_node_registered() {
    let kv = MemKv::new();
    let node = agent_record();

    catalog::register(&kv, &node, web_request(), source())
        .await
        .unwrap();
    let mut other = web_request();
    other.service = "api".into();
    catalog::register(&kv, &node, other, source()).await.unwrap();

    catalog::reset(&kv, &node).await.unwrap();

    assert!(kv
        .range(RangeRequest::prefix(b"svc/".to_vec(), 0))
        .await
        .unwrap()
        .is_empty());
    assert!(kv
        .range(RangeRequest::prefix(b"dcsvc/".to_vec(), 0))
        .await
        .unwrap()
        .is_empty());

    // Reset on an already clean node is fine.
    catalog::reset(&kv, &node).await.unwrap();
}
