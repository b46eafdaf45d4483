use std::net::IpAddr;

use fleetreg_core::NodeRecord;
use fleetreg_core::NodeRole;
use fleetreg_proto::agent::DiscoverRequest;
use fleetreg_proto::agent::RegisterServiceRequest;

use crate::catalog;
use crate::discover::discover;
use crate::substrate::MemKv;

fn record(location: &str, dc: &str, name: &str) -> NodeRecord {
    NodeRecord {
        name: name.into(),
        datacenter: dc.into(),
        location: location.into(),
        role: NodeRole::Agent,
    }
}

fn query(service: &str) -> DiscoverRequest {
    DiscoverRequest {
        service: service.into(),
        location: None,
        datacenter: None,
        node: None,
        instance: None,
    }
}

async fn seed(kv: &MemKv, location: &str, dc: &str, node: &str, service: &str, instance: &str) {
    let source: Option<IpAddr> = Some(format!("10.0.{}.1", instance.len()).parse().unwrap());
    catalog::register(
        kv,
        &record(location, dc, node),
        RegisterServiceRequest {
            service: service.into(),
            instance: instance.into(),
            addresses: vec![],
            ports: vec![],
            metrics_port: 0,
        },
        source,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_same_node_match() {
    let kv = MemKv::new();
    seed(&kv, "eu", "dc1", "n1", "web", "a").await;

    let found = discover(&kv, &record("eu", "dc1", "n1"), &query("web"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].node, "n1");
    assert_eq!(found[0].datacenter, "dc1");
    assert_eq!(found[0].location, "eu");
}

#[tokio::test]
async fn test_widening_order_is_node_dc_location_global() {
    let kv = MemKv::new();
    seed(&kv, "eu", "dc1", "n1", "web", "a").await; // caller's node
    seed(&kv, "eu", "dc1", "n2", "web", "b").await; // same datacenter
    seed(&kv, "eu", "dc2", "n3", "web", "c").await; // same location
    seed(&kv, "us", "dc9", "n9", "web", "d").await; // global

    let found = discover(&kv, &record("eu", "dc1", "n1"), &query("web"))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    // Narrower scope first, no duplicates of the caller's own entry.
    assert_eq!(found[0].node, "n1");
    assert_eq!(found[1].node, "n2");
    assert_eq!(found[2].node, "n3");
}

#[tokio::test]
async fn test_cross_scope_widening_from_empty_node() {
    let kv = MemKv::new();
    seed(&kv, "eu", "dc1", "n1", "web", "a").await;
    seed(&kv, "eu", "dc2", "n2", "web", "b").await;

    // A third agent with nothing local sees both through fallback.
    let found = discover(&kv, &record("eu", "dc3", "n3"), &query("web"))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn test_result_cap() {
    let kv = MemKv::new();
    for i in 0..5 {
        seed(&kv, "eu", "dc1", &format!("n{i}"), "web", "a").await;
    }

    let found = discover(&kv, &record("eu", "dc1", "n0"), &query("web"))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn test_pinned_node_disables_fallback() {
    let kv = MemKv::new();
    seed(&kv, "eu", "dc1", "n2", "web", "a").await;

    let mut req = query("web");
    req.node = Some("n9".into());
    let found = discover(&kv, &record("eu", "dc1", "n1"), &req)
        .await
        .unwrap();
    // n9 has nothing and the pin forbids widening past the node scope.
    assert!(found.is_empty());

    req.node = Some("n2".into());
    let found = discover(&kv, &record("eu", "dc1", "n1"), &req)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].node, "n2");
}

#[tokio::test]
async fn test_pinned_datacenter_stops_at_location() {
    let kv = MemKv::new();
    seed(&kv, "eu", "dc2", "n2", "web", "a").await;
    seed(&kv, "us", "dc9", "n9", "web", "b").await;

    let mut req = query("web");
    req.datacenter = Some("dc1".into());
    let found = discover(&kv, &record("eu", "dc1", "n1"), &req)
        .await
        .unwrap();
    // dc1 is empty; the pin blocks the location and global passes.
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_pinned_location_stops_global_fallback() {
    let kv = MemKv::new();
    seed(&kv, "us", "dc9", "n9", "web", "a").await;

    let mut req = query("web");
    req.location = Some("eu".into());
    let found = discover(&kv, &record("eu", "dc1", "n1"), &req)
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_instance_lookup() {
    let kv = MemKv::new();
    seed(&kv, "eu", "dc1", "n1", "web", "a").await;
    seed(&kv, "eu", "dc1", "n1", "web", "b").await;

    let mut req = query("web");
    req.instance = Some("b".into());
    req.node = Some("n1".into());
    let found = discover(&kv, &record("eu", "dc1", "n1"), &req)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].instance, "b");
}

#[tokio::test]
async fn test_unknown_service_is_empty_not_error() {
    let kv = MemKv::new();
    let found = discover(&kv, &record("eu", "dc1", "n1"), &query("nothing"))
        .await
        .unwrap();
    assert!(found.is_empty());
}
