use fleetreg_core::keys::dc_service_key;
use fleetreg_core::kv::KeyValue;
use fleetreg_core::kv::WatchEvent;
use fleetreg_proto::common::ServiceSpec;
use fleetreg_proto::observer::watch_datacenter_services_response::Notification;

use crate::datacenter_snapshot;
use crate::substrate::MemKv;
use crate::translate_event;

fn put_event(key: Vec<u8>, spec: &ServiceSpec) -> WatchEvent {
    WatchEvent::Put(KeyValue {
        key,
        value: serde_json::to_vec(spec).unwrap(),
        version: 1,
        create_revision: 1,
        lease: 0,
    })
}

#[test]
fn test_translate_put_to_update() {
    let spec = ServiceSpec {
        service_name: "web".into(),
        instance: "a".into(),
        datacenter: "dc1".into(),
        node: "n1".into(),
        ..Default::default()
    };

    let response =
        translate_event(put_event(dc_service_key("dc1", "n1", "web", "a"), &spec)).unwrap();
    match response.notification.unwrap() {
        Notification::Update(update) => assert_eq!(update.service.unwrap(), spec),
        other => panic!("expected update, got {other:?}"),
    }
}

#[test]
fn test_translate_delete_parses_key_tail() {
    let response = translate_event(WatchEvent::Delete {
        key: dc_service_key("dc1", "n1", "web", "a"),
    })
    .unwrap();

    match response.notification.unwrap() {
        Notification::Delete(delete) => {
            assert_eq!(delete.node, "n1");
            assert_eq!(delete.service_name, "web");
            assert_eq!(delete.instance, "a");
        }
        other => panic!("expected delete, got {other:?}"),
    }
}

#[test]
fn test_translate_rejects_garbage() {
    // Undecodable value on a put.
    let garbage = WatchEvent::Put(KeyValue {
        key: dc_service_key("dc1", "n1", "web", "a"),
        value: b"not json".to_vec(),
        version: 1,
        create_revision: 1,
        lease: 0,
    });
    assert!(translate_event(garbage).is_err());

    // Key too short to carry an identity on a delete.
    assert!(translate_event(WatchEvent::Delete {
        key: b"dcsvc/dc1".to_vec(),
    })
    .is_err());
}

#[tokio::test]
async fn test_snapshot_is_scoped_to_datacenter() {
    use fleetreg_core::kv::KvEngine;

    let kv = MemKv::new();
    let spec = ServiceSpec {
        service_name: "web".into(),
        instance: "a".into(),
        datacenter: "dc1".into(),
        node: "n1".into(),
        ..Default::default()
    };
    kv.put(
        dc_service_key("dc1", "n1", "web", "a"),
        serde_json::to_vec(&spec).unwrap(),
    )
    .await
    .unwrap();
    kv.put(
        dc_service_key("dc2", "n2", "web", "b"),
        serde_json::to_vec(&ServiceSpec::default()).unwrap(),
    )
    .await
    .unwrap();

    let services = datacenter_snapshot(&kv, "dc1").await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0], spec);

    assert!(datacenter_snapshot(&kv, "dc3").await.unwrap().is_empty());
}
