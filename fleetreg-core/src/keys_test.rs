use super::keys::*;

#[test]
fn test_key_builders() {
    assert_eq!(node_key("dc1", "n1"), b"nodes/dc1/n1");
    assert_eq!(node_lease_key("dc1", "n1"), b"node_lease/dc1/n1");
    assert_eq!(peer_agent_api_key("peer-a"), b"peer_agent_api/peer-a");
    assert_eq!(
        service_key("web", "eu", "dc1", "n1", "a"),
        b"svc/web/eu/dc1/n1/a"
    );
    assert_eq!(dc_service_key("dc1", "n1", "web", "a"), b"dcsvc/dc1/n1/web/a");
}

#[test]
fn test_service_prefixes_narrow_to_wide() {
    let p = ServicePrefixes::new("web", "eu", "dc1", "n1");
    assert_eq!(p.service, b"svc/web/");
    assert_eq!(p.location, b"svc/web/eu/");
    assert_eq!(p.datacenter, b"svc/web/eu/dc1/");
    assert_eq!(p.node, b"svc/web/eu/dc1/n1/");
}

#[test]
fn test_dc_prefix_does_not_match_sibling_datacenter() {
    let prefix = dc_service_prefix("dc1");
    assert!(dc_service_key("dc1", "n1", "web", "a").starts_with(&prefix));
    assert!(!dc_service_key("dc10", "n1", "web", "a").starts_with(&prefix));
}

#[test]
fn test_parse_dc_service_key() {
    let key = dc_service_key("dc1", "n1", "web", "a");
    let tail = parse_dc_service_key(&key).unwrap();
    assert_eq!(
        tail,
        DcServiceKeyTail {
            node: "n1".into(),
            service_name: "web".into(),
            instance: "a".into(),
        }
    );

    assert!(parse_dc_service_key(b"dcsvc/short").is_none());
    assert!(parse_dc_service_key(&[0xff, 0xfe]).is_none());
}

#[test]
fn test_prefix_end_covers_prefix_range() {
    assert_eq!(prefix_end(b"svc/web/"), b"svc/web0");
    assert_eq!(prefix_end(b"a"), b"b");
    // Trailing 0xff pushes the increment one byte left.
    assert_eq!(prefix_end(&[b'a', 0xff]), b"b");
}

#[test]
fn test_validate_segment() {
    assert!(validate_segment("name", "n1").is_ok());
    assert!(validate_segment("name", "").is_err());
    assert!(validate_segment("name", "a/b").is_err());
}
