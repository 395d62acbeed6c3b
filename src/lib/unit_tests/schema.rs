// SPDX-License-Identifier: Apache-2.0

use serde_json::json;

use super::testlib::{path, schema};
use crate::{ErrorKind, NodeKind, Schema};

#[test]
fn test_schema_resolve() {
    let schema = schema();
    assert!(schema.is_tag(&path("interfaces ethernet")));
    assert!(schema.is_tag_value(&path("interfaces ethernet eth0")));
    assert!(schema.is_leaf(&path("interfaces ethernet eth0 mtu")));
    assert!(schema.is_multi(&path("interfaces ethernet eth0 address")));
    assert!(!schema.is_multi(&path("interfaces ethernet eth0 mtu")));
    assert!(schema.is_secret(&path("pki certificate web private key")));
    let node = schema.resolve(&path("vrf bind-to-all")).unwrap();
    assert!(node.node.is_valueless());
    assert_eq!(node.node.kind(), NodeKind::Leaf);
}

#[test]
fn test_schema_invalid_path() {
    let e = schema()
        .resolve(&path("interfaces ethernet eth0 speed"))
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::SchemaViolation);
    assert_eq!(
        e.msg(),
        "Configuration path: [interfaces ethernet eth0 speed] is not valid"
    );
}

#[test]
fn test_schema_tag_value_rules() {
    let schema = schema();
    assert!(schema.resolve(&path("interfaces ethernet eth1")).is_ok());
    assert!(schema.resolve(&path("interfaces ethernet br0")).is_err());
    assert!(schema.resolve(&path("interfaces ethernet eth")).is_err());
    assert!(schema.resolve(&path("policy route-map RM rule 10")).is_ok());
    assert!(schema.resolve(&path("policy route-map RM rule 0")).is_err());
    assert!(schema.resolve(&path("policy route-map RM rule ten")).is_err());
    assert!(schema
        .resolve(&path(
            "service dhcp-server shared-network-name LAN subnet 10.0.0.0/24"
        ))
        .is_ok());
}

#[test]
fn test_schema_defaults() {
    let schema = schema();
    let defaults = schema.defaults(&path("system"), false).unwrap();
    assert_eq!(defaults.get("host-name"), Some(&json!("router")));
    let defaults = schema
        .defaults(&path("service dns forwarding"), false)
        .unwrap();
    assert_eq!(defaults.get("cache-size"), Some(&json!("10000")));
    assert_eq!(defaults.get("port"), Some(&json!("53")));
    assert!(defaults.get("allow-from").is_none());
}

#[test]
fn test_schema_merge_defaults_keeps_configured() {
    let schema = schema();
    let mut value = json!({"eth0": {"mtu": "9000"}, "eth1": {}});
    schema
        .merge_defaults(&path("interfaces ethernet"), &mut value, true)
        .unwrap();
    assert_eq!(value["eth0"]["mtu"], json!("9000"));
    assert_eq!(value["eth1"]["mtu"], json!("1500"));

    let mut value = json!({"eth0": {}});
    schema
        .merge_defaults(&path("interfaces ethernet"), &mut value, false)
        .unwrap();
    assert_eq!(value, json!({"eth0": {}}));
}

#[test]
fn test_schema_from_yaml_rejects_bad_node() {
    let result = Schema::from_yaml(
        r#"---
foo:
  type: leaf-list
  value: none
"#,
    );
    assert!(result.is_err());
    if let Err(e) = result {
        assert_eq!(e.kind(), ErrorKind::Bug);
    }
}
