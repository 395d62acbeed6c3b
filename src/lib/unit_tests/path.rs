// SPDX-License-Identifier: Apache-2.0

use crate::{ConfigPath, ErrorKind};

#[test]
fn test_path_parse_and_display() {
    let path: ConfigPath = "interfaces  ethernet eth0 address".parse().unwrap();
    assert_eq!(path.len(), 4);
    assert_eq!(path.last(), Some("address"));
    assert_eq!(path.to_string(), "interfaces ethernet eth0 address");
    assert_eq!(
        path.parent(),
        Some(ConfigPath::from(["interfaces", "ethernet", "eth0"]))
    );
}

#[test]
fn test_path_reject_reserved_chars() {
    let result = "interfaces {".parse::<ConfigPath>();
    assert!(result.is_err());
    if let Err(e) = result {
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn test_path_prefix() {
    let path = ConfigPath::from(["vrf", "name", "red", "table"]);
    assert!(path.starts_with(&ConfigPath::from(["vrf", "name"])));
    assert!(!path.starts_with(&ConfigPath::from(["vrf", "bind-to-all"])));
    assert!(path.starts_with(&ConfigPath::new()));
    assert_eq!(
        ConfigPath::from(["vrf"]).child("name").join(&["red"].into()),
        ConfigPath::from(["vrf", "name", "red"])
    );
    assert_eq!(ConfigPath::new().parent(), None);
}
