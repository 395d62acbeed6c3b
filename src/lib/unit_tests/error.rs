// SPDX-License-Identifier: Apache-2.0

use crate::{ErrorKind, RtconfError};

#[test]
fn test_error_display_with_path() {
    let e = RtconfError::new_with_path(
        ErrorKind::ConfigError,
        "vrf name red",
        "VRF \"red\" table id is mandatory".to_string(),
    );
    assert_eq!(e.path(), "vrf name red");
    assert!(e.to_string().contains("vrf name red"));
    assert!(e.to_string().contains("table id is mandatory"));
}

#[test]
fn test_error_combined_is_flat() {
    let a = RtconfError::new(ErrorKind::ConfigError, "a".to_string());
    let b = RtconfError::new(ErrorKind::ConfigError, "b".to_string());
    let c = RtconfError::new(ErrorKind::ConfigError, "c".to_string());
    let inner =
        RtconfError::combined(ErrorKind::ConfigError, "ab".to_string(), vec![a, b]);
    let outer = RtconfError::combined(
        ErrorKind::ConfigError,
        "all".to_string(),
        vec![inner, c],
    );
    let msgs: Vec<&str> = outer.causes().iter().map(|e| e.msg()).collect();
    assert_eq!(msgs, vec!["a", "b", "c"]);
    assert!(outer.causes().iter().all(|e| e.causes().is_empty()));
}

#[test]
fn test_error_with_handler_marks_causes() {
    let cause = RtconfError::new(ErrorKind::CommandFailed, "exit 2".to_string());
    let e = RtconfError::combined(
        ErrorKind::ApplyError,
        "Failed to apply vrf".to_string(),
        vec![cause],
    )
    .with_handler("vrf");
    assert_eq!(e.handler(), "vrf");
    assert_eq!(e.causes()[0].handler(), "vrf");
    assert!(e.to_string().contains("exit 2"));
}
