// SPDX-License-Identifier: Apache-2.0

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use super::testlib::{parse_tree, path, schema};
use crate::{ConfigStore, ConfigValue, ErrorKind};

#[test]
fn test_store_session_is_isolated_from_running() {
    let mut store = ConfigStore::with_running(
        schema(),
        parse_tree("system {\n    host-name r1;\n}\n"),
    );
    assert!(!store.has_pending_changes());

    store
        .set(&path("system host-name"), Some("r2"))
        .unwrap();
    assert!(store.has_pending_changes());
    assert_eq!(
        store.value(&path("system host-name")).unwrap(),
        Some(ConfigValue::String("r2".to_string()))
    );
    assert_eq!(
        store.running().value(&path("system host-name")).unwrap(),
        Some(&ConfigValue::String("r1".to_string()))
    );

    store.discard();
    assert!(!store.has_pending_changes());
    assert_eq!(
        store.value(&path("system host-name")).unwrap(),
        Some(ConfigValue::String("r1".to_string()))
    );
}

#[test]
fn test_store_revert_edit_is_not_pending() {
    let mut store = ConfigStore::with_running(
        schema(),
        parse_tree("vrf {\n    name red {\n        table 100;\n    }\n}\n"),
    );
    store.delete(&path("vrf name red")).unwrap();
    assert!(store.has_pending_changes());
    assert!(!store.exists(&path("vrf")));
    store.set(&path("vrf name red table"), Some("100")).unwrap();
    assert!(!store.has_pending_changes());
}

#[test]
fn test_store_failed_edit_keeps_session() {
    let mut store = ConfigStore::new(schema());
    store
        .set(&path("interfaces dummy dum0 mtu"), Some("9000"))
        .unwrap();
    let e = store
        .set(&path("interfaces dummy dum0 mtu"), Some("99999"))
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::SchemaViolation);
    assert_eq!(
        store.value(&path("interfaces dummy dum0 mtu")).unwrap(),
        Some(ConfigValue::Integer(9000))
    );
    let e = store.delete(&path("interfaces dummy dum1")).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::NotFound);
}

#[test]
fn test_store_rename_and_list() {
    let mut store = ConfigStore::new(schema());
    store.set(&path("interfaces dummy dum0"), None).unwrap();
    store
        .rename(&path("interfaces dummy dum0"), "dum5")
        .unwrap();
    store.copy(&path("interfaces dummy dum5"), "dum6").unwrap();
    assert_eq!(
        store.list_children(&path("interfaces dummy")).unwrap(),
        vec!["dum5".to_string(), "dum6".to_string()]
    );
}

#[test]
fn test_store_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config/config.boot");
    let running = parse_tree(
        "interfaces {\n    dummy dum0 {\n        address 10.0.0.1/32;\n    }\n}\n",
    );
    let store = ConfigStore::with_running(schema(), running.clone());
    store.save(&file).unwrap();
    let mode = std::fs::metadata(&file).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o660);

    let mut other = ConfigStore::new(schema());
    other.set(&path("system host-name"), Some("r9")).unwrap();
    other.load(&file).unwrap();
    assert_eq!(other.running().as_ref(), &running);
    assert!(!other.has_pending_changes());
    assert!(!other.exists(&path("system host-name")));
}

#[test]
fn test_store_load_session_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("candidate.conf");
    std::fs::write(&file, "system {\n    host-name r2;\n}\n").unwrap();

    let running = Arc::new(parse_tree("system {\n    host-name r1;\n}\n"));
    let mut store = ConfigStore::with_running(schema(), running.as_ref().clone());
    store.load_session(&file).unwrap();
    assert!(store.has_pending_changes());
    assert_eq!(store.running(), running);
}

#[test]
fn test_store_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ConfigStore::new(schema());
    let e = store.load(&dir.path().join("absent.boot")).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::StorageFailure);
}

#[test]
fn test_store_load_invalid_file_keeps_state() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("broken.boot");
    std::fs::write(&file, "system {\n    host-name r2;\n").unwrap();
    let mut store = ConfigStore::with_running(
        schema(),
        parse_tree("system {\n    host-name r1;\n}\n"),
    );
    assert!(store.load(&file).is_err());
    assert_eq!(
        store.value(&path("system host-name")).unwrap(),
        Some(ConfigValue::String("r1".to_string()))
    );
}
