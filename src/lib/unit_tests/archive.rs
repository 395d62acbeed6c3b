// SPDX-License-Identifier: Apache-2.0

use super::testlib::{parse_tree, schema};
use crate::{CommitArchive, ErrorKind};

fn host(name: &str) -> String {
    format!("system {{\n    host-name {name};\n}}\n")
}

#[test]
fn test_archive_empty() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CommitArchive::new(&dir.path().join("archive"), 10);
    assert!(archive.log().unwrap().is_empty());
    let e = archive.revision(&schema(), 0).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::NotFound);
    assert_eq!(
        e.msg(),
        "Revision 0 does not exist, the archive holds 0 revisions"
    );
}

#[test]
fn test_archive_record_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CommitArchive::new(dir.path(), 10);
    let entry = archive
        .record(&parse_tree(&host("r1")), "alice", "initial setup")
        .unwrap();
    assert_eq!(entry.revision, 1);
    assert_eq!(entry.user, "alice");
    assert_eq!(entry.comment, "initial setup");
    archive.record(&parse_tree(&host("r2")), "root", "").unwrap();

    let log = archive.log().unwrap();
    assert_eq!(
        log.iter().map(|e| e.revision).collect::<Vec<_>>(),
        vec![2, 1]
    );
    assert_eq!(log[1], entry);
    assert_eq!(archive.revision(&schema(), 0).unwrap(), parse_tree(&host("r2")));
    assert_eq!(archive.revision(&schema(), 1).unwrap(), parse_tree(&host("r1")));
}

#[test]
fn test_archive_drops_oldest_revisions() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CommitArchive::new(dir.path(), 2);
    for name in ["r1", "r2", "r3"] {
        archive.record(&parse_tree(&host(name)), "root", name).unwrap();
    }
    let log = archive.log().unwrap();
    assert_eq!(
        log.iter().map(|e| e.comment.as_str()).collect::<Vec<_>>(),
        vec!["r3", "r2"]
    );
    assert!(!dir.path().join("config.boot.1").exists());
    assert!(dir.path().join("config.boot.3").exists());
    assert_eq!(
        archive.revision(&schema(), 2).unwrap_err().msg(),
        "Revision 2 does not exist, the archive holds 2 revisions"
    );
}

#[test]
fn test_archive_compare() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CommitArchive::new(dir.path(), 10);
    archive
        .record(
            &parse_tree("system {\n    host-name r1;\n    name-server 192.0.2.53;\n}\n"),
            "root",
            "",
        )
        .unwrap();
    let current = parse_tree(
        "system {\n    domain-name example.com;\n    host-name r2;\n}\n",
    );
    assert_eq!(
        archive.compare(&schema(), 0, &current).unwrap(),
        "- set system host-name 'r1'\n\
        - set system name-server '192.0.2.53'\n\
        + set system domain-name 'example.com'\n\
        + set system host-name 'r2'"
    );
    assert_eq!(
        archive.compare(&schema(), 0, &parse_tree(&host("r1"))).unwrap(),
        "- set system name-server '192.0.2.53'"
    );
}
