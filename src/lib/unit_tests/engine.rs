// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use super::testlib::{parse_tree, path, FakeCommandRunner, TestEnv};
use crate::{CancelToken, CommitOptions, Engine, ErrorKind};

fn set_host_name(env: &mut TestEnv, name: &str) {
    env.engine
        .store_mut()
        .set(&path("system host-name"), Some(name))
        .unwrap();
}

#[test]
fn test_engine_commit_is_archived() {
    let mut env = TestEnv::new();
    set_host_name(&mut env, "r1");
    env.engine
        .commit(&CommitOptions::new().with_user("alice").with_comment("first"))
        .unwrap();
    set_host_name(&mut env, "r2");
    env.engine.commit(&CommitOptions::new()).unwrap();

    let log = env.engine.log().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].revision, 2);
    assert_eq!(log[0].user, "root");
    assert_eq!(log[0].comment, "");
    assert_eq!(log[1].user, "alice");
    assert_eq!(log[1].comment, "first");
}

#[test]
fn test_engine_archive_keeps_max_revisions() {
    let mut env = TestEnv::new();
    for name in ["r1", "r2", "r3", "r4"] {
        set_host_name(&mut env, name);
        env.engine.commit(&CommitOptions::new()).unwrap();
    }
    let log = env.engine.log().unwrap();
    assert_eq!(
        log.iter().map(|e| e.revision).collect::<Vec<_>>(),
        vec![4, 3, 2]
    );
}

#[test]
fn test_engine_compare_revision() {
    let mut env = TestEnv::new();
    set_host_name(&mut env, "r1");
    env.engine.commit(&CommitOptions::new()).unwrap();
    set_host_name(&mut env, "r2");
    env.engine.commit(&CommitOptions::new()).unwrap();

    assert_eq!(env.engine.compare_revision(0).unwrap(), "");
    assert_eq!(
        env.engine.compare_revision(1).unwrap(),
        "- set system host-name 'r1'\n+ set system host-name 'r2'"
    );
}

#[test]
fn test_engine_rollback() {
    let mut env = TestEnv::new();
    set_host_name(&mut env, "r1");
    env.engine.commit(&CommitOptions::new()).unwrap();
    set_host_name(&mut env, "r2");
    env.engine.commit(&CommitOptions::new()).unwrap();
    env.runner.clear_commands();

    let report = env.engine.rollback(1, &CommitOptions::new()).unwrap();
    assert_eq!(report.handlers, vec!["system_host_name"]);
    assert_eq!(env.runner.commands(), vec!["hostname r1"]);
    assert_eq!(
        env.engine.store().running().as_ref(),
        &parse_tree("system {\n    host-name r1;\n}\n")
    );
    assert_eq!(env.engine.log().unwrap().len(), 3);
    assert_eq!(env.read("/etc/hostname").unwrap().trim(), "r1");
}

#[test]
fn test_engine_rollback_failure_keeps_running() {
    let mut env = TestEnv::new();
    set_host_name(&mut env, "r1");
    env.engine.commit(&CommitOptions::new()).unwrap();
    set_host_name(&mut env, "r2");
    env.engine.commit(&CommitOptions::new()).unwrap();

    let e = env.engine.rollback(5, &CommitOptions::new()).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::NotFound);

    env.runner.fail_on("hostname", 1, "hostname: you must be root");
    let e = env.engine.rollback(1, &CommitOptions::new()).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::ApplyError);
    assert!(!env.engine.store().has_pending_changes());
    assert_eq!(
        env.engine
            .store()
            .running()
            .value(&path("system host-name"))
            .unwrap()
            .map(|v| v.to_string()),
        Some("r2".to_string())
    );
}

#[test]
fn test_engine_save_and_open() {
    let mut env = TestEnv::new();
    env.candidate(
        r#"system {
    host-name r1;
}
vrf {
    name red {
        table 100;
    }
}
"#,
    );
    env.engine.commit(&CommitOptions::new()).unwrap();
    env.engine.save().unwrap();
    assert!(env.engine.config().config_file.exists());

    let mut engine = Engine::with_runner(
        env.engine.config().clone(),
        Arc::new(FakeCommandRunner::new()),
        CancelToken::new(),
    )
    .unwrap();
    assert!(engine.store().running().is_empty());
    engine.open().unwrap();
    assert_eq!(engine.store().running(), env.engine.store().running());
    assert!(!engine.store().has_pending_changes());
}

#[test]
fn test_engine_open_without_saved_config() {
    let mut env = TestEnv::new();
    env.engine.open().unwrap();
    assert!(env.engine.store().running().is_empty());
}

fn host_name(env: &TestEnv) -> Option<String> {
    env.engine
        .store()
        .running()
        .value(&path("system host-name"))
        .ok()
        .flatten()
        .map(|v| v.to_string())
}

#[test]
fn test_engine_load_revision_only_touches_session() {
    let mut env = TestEnv::new();
    set_host_name(&mut env, "r1");
    env.engine.commit(&CommitOptions::new()).unwrap();
    set_host_name(&mut env, "r2");
    env.engine.commit(&CommitOptions::new()).unwrap();
    env.runner.clear_commands();

    env.engine.load_revision(1).unwrap();
    assert!(env.engine.store().has_pending_changes());
    assert_eq!(host_name(&env), Some("r2".to_string()));
    assert!(env.runner.commands().is_empty());
    assert_eq!(env.engine.log().unwrap().len(), 2);

    assert_eq!(
        env.engine.load_revision(7).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    env.engine.commit(&CommitOptions::new()).unwrap();
    assert_eq!(host_name(&env), Some("r1".to_string()));
}

#[test]
fn test_engine_commit_confirm_and_confirm() {
    let mut env = TestEnv::new();
    set_host_name(&mut env, "r1");
    env.engine.commit(&CommitOptions::new()).unwrap();
    set_host_name(&mut env, "r2");
    env.runner.clear_commands();

    env.engine
        .commit_confirm(5, &CommitOptions::new().with_user("alice"))
        .unwrap();
    assert!(env.runner.ran(
        "systemd-run --quiet --on-active=5m --unit=rtconf-commit-confirm \
        /usr/bin/rtconfctl revert"
    ));
    let pending = env.engine.pending_confirm().unwrap().unwrap();
    assert_eq!(pending.revision, Some(1));
    assert_eq!(pending.user, "alice");
    assert_eq!(host_name(&env), Some("r2".to_string()));

    set_host_name(&mut env, "r3");
    let e = env
        .engine
        .commit_confirm(5, &CommitOptions::new())
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    assert!(e.msg().starts_with("Another confirm is pending"));
    env.engine.store_mut().discard();

    assert!(env.engine.confirm().unwrap());
    assert!(env
        .runner
        .ran("systemctl stop --quiet rtconf-commit-confirm.timer"));
    assert!(env.engine.pending_confirm().unwrap().is_none());
    assert!(!env.engine.confirm().unwrap());
    assert!(env.engine.revert().unwrap().is_none());
    assert_eq!(host_name(&env), Some("r2".to_string()));
}

#[test]
fn test_engine_commit_confirm_revert() {
    let mut env = TestEnv::new();
    set_host_name(&mut env, "r1");
    env.engine.commit(&CommitOptions::new()).unwrap();
    set_host_name(&mut env, "r2");
    env.engine.commit_confirm(10, &CommitOptions::new()).unwrap();
    env.runner.clear_commands();

    let report = env.engine.revert().unwrap().unwrap();
    assert_eq!(report.handlers, vec!["system_host_name"]);
    assert_eq!(env.runner.commands(), vec!["hostname r1"]);
    assert_eq!(host_name(&env), Some("r1".to_string()));
    assert!(env.engine.pending_confirm().unwrap().is_none());
    assert_eq!(env.engine.log().unwrap()[0].user, "commit-confirm");
}

#[test]
fn test_engine_commit_confirm_keeps_revert_target() {
    let mut env = TestEnv::new();
    // Never archived, recorded before the confirmed commit
    env.engine.store().commit_running(Arc::new(parse_tree(
        "system {\n    host-name r0;\n}\n",
    )));
    set_host_name(&mut env, "r1");
    env.engine.commit_confirm(10, &CommitOptions::new()).unwrap();
    assert_eq!(
        env.engine.pending_confirm().unwrap().unwrap().revision,
        Some(1)
    );

    // Rotation beyond the archive size keeps the revert target
    for name in ["r2", "r3", "r4"] {
        set_host_name(&mut env, name);
        env.engine.commit(&CommitOptions::new()).unwrap();
    }
    assert!(env.engine.log().unwrap().iter().all(|e| e.revision != 1));
    env.engine.revert().unwrap().unwrap();
    assert_eq!(host_name(&env), Some("r0".to_string()));
    assert!(!env
        .engine
        .config()
        .archive_dir
        .join("config.boot.1")
        .exists());
}

#[test]
fn test_engine_commit_confirm_timer_failure() {
    let mut env = TestEnv::new();
    env.runner.fail_on("systemd-run", 1, "Failed to start transient timer");
    set_host_name(&mut env, "r1");
    let e = env
        .engine
        .commit_confirm(10, &CommitOptions::new())
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::CommandFailed);
    assert!(env.engine.pending_confirm().unwrap().is_none());
    assert_eq!(
        env.engine
            .commit_confirm(0, &CommitOptions::new())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidArgument
    );
}
