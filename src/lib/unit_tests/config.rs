// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use crate::EngineConfig;

#[test]
fn test_engine_config_defaults() {
    let config: EngineConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.config_file, PathBuf::from("/config/config.boot"));
    assert_eq!(config.archive_max_revisions, 100);
    assert_eq!(config.command_timeout, 30);
    assert!(config.required_tools_check);
    assert_eq!(
        config.confirm_revert_command,
        vec!["/usr/bin/rtconfctl", "revert"]
    );
}

#[test]
fn test_engine_config_partial() {
    let config: EngineConfig = serde_yaml::from_str(
        r#"---
system-root: /tmp/rtconf
command-timeout: 5
required-tools-check: false
"#,
    )
    .unwrap();
    assert_eq!(config.system_root, PathBuf::from("/tmp/rtconf"));
    assert_eq!(config.command_timeout, 5);
    assert!(!config.required_tools_check);
    assert_eq!(config.lock_file, PathBuf::from("/run/rtconf/commit.lock"));
}

#[test]
fn test_engine_config_unknown_key() {
    assert!(serde_yaml::from_str::<EngineConfig>("system_root: /tmp").is_err());
}
