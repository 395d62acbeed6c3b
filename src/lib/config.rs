// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "/config/config.boot";
const DEFAULT_ARCHIVE_DIR: &str = "/config/archive";
const DEFAULT_ARCHIVE_MAX_REVISIONS: usize = 100;
const DEFAULT_LOCK_FILE: &str = "/run/rtconf/commit.lock";
const DEFAULT_COMMAND_TIMEOUT: u64 = 30;
const DEFAULT_CONFIRM_REVERT_COMMAND: [&str; 2] = ["/usr/bin/rtconfctl", "revert"];

/// Engine settings. Every field has a default so a partial or missing
/// settings file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
#[non_exhaustive]
pub struct EngineConfig {
    /// Persisted Running configuration
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "default_archive_max_revisions")]
    pub archive_max_revisions: usize,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// Prefix of every file generated or modified, `/` on a real system
    #[serde(default = "default_system_root")]
    pub system_root: PathBuf,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    /// Seconds before an external command is killed
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    #[serde(default = "default_true")]
    pub required_tools_check: bool,
    /// Command run by the commit-confirm timer once it expires
    #[serde(default = "default_confirm_revert_command")]
    pub confirm_revert_command: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_file: default_config_file(),
            archive_dir: default_archive_dir(),
            archive_max_revisions: default_archive_max_revisions(),
            lock_file: default_lock_file(),
            system_root: default_system_root(),
            sysfs_root: default_sysfs_root(),
            command_timeout: default_command_timeout(),
            required_tools_check: true,
            confirm_revert_command: default_confirm_revert_command(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

fn default_config_file() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARCHIVE_DIR)
}

fn default_archive_max_revisions() -> usize {
    DEFAULT_ARCHIVE_MAX_REVISIONS
}

fn default_lock_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_FILE)
}

fn default_system_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys")
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT
}

fn default_confirm_revert_command() -> Vec<String> {
    DEFAULT_CONFIRM_REVERT_COMMAND
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}
