// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::file::{remove_file, write_atomic, FileOptions};
use crate::text::{from_text, to_text};
use crate::{ConfigDiff, ConfigTree, ErrorKind, RtconfError, Schema};

const LOG_FILE: &str = "commits.json";
const REVISION_PREFIX: &str = "config.boot.";
const CONFIRM_FILE: &str = "commit-confirm.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CommitEntry {
    pub revision: u64,
    pub timestamp: String,
    pub user: String,
    #[serde(default)]
    pub comment: String,
}

/// Commit waiting for confirmation before its revert timer expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PendingConfirm {
    /// Archived revision restored on revert, `None` restores an empty
    /// configuration
    pub revision: Option<u64>,
    pub deadline: String,
    pub user: String,
}

/// Archive of committed configurations. Entries are indexed from the
/// newest (0) to the oldest.
#[derive(Debug, Clone)]
pub struct CommitArchive {
    dir: PathBuf,
    max_revisions: usize,
}

fn storage_error(e: RtconfError) -> RtconfError {
    RtconfError::new(ErrorKind::StorageFailure, e.msg().to_string())
}

impl CommitArchive {
    pub fn new(dir: &Path, max_revisions: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            max_revisions: max_revisions.max(1),
        }
    }

    fn revision_path(&self, revision: u64) -> PathBuf {
        self.dir.join(format!("{REVISION_PREFIX}{revision}"))
    }

    pub fn log(&self) -> Result<Vec<CommitEntry>, RtconfError> {
        let path = self.dir.join(LOG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(RtconfError::new(
                ErrorKind::StorageFailure,
                format!("Failed to read {}: {e}", path.display()),
            )),
        }
    }

    /// Archive `tree` as a new revision, dropping the oldest revisions
    /// beyond the configured maximum.
    pub fn record(
        &self,
        tree: &ConfigTree,
        user: &str,
        comment: &str,
    ) -> Result<CommitEntry, RtconfError> {
        let mut entries = self.log()?;
        let entry = CommitEntry {
            revision: entries.first().map(|e| e.revision + 1).unwrap_or(1),
            timestamp: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            user: user.to_string(),
            comment: comment.to_string(),
        };
        write_atomic(
            &self.revision_path(entry.revision),
            to_text(tree).as_bytes(),
            &FileOptions::new().with_mode(0o640),
        )
        .map_err(storage_error)?;
        entries.insert(0, entry.clone());
        let kept = self.pending_confirm()?.and_then(|p| p.revision);
        for old in entries.split_off(self.max_revisions.min(entries.len())) {
            // Still needed by the pending commit-confirm
            if kept == Some(old.revision) {
                continue;
            }
            remove_file(&self.revision_path(old.revision)).map_err(storage_error)?;
            log::debug!("Dropped archived revision {}", old.revision);
        }
        write_atomic(
            &self.dir.join(LOG_FILE),
            serde_json::to_string_pretty(&entries)?.as_bytes(),
            &FileOptions::new().with_mode(0o640),
        )
        .map_err(storage_error)?;
        log::info!("Archived configuration revision {}", entry.revision);
        Ok(entry)
    }

    /// Configuration committed `index` commits ago.
    pub fn revision(
        &self,
        schema: &Schema,
        index: usize,
    ) -> Result<ConfigTree, RtconfError> {
        let entries = self.log()?;
        let entry = entries.get(index).ok_or_else(|| {
            RtconfError::new(
                ErrorKind::NotFound,
                format!(
                    "Revision {index} does not exist, the archive holds {} \
                    revisions",
                    entries.len()
                ),
            )
        })?;
        self.read_revision(schema, entry.revision)
    }

    /// Configuration archived as revision number `revision`.
    pub fn read_revision(
        &self,
        schema: &Schema,
        revision: u64,
    ) -> Result<ConfigTree, RtconfError> {
        let path = self.revision_path(revision);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            RtconfError::new(
                if e.kind() == std::io::ErrorKind::NotFound {
                    ErrorKind::NotFound
                } else {
                    ErrorKind::StorageFailure
                },
                format!("Failed to read {}: {e}", path.display()),
            )
        })?;
        from_text(schema, &content)
    }

    pub fn pending_confirm(&self) -> Result<Option<PendingConfirm>, RtconfError> {
        let path = self.dir.join(CONFIRM_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RtconfError::new(
                ErrorKind::StorageFailure,
                format!("Failed to read {}: {e}", path.display()),
            )),
        }
    }

    pub fn start_confirm(
        &self,
        pending: &PendingConfirm,
    ) -> Result<(), RtconfError> {
        write_atomic(
            &self.dir.join(CONFIRM_FILE),
            serde_json::to_string_pretty(pending)?.as_bytes(),
            &FileOptions::new().with_mode(0o640),
        )
        .map_err(storage_error)
    }

    /// Drop the pending commit-confirm, if any, along with a revision
    /// file kept only for it.
    pub fn finish_confirm(&self) -> Result<Option<PendingConfirm>, RtconfError> {
        let pending = match self.pending_confirm()? {
            Some(p) => p,
            None => return Ok(None),
        };
        remove_file(&self.dir.join(CONFIRM_FILE)).map_err(storage_error)?;
        if let Some(revision) = pending.revision {
            if !self.log()?.iter().any(|e| e.revision == revision) {
                remove_file(&self.revision_path(revision))
                    .map_err(storage_error)?;
            }
        }
        Ok(Some(pending))
    }

    /// Commands turning revision `index` into `current`, prefixed with `-`
    /// for removed and `+` for added lines.
    pub fn compare(
        &self,
        schema: &Schema,
        index: usize,
        current: &ConfigTree,
    ) -> Result<String, RtconfError> {
        let old = self.revision(schema, index)?;
        let diff = ConfigDiff::new(Arc::new(old), Arc::new(current.clone()));
        let mut lines = Vec::new();
        for line in diff.deleted().to_commands().lines() {
            lines.push(format!("- {line}"));
        }
        for line in diff.added().to_commands().lines() {
            lines.push(format!("+ {line}"));
        }
        Ok(lines.join("\n"))
    }
}
