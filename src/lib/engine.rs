// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use crate::handlers::builtin_registry;
use crate::{
    CancelToken, CommandRunner, CommandSpec, CommitArchive, CommitEntry,
    CommitLock, CommitOptions, CommitReport, Committer, ConfigStore,
    ConfigTree, EngineConfig, ErrorKind, HandlerRegistry, PendingConfirm,
    ProcessRunner, Renderer, RtconfError, Schema, SystemOps,
};

const DEFAULT_USER: &str = "root";
const CONFIRM_TIMER_UNIT: &str = "rtconf-commit-confirm";
const REVERT_USER: &str = "commit-confirm";

pub const DEFAULT_CONFIRM_MINUTES: u32 = 10;

/// Configuration store, commit pipeline and commit archive wired together
/// from an [EngineConfig].
pub struct Engine {
    config: EngineConfig,
    store: ConfigStore,
    committer: Committer,
    archive: CommitArchive,
}

impl Engine {
    /// Engine running external commands for real.
    pub fn new(config: EngineConfig) -> Result<Self, RtconfError> {
        let cancel = CancelToken::new();
        let runner = Arc::new(ProcessRunner::new(
            cancel.clone(),
            Duration::from_secs(config.command_timeout),
        ));
        Self::with_runner(config, runner, cancel)
    }

    pub fn with_runner(
        config: EngineConfig,
        runner: Arc<dyn CommandRunner>,
        cancel: CancelToken,
    ) -> Result<Self, RtconfError> {
        Self::with_registry(
            config,
            Schema::builtin()?,
            builtin_registry()?,
            runner,
            cancel,
        )
    }

    pub fn with_registry(
        config: EngineConfig,
        schema: Arc<Schema>,
        registry: HandlerRegistry,
        runner: Arc<dyn CommandRunner>,
        cancel: CancelToken,
    ) -> Result<Self, RtconfError> {
        let renderer = Renderer::builtin(&config.system_root)?;
        let system = SystemOps::new(runner, &config.system_root);
        let committer = Committer::new(
            registry,
            renderer,
            system,
            CommitLock::new(Some(config.lock_file.as_path())),
            cancel,
        )
        .with_sysfs_root(&config.sysfs_root)
        .with_tool_check(config.required_tools_check);
        let archive =
            CommitArchive::new(&config.archive_dir, config.archive_max_revisions);
        Ok(Self {
            store: ConfigStore::new(schema),
            committer,
            archive,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    pub fn committer(&self) -> &Committer {
        &self.committer
    }

    pub fn archive(&self) -> &CommitArchive {
        &self.archive
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.committer.cancel_token()
    }

    /// Load the saved configuration file as Running, if it exists.
    /// Nothing is applied.
    pub fn open(&mut self) -> Result<(), RtconfError> {
        if self.config.config_file.exists() {
            let path = self.config.config_file.clone();
            self.store.load(&path)
        } else {
            log::info!(
                "No saved configuration at {}, starting empty",
                self.config.config_file.display()
            );
            Ok(())
        }
    }

    /// Commit the Session and archive the new Running configuration.
    /// Failing to archive does not fail the commit.
    pub fn commit(
        &mut self,
        opts: &CommitOptions,
    ) -> Result<CommitReport, RtconfError> {
        let report = self.committer.commit(&self.store, opts)?;
        if report.changed && !report.dry_run {
            let user = opts.user.as_deref().unwrap_or(DEFAULT_USER);
            let comment = opts.comment.as_deref().unwrap_or_default();
            if let Err(e) =
                self.archive
                    .record(self.store.running().as_ref(), user, comment)
            {
                log::warn!("Failed to archive the committed configuration: {e}");
            }
        }
        Ok(report)
    }

    /// Persist Running to the configuration file.
    pub fn save(&self) -> Result<(), RtconfError> {
        self.store.save(&self.config.config_file)
    }

    /// Replace the Session with the configuration archived `index`
    /// commits ago. Nothing is committed.
    pub fn load_revision(&mut self, index: usize) -> Result<(), RtconfError> {
        let tree = self.archive.revision(self.store.schema(), index)?;
        self.store.replace_session(tree);
        log::info!("Loaded revision {index} into the session");
        Ok(())
    }

    /// Commit the configuration archived `index` commits ago.
    pub fn rollback(
        &mut self,
        index: usize,
        opts: &CommitOptions,
    ) -> Result<CommitReport, RtconfError> {
        self.load_revision(index)?;
        log::info!("Rolling back to revision {index}");
        let ret = self.commit(opts);
        if ret.is_err() {
            self.store.discard();
        }
        ret
    }

    /// Commit the Session and schedule a revert to the configuration it
    /// replaces unless [Engine::confirm()] is called within `minutes`.
    pub fn commit_confirm(
        &mut self,
        minutes: u32,
        opts: &CommitOptions,
    ) -> Result<CommitReport, RtconfError> {
        if minutes == 0 {
            return Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                "Confirm timeout must be at least one minute".to_string(),
            ));
        }
        if let Some(pending) = self.archive.pending_confirm()? {
            return Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "Another confirm is pending, revert due at {}",
                    pending.deadline
                ),
            ));
        }
        if opts.dry_run {
            return self.commit(opts);
        }

        let user = opts.user.as_deref().unwrap_or(DEFAULT_USER);
        let previous = self.revert_target(user)?;
        let report = self.commit(opts)?;
        if !report.changed {
            return Ok(report);
        }

        let deadline = chrono::Local::now()
            + chrono::Duration::minutes(i64::from(minutes));
        self.archive.start_confirm(&PendingConfirm {
            revision: previous,
            deadline: deadline.format("%Y-%m-%d %H:%M:%S").to_string(),
            user: user.to_string(),
        })?;
        let on_active = format!("--on-active={minutes}m");
        let unit = format!("--unit={CONFIRM_TIMER_UNIT}");
        let mut argv = vec![
            "systemd-run",
            "--quiet",
            on_active.as_str(),
            unit.as_str(),
        ];
        argv.extend(self.config.confirm_revert_command.iter().map(String::as_str));
        if let Err(e) = self.committer.system().run_or_raise(&argv) {
            log::error!("Failed to schedule the commit-confirm revert: {e}");
            self.archive.finish_confirm()?;
            return Err(e);
        }
        log::info!("{minutes} minutes to confirm the commit before revert");
        Ok(report)
    }

    // Archived revision holding Running, recorded first when the archive
    // does not have it.
    fn revert_target(&self, user: &str) -> Result<Option<u64>, RtconfError> {
        let running = self.store.running();
        if let Some(newest) = self.archive.log()?.first() {
            if self
                .archive
                .read_revision(self.store.schema(), newest.revision)
                .ok()
                .as_ref()
                == Some(running.as_ref())
            {
                return Ok(Some(newest.revision));
            }
        }
        if running.is_empty() {
            return Ok(None);
        }
        let entry = self.archive.record(
            running.as_ref(),
            user,
            "Configuration before commit-confirm",
        )?;
        Ok(Some(entry.revision))
    }

    /// Keep the changes of a pending commit-confirm. Returns false when
    /// no confirm is pending.
    pub fn confirm(&self) -> Result<bool, RtconfError> {
        if self.archive.pending_confirm()?.is_none() {
            log::info!("No confirm pending");
            return Ok(false);
        }
        let timer = format!("{CONFIRM_TIMER_UNIT}.timer");
        // 5: timer already gone
        self.committer.system().run_spec_or_raise(
            &CommandSpec::new(&["systemctl", "stop", "--quiet", &timer])
                .with_expect(&[0, 5]),
        )?;
        self.archive.finish_confirm()?;
        log::info!("Commit confirmed, revert timer stopped");
        Ok(true)
    }

    /// Commit back the configuration replaced by a pending commit-confirm.
    /// Returns `None` when no confirm is pending.
    pub fn revert(&mut self) -> Result<Option<CommitReport>, RtconfError> {
        let pending = match self.archive.pending_confirm()? {
            Some(p) => p,
            None => {
                log::info!("No confirm pending");
                return Ok(None);
            }
        };
        let tree = match pending.revision {
            Some(revision) => {
                self.archive.read_revision(self.store.schema(), revision)?
            }
            None => ConfigTree::new(),
        };
        log::warn!(
            "Commit by {} was not confirmed before {}, reverting",
            pending.user,
            pending.deadline
        );
        self.store.replace_session(tree);
        let opts = CommitOptions::new()
            .with_user(REVERT_USER)
            .with_comment("Revert of an unconfirmed commit");
        match self.commit(&opts) {
            Ok(report) => {
                self.archive.finish_confirm()?;
                Ok(Some(report))
            }
            Err(e) => {
                self.store.discard();
                Err(e)
            }
        }
    }

    pub fn pending_confirm(&self) -> Result<Option<PendingConfirm>, RtconfError> {
        self.archive.pending_confirm()
    }

    /// Difference between archived revision `index` and Running.
    pub fn compare_revision(&self, index: usize) -> Result<String, RtconfError> {
        self.archive.compare(
            self.store.schema(),
            index,
            self.store.running().as_ref(),
        )
    }

    pub fn log(&self) -> Result<Vec<CommitEntry>, RtconfError> {
        self.archive.log()
    }
}
