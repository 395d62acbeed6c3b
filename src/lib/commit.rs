// SPDX-License-Identifier: Apache-2.0

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};

use crate::file::io_error;
use crate::{
    AnyHandler, CancelToken, ConfigDiff, ConfigQuery, ConfigStore, ConfigTree,
    ErrorKind, HandlerRegistry, HandlerView, PolicyContext, Renderer,
    RtconfError, Schema, SystemFacts, SystemOps,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CommitOptions {
    /// Stop after verification, nothing is generated or applied.
    pub dry_run: bool,
    pub comment: Option<String>,
    pub user: Option<String>,
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CommitReport {
    /// Handlers run by this commit, in execution order
    pub handlers: Vec<String>,
    /// Whether the Session differed from Running
    pub changed: bool,
    pub dry_run: bool,
}

/// Commit serialization: an in-process mutex plus an advisory lock on a
/// file so that two processes cannot commit at the same time.
#[derive(Debug, Default)]
pub struct CommitLock {
    path: Option<PathBuf>,
    guard: Mutex<()>,
}

#[derive(Debug)]
pub struct CommitLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    // The flock is released when the file is closed.
    _file: Option<File>,
}

fn commit_in_progress() -> RtconfError {
    let e = RtconfError::new(
        ErrorKind::CommitInProgress,
        "Another commit is in progress".to_string(),
    );
    log::error!("{}", e);
    e
}

impl CommitLock {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            guard: Mutex::new(()),
        }
    }

    /// Take the lock without waiting.
    pub fn try_lock(&self) -> Result<CommitLockGuard<'_>, RtconfError> {
        let guard = match self.guard.try_lock() {
            Ok(g) => g,
            Err(TryLockError::WouldBlock) => return Err(commit_in_progress()),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        let file = match self.path.as_ref() {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)
                        .map_err(|e| io_error(dir, e))?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .open(path)
                    .map_err(|e| io_error(path, e))?;
                match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
                {
                    Ok(()) => Some(file),
                    Err(e) if e == Errno::EWOULDBLOCK => {
                        return Err(commit_in_progress());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => None,
        };
        Ok(CommitLockGuard {
            _guard: guard,
            _file: file,
        })
    }
}

// Handler code is not trusted to be panic free, a panic is reported as
// an ApplyError of that handler.
fn guarded<T, F>(
    handler: &str,
    phase: &str,
    f: F,
) -> Result<T, RtconfError>
where
    F: FnOnce() -> Result<T, RtconfError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r.map_err(|e| e.with_handler(handler)),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let e = RtconfError::new(
                ErrorKind::ApplyError,
                format!("Unexpected failure of {handler} during {phase}: {msg}"),
            )
            .with_handler(handler);
            log::error!("{}", e);
            Err(e)
        }
    }
}

/// Runs the commit pipeline: diff, order, verify, generate, apply and
/// finally promotion of the Session to Running.
pub struct Committer {
    registry: HandlerRegistry,
    renderer: Renderer,
    system: SystemOps,
    lock: CommitLock,
    cancel: CancelToken,
    sysfs_root: PathBuf,
    check_tools: bool,
}

impl Committer {
    pub fn new(
        registry: HandlerRegistry,
        renderer: Renderer,
        system: SystemOps,
        lock: CommitLock,
        cancel: CancelToken,
    ) -> Self {
        Self {
            registry,
            renderer,
            system,
            lock,
            cancel,
            sysfs_root: PathBuf::from("/sys"),
            check_tools: true,
        }
    }

    pub fn with_sysfs_root(mut self, sysfs_root: &Path) -> Self {
        self.sysfs_root = sysfs_root.to_path_buf();
        self
    }

    pub fn with_tool_check(mut self, enabled: bool) -> Self {
        self.check_tools = enabled;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn system(&self) -> &SystemOps {
        &self.system
    }

    pub fn lock(&self) -> &CommitLock {
        &self.lock
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn check_cancelled(&self, phase: &str) -> Result<(), RtconfError> {
        if self.cancel.is_cancelled() {
            let e = RtconfError::new(
                ErrorKind::Cancelled,
                format!("Commit interrupted before {phase}"),
            );
            log::error!("{}", e);
            Err(e)
        } else {
            Ok(())
        }
    }

    /// Commit the Session of `store`. Running is only replaced when every
    /// handler applied successfully.
    pub fn commit(
        &self,
        store: &ConfigStore,
        opts: &CommitOptions,
    ) -> Result<CommitReport, RtconfError> {
        let _lock = self.lock.try_lock()?;
        let running = store.running();
        let session = store.snapshot();
        let schema = store.schema().clone();

        let diff = ConfigDiff::new(running.clone(), session.clone());
        let mut report = CommitReport {
            changed: !diff.is_empty(),
            dry_run: opts.dry_run,
            ..Default::default()
        };
        if diff.is_empty() {
            log::info!("No configuration changes to commit");
            if !opts.dry_run {
                store.commit_running(session);
            }
            return Ok(report);
        }

        let affected = self.registry.affected(&diff);
        let handlers = self.registry.order(&affected)?;
        report.handlers =
            handlers.iter().map(|h| h.name().to_string()).collect();
        log::info!("Handlers to run: {}", report.handlers.join(", "));

        let tools: Vec<&str> = handlers
            .iter()
            .flat_map(|h| h.required_tools().iter().copied())
            .collect();
        let facts = SystemFacts::discover(
            &self.sysfs_root,
            self.system.runner().as_ref(),
            if self.check_tools { tools.as_slice() } else { &[] },
        );

        let query =
            ConfigQuery::new(session.clone(), running.clone(), schema.clone());
        let views = self.verify(&handlers, &query, &facts)?;
        if self.check_tools {
            self.check_required_tools(&handlers, &facts)?;
        }
        if opts.dry_run {
            log::info!("Dry run, configuration verified");
            return Ok(report);
        }

        self.check_cancelled("generate")?;
        let mut generated: Vec<&dyn AnyHandler> = Vec::new();
        for (handler, view) in handlers.iter().zip(views.iter()) {
            generated.push(*handler);
            if let Err(e) = guarded(handler.name(), "generate", || {
                handler.generate(view, &self.renderer)
            }) {
                self.restore_files(&generated, running.clone(), schema);
                return Err(e);
            }
        }

        for (handler, view) in handlers.iter().zip(views.iter()) {
            self.check_cancelled(&format!("applying {}", handler.name()))?;
            log::info!("Applying {}", handler.name());
            if let Err(e) = guarded(handler.name(), "apply", || {
                handler.apply(view, &self.system)
            }) {
                let e = if e.kind() == ErrorKind::ApplyError {
                    e
                } else {
                    RtconfError::combined(
                        ErrorKind::ApplyError,
                        format!("Failed to apply {}", handler.name()),
                        vec![e],
                    )
                    .with_handler(handler.name())
                };
                log::error!("{}", e);
                return Err(e);
            }
        }

        store.commit_running(session);
        log::info!("Commit finished");
        Ok(report)
    }

    fn verify(
        &self,
        handlers: &[&dyn AnyHandler],
        query: &ConfigQuery,
        facts: &SystemFacts,
    ) -> Result<Vec<HandlerView>, RtconfError> {
        let policy = PolicyContext::new(query, facts);
        let mut views = Vec::new();
        let mut errors = Vec::new();
        for handler in handlers {
            let ret = guarded(handler.name(), "verify", || {
                let view = handler.get_config(query)?;
                handler.verify(&view, &policy)?;
                Ok(view)
            });
            match ret {
                Ok(view) => views.push(view),
                Err(e) => {
                    log::error!("{}: {}", handler.name(), e);
                    errors.push(e);
                }
            }
        }
        match errors.len() {
            0 => Ok(views),
            1 => Err(errors.remove(0)),
            n => Err(RtconfError::combined(
                ErrorKind::ConfigError,
                format!("Configuration verification failed with {n} errors"),
                errors,
            )),
        }
    }

    fn check_required_tools(
        &self,
        handlers: &[&dyn AnyHandler],
        facts: &SystemFacts,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        for handler in handlers {
            for tool in facts.missing_tools(handler.required_tools()) {
                errors.push(
                    RtconfError::new(
                        ErrorKind::DependencyError,
                        format!(
                            "{} requires {tool} which is not installed",
                            handler.name()
                        ),
                    )
                    .with_handler(handler.name()),
                );
            }
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(RtconfError::combined(
                ErrorKind::DependencyError,
                "Required tools are missing".to_string(),
                errors,
            )),
        }
    }

    // Best effort: regenerate the files of already generated handlers from
    // Running so they match the system state again.
    fn restore_files(
        &self,
        handlers: &[&dyn AnyHandler],
        running: Arc<ConfigTree>,
        schema: Arc<Schema>,
    ) {
        let query = ConfigQuery::new(running.clone(), running, schema);
        for handler in handlers {
            let ret = guarded(handler.name(), "generate", || {
                let view = handler.get_config(&query)?;
                handler.generate(&view, &self.renderer)
            });
            match ret {
                Ok(()) => {
                    log::info!("Restored generated files of {}", handler.name())
                }
                Err(e) => log::warn!(
                    "Failed to restore generated files of {}: {}",
                    handler.name(),
                    e
                ),
            }
        }
    }
}
