// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::file::{chmod, chown, io_error, remove_file, rooted, write_atomic};
use crate::{
    CommandOutput, CommandRunner, CommandSpec, ErrorKind, FileOptions,
    RtconfError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
    ReloadOrRestart,
    Enable,
    Disable,
}

impl std::fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Start => "start",
                Self::Stop => "stop",
                Self::Restart => "restart",
                Self::Reload => "reload",
                Self::ReloadOrRestart => "reload-or-restart",
                Self::Enable => "enable",
                Self::Disable => "disable",
            }
        )
    }
}

/// Side effecting primitives available to handlers during apply: external
/// commands, kernel parameters, services and files. File paths are
/// absolute system paths resolved below the configured system root.
#[derive(Debug, Clone)]
pub struct SystemOps {
    runner: Arc<dyn CommandRunner>,
    root: PathBuf,
}

impl SystemOps {
    pub fn new(runner: Arc<dyn CommandRunner>, system_root: &Path) -> Self {
        Self {
            runner,
            root: system_root.to_path_buf(),
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn path(&self, path: &str) -> PathBuf {
        rooted(&self.root, Path::new(path))
    }

    /// Run a command whatever its exit code.
    pub fn run(&self, argv: &[&str]) -> Result<CommandOutput, RtconfError> {
        self.runner.run(&CommandSpec::new(argv))
    }

    /// Run a command, failing with `CommandFailed` on an unexpected exit
    /// code. The error carries the command line and its stderr.
    pub fn run_or_raise(
        &self,
        argv: &[&str],
    ) -> Result<CommandOutput, RtconfError> {
        self.run_spec_or_raise(&CommandSpec::new(argv))
    }

    pub fn run_spec_or_raise(
        &self,
        spec: &CommandSpec,
    ) -> Result<CommandOutput, RtconfError> {
        let output = self.runner.run(spec)?;
        if spec.is_expected(output.code) {
            Ok(output)
        } else {
            let e = RtconfError::new(
                ErrorKind::CommandFailed,
                format!(
                    "Command '{spec}' failed with exit code {}: {}",
                    output.code,
                    output.stderr.trim()
                ),
            );
            log::error!("{}", e);
            Err(e)
        }
    }

    fn sysctl_path(&self, key: &str) -> PathBuf {
        self.path(&format!("/proc/sys/{}", key.replace('.', "/")))
    }

    pub fn sysctl_read(&self, key: &str) -> Result<Option<String>, RtconfError> {
        let path = self.sysctl_path(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Set a kernel parameter, returns whether the value changed. Writing
    /// the value already in place is a no-op.
    pub fn sysctl_write(
        &self,
        key: &str,
        value: &str,
    ) -> Result<bool, RtconfError> {
        match self.sysctl_read(key)? {
            Some(cur) if cur == value => {
                log::debug!("sysctl {key} already set to {value}");
                Ok(false)
            }
            Some(_) => {
                let path = self.sysctl_path(key);
                std::fs::write(&path, format!("{value}\n"))
                    .map_err(|e| io_error(&path, e))?;
                log::info!("sysctl {key} = {value}");
                Ok(true)
            }
            None => {
                let e = RtconfError::new(
                    ErrorKind::NotFound,
                    format!("Kernel parameter {key} does not exist"),
                );
                log::error!("{}", e);
                Err(e)
            }
        }
    }

    pub fn service(
        &self,
        name: &str,
        action: ServiceAction,
    ) -> Result<(), RtconfError> {
        log::info!("Service {name}: {action}");
        self.run_or_raise(&["systemctl", &action.to_string(), name])?;
        Ok(())
    }

    pub fn service_running(&self, name: &str) -> Result<bool, RtconfError> {
        let output = self.run(&["systemctl", "is-active", "--quiet", name])?;
        Ok(output.code == 0)
    }

    /// Make the service supervisor pick up changed unit files.
    pub fn reload_supervisor(&self) -> Result<(), RtconfError> {
        self.run_or_raise(&["systemctl", "daemon-reload"])?;
        Ok(())
    }

    pub fn write_file(
        &self,
        path: &str,
        content: &str,
        opts: &FileOptions,
    ) -> Result<(), RtconfError> {
        write_atomic(&self.path(path), content.as_bytes(), opts)
    }

    pub fn read_file(&self, path: &str) -> Result<Option<String>, RtconfError> {
        let full = self.path(path);
        match std::fs::read_to_string(&full) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    pub fn remove_file(&self, path: &str) -> Result<bool, RtconfError> {
        remove_file(&self.path(path))
    }

    pub fn chown(
        &self,
        path: &str,
        user: Option<&str>,
        group: Option<&str>,
    ) -> Result<(), RtconfError> {
        chown(&self.path(path), user, group)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> Result<(), RtconfError> {
        chmod(&self.path(path), mode)
    }
}
