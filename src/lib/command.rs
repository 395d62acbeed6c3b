// SPDX-License-Identifier: Apache-2.0

use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::{ErrorKind, RtconfError};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const TERM_GRACE: Duration = Duration::from_secs(1);
const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Cooperative cancellation flag shared by the commit orchestrator and the
/// command runner. Running commands are terminated once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub input: Option<String>,
    /// Falls back to the runner default when unset
    pub timeout: Option<Duration>,
    /// Exit codes treated as success, `[0]` when empty
    pub expect: Vec<i32>,
}

impl CommandSpec {
    pub fn new(argv: &[&str]) -> Self {
        Self {
            argv: argv.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_input(mut self, input: &str) -> Self {
        self.input = Some(input.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_expect(mut self, codes: &[i32]) -> Self {
        self.expect = codes.to_vec();
        self
    }

    pub fn is_expected(&self, code: i32) -> bool {
        if self.expect.is_empty() {
            code == 0
        } else {
            self.expect.contains(&code)
        }
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// -1 when the process was killed by a signal
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Executes external commands. A non-zero exit code is reported through
/// [CommandOutput::code], errors are reserved for commands which could
/// not run to completion.
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RtconfError>;

    /// Whether `tool` can be executed on this system.
    fn has_tool(&self, tool: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    cancel: CancelToken,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(cancel: CancelToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }
}

fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut ret = String::new();
        if let Some(mut pipe) = pipe {
            let mut buf = Vec::new();
            if pipe.read_to_end(&mut buf).is_ok() {
                ret = String::from_utf8_lossy(&buf).to_string();
            }
        }
        ret
    })
}

// SIGTERM first so the process may clean up, SIGKILL after a grace delay.
fn terminate(child: &mut Child) {
    if let Ok(pid) = i32::try_from(child.id()) {
        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            log::debug!("Failed to send SIGTERM to {pid}: {e}");
        }
    }
    let deadline = Instant::now() + TERM_GRACE;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    if let Err(e) = child.kill() {
        log::debug!("Failed to kill child process: {e}");
    }
    child.wait().ok();
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RtconfError> {
        let (program, args) = spec.argv.split_first().ok_or_else(|| {
            RtconfError::new(
                ErrorKind::InvalidArgument,
                "Empty command line".to_string(),
            )
        })?;
        log::debug!("Running command: {spec}");
        let mut child = Command::new(program)
            .args(args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if spec.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let e = RtconfError::new(
                    ErrorKind::CommandFailed,
                    format!("Failed to execute '{spec}': {e}"),
                );
                log::error!("{}", e);
                e
            })?;

        let stdin_writer = match (child.stdin.take(), spec.input.clone()) {
            (Some(mut stdin), Some(input)) => Some(std::thread::spawn(move || {
                stdin.write_all(input.as_bytes()).ok();
            })),
            _ => None,
        };
        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());

        let deadline = Instant::now() + spec.timeout.unwrap_or(self.timeout);
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if self.cancel.is_cancelled() {
                        terminate(&mut child);
                        let e = RtconfError::new(
                            ErrorKind::Cancelled,
                            format!("Command '{spec}' interrupted"),
                        );
                        log::error!("{}", e);
                        return Err(e);
                    }
                    if Instant::now() >= deadline {
                        terminate(&mut child);
                        let e = RtconfError::new_timeout(format!(
                            "Command '{spec}' timed out after {}s",
                            spec.timeout.unwrap_or(self.timeout).as_secs()
                        ));
                        log::error!("{}", e);
                        return Err(e);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        };
        if let Some(writer) = stdin_writer {
            writer.join().ok();
        }
        let output = CommandOutput {
            code: status.code().unwrap_or(-1),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };
        if let Some(signal) = status.signal() {
            log::debug!("Command '{spec}' killed by signal {signal}");
        } else {
            log::debug!("Command '{spec}' exited with {}", output.code);
        }
        if !output.stdout.is_empty() {
            log::debug!("Command '{spec}' stdout: {}", output.stdout.trim_end());
        }
        if !output.stderr.is_empty() {
            log::debug!("Command '{spec}' stderr: {}", output.stderr.trim_end());
        }
        Ok(output)
    }

    fn has_tool(&self, tool: &str) -> bool {
        let search = std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        if tool.contains('/') {
            return is_executable(Path::new(tool));
        }
        search
            .split(':')
            .filter(|d| !d.is_empty())
            .any(|dir| is_executable(&Path::new(dir).join(tool)))
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or_default()
}
