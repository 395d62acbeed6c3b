// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::{
    from_text, CancelToken, CommandOutput, CommandRunner, CommandSpec,
    ConfigPath, ConfigQuery, ConfigTree, Engine, EngineConfig, RtconfError,
    Schema, SystemFacts,
};

pub(crate) const TEST_INTERFACES: [&str; 4] = ["lo", "eth0", "eth1", "eth2"];

#[derive(Debug, Clone)]
struct FailureRule {
    prefix: String,
    code: i32,
    stderr: String,
}

#[derive(Debug, Default)]
struct FakeState {
    commands: Vec<String>,
    links: BTreeSet<String>,
    failures: Vec<FailureRule>,
    responses: Vec<(String, String)>,
    missing_tools: BTreeSet<String>,
}

/// Records every command and emulates the few `ip link` operations the
/// handlers rely on.
#[derive(Debug, Default)]
pub(crate) struct FakeCommandRunner {
    state: Mutex<FakeState>,
}

impl FakeCommandRunner {
    pub(crate) fn new() -> Self {
        let ret = Self::default();
        for name in TEST_INTERFACES {
            ret.add_link(name);
        }
        ret
    }

    pub(crate) fn add_link(&self, name: &str) {
        self.state.lock().unwrap().links.insert(name.to_string());
    }

    pub(crate) fn has_link(&self, name: &str) -> bool {
        self.state.lock().unwrap().links.contains(name)
    }

    /// Commands starting with `prefix` exit with `code`.
    pub(crate) fn fail_on(&self, prefix: &str, code: i32, stderr: &str) {
        self.state.lock().unwrap().failures.push(FailureRule {
            prefix: prefix.to_string(),
            code,
            stderr: stderr.to_string(),
        });
    }

    /// Commands starting with `prefix` print `stdout`.
    pub(crate) fn respond(&self, prefix: &str, stdout: &str) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((prefix.to_string(), stdout.to_string()));
    }

    pub(crate) fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub(crate) fn remove_tool(&self, tool: &str) {
        self.state
            .lock()
            .unwrap()
            .missing_tools
            .insert(tool.to_string());
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub(crate) fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    /// Index of the first recorded command starting with `prefix`.
    pub(crate) fn position(&self, prefix: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.starts_with(prefix))
    }

    pub(crate) fn ran(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RtconfError> {
        let mut state = self.state.lock().unwrap();
        let line = spec.argv.join(" ");
        state.commands.push(line.clone());
        if let Some(rule) =
            state.failures.iter().find(|r| line.starts_with(&r.prefix))
        {
            return Ok(CommandOutput {
                code: rule.code,
                stdout: String::new(),
                stderr: rule.stderr.clone(),
            });
        }
        let argv: Vec<&str> = spec.argv.iter().map(String::as_str).collect();
        let mut output = CommandOutput::default();
        if let Some((_, stdout)) =
            state.responses.iter().find(|(p, _)| line.starts_with(p))
        {
            output.stdout = stdout.clone();
        }
        match argv.as_slice() {
            ["ip", "link", "show", "dev", name] => {
                if !state.links.contains(*name) {
                    output.code = 1;
                    output.stderr =
                        format!("Device \"{name}\" does not exist.");
                }
            }
            ["ip", "link", "add", "dev", name, ..] => {
                if !state.links.insert(name.to_string()) {
                    output.code = 2;
                    output.stderr = "RTNETLINK answers: File exists".to_string();
                }
            }
            ["ip", "link", "delete", "dev", name] => {
                if !state.links.remove(*name) {
                    output.code = 1;
                    output.stderr = "Cannot find device".to_string();
                }
            }
            ["ip", "link", "set", "dev", name, ..] => {
                if !state.links.contains(*name) {
                    output.code = 1;
                    output.stderr =
                        format!("Cannot find device \"{name}\"");
                }
            }
            _ => (),
        }
        Ok(output)
    }

    fn has_tool(&self, tool: &str) -> bool {
        !self.state.lock().unwrap().missing_tools.contains(tool)
    }
}

pub(crate) fn schema() -> Arc<Schema> {
    Schema::builtin().unwrap()
}

pub(crate) fn parse_tree(content: &str) -> ConfigTree {
    from_text(&schema(), content).unwrap()
}

pub(crate) fn path(s: &str) -> ConfigPath {
    s.parse().unwrap()
}

pub(crate) fn new_query(session: &str, effective: &str) -> ConfigQuery {
    ConfigQuery::new(
        Arc::new(parse_tree(session)),
        Arc::new(parse_tree(effective)),
        schema(),
    )
}

pub(crate) fn test_facts() -> SystemFacts {
    let mut facts = SystemFacts::new();
    for name in TEST_INTERFACES {
        facts = facts.with_interface(name);
    }
    facts
}

/// Engine working in a temporary directory with a fake command runner.
pub(crate) struct TestEnv {
    pub(crate) dir: TempDir,
    pub(crate) runner: Arc<FakeCommandRunner>,
    pub(crate) engine: Engine,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let ipv4_sys = root.join("proc/sys/net/ipv4");
        std::fs::create_dir_all(&ipv4_sys).unwrap();
        for key in ["tcp_l3mdev_accept", "udp_l3mdev_accept"] {
            std::fs::write(ipv4_sys.join(key), "0\n").unwrap();
        }
        let net_dir = dir.path().join("sys/class/net");
        for name in TEST_INTERFACES {
            std::fs::create_dir_all(net_dir.join(name)).unwrap();
        }

        let mut config = EngineConfig::new();
        config.config_file = dir.path().join("config/config.boot");
        config.archive_dir = dir.path().join("config/archive");
        config.archive_max_revisions = 3;
        config.lock_file = dir.path().join("run/commit.lock");
        config.system_root = root;
        config.sysfs_root = dir.path().join("sys");

        let runner = Arc::new(FakeCommandRunner::new());
        let engine =
            Engine::with_runner(config, runner.clone(), CancelToken::new())
                .unwrap();
        Self {
            dir,
            runner,
            engine,
        }
    }

    pub(crate) fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    /// Content of a file below the system root, if any.
    pub(crate) fn read(&self, file: &str) -> Option<String> {
        let path = self.root().join(file.trim_start_matches('/'));
        std::fs::read_to_string(path).ok()
    }

    pub(crate) fn exists(&self, file: &str) -> bool {
        Path::new(&self.root().join(file.trim_start_matches('/'))).exists()
    }

    /// Replace the Session with `content`.
    pub(crate) fn candidate(&mut self, content: &str) {
        let tree = parse_tree(content);
        self.engine.store_mut().replace_session(tree);
    }

    pub(crate) fn sysctl(&self, key: &str) -> String {
        self.read(&format!("/proc/sys/{}", key.replace('.', "/")))
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}
