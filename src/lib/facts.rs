// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::CommandRunner;

/// System state gathered once before the verify phase, so that verify
/// itself never touches the system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemFacts {
    interfaces: BTreeSet<String>,
    tools: BTreeMap<String, bool>,
}

impl SystemFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read kernel interfaces from `<sysfs_root>/class/net` and probe
    /// every tool in `tools`.
    pub fn discover(
        sysfs_root: &Path,
        runner: &dyn CommandRunner,
        tools: &[&str],
    ) -> Self {
        let mut ret = Self::new();
        let net_dir = sysfs_root.join("class/net");
        match std::fs::read_dir(&net_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if let Some(name) = entry.file_name().to_str() {
                        ret.interfaces.insert(name.to_string());
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "Failed to list interfaces in {}: {e}",
                    net_dir.display()
                );
            }
        }
        for tool in tools {
            let found = runner.has_tool(tool);
            if !found {
                log::debug!("Tool {tool} not found");
            }
            ret.tools.insert(tool.to_string(), found);
        }
        log::debug!(
            "Discovered interfaces: {:?}",
            ret.interfaces.iter().collect::<Vec<_>>()
        );
        ret
    }

    pub fn with_interface(mut self, name: &str) -> Self {
        self.interfaces.insert(name.to_string());
        self
    }

    pub fn with_tool(mut self, name: &str, found: bool) -> Self {
        self.tools.insert(name.to_string(), found);
        self
    }

    pub fn has_interface(&self, name: &str) -> bool {
        self.interfaces.contains(name)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(String::as_str)
    }

    /// Tools from `tools` which were probed and not found. Tools never
    /// probed are not reported.
    pub fn missing_tools<'a>(&self, tools: &[&'a str]) -> Vec<&'a str> {
        tools
            .iter()
            .filter(|t| self.tools.get(**t) == Some(&false))
            .copied()
            .collect()
    }
}
