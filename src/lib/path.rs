// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use crate::{ErrorKind, RtconfError};

/// Ordered sequence of node names addressing a node in a configuration
/// tree. Tag instance identifiers are ordinary path elements, so
/// `interfaces ethernet eth0 address` has four elements.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        self.0.as_slice()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn push(&mut self, name: &str) {
        self.0.push(name.to_string());
    }

    /// New path with `name` appended.
    pub fn child(&self, name: &str) -> Self {
        let mut ret = self.clone();
        ret.push(name);
        ret
    }

    pub fn join(&self, other: &ConfigPath) -> Self {
        let mut ret = self.clone();
        ret.0.extend(other.0.iter().cloned());
        ret
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn starts_with(&self, prefix: &ConfigPath) -> bool {
        self.0.starts_with(prefix.0.as_slice())
    }
}

impl std::fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

impl FromStr for ConfigPath {
    type Err = RtconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let elements: Vec<String> =
            s.split_whitespace().map(|e| e.to_string()).collect();
        if elements.iter().any(|e| e.contains(['{', '}', ';', '"'])) {
            return Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                format!("Invalid configuration path '{s}'"),
            ));
        }
        Ok(Self(elements))
    }
}

impl From<Vec<String>> for ConfigPath {
    fn from(elements: Vec<String>) -> Self {
        Self(elements)
    }
}

impl From<&[&str]> for ConfigPath {
    fn from(elements: &[&str]) -> Self {
        Self(elements.iter().map(|e| e.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ConfigPath {
    fn from(elements: [&str; N]) -> Self {
        Self(elements.iter().map(|e| e.to_string()).collect())
    }
}

impl<'a> IntoIterator for &'a ConfigPath {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
