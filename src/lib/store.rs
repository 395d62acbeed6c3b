// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::file::{write_atomic, FileOptions};
use crate::text::{from_text, to_text};
use crate::{
    ConfigPath, ConfigTree, ConfigValue, ErrorKind, RtconfError, Schema,
};

const SAVED_CONFIG_MODE: u32 = 0o660;

/// Holder of the Running tree and of the editable Session tree.
///
/// Running is swapped as a whole on commit so readers holding a snapshot
/// never observe a partially updated tree.
#[derive(Debug)]
pub struct ConfigStore {
    schema: Arc<Schema>,
    running: RwLock<Arc<ConfigTree>>,
    session: Option<ConfigTree>,
}

impl ConfigStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            running: RwLock::new(Arc::new(ConfigTree::new())),
            session: None,
        }
    }

    pub fn with_running(schema: Arc<Schema>, running: ConfigTree) -> Self {
        Self {
            schema,
            running: RwLock::new(Arc::new(running)),
            session: None,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Snapshot of the Running tree.
    pub fn running(&self) -> Arc<ConfigTree> {
        match self.running.read() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Snapshot of the Session tree, identical to Running when no edit
    /// happened since the last commit.
    pub fn snapshot(&self) -> Arc<ConfigTree> {
        match self.session.as_ref() {
            Some(s) => Arc::new(s.clone()),
            None => self.running(),
        }
    }

    /// Start a new Session as a copy of Running, dropping pending edits.
    pub fn begin_session(&mut self) {
        self.session = Some(self.running().as_ref().clone());
    }

    pub fn discard(&mut self) {
        log::info!("Discarding uncommitted changes");
        self.session = None;
    }

    pub fn has_pending_changes(&self) -> bool {
        match self.session.as_ref() {
            Some(s) => s != self.running().as_ref(),
            None => false,
        }
    }

    fn session_mut(&mut self) -> &mut ConfigTree {
        if self.session.is_none() {
            self.begin_session();
        }
        self.session.get_or_insert_with(ConfigTree::new)
    }

    pub fn set(
        &mut self,
        path: &ConfigPath,
        value: Option<&str>,
    ) -> Result<(), RtconfError> {
        let schema = self.schema.clone();
        self.session_mut().set(&schema, path, value)?;
        log::debug!("set {path} {}", value.unwrap_or_default());
        Ok(())
    }

    pub fn delete(&mut self, path: &ConfigPath) -> Result<(), RtconfError> {
        self.session_mut().delete(path)?;
        log::debug!("delete {path}");
        Ok(())
    }

    pub fn delete_value(
        &mut self,
        path: &ConfigPath,
        value: &str,
    ) -> Result<(), RtconfError> {
        self.session_mut().delete_value(path, value)
    }

    pub fn rename(
        &mut self,
        path: &ConfigPath,
        new_name: &str,
    ) -> Result<(), RtconfError> {
        let schema = self.schema.clone();
        self.session_mut().rename(&schema, path, new_name)
    }

    pub fn copy(
        &mut self,
        path: &ConfigPath,
        new_name: &str,
    ) -> Result<(), RtconfError> {
        let schema = self.schema.clone();
        self.session_mut().copy(&schema, path, new_name)
    }

    pub fn exists(&self, path: &ConfigPath) -> bool {
        self.snapshot().exists(path)
    }

    pub fn value(
        &self,
        path: &ConfigPath,
    ) -> Result<Option<ConfigValue>, RtconfError> {
        Ok(self.snapshot().value(path)?.cloned())
    }

    pub fn values(
        &self,
        path: &ConfigPath,
    ) -> Result<Vec<ConfigValue>, RtconfError> {
        Ok(self
            .snapshot()
            .values(path)?
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn list_children(
        &self,
        path: &ConfigPath,
    ) -> Result<Vec<String>, RtconfError> {
        self.snapshot().list_children(path)
    }

    /// Replace the whole Session, for example with a candidate document.
    pub fn replace_session(&mut self, tree: ConfigTree) {
        self.session = Some(tree);
    }

    /// Atomically promote `tree` to Running.
    pub(crate) fn commit_running(&self, tree: Arc<ConfigTree>) {
        match self.running.write() {
            Ok(mut r) => *r = tree,
            Err(poisoned) => *poisoned.into_inner() = tree,
        }
    }

    /// Persist Running to `path`. On failure the previous file and the
    /// in-memory state are left untouched.
    pub fn save(&self, path: &Path) -> Result<(), RtconfError> {
        let content = to_text(self.running().as_ref());
        write_atomic(
            path,
            content.as_bytes(),
            &FileOptions::new().with_mode(SAVED_CONFIG_MODE),
        )
        .map_err(|e| {
            RtconfError::new(
                ErrorKind::StorageFailure,
                format!("Failed to save configuration: {}", e.msg()),
            )
        })?;
        log::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Replace Running with the content of `path` and reset the Session.
    pub fn load(&mut self, path: &Path) -> Result<(), RtconfError> {
        let tree = self.read_file(path)?;
        self.commit_running(Arc::new(tree));
        self.session = None;
        log::info!("Loaded running configuration from {}", path.display());
        Ok(())
    }

    /// Replace the Session with the content of `path`, Running is kept.
    pub fn load_session(&mut self, path: &Path) -> Result<(), RtconfError> {
        let tree = self.read_file(path)?;
        self.session = Some(tree);
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<ConfigTree, RtconfError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            let e = RtconfError::new(
                ErrorKind::StorageFailure,
                format!("Failed to read {}: {e}", path.display()),
            );
            log::error!("{}", e);
            e
        })?;
        from_text(&self.schema, &content)
    }
}
