// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    ConfigPath, ConfigTree, ConfigValue, ErrorKind, RtconfError, Schema,
};

/// Options of [ConfigQuery::get_config_dict()].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConfigDictOptions {
    /// Replace the first string with the second one in every key, for
    /// example `("-", "_")` so keys map onto struct fields.
    pub key_mangling: Option<(String, String)>,
    /// Keep tag instance identifiers (interface names, ...) unmangled.
    pub no_tag_node_value_mangle: bool,
    /// Return the content of the node instead of `{name: content}`.
    pub get_first_key: bool,
    /// Overlay schema defaults, not entering tag instances.
    pub with_defaults: bool,
    /// Overlay schema defaults including inside tag instances and absent
    /// containers.
    pub with_recursive_defaults: bool,
    /// Read from the Effective tree instead of the Session.
    pub effective: bool,
}

impl ConfigDictOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used by most handlers: `-` mangled into `_` except in tag
    /// identifiers, node content only, defaults applied.
    pub fn handler_view() -> Self {
        Self {
            key_mangling: Some(("-".to_string(), "_".to_string())),
            no_tag_node_value_mangle: true,
            get_first_key: true,
            with_recursive_defaults: true,
            ..Default::default()
        }
    }

    pub fn effective(mut self) -> Self {
        self.effective = true;
        self
    }
}

/// Read-only view over the Session and Effective trees used by handlers
/// to build their views. Queries are relative to the edit level.
#[derive(Debug, Clone)]
pub struct ConfigQuery {
    session: Arc<ConfigTree>,
    effective: Arc<ConfigTree>,
    schema: Arc<Schema>,
    level: ConfigPath,
}

impl ConfigQuery {
    pub fn new(
        session: Arc<ConfigTree>,
        effective: Arc<ConfigTree>,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            session,
            effective,
            schema,
            level: ConfigPath::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn session(&self) -> &Arc<ConfigTree> {
        &self.session
    }

    pub fn effective_tree(&self) -> &Arc<ConfigTree> {
        &self.effective
    }

    pub fn level(&self) -> &ConfigPath {
        &self.level
    }

    pub fn set_level(&mut self, level: ConfigPath) {
        self.level = level;
    }

    fn full(&self, path: &ConfigPath) -> ConfigPath {
        self.level.join(path)
    }

    pub fn exists(&self, path: &ConfigPath) -> bool {
        self.session.exists(&self.full(path))
    }

    pub fn exists_effective(&self, path: &ConfigPath) -> bool {
        self.effective.exists(&self.full(path))
    }

    /// Value of a leaf, `None` when the leaf is absent or valueless.
    pub fn return_value(&self, path: &ConfigPath) -> Option<ConfigValue> {
        self.session.value(&self.full(path)).ok().flatten().cloned()
    }

    pub fn return_effective_value(
        &self,
        path: &ConfigPath,
    ) -> Option<ConfigValue> {
        self.effective.value(&self.full(path)).ok().flatten().cloned()
    }

    pub fn return_values(&self, path: &ConfigPath) -> Vec<ConfigValue> {
        values(&self.session, &self.full(path))
    }

    pub fn return_effective_values(
        &self,
        path: &ConfigPath,
    ) -> Vec<ConfigValue> {
        values(&self.effective, &self.full(path))
    }

    /// Child names, empty when the node is absent.
    pub fn list_nodes(&self, path: &ConfigPath) -> Vec<String> {
        self.session
            .list_children(&self.full(path))
            .unwrap_or_default()
    }

    pub fn list_effective_nodes(&self, path: &ConfigPath) -> Vec<String> {
        self.effective
            .list_children(&self.full(path))
            .unwrap_or_default()
    }

    /// Mapping form of the subtree at `path`. The result is a copy. An
    /// absent node gives an empty mapping, plus defaults when requested
    /// and the node is not part of a tag instance.
    pub fn get_config_dict(
        &self,
        path: &ConfigPath,
        opts: &ConfigDictOptions,
    ) -> Result<Value, RtconfError> {
        let full = self.full(path);
        self.schema.resolve(&full).map_err(|e| {
            RtconfError::new(ErrorKind::InvalidArgument, e.msg().to_string())
        })?;
        let tree = if opts.effective {
            &self.effective
        } else {
            &self.session
        };
        let node = tree.node(&full);
        let mut value = match node {
            Some(node) => node.to_json(),
            None => Value::Object(Map::new()),
        };
        // Defaults of a missing tag instance would describe an object
        // which does not exist, fixed containers always get them.
        if (opts.with_defaults || opts.with_recursive_defaults)
            && (node.is_some() || !self.within_tag_instance(&full))
        {
            self.schema.merge_defaults(
                &full,
                &mut value,
                opts.with_recursive_defaults,
            )?;
        }
        if let Some((from, to)) = opts.key_mangling.as_ref() {
            value = self.mangle_keys(
                &full,
                value,
                from,
                to,
                opts.no_tag_node_value_mangle,
            );
        }
        if opts.get_first_key || full.is_empty() {
            Ok(value)
        } else {
            let mut key = full.last().unwrap_or_default().to_string();
            let keep = opts.no_tag_node_value_mangle
                && self.schema.is_tag_value(&full);
            if let Some((from, to)) = opts.key_mangling.as_ref() {
                if !keep {
                    key = key.replace(from.as_str(), to);
                }
            }
            let mut map = Map::new();
            map.insert(key, value);
            Ok(Value::Object(map))
        }
    }

    fn within_tag_instance(&self, path: &ConfigPath) -> bool {
        let mut prefix = ConfigPath::new();
        for name in path {
            prefix.push(name);
            if self.schema.is_tag_value(&prefix) {
                return true;
            }
        }
        false
    }

    fn mangle_keys(
        &self,
        path: &ConfigPath,
        value: Value,
        from: &str,
        to: &str,
        keep_tag_values: bool,
    ) -> Value {
        match value {
            Value::Object(map) => {
                let mut ret = Map::new();
                for (k, v) in map {
                    let child_path = path.child(&k);
                    let leaf = self.schema.is_leaf(&child_path);
                    let new_key = if keep_tag_values
                        && self.schema.is_tag_value(&child_path)
                    {
                        k
                    } else {
                        k.replace(from, to)
                    };
                    let v = if leaf {
                        v
                    } else {
                        self.mangle_keys(&child_path, v, from, to, keep_tag_values)
                    };
                    ret.insert(new_key, v);
                }
                Value::Object(ret)
            }
            v => v,
        }
    }
}

fn values(tree: &ConfigTree, path: &ConfigPath) -> Vec<ConfigValue> {
    tree.values(path)
        .map(|vs| vs.into_iter().cloned().collect())
        .unwrap_or_default()
}
