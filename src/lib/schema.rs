// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::value::ValueConstraint;
use crate::{ConfigPath, ConfigValue, ErrorKind, RtconfError, ValueType};

const BUILTIN_SCHEMA: &str = include_str!("schema/router.yml");

static BUILTIN: OnceLock<Result<Arc<Schema>, RtconfError>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Container,
    Tag,
    Leaf,
    LeafList,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum SchemaDefault {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SchemaNode {
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    value: ValueType,
    #[serde(default)]
    range: Option<(u64, u64)>,
    #[serde(default)]
    values: Vec<String>,
    #[serde(default)]
    default: Option<SchemaDefault>,
    #[serde(default)]
    secret: bool,
    #[serde(default)]
    tag_value: Option<ValueType>,
    #[serde(default)]
    tag_range: Option<(u64, u64)>,
    #[serde(default)]
    tag_prefix: Option<String>,
    #[serde(default)]
    children: BTreeMap<String, SchemaNode>,
}

impl SchemaNode {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn value_type(&self) -> ValueType {
        self.value
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    pub fn is_valueless(&self) -> bool {
        self.kind == NodeKind::Leaf && self.value == ValueType::None
    }

    pub fn child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Validate a raw leaf value and convert it to its stored form.
    pub fn parse_value(&self, raw: &str) -> Result<ConfigValue, RtconfError> {
        self.value.parse(
            raw,
            &ValueConstraint {
                range: self.range,
                values: self.values.as_slice(),
            },
        )
    }

    pub(crate) fn validate_tag_value(
        &self,
        id: &str,
    ) -> Result<(), RtconfError> {
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(RtconfError::new(
                ErrorKind::SchemaViolation,
                format!("Invalid tag node identifier '{id}'"),
            ));
        }
        if let Some(prefix) = self.tag_prefix.as_deref() {
            if !id.starts_with(prefix) || id.len() == prefix.len() {
                return Err(RtconfError::new(
                    ErrorKind::SchemaViolation,
                    format!(
                        "Identifier '{id}' must start with '{prefix}' \
                        followed by a suffix"
                    ),
                ));
            }
        }
        if let Some(value_type) = self.tag_value {
            value_type.parse(
                id,
                &ValueConstraint {
                    range: self.tag_range,
                    values: &[],
                },
            )?;
        }
        Ok(())
    }

    fn default_json(&self) -> Option<Value> {
        match (&self.kind, self.default.as_ref()?) {
            (NodeKind::Leaf, SchemaDefault::One(v)) => {
                Some(Value::String(v.clone()))
            }
            (NodeKind::LeafList, SchemaDefault::One(v)) => Some(Value::Array(
                v.split_whitespace()
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            )),
            (NodeKind::LeafList, SchemaDefault::Many(vs)) => Some(
                Value::Array(vs.iter().map(|s| Value::String(s.clone())).collect()),
            ),
            _ => None,
        }
    }

    // Defaults of the direct leaves, descending into containers only when
    // `recursive`. Tag nodes are never entered: an instance only exists
    // once configured.
    fn defaults(&self, recursive: bool) -> Map<String, Value> {
        let mut ret = Map::new();
        for (name, child) in self.children.iter() {
            match child.kind {
                NodeKind::Leaf | NodeKind::LeafList => {
                    if let Some(v) = child.default_json() {
                        ret.insert(name.to_string(), v);
                    }
                }
                NodeKind::Container => {
                    if recursive {
                        let sub = child.defaults(true);
                        if !sub.is_empty() {
                            ret.insert(name.to_string(), Value::Object(sub));
                        }
                    }
                }
                NodeKind::Tag => (),
            }
        }
        ret
    }

    fn merge_defaults(&self, value: &mut Map<String, Value>, recursive: bool) {
        for (name, child) in self.children.iter() {
            match child.kind {
                NodeKind::Leaf | NodeKind::LeafList => {
                    if !value.contains_key(name) {
                        if let Some(v) = child.default_json() {
                            value.insert(name.to_string(), v);
                        }
                    }
                }
                NodeKind::Container => match value.get_mut(name) {
                    Some(Value::Object(sub)) => {
                        child.merge_defaults(sub, recursive)
                    }
                    None if recursive => {
                        let sub = child.defaults(true);
                        if !sub.is_empty() {
                            value.insert(name.to_string(), Value::Object(sub));
                        }
                    }
                    _ => (),
                },
                NodeKind::Tag => {
                    if recursive {
                        if let Some(Value::Object(instances)) =
                            value.get_mut(name)
                        {
                            child.merge_instance_defaults(instances);
                        }
                    }
                }
            }
        }
    }

    fn merge_instance_defaults(&self, instances: &mut Map<String, Value>) {
        for instance in instances.values_mut() {
            if let Value::Object(instance) = instance {
                self.merge_defaults(instance, true);
            }
        }
    }

    fn check(&self, path: &ConfigPath) -> Result<(), RtconfError> {
        let bad = |msg: &str| {
            Err(RtconfError::new(
                ErrorKind::Bug,
                format!("Invalid schema node '{path}': {msg}"),
            ))
        };
        match self.kind {
            NodeKind::Leaf | NodeKind::LeafList => {
                if !self.children.is_empty() {
                    return bad("leaf nodes cannot have children");
                }
                if self.kind == NodeKind::LeafList
                    && self.value == ValueType::None
                {
                    return bad("leaf-list nodes must carry a value");
                }
                if self.value == ValueType::Enum && self.values.is_empty() {
                    return bad("enum leaf without values");
                }
                match self.default.as_ref() {
                    Some(SchemaDefault::One(v)) => {
                        for v in v.split_whitespace() {
                            self.parse_value(v)?;
                        }
                    }
                    Some(SchemaDefault::Many(vs)) => {
                        if self.kind == NodeKind::Leaf {
                            return bad("leaf default must be a scalar");
                        }
                        for v in vs {
                            self.parse_value(v)?;
                        }
                    }
                    None => (),
                }
            }
            NodeKind::Container | NodeKind::Tag => {
                if self.default.is_some() {
                    return bad("only leaves can have defaults");
                }
                for (name, child) in self.children.iter() {
                    child.check(&path.child(name))?;
                }
            }
        }
        Ok(())
    }
}

/// Result of resolving a configuration path against the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaRef<'a> {
    pub node: &'a SchemaNode,
    /// The path ends on a tag instance identifier, `node` is then the tag
    /// node describing the instance content.
    pub tag_instance: bool,
}

impl<'a> SchemaRef<'a> {
    /// Whether the addressed node holds children (container or tag
    /// instance).
    pub fn is_container(&self) -> bool {
        self.tag_instance || self.node.kind == NodeKind::Container
    }

    pub fn is_tag(&self) -> bool {
        !self.tag_instance && self.node.kind == NodeKind::Tag
    }

    pub fn is_leaf(&self) -> bool {
        !self.tag_instance
            && matches!(self.node.kind, NodeKind::Leaf | NodeKind::LeafList)
    }

    pub fn is_multi(&self) -> bool {
        !self.tag_instance && self.node.kind == NodeKind::LeafList
    }
}

/// Declarative description of every valid configuration path, the value
/// type of each leaf and its default.
#[derive(Debug, Clone)]
pub struct Schema {
    root: SchemaNode,
}

impl Schema {
    pub fn from_yaml(content: &str) -> Result<Self, RtconfError> {
        let children: BTreeMap<String, SchemaNode> =
            serde_yaml::from_str(content)?;
        let root = SchemaNode {
            kind: NodeKind::Container,
            value: ValueType::None,
            range: None,
            values: Vec::new(),
            default: None,
            secret: false,
            tag_value: None,
            tag_range: None,
            tag_prefix: None,
            children,
        };
        root.check(&ConfigPath::new())?;
        Ok(Self { root })
    }

    /// Schema shipped with this library, parsed once per process.
    pub fn builtin() -> Result<Arc<Self>, RtconfError> {
        BUILTIN
            .get_or_init(|| Schema::from_yaml(BUILTIN_SCHEMA).map(Arc::new))
            .clone()
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    pub fn resolve(
        &self,
        path: &ConfigPath,
    ) -> Result<SchemaRef<'_>, RtconfError> {
        let mut cur = SchemaRef {
            node: &self.root,
            tag_instance: false,
        };
        for name in path {
            cur = if cur.is_tag() {
                cur.node.validate_tag_value(name).map_err(|e| {
                    RtconfError::new_with_path(
                        e.kind(),
                        &path.to_string(),
                        e.msg().to_string(),
                    )
                })?;
                SchemaRef {
                    node: cur.node,
                    tag_instance: true,
                }
            } else if cur.is_leaf() {
                return Err(invalid_path(path));
            } else {
                match cur.node.child(name) {
                    Some(node) => SchemaRef {
                        node,
                        tag_instance: false,
                    },
                    None => return Err(invalid_path(path)),
                }
            };
        }
        Ok(cur)
    }

    pub fn is_tag(&self, path: &ConfigPath) -> bool {
        self.resolve(path).map(|r| r.is_tag()).unwrap_or_default()
    }

    pub fn is_tag_value(&self, path: &ConfigPath) -> bool {
        self.resolve(path).map(|r| r.tag_instance).unwrap_or_default()
    }

    pub fn is_leaf(&self, path: &ConfigPath) -> bool {
        self.resolve(path).map(|r| r.is_leaf()).unwrap_or_default()
    }

    pub fn is_multi(&self, path: &ConfigPath) -> bool {
        self.resolve(path).map(|r| r.is_multi()).unwrap_or_default()
    }

    pub fn is_secret(&self, path: &ConfigPath) -> bool {
        self.resolve(path)
            .map(|r| r.is_leaf() && r.node.secret)
            .unwrap_or_default()
    }

    /// Default values of the node at `path` as a mapping.
    pub fn defaults(
        &self,
        path: &ConfigPath,
        recursive: bool,
    ) -> Result<Map<String, Value>, RtconfError> {
        let r = self.resolve(path)?;
        if r.is_container() {
            Ok(r.node.defaults(recursive))
        } else {
            Ok(Map::new())
        }
    }

    /// Overlay defaults onto `value`, the mapping form of the node at
    /// `path`. Configured values always win over defaults.
    pub fn merge_defaults(
        &self,
        path: &ConfigPath,
        value: &mut Value,
        recursive: bool,
    ) -> Result<(), RtconfError> {
        let r = self.resolve(path)?;
        if let Value::Object(map) = value {
            if r.is_container() {
                r.node.merge_defaults(map, recursive);
            } else if r.is_tag() && recursive {
                r.node.merge_instance_defaults(map);
            }
        }
        Ok(())
    }
}

fn invalid_path(path: &ConfigPath) -> RtconfError {
    let e = RtconfError::new(
        ErrorKind::SchemaViolation,
        format!("Configuration path: [{path}] is not valid"),
    );
    log::error!("{}", e);
    e
}
