// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::schema::SchemaRef;
use crate::{ConfigPath, ConfigValue, ErrorKind, RtconfError, Schema};

pub(crate) const REDACTED_VALUE: &str = "<_secret_hid_by_rtconf>";

/// Children of a branch node in insertion order, indexed by name.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ChildNodes {
    nodes: Vec<ConfigNode>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ChildNodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.nodes.iter()).finish()
    }
}

impl ChildNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[ConfigNode] {
        self.nodes.as_slice()
    }

    pub fn get(&self, name: &str) -> Option<&ConfigNode> {
        self.index.get(name).map(|i| &self.nodes[*i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ConfigNode> {
        let i = self.position(name)?;
        self.nodes.get_mut(i)
    }

    fn iter_mut(&mut self) -> std::slice::IterMut<'_, ConfigNode> {
        self.nodes.iter_mut()
    }

    /// Append `node`, replacing a child of the same name in place.
    fn push(&mut self, node: ConfigNode) -> usize {
        if let Some(i) = self.position(&node.name) {
            self.nodes[i] = node;
            return i;
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn remove(&mut self, name: &str) -> Option<ConfigNode> {
        let i = self.index.remove(name)?;
        let node = self.nodes.remove(i);
        for later in self.nodes[i..].iter() {
            if let Some(pos) = self.index.get_mut(&later.name) {
                *pos -= 1;
            }
        }
        Some(node)
    }

    fn rename(&mut self, name: &str, new_name: &str) -> bool {
        match self.index.remove(name) {
            Some(i) => {
                self.nodes[i].name = new_name.to_string();
                self.index.insert(new_name.to_string(), i);
                true
            }
            None => false,
        }
    }
}

impl std::ops::Deref for ChildNodes {
    type Target = [ConfigNode];

    fn deref(&self) -> &[ConfigNode] {
        self.nodes.as_slice()
    }
}

impl From<Vec<ConfigNode>> for ChildNodes {
    fn from(nodes: Vec<ConfigNode>) -> Self {
        let mut ret = Self::new();
        for node in nodes {
            ret.push(node);
        }
        ret
    }
}

impl<'a> IntoIterator for &'a ChildNodes {
    type Item = &'a ConfigNode;
    type IntoIter = std::slice::Iter<'a, ConfigNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// Fixed set of named children. Tag instances are containers too.
    Container(ChildNodes),
    /// Children are the instances, named by their identifier.
    Tag(ChildNodes),
    /// `None` for valueless leaves.
    Leaf(Option<ConfigValue>),
    LeafList(Vec<ConfigValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNode {
    name: String,
    data: NodeData,
}

impl ConfigNode {
    pub(crate) fn new(name: &str, data: NodeData) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }

    fn new_for(name: &str, schema: &SchemaRef) -> Self {
        let data = if schema.is_container() {
            NodeData::Container(ChildNodes::new())
        } else if schema.is_tag() {
            NodeData::Tag(ChildNodes::new())
        } else if schema.is_multi() {
            NodeData::LeafList(Vec::new())
        } else {
            NodeData::Leaf(None)
        };
        Self::new(name, data)
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.data, NodeData::Leaf(_) | NodeData::LeafList(_))
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.data, NodeData::Tag(_))
    }

    /// Children of containers and tag nodes, empty for leaves.
    pub fn children(&self) -> &[ConfigNode] {
        match &self.data {
            NodeData::Container(c) | NodeData::Tag(c) => c.as_slice(),
            _ => &[],
        }
    }

    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        match &self.data {
            NodeData::Container(c) | NodeData::Tag(c) => c.get(name),
            _ => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut ChildNodes> {
        match &mut self.data {
            NodeData::Container(c) | NodeData::Tag(c) => Some(c),
            _ => None,
        }
    }

    /// Values of a leaf or leaf-list, empty for other nodes.
    pub fn values(&self) -> Vec<&ConfigValue> {
        match &self.data {
            NodeData::Leaf(Some(v)) => vec![v],
            NodeData::LeafList(vs) => vs.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Mapping form: containers and tags become objects, leaf values
    /// become strings, leaf-lists become lists and valueless leaves
    /// become empty objects.
    pub fn to_json(&self) -> Value {
        match &self.data {
            NodeData::Container(c) | NodeData::Tag(c) => {
                let mut map = Map::new();
                for child in c {
                    map.insert(child.name.clone(), child.to_json());
                }
                Value::Object(map)
            }
            NodeData::Leaf(Some(v)) => Value::String(v.to_string()),
            NodeData::Leaf(None) => Value::Object(Map::new()),
            NodeData::LeafList(vs) => Value::Array(
                vs.iter().map(|v| Value::String(v.to_string())).collect(),
            ),
        }
    }

    fn is_empty_branch(&self) -> bool {
        match &self.data {
            NodeData::Container(c) | NodeData::Tag(c) => c.is_empty(),
            NodeData::LeafList(vs) => vs.is_empty(),
            NodeData::Leaf(_) => false,
        }
    }

    fn redact(&mut self, schema: &Schema, path: &ConfigPath) {
        match &mut self.data {
            NodeData::Container(c) | NodeData::Tag(c) => {
                for child in c.iter_mut() {
                    let child_path = path.child(&child.name);
                    child.redact(schema, &child_path);
                }
            }
            NodeData::Leaf(Some(v)) => {
                if schema.is_secret(path) {
                    *v = ConfigValue::String(REDACTED_VALUE.to_string());
                }
            }
            NodeData::LeafList(vs) => {
                if schema.is_secret(path) {
                    for v in vs.iter_mut() {
                        *v = ConfigValue::String(REDACTED_VALUE.to_string());
                    }
                }
            }
            NodeData::Leaf(None) => (),
        }
    }

    fn append_commands(&self, path: &ConfigPath, out: &mut Vec<String>) {
        match &self.data {
            NodeData::Container(c) | NodeData::Tag(c) => {
                if c.is_empty() && !path.is_empty() {
                    out.push(format!("set {path}"));
                }
                for child in c {
                    child.append_commands(&path.child(&child.name), out);
                }
            }
            NodeData::Leaf(None) => out.push(format!("set {path}")),
            NodeData::Leaf(Some(v)) => out.push(format!("set {path} '{v}'")),
            NodeData::LeafList(vs) => {
                for v in vs {
                    out.push(format!("set {path} '{v}'"));
                }
            }
        }
    }
}

/// Hierarchical configuration document. Children keep their insertion
/// order. Every tree built through `set()` or loaded from text is valid
/// against the schema it was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTree {
    root: ConfigNode,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self {
            root: ConfigNode::new("", NodeData::Container(ChildNodes::new())),
        }
    }
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    pub(crate) fn from_root(root: ConfigNode) -> Self {
        Self { root }
    }

    pub fn is_empty(&self) -> bool {
        self.root.children().is_empty()
    }

    pub fn node(&self, path: &ConfigPath) -> Option<&ConfigNode> {
        let mut cur = &self.root;
        for name in path {
            cur = cur.child(name)?;
        }
        Some(cur)
    }

    fn node_mut(&mut self, path: &ConfigPath) -> Option<&mut ConfigNode> {
        let mut cur = &mut self.root;
        for name in path {
            cur = cur.children_mut()?.get_mut(name)?;
        }
        Some(cur)
    }

    pub fn exists(&self, path: &ConfigPath) -> bool {
        self.node(path).is_some()
    }

    fn get(&self, path: &ConfigPath) -> Result<&ConfigNode, RtconfError> {
        self.node(path).ok_or_else(|| not_found(path))
    }

    /// Value of a single valued leaf, `None` for valueless leaves.
    pub fn value(
        &self,
        path: &ConfigPath,
    ) -> Result<Option<&ConfigValue>, RtconfError> {
        match &self.get(path)?.data {
            NodeData::Leaf(v) => Ok(v.as_ref()),
            _ => Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                format!("Node [{path}] is not a single value leaf"),
            )),
        }
    }

    pub fn values(
        &self,
        path: &ConfigPath,
    ) -> Result<Vec<&ConfigValue>, RtconfError> {
        let node = self.get(path)?;
        if node.is_leaf() {
            Ok(node.values())
        } else {
            Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                format!("Node [{path}] is not a leaf"),
            ))
        }
    }

    /// Names of the direct children, tag instance identifiers for tag
    /// nodes.
    pub fn list_children(
        &self,
        path: &ConfigPath,
    ) -> Result<Vec<String>, RtconfError> {
        let node = self.get(path)?;
        if node.is_leaf() {
            return Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                format!("Node [{path}] is a leaf and has no children"),
            ));
        }
        Ok(node.children().iter().map(|c| c.name.clone()).collect())
    }

    /// Create the node at `path` with every missing ancestor. Leaves take
    /// the validated `value`, leaf-lists append it.
    pub fn set(
        &mut self,
        schema: &Schema,
        path: &ConfigPath,
        value: Option<&str>,
    ) -> Result<(), RtconfError> {
        let target = schema.resolve(path)?;
        let parsed = match (target.is_leaf(), value) {
            (true, Some(v)) => Some(
                target.node.parse_value(v).map_err(|e| with_path(e, path))?,
            ),
            (true, None) => {
                if target.node.is_valueless() {
                    None
                } else {
                    return Err(schema_violation(
                        path,
                        "Value is required".to_string(),
                    ));
                }
            }
            (false, Some(v)) => {
                return Err(schema_violation(
                    path,
                    format!("Node does not take a value, got '{v}'"),
                ));
            }
            (false, None) => {
                if target.is_tag() {
                    return Err(schema_violation(
                        path,
                        "Tag node requires an identifier".to_string(),
                    ));
                }
                None
            }
        };

        let mut prefix = ConfigPath::new();
        let mut cur = &mut self.root;
        for name in path {
            prefix.push(name);
            let node_schema = schema.resolve(&prefix)?;
            let children = cur.children_mut().ok_or_else(|| {
                RtconfError::new(
                    ErrorKind::Bug,
                    format!("Node [{prefix}] has a leaf as parent"),
                )
            })?;
            let idx = match children.position(name) {
                Some(i) => i,
                None => children.push(ConfigNode::new_for(name, &node_schema)),
            };
            cur = &mut children.nodes[idx];
        }

        match &mut cur.data {
            NodeData::Leaf(v) => *v = parsed,
            NodeData::LeafList(vs) => {
                if let Some(v) = parsed {
                    if vs.contains(&v) {
                        return Err(schema_violation(
                            path,
                            format!("Value '{v}' already exists"),
                        ));
                    }
                    vs.push(v);
                }
            }
            _ => (),
        }
        Ok(())
    }

    /// Remove the subtree at `path`. Tag and container nodes left without
    /// children are removed as well, tag instances are kept.
    pub fn delete(&mut self, path: &ConfigPath) -> Result<(), RtconfError> {
        let parent_path = match path.parent() {
            Some(p) => p,
            None => {
                self.root = ConfigTree::default().root;
                return Ok(());
            }
        };
        let name = path.last().unwrap_or_default();
        let children = self
            .node_mut(&parent_path)
            .and_then(|n| n.children_mut())
            .ok_or_else(|| not_found(path))?;
        children.remove(name).ok_or_else(|| not_found(path))?;
        self.prune(&parent_path);
        Ok(())
    }

    fn prune(&mut self, path: &ConfigPath) {
        let mut cur = path.clone();
        while let Some(parent) = cur.parent() {
            let removable = self.node(&cur).map(|n| n.is_empty_branch())
                == Some(true)
                && !self.node(&parent).map(|p| p.is_tag()).unwrap_or_default();
            if !removable {
                break;
            }
            let name = cur.last().unwrap_or_default().to_string();
            if let Some(children) =
                self.node_mut(&parent).and_then(|n| n.children_mut())
            {
                children.remove(&name);
            }
            cur = parent;
        }
    }

    /// Remove a single value of a leaf-list, deleting the leaf once empty.
    pub fn delete_value(
        &mut self,
        path: &ConfigPath,
        value: &str,
    ) -> Result<(), RtconfError> {
        let node = self.node_mut(path).ok_or_else(|| not_found(path))?;
        let now_empty = match &mut node.data {
            NodeData::LeafList(vs) => {
                let before = vs.len();
                vs.retain(|v| v.to_string() != value);
                if vs.len() == before {
                    return Err(value_not_found(path, value));
                }
                vs.is_empty()
            }
            NodeData::Leaf(Some(v)) => {
                if v.to_string() != value {
                    return Err(value_not_found(path, value));
                }
                true
            }
            _ => return Err(value_not_found(path, value)),
        };
        if now_empty {
            self.delete(path)?;
        }
        Ok(())
    }

    /// Rename the tag instance at `path`.
    pub fn rename(
        &mut self,
        schema: &Schema,
        path: &ConfigPath,
        new_name: &str,
    ) -> Result<(), RtconfError> {
        let new_path = self.check_tag_instance_target(schema, path, new_name)?;
        let old_name = path.last().unwrap_or_default();
        if let Some(children) = path
            .parent()
            .and_then(|p| self.node_mut(&p))
            .and_then(|n| n.children_mut())
        {
            children.rename(old_name, new_name);
        }
        log::debug!("Renamed [{path}] to [{new_path}]");
        Ok(())
    }

    /// Duplicate the tag instance at `path` under a new identifier.
    pub fn copy(
        &mut self,
        schema: &Schema,
        path: &ConfigPath,
        new_name: &str,
    ) -> Result<(), RtconfError> {
        let new_path = self.check_tag_instance_target(schema, path, new_name)?;
        let mut node = self.get(path)?.clone();
        node.name = new_name.to_string();
        if let Some(children) = new_path
            .parent()
            .and_then(|p| self.node_mut(&p))
            .and_then(|n| n.children_mut())
        {
            children.push(node);
        }
        Ok(())
    }

    fn check_tag_instance_target(
        &self,
        schema: &Schema,
        path: &ConfigPath,
        new_name: &str,
    ) -> Result<ConfigPath, RtconfError> {
        self.get(path)?;
        let parent = path.parent().unwrap_or_default();
        if !schema.is_tag_value(path) {
            return Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                format!("Node [{path}] is not a tag node instance"),
            ));
        }
        let new_path = parent.child(new_name);
        schema.resolve(&new_path)?;
        if self.exists(&new_path) {
            return Err(RtconfError::new(
                ErrorKind::InvalidArgument,
                format!("Node [{new_path}] already exists"),
            ));
        }
        Ok(new_path)
    }

    /// Equivalent list of `set` commands, one per leaf value.
    pub fn to_commands(&self) -> String {
        let mut out = Vec::new();
        self.root.append_commands(&ConfigPath::new(), &mut out);
        out.join("\n")
    }

    /// Copy of the tree with every secret leaf value replaced.
    pub fn redacted(&self, schema: &Schema) -> Self {
        let mut ret = self.clone();
        ret.root.redact(schema, &ConfigPath::new());
        ret
    }

    pub fn to_json(&self) -> Value {
        self.root.to_json()
    }

    /// Build a tree from its mapping form, as produced by `to_json()`.
    /// Scalars may be strings, numbers or booleans.
    pub fn from_json(schema: &Schema, value: &Value) -> Result<Self, RtconfError> {
        let mut tree = Self::new();
        match value {
            Value::Object(map) => {
                tree.set_json(schema, &ConfigPath::new(), map)?;
            }
            Value::Null => (),
            _ => {
                return Err(RtconfError::new(
                    ErrorKind::InvalidArgument,
                    "Configuration document must be a mapping".to_string(),
                ));
            }
        }
        Ok(tree)
    }

    fn set_json(
        &mut self,
        schema: &Schema,
        path: &ConfigPath,
        map: &Map<String, Value>,
    ) -> Result<(), RtconfError> {
        for (name, value) in map {
            let child_path = path.child(name);
            let r = schema.resolve(&child_path)?;
            if r.is_leaf() {
                if r.node.is_valueless() {
                    match value {
                        Value::Bool(false) => (),
                        Value::Null | Value::Bool(true) => {
                            self.set(schema, &child_path, None)?
                        }
                        Value::Object(m) if m.is_empty() => {
                            self.set(schema, &child_path, None)?
                        }
                        _ => {
                            return Err(schema_violation(
                                &child_path,
                                "Valueless node cannot hold a value"
                                    .to_string(),
                            ));
                        }
                    }
                } else if let Value::Array(items) = value {
                    if !r.is_multi() {
                        return Err(schema_violation(
                            &child_path,
                            "Node does not accept multiple values".to_string(),
                        ));
                    }
                    for item in items {
                        let raw = json_scalar(&child_path, item)?;
                        self.set(schema, &child_path, Some(&raw))?;
                    }
                } else {
                    let raw = json_scalar(&child_path, value)?;
                    self.set(schema, &child_path, Some(&raw))?;
                }
            } else if r.is_tag() {
                match value {
                    Value::Object(instances) => {
                        for (id, content) in instances {
                            let instance_path = child_path.child(id);
                            self.set(schema, &instance_path, None)?;
                            if let Value::Object(m) = content {
                                self.set_json(schema, &instance_path, m)?;
                            } else if !content.is_null() {
                                return Err(schema_violation(
                                    &instance_path,
                                    "Tag instance must be a mapping"
                                        .to_string(),
                                ));
                            }
                        }
                    }
                    _ => {
                        return Err(schema_violation(
                            &child_path,
                            "Tag node must be a mapping of instances"
                                .to_string(),
                        ));
                    }
                }
            } else {
                self.set(schema, &child_path, None)?;
                match value {
                    Value::Object(m) => self.set_json(schema, &child_path, m)?,
                    Value::Null => (),
                    _ => {
                        return Err(schema_violation(
                            &child_path,
                            "Container must be a mapping".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn json_scalar(path: &ConfigPath, value: &Value) -> Result<String, RtconfError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(schema_violation(
            path,
            format!("Expecting a scalar value, got {value}"),
        )),
    }
}

fn with_path(e: RtconfError, path: &ConfigPath) -> RtconfError {
    RtconfError::new_with_path(e.kind(), &path.to_string(), e.msg().to_string())
}

fn schema_violation(path: &ConfigPath, msg: String) -> RtconfError {
    RtconfError::new_with_path(ErrorKind::SchemaViolation, &path.to_string(), msg)
}

fn not_found(path: &ConfigPath) -> RtconfError {
    RtconfError::new(
        ErrorKind::NotFound,
        format!("Configuration path: [{path}] does not exist"),
    )
}

fn value_not_found(path: &ConfigPath, value: &str) -> RtconfError {
    RtconfError::new(
        ErrorKind::NotFound,
        format!("Value '{value}' does not exist at [{path}]"),
    )
}
