// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::{
    ChildNodes, ConfigNode, ConfigPath, ConfigTree, ConfigValue, NodeData,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Only present in the right (new) tree
    Added,
    /// Only present in the left (old) tree
    Deleted,
    /// Present in both trees, content may differ
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Change {
    kind: ChangeKind,
    identical: bool,
}

/// Child names of a node split by how they changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildNodesDiff {
    /// Every child of the new tree
    pub merge: Vec<String>,
    pub delete: Vec<String>,
    pub add: Vec<String>,
    /// Present on both sides with identical content
    pub stable: Vec<String>,
}

/// Structural comparison of two trees, usually Effective (left) against
/// Session (right). Leaf-list values are compared as sets.
#[derive(Debug, Clone)]
pub struct ConfigDiff {
    left: Arc<ConfigTree>,
    right: Arc<ConfigTree>,
    changes: BTreeMap<ConfigPath, Change>,
    added: ConfigTree,
    deleted: ConfigTree,
    identical: bool,
}

impl ConfigDiff {
    pub fn new(left: Arc<ConfigTree>, right: Arc<ConfigTree>) -> Self {
        let mut changes = BTreeMap::new();
        let (identical, added, deleted) = compare(
            &mut changes,
            &ConfigPath::new(),
            Some(left.root()),
            Some(right.root()),
        );
        let root = |node: Option<ConfigNode>| match node {
            Some(n) => ConfigTree::from_root(n),
            None => ConfigTree::new(),
        };
        Self {
            added: root(added),
            deleted: root(deleted),
            left,
            right,
            changes,
            identical,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identical
    }

    pub fn left(&self) -> &Arc<ConfigTree> {
        &self.left
    }

    pub fn right(&self) -> &Arc<ConfigTree> {
        &self.right
    }

    pub fn change(&self, path: &ConfigPath) -> Option<ChangeKind> {
        if path.is_empty() {
            return Some(ChangeKind::Stable);
        }
        self.changes.get(path).map(|c| c.kind)
    }

    /// Whether anything at or below `path` differs between the trees.
    pub fn node_changed(&self, path: &ConfigPath) -> bool {
        if path.is_empty() {
            return !self.identical;
        }
        self.changes
            .get(path)
            .map(|c| !c.identical)
            .unwrap_or_default()
    }

    /// Whether the node at `path` itself appeared or disappeared.
    pub fn node_changed_presence(&self, path: &ConfigPath) -> bool {
        matches!(
            self.changes.get(path).map(|c| c.kind),
            Some(ChangeKind::Added) | Some(ChangeKind::Deleted)
        )
    }

    /// Direct children of `path` which were added or deleted.
    pub fn node_changed_children(&self, path: &ConfigPath) -> Vec<String> {
        self.changes
            .range(path.clone()..)
            .take_while(|(p, _)| p.starts_with(path))
            .filter(|(p, c)| {
                p.len() == path.len() + 1 && c.kind != ChangeKind::Stable
            })
            .filter_map(|(p, _)| p.last().map(|s| s.to_string()))
            .collect()
    }

    /// Paths that differ, including the ancestors of changed nodes.
    pub fn changed_paths(
        &self,
    ) -> impl Iterator<Item = (&ConfigPath, ChangeKind)> {
        self.changes
            .iter()
            .filter(|(_, c)| !c.identical)
            .map(|(p, c)| (p, c.kind))
    }

    /// Tree holding what is new on the right side: added nodes, the new
    /// value of changed leaves and added leaf-list values.
    pub fn added(&self) -> &ConfigTree {
        &self.added
    }

    /// Tree holding what disappeared from the left side: deleted nodes,
    /// the old value of changed leaves and removed leaf-list values.
    pub fn deleted(&self) -> &ConfigTree {
        &self.deleted
    }

    pub fn added_tree(&self, path: &ConfigPath) -> Option<&ConfigNode> {
        self.added.node(path)
    }

    pub fn deleted_tree(&self, path: &ConfigPath) -> Option<&ConfigNode> {
        self.deleted.node(path)
    }

    /// New and old value of a single value leaf.
    pub fn get_value_diff(
        &self,
        path: &ConfigPath,
    ) -> (Option<ConfigValue>, Option<ConfigValue>) {
        let get = |tree: &ConfigTree| {
            tree.value(path).ok().flatten().cloned()
        };
        (get(&self.right), get(&self.left))
    }

    /// Values added to and removed from a leaf-list.
    pub fn get_values_diff(
        &self,
        path: &ConfigPath,
    ) -> (Vec<ConfigValue>, Vec<ConfigValue>) {
        let get = |tree: &ConfigTree| -> Vec<ConfigValue> {
            tree.node(path)
                .map(|n| n.values().into_iter().cloned().collect())
                .unwrap_or_default()
        };
        (get(&self.added), get(&self.deleted))
    }

    pub fn get_child_nodes_diff(&self, path: &ConfigPath) -> ChildNodesDiff {
        let names = |tree: &ConfigTree| -> Vec<String> {
            tree.node(path)
                .map(|n| {
                    n.children().iter().map(|c| c.name().to_string()).collect()
                })
                .unwrap_or_default()
        };
        let left = names(&self.left);
        let right = names(&self.right);
        let left_set: HashSet<&str> = left.iter().map(|n| n.as_str()).collect();
        let right_set: HashSet<&str> =
            right.iter().map(|n| n.as_str()).collect();
        let mut ret = ChildNodesDiff::default();
        for name in right.iter() {
            if !left_set.contains(name.as_str()) {
                ret.add.push(name.clone());
            } else if !self.node_changed(&path.child(name)) {
                ret.stable.push(name.clone());
            }
        }
        for name in left.iter() {
            if !right_set.contains(name.as_str()) {
                ret.delete.push(name.clone());
            }
        }
        ret.merge = right;
        ret
    }
}

type Compared = (bool, Option<ConfigNode>, Option<ConfigNode>);

fn compare(
    changes: &mut BTreeMap<ConfigPath, Change>,
    path: &ConfigPath,
    left: Option<&ConfigNode>,
    right: Option<&ConfigNode>,
) -> Compared {
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        (Some(l), None) => {
            mark(changes, path, l, ChangeKind::Deleted);
            return (false, None, Some(l.clone()));
        }
        (None, Some(r)) => {
            mark(changes, path, r, ChangeKind::Added);
            return (false, Some(r.clone()), None);
        }
        (None, None) => return (true, None, None),
    };

    let ret = match (l.data(), r.data()) {
        (NodeData::Container(lc), NodeData::Container(rc)) => {
            let (identical, added, deleted) = compare_children(changes, path, lc, rc);
            (
                identical,
                wrap(r.name(), added, NodeData::Container),
                wrap(l.name(), deleted, NodeData::Container),
            )
        }
        (NodeData::Tag(lc), NodeData::Tag(rc)) => {
            let (identical, added, deleted) = compare_children(changes, path, lc, rc);
            (
                identical,
                wrap(r.name(), added, NodeData::Tag),
                wrap(l.name(), deleted, NodeData::Tag),
            )
        }
        (NodeData::Leaf(lv), NodeData::Leaf(rv)) => {
            if lv == rv {
                (true, None, None)
            } else {
                (false, Some(r.clone()), Some(l.clone()))
            }
        }
        (NodeData::LeafList(lv), NodeData::LeafList(rv)) => {
            let lset: HashSet<&ConfigValue> = lv.iter().collect();
            let rset: HashSet<&ConfigValue> = rv.iter().collect();
            let added: Vec<ConfigValue> =
                rv.iter().filter(|v| !lset.contains(v)).cloned().collect();
            let deleted: Vec<ConfigValue> =
                lv.iter().filter(|v| !rset.contains(v)).cloned().collect();
            let identical = added.is_empty() && deleted.is_empty();
            (
                identical,
                (!added.is_empty()).then(|| {
                    ConfigNode::new(r.name(), NodeData::LeafList(added))
                }),
                (!deleted.is_empty()).then(|| {
                    ConfigNode::new(l.name(), NodeData::LeafList(deleted))
                }),
            )
        }
        _ => (false, Some(r.clone()), Some(l.clone())),
    };
    if !path.is_empty() {
        changes.insert(
            path.clone(),
            Change {
                kind: ChangeKind::Stable,
                identical: ret.0,
            },
        );
    }
    ret
}

fn compare_children(
    changes: &mut BTreeMap<ConfigPath, Change>,
    path: &ConfigPath,
    left: &ChildNodes,
    right: &ChildNodes,
) -> (bool, Vec<ConfigNode>, Vec<ConfigNode>) {
    let mut identical = true;
    let mut added = Vec::new();
    let mut deleted = Vec::new();
    // Right order first, then the names only found on the left
    let names = right.iter().map(|n| n.name()).chain(
        left.iter()
            .map(|n| n.name())
            .filter(|n| right.get(n).is_none()),
    );
    for name in names {
        let (same, a, d) = compare(
            changes,
            &path.child(name),
            left.get(name),
            right.get(name),
        );
        identical &= same;
        added.extend(a);
        deleted.extend(d);
    }
    (identical, added, deleted)
}

fn wrap(
    name: &str,
    children: Vec<ConfigNode>,
    kind: fn(ChildNodes) -> NodeData,
) -> Option<ConfigNode> {
    if children.is_empty() {
        None
    } else {
        Some(ConfigNode::new(name, kind(children.into())))
    }
}

fn mark(
    changes: &mut BTreeMap<ConfigPath, Change>,
    path: &ConfigPath,
    node: &ConfigNode,
    kind: ChangeKind,
) {
    changes.insert(
        path.clone(),
        Change {
            kind,
            identical: false,
        },
    );
    for child in node.children() {
        mark(changes, &path.child(child.name()), child, kind);
    }
}
