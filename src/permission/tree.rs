//! Menu tree construction
//!
//! Builds the nested permission tree from a flat, pre-sorted node list.
//! Ordering is never changed here: siblings come out in the order the caller
//! supplied, which is `(sort, created_at)` ascending for every store query.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::entity::permission;

/// One node of the rendered tree.
///
/// The node is serialized flat; `children` is left out entirely for leaves
/// because clients decide on an expand affordance by key presence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionTree {
    #[serde(flatten)]
    pub node: permission::Model,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PermissionTree>,
}

impl PermissionTree {
    /// Every code in this subtree, depth first.
    pub fn codes(&self) -> Vec<&str> {
        let mut out = vec![self.node.code.as_str()];
        for child in &self.children {
            out.extend(child.codes());
        }
        out
    }
}

/// Build the tree for `nodes`.
///
/// With `parent_code = None` the roots are the nodes without a parent. With
/// `Some(code)` the result is the forest of that node's descendants. A node
/// whose parent is missing from `nodes` is never attached.
pub fn build_tree(nodes: &[permission::Model], parent_code: Option<&str>) -> Vec<PermissionTree> {
    let mut by_parent: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (idx, node) in nodes.iter().enumerate() {
        match node.parent() {
            Some(parent) => by_parent.entry(parent).or_default().push(idx),
            None => roots.push(idx),
        }
    }

    let level = match parent_code {
        None => roots,
        Some(code) => by_parent.get(code).cloned().unwrap_or_default(),
    };

    let mut builder = Builder {
        nodes,
        by_parent,
        visited: HashSet::new(),
    };
    if let Some(code) = parent_code {
        builder.visited.insert(code);
    }

    builder.level(&level)
}

struct Builder<'a> {
    nodes: &'a [permission::Model],
    by_parent: HashMap<&'a str, Vec<usize>>,
    /// Codes already placed; a cyclic parent chain stops here
    visited: HashSet<&'a str>,
}

impl<'a> Builder<'a> {
    fn level(&mut self, indices: &[usize]) -> Vec<PermissionTree> {
        let nodes = self.nodes;
        let mut out = Vec::with_capacity(indices.len());
        for &idx in indices {
            let node = &nodes[idx];
            if !self.visited.insert(node.code.as_str()) {
                continue;
            }
            let child_indices = self
                .by_parent
                .get(node.code.as_str())
                .cloned()
                .unwrap_or_default();
            let children = self.level(&child_indices);
            out.push(PermissionTree {
                node: node.clone(),
                children,
            });
        }
        out
    }
}
