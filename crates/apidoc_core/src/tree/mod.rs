//! Flat-list to nested-tree reconstruction.
//!
//! # Responsibility
//! - Rebuild a parent-linked flat sequence into ordered nested branches.
//! - Render trees (and any other value) through the extended-literal
//!   serializer in [`literal`].
//!
//! # Invariants
//! - Every input node appears in the output exactly once.
//! - Siblings keep their relative input order.
//! - A node whose parent id matches no input node is a root.
//! - Construction terminates on cyclic parent links: the first node of a cycle
//!   (in input order) becomes a root and the link back to it is dropped.

pub mod literal;

use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A record that knows its own id and its parent's id.
pub trait TreeNode {
    fn node_id(&self) -> i64;
    /// `None` marks a root.
    fn parent_id(&self) -> Option<i64>;
}

/// One node plus its nested children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch<T> {
    #[serde(flatten)]
    pub item: T,
    /// Distance from the synthetic root; top-level branches have depth 1.
    pub depth: u32,
    pub children: Vec<Branch<T>>,
}

/// Synthetic root holding the top-level branches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tree<T> {
    pub children: Vec<Branch<T>>,
}

impl<T> Tree<T> {
    /// Total number of nodes, excluding the synthetic root.
    pub fn len(&self) -> usize {
        fn count<T>(branches: &[Branch<T>]) -> usize {
            branches
                .iter()
                .map(|branch| 1 + count(&branch.children))
                .sum()
        }
        count(&self.children)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Flattens the tree back into nodes in pre-order.
    pub fn into_preorder(self) -> Vec<T> {
        fn walk<T>(branches: Vec<Branch<T>>, out: &mut Vec<T>) {
            for branch in branches {
                out.push(branch.item);
                walk(branch.children, out);
            }
        }
        let mut out = Vec::new();
        walk(self.children, &mut out);
        out
    }
}

/// Builds a nested tree from a flat, ordered node sequence.
pub fn array_to_tree<T: TreeNode>(nodes: Vec<T>) -> Tree<T> {
    let known_ids: HashSet<i64> = nodes.iter().map(TreeNode::node_id).collect();

    let mut roots = Vec::new();
    let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        match node.parent_id() {
            Some(parent_id) if known_ids.contains(&parent_id) => {
                groups.entry(parent_id).or_default().push(index);
            }
            _ => roots.push(index),
        }
    }

    let len = nodes.len();
    let mut builder = Builder {
        slots: nodes.into_iter().map(Some).collect(),
        visited: vec![false; len],
        groups,
    };

    let mut children = Vec::new();
    for index in roots {
        children.extend(builder.build(index, 1));
    }
    // Whatever is still unvisited sits on a parent cycle.
    for index in 0..len {
        children.extend(builder.build(index, 1));
    }

    Tree { children }
}

struct Builder<T> {
    slots: Vec<Option<T>>,
    visited: Vec<bool>,
    groups: HashMap<i64, Vec<usize>>,
}

impl<T: TreeNode> Builder<T> {
    fn build(&mut self, index: usize, depth: u32) -> Option<Branch<T>> {
        if self.visited[index] {
            return None;
        }
        self.visited[index] = true;

        let item = self.slots[index].take()?;
        let child_indexes = self.groups.get(&item.node_id()).cloned().unwrap_or_default();

        let mut children = Vec::with_capacity(child_indexes.len());
        for child_index in child_indexes {
            children.extend(self.build(child_index, depth + 1));
        }

        Some(Branch {
            item,
            depth,
            children,
        })
    }
}
