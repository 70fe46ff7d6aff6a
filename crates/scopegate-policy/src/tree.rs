//! Hash-consed decision-tree arena.
//!
//! Every compiled permission is a root [`NodeId`] into one shared arena.
//! Structurally identical subtrees, whether inside one permission or across
//! several, are interned once and share an id.

use scopegate_core::ScopeValue;
use std::collections::{BTreeMap, HashMap};

use crate::types::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether any cell under a node is allowed or denied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Flags {
    pub allow: bool,
    pub deny: bool,
}

impl Flags {
    pub(crate) fn of(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Allow => Flags {
                allow: true,
                deny: false,
            },
            Outcome::Deny => Flags {
                allow: false,
                deny: true,
            },
            Outcome::Unset => Flags::default(),
        }
    }

    pub(crate) fn union(self, other: Flags) -> Self {
        Flags {
            allow: self.allow || other.allow,
            deny: self.deny || other.deny,
        }
    }

    /// Deny anywhere wins; otherwise at least one allow is required.
    pub(crate) fn is_allowed(self) -> bool {
        self.allow && !self.deny
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Node {
    Leaf(Outcome),
    /// Tests dimension `dim` (an index into the policy's sorted dimension
    /// list). A query value not present in `values`, or an absent dimension,
    /// follows `other`.
    Branch {
        dim: usize,
        values: BTreeMap<ScopeValue, NodeId>,
        other: NodeId,
    },
}

impl Node {
    pub(crate) fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        let (values, other) = match self {
            Node::Leaf(_) => (None, None),
            Node::Branch { values, other, .. } => (Some(values), Some(*other)),
        };
        values
            .into_iter()
            .flat_map(|v| v.values().copied())
            .chain(other)
    }
}

// ---------------------------------------------------------------------------
// Interner — mutable during compilation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct Interner {
    nodes: Vec<Node>,
    summaries: Vec<Flags>,
    index: HashMap<Node, NodeId>,
}

impl Interner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn leaf(&mut self, outcome: Outcome) -> NodeId {
        self.intern(Node::Leaf(outcome))
    }

    /// Intern a branch. With `prune`, values whose child equals `other` are
    /// dropped; a branch left without values is its `other` child.
    pub(crate) fn branch(
        &mut self,
        dim: usize,
        mut values: BTreeMap<ScopeValue, NodeId>,
        other: NodeId,
        prune: bool,
    ) -> NodeId {
        if prune {
            values.retain(|_, child| *child != other);
        }
        if values.is_empty() {
            return other;
        }
        self.intern(Node::Branch { dim, values, other })
    }

    pub(crate) fn intern(&mut self, node: Node) -> NodeId {
        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let summary = match &node {
            Node::Leaf(outcome) => Flags::of(*outcome),
            Node::Branch { .. } => node
                .children()
                .fold(Flags::default(), |acc, c| acc.union(self.summaries[c.index()])),
        };
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node.clone());
        self.summaries.push(summary);
        self.index.insert(node, id);
        id
    }

    pub(crate) fn summary(&self, id: NodeId) -> Flags {
        self.summaries[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn freeze(self) -> Arena {
        Arena {
            nodes: self.nodes,
            summaries: self.summaries,
        }
    }
}

// ---------------------------------------------------------------------------
// Arena — frozen, shared by every reader of a compiled policy
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
    summaries: Vec<Flags>,
}

impl Arena {
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn summary(&self, id: NodeId) -> Flags {
        self.summaries[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Dimension indexes tested anywhere under `root`, sorted.
    pub(crate) fn dimensions_under(&self, root: NodeId) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut dims = std::collections::BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            let node = self.node(id);
            if let Node::Branch { dim, .. } = node {
                dims.insert(*dim);
            }
            stack.extend(node.children());
        }
        dims.into_iter().collect()
    }
}
