//! Portable policy document.
//!
//! A [`PolicyDocument`] is a self-describing, serde-serializable rendering of
//! a [`CompiledPolicy`]: a flat node table plus a root per permission. It
//! carries its own evaluator so a consumer can answer queries from the
//! document alone, and it converts back into a `CompiledPolicy`.

use scopegate_core::{ScopeValue, Target};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::engine::{CompiledPolicy, Entry, Tables};
use crate::error::{PolicyError, PolicyResult};
use crate::tree::{Interner, Node, NodeId};
use crate::types::{CompileStats, Outcome};

/// Document format understood by this version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub format: u32,
    /// Sorted, distinct.
    pub dimensions: Vec<String>,
    /// Children always precede their parents.
    pub nodes: Vec<DocNode>,
    pub permissions: BTreeMap<String, DocPermission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocNode {
    Leaf {
        outcome: Outcome,
    },
    /// Values absent from `values`, and queries without `dimension`, follow
    /// `other`.
    Branch {
        dimension: String,
        values: Vec<DocEdge>,
        other: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEdge {
    pub value: ScopeValue,
    pub node: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocPermission {
    pub root: usize,
    pub space: Vec<String>,
}

impl PolicyDocument {
    /// Export the nodes reachable from any permission, renumbered so that
    /// children come first.
    pub fn from_policy(policy: &CompiledPolicy) -> Self {
        let tables = policy.tables();
        let mut exporter = Exporter {
            tables,
            index: HashMap::new(),
            nodes: Vec::new(),
        };
        let permissions = tables
            .permissions
            .iter()
            .map(|(name, entry)| {
                let root = exporter.export(entry.root);
                let space = tables.spaces[entry.space]
                    .iter()
                    .map(|&d| tables.dimensions[d].clone())
                    .collect();
                (name.clone(), DocPermission { root, space })
            })
            .collect();

        PolicyDocument {
            format: FORMAT_VERSION,
            dimensions: tables.dimensions.clone(),
            nodes: exporter.nodes,
            permissions,
        }
    }

    pub fn to_json(&self) -> PolicyResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a document.
    pub fn from_json(json: &str) -> PolicyResult<Self> {
        let document: PolicyDocument = serde_json::from_str(json)?;
        document.validate()?;
        Ok(document)
    }

    /// Check every structural guarantee the evaluators rely on.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.format != FORMAT_VERSION {
            return Err(invalid(format!(
                "unsupported format {} (expected {})",
                self.format, FORMAT_VERSION
            )));
        }
        if !self.dimensions.windows(2).all(|w| w[0] < w[1]) {
            return Err(invalid("dimensions must be sorted and distinct".into()));
        }
        let known: BTreeSet<&str> = self.dimensions.iter().map(String::as_str).collect();

        for (i, node) in self.nodes.iter().enumerate() {
            let DocNode::Branch {
                dimension,
                values,
                other,
            } = node
            else {
                continue;
            };
            if !known.contains(dimension.as_str()) {
                return Err(invalid(format!(
                    "node {} tests undeclared dimension `{}`",
                    i, dimension
                )));
            }
            if *other >= i || values.iter().any(|e| e.node >= i) {
                return Err(invalid(format!(
                    "node {} refers to a node that does not precede it",
                    i
                )));
            }
            if values.iter().any(|e| e.value.is_wildcard()) {
                return Err(invalid(format!("node {} branches on a wildcard", i)));
            }
            if !values.windows(2).all(|w| w[0].value < w[1].value) {
                return Err(invalid(format!(
                    "node {} values must be sorted and distinct",
                    i
                )));
            }
        }

        for (name, permission) in &self.permissions {
            if permission.root >= self.nodes.len() {
                return Err(invalid(format!(
                    "permission `{}` has a dangling root {}",
                    name, permission.root
                )));
            }
            if let Some(d) = permission
                .space
                .iter()
                .find(|d| !known.contains(d.as_str()))
            {
                return Err(invalid(format!(
                    "permission `{}` space names undeclared dimension `{}`",
                    name, d
                )));
            }
        }
        Ok(())
    }

    /// Evaluate a query against the document's own node table, with the same
    /// matching rules as [`CompiledPolicy::is_allowed`].
    pub fn is_allowed<'a>(&self, permission: &str, target: impl Into<Target<'a>>) -> bool {
        let Some(entry) = self.permissions.get(permission) else {
            return false;
        };
        let query = target.into().resolve();
        let (allow, deny) = self.walk(entry.root, &|d: &str| query.value(d).cloned());
        allow && !deny
    }

    /// Returns (any allow, any deny) over the cells the query covers.
    fn walk(
        &self,
        index: usize,
        value_of: &dyn Fn(&str) -> Option<ScopeValue>,
    ) -> (bool, bool) {
        match self.nodes.get(index) {
            None => (false, false),
            Some(DocNode::Leaf { outcome }) => {
                (*outcome == Outcome::Allow, *outcome == Outcome::Deny)
            }
            Some(DocNode::Branch {
                dimension,
                values,
                other,
            }) => match value_of(dimension) {
                Some(ScopeValue::Wildcard) => {
                    let mut acc = (false, false);
                    for child in values.iter().map(|e| e.node).chain([*other]) {
                        let (allow, deny) = self.descend(index, child, value_of);
                        acc = (acc.0 || allow, acc.1 || deny);
                        if acc.1 {
                            break;
                        }
                    }
                    acc
                }
                Some(v) => {
                    let next = values
                        .iter()
                        .find(|e| e.value == v)
                        .map_or(*other, |e| e.node);
                    self.descend(index, next, value_of)
                }
                None => self.descend(index, *other, value_of),
            },
        }
    }

    /// Only ever step to an earlier node, so an unvalidated document with a
    /// cycle still terminates.
    fn descend(
        &self,
        parent: usize,
        child: usize,
        value_of: &dyn Fn(&str) -> Option<ScopeValue>,
    ) -> (bool, bool) {
        if child >= parent {
            return (false, false);
        }
        self.walk(child, value_of)
    }
}

fn invalid(msg: String) -> PolicyError {
    PolicyError::InvalidDocument(msg)
}

struct Exporter<'p> {
    tables: &'p Tables,
    index: HashMap<NodeId, usize>,
    nodes: Vec<DocNode>,
}

impl Exporter<'_> {
    fn export(&mut self, id: NodeId) -> usize {
        if let Some(&i) = self.index.get(&id) {
            return i;
        }
        let tables = self.tables;
        let node = match tables.arena.node(id) {
            Node::Leaf(outcome) => DocNode::Leaf { outcome: *outcome },
            Node::Branch { dim, values, other } => {
                let values = values
                    .iter()
                    .map(|(value, child)| DocEdge {
                        value: value.clone(),
                        node: self.export(*child),
                    })
                    .collect();
                DocNode::Branch {
                    dimension: tables.dimensions[*dim].clone(),
                    values,
                    other: self.export(*other),
                }
            }
        };
        let i = self.nodes.len();
        self.nodes.push(node);
        self.index.insert(id, i);
        i
    }
}

impl CompiledPolicy {
    pub fn to_document(&self) -> PolicyDocument {
        PolicyDocument::from_policy(self)
    }

    /// Rebuild a compiled policy from a document. Identical subtrees are
    /// shared again even if the document repeats them.
    pub fn from_document(document: &PolicyDocument) -> PolicyResult<Self> {
        document.validate()?;
        let dim_index: HashMap<&str, usize> = document
            .dimensions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.as_str(), i))
            .collect();

        let mut interner = Interner::new();
        let mut ids: Vec<NodeId> = Vec::with_capacity(document.nodes.len());
        for node in &document.nodes {
            let node = match node {
                DocNode::Leaf { outcome } => Node::Leaf(*outcome),
                DocNode::Branch {
                    dimension,
                    values,
                    other,
                } => Node::Branch {
                    dim: dim_index[dimension.as_str()],
                    values: values
                        .iter()
                        .map(|e| (e.value.clone(), ids[e.node]))
                        .collect(),
                    other: ids[*other],
                },
            };
            ids.push(interner.intern(node));
        }
        let arena = interner.freeze();

        let assigned: BTreeMap<&str, Vec<usize>> = document
            .permissions
            .iter()
            .map(|(name, p)| {
                let mut space: Vec<usize> =
                    p.space.iter().map(|d| dim_index[d.as_str()]).collect();
                space.sort_unstable();
                space.dedup();
                (name.as_str(), space)
            })
            .collect();
        let spaces: Vec<Vec<usize>> = assigned
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let permissions: BTreeMap<String, Entry> = document
            .permissions
            .iter()
            .map(|(name, p)| {
                let space = spaces
                    .binary_search(&assigned[name.as_str()])
                    .unwrap_or_else(|i| i);
                let entry = Entry {
                    root: ids[p.root],
                    space,
                };
                (name.clone(), entry)
            })
            .collect();

        let stats = CompileStats {
            cells: 0,
            nodes: arena.len(),
            permissions: permissions.len(),
            dropped_permissions: 0,
            spaces: spaces.len(),
        };
        tracing::debug!(
            nodes = stats.nodes,
            permissions = stats.permissions,
            "loaded policy document"
        );

        Ok(CompiledPolicy::from_tables(Tables {
            dimensions: document.dimensions.clone(),
            arena,
            permissions,
            spaces,
            stats,
        }))
    }
}
