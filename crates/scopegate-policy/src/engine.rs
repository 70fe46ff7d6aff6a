use scopegate_core::{wildcard, QueryScope, Scope, ScopeValue, Target};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{PolicyError, PolicyResult};
use crate::predicate::Predicate;
use crate::tree::{Arena, Flags, Node, NodeId};
use crate::types::CompileStats;

// ---------------------------------------------------------------------------
// Lookup — how the evaluator reads query values
// ---------------------------------------------------------------------------

/// Source of query values during tree evaluation.
pub(crate) trait Lookup {
    /// `None` when the dimension is absent from the query.
    fn value(&self, dimension: &str) -> Option<&ScopeValue>;
}

impl Lookup for QueryScope<'_> {
    fn value(&self, dimension: &str) -> Option<&ScopeValue> {
        QueryScope::value(self, dimension)
    }
}

/// A query with one dimension overridden, used to vary the free dimension of
/// a predicate without copying the fixed scope.
pub(crate) struct Pinned<'q> {
    pub base: &'q dyn Lookup,
    pub dimension: &'q str,
    pub value: Option<&'q ScopeValue>,
}

impl Lookup for Pinned<'_> {
    fn value(&self, dimension: &str) -> Option<&ScopeValue> {
        if dimension == self.dimension {
            self.value
        } else {
            self.base.value(dimension)
        }
    }
}

// ---------------------------------------------------------------------------
// CompiledPolicy — immutable, shareable result of compilation
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Entry {
    pub root: NodeId,
    /// Index into `Tables::spaces`.
    pub space: usize,
}

#[derive(Debug)]
pub(crate) struct Tables {
    /// Sorted; branch nodes refer to dimensions by index into this list.
    pub dimensions: Vec<String>,
    pub arena: Arena,
    pub permissions: BTreeMap<String, Entry>,
    /// Distinct spaces, sorted; each is a sorted list of dimension indexes.
    pub spaces: Vec<Vec<usize>>,
    pub stats: CompileStats,
}

/// Immutable compiled form of a [`RuleStore`](crate::RuleStore).
///
/// Cloning is cheap and the policy can be shared across threads freely.
/// Permissions that were never allowed anywhere are absent and answer
/// `false`, exactly like permissions that were never declared.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    tables: Arc<Tables>,
}

impl CompiledPolicy {
    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }

    pub(crate) fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Is `permission` allowed for `target`?
    ///
    /// A matching deny always wins. A query wildcard ranges over every value
    /// of its dimension, declared or not; the answer is `false` if any of
    /// those is denied and `true` if at least one is allowed.
    pub fn is_allowed<'a>(&self, permission: &str, target: impl Into<Target<'a>>) -> bool {
        let Some(entry) = self.tables.permissions.get(permission) else {
            return false;
        };
        let query = target.into().resolve();
        if query.is_any() {
            return self.tables.arena.summary(entry.root).is_allowed();
        }
        self.evaluate(entry.root, &query).is_allowed()
    }

    /// Like [`CompiledPolicy::is_allowed`] with the scope given as a JSON
    /// object. `null` members are wildcards.
    pub fn is_allowed_json(&self, permission: &str, scope: &Value) -> PolicyResult<bool> {
        let scope = Scope::from_json(scope)?;
        Ok(self.is_allowed(permission, &scope))
    }

    /// Enumerate the values of `free_dimension` for which `permission` is
    /// allowed, every other dimension held as in `target`.
    ///
    /// Fails with `InvalidScope` if `target` already fixes `free_dimension`.
    pub fn predicate<'a>(
        &self,
        permission: &str,
        free_dimension: &str,
        target: impl Into<Target<'a>>,
    ) -> PolicyResult<Predicate> {
        let query = target.into().resolve();
        if query.contains_dimension(free_dimension) {
            return Err(PolicyError::InvalidScope(format!(
                "free dimension `{}` is also fixed by the query scope",
                free_dimension
            )));
        }
        let Some(entry) = self.tables.permissions.get(permission) else {
            return Ok(Predicate::None);
        };

        // Every value not tested by the tree behaves like an absent one.
        let default = self
            .evaluate(
                entry.root,
                &Pinned {
                    base: &query,
                    dimension: free_dimension,
                    value: None,
                },
            )
            .is_allowed();

        let exceptions: Vec<ScopeValue> = self
            .values_tested(entry.root, free_dimension)
            .into_iter()
            .filter(|value| {
                let pinned = Pinned {
                    base: &query,
                    dimension: free_dimension,
                    value: Some(value),
                };
                self.evaluate(entry.root, &pinned).is_allowed() != default
            })
            .collect();

        Ok(Predicate::from_exceptions(default, exceptions))
    }

    pub(crate) fn evaluate(&self, id: NodeId, query: &dyn Lookup) -> Flags {
        let node = self.tables.arena.node(id);
        let Node::Branch { dim, values, other } = node else {
            return self.tables.arena.summary(id);
        };
        match query.value(&self.tables.dimensions[*dim]) {
            None => self.evaluate(*other, query),
            Some(v) if v.is_wildcard() => {
                let mut acc = Flags::default();
                for child in node.children() {
                    acc = acc.union(self.evaluate(child, query));
                    if acc.deny {
                        break;
                    }
                }
                acc
            }
            Some(v) => self.evaluate(*values.get(v).unwrap_or(other), query),
        }
    }

    /// Values of `dimension` the tree under `root` distinguishes, sorted.
    fn values_tested(&self, root: NodeId, dimension: &str) -> BTreeSet<ScopeValue> {
        let mut out = BTreeSet::new();
        let Ok(target) = self
            .tables
            .dimensions
            .binary_search_by(|d| d.as_str().cmp(dimension))
        else {
            return out;
        };
        let mut seen = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.tables.arena.node(id);
            if let Node::Branch { dim, values, .. } = node {
                if *dim == target {
                    out.extend(values.keys().cloned());
                }
            }
            stack.extend(node.children());
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn root(&self, permission: &str) -> Option<NodeId> {
        self.tables.permissions.get(permission).map(|e| e.root)
    }

    /// Compiled permission names, sorted.
    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.tables.permissions.keys().map(String::as_str)
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.tables.permissions.contains_key(permission)
    }

    /// Every dimension named by a declared scope, sorted.
    pub fn dimensions(&self) -> &[String] {
        &self.tables.dimensions
    }

    /// The space `permission` is stored in: the dimensions its tree may test,
    /// possibly widened to share storage with other permissions.
    pub fn space(&self, permission: &str) -> Option<Vec<&str>> {
        let entry = self.tables.permissions.get(permission)?;
        Some(self.space_names(&self.tables.spaces[entry.space]))
    }

    /// Every distinct space, sorted.
    pub fn spaces(&self) -> Vec<Vec<&str>> {
        self.tables
            .spaces
            .iter()
            .map(|s| self.space_names(s))
            .collect()
    }

    pub fn stats(&self) -> CompileStats {
        self.tables.stats
    }

    fn space_names(&self, space: &[usize]) -> Vec<&str> {
        space
            .iter()
            .map(|&d| self.tables.dimensions[d].as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Reader — the query surface
// ---------------------------------------------------------------------------

/// Read-only view over a compiled policy.
#[derive(Debug, Clone)]
pub struct Reader {
    policy: CompiledPolicy,
}

impl Reader {
    pub fn new(policy: CompiledPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    pub fn is_allowed<'a>(&self, permission: &str, target: impl Into<Target<'a>>) -> bool {
        self.policy.is_allowed(permission, target)
    }

    pub fn is_allowed_json(&self, permission: &str, scope: &Value) -> PolicyResult<bool> {
        self.policy.is_allowed_json(permission, scope)
    }

    pub fn get_predicate<'a>(
        &self,
        permission: &str,
        free_dimension: &str,
        target: impl Into<Target<'a>>,
    ) -> PolicyResult<Predicate> {
        self.policy.predicate(permission, free_dimension, target)
    }

    /// The wildcard query value.
    pub fn wildcard() -> ScopeValue {
        wildcard()
    }
}

impl From<CompiledPolicy> for Reader {
    fn from(policy: CompiledPolicy) -> Self {
        Self::new(policy)
    }
}
