use scopegate_core::{Resource, Scope};
use std::collections::BTreeSet;

use crate::compile;
use crate::config::CompilerConfig;
use crate::engine::{CompiledPolicy, Reader};
use crate::error::PolicyResult;
use crate::types::{Decision, DerivationEdge, EdgeKind, Rule};

// ---------------------------------------------------------------------------
// RuleStore — the mutable builder
// ---------------------------------------------------------------------------

/// Accumulates declarations until they are compiled.
///
/// Declaration order is irrelevant and declaring the same fact twice is a
/// no-op. A compiled policy never observes mutations made after it was
/// produced; recompile to pick them up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStore {
    rules: BTreeSet<Rule>,
    edges: BTreeSet<DerivationEdge>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `permission` allowed in `scope`.
    ///
    /// Fails with `InvalidScope` if the scope holds a wildcard.
    pub fn allow(&mut self, permission: impl Into<String>, scope: Scope) -> PolicyResult<&mut Self> {
        self.push(permission.into(), scope, Decision::Allow)
    }

    /// Declare `permission` denied in `scope`.
    pub fn deny(&mut self, permission: impl Into<String>, scope: Scope) -> PolicyResult<&mut Self> {
        self.push(permission.into(), scope, Decision::Deny)
    }

    pub fn allow_global(&mut self, permission: impl Into<String>) -> &mut Self {
        self.rules.insert(Rule {
            permission: permission.into(),
            scope: Scope::global(),
            decision: Decision::Allow,
        });
        self
    }

    pub fn deny_global(&mut self, permission: impl Into<String>) -> &mut Self {
        self.rules.insert(Rule {
            permission: permission.into(),
            scope: Scope::global(),
            decision: Decision::Deny,
        });
        self
    }

    /// Declare `permission` allowed on a resource, through its builder scope.
    pub fn allow_on(
        &mut self,
        permission: impl Into<String>,
        resource: &dyn Resource,
    ) -> PolicyResult<&mut Self> {
        self.allow(permission, resource.builder_scope())
    }

    pub fn deny_on(
        &mut self,
        permission: impl Into<String>,
        resource: &dyn Resource,
    ) -> PolicyResult<&mut Self> {
        self.deny(permission, resource.builder_scope())
    }

    /// Declare a derivation relationship between two permissions.
    pub fn add_rule(
        &mut self,
        source: impl Into<String>,
        kind: EdgeKind,
        target: impl Into<String>,
    ) -> &mut Self {
        self.edges.insert(DerivationEdge {
            source: source.into(),
            kind,
            target: target.into(),
        });
        self
    }

    /// Shorthand for `add_rule(source, EdgeKind::Grant, target)`.
    pub fn grant(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.add_rule(source, EdgeKind::Grant, target)
    }

    /// Shorthand for `add_rule(source, EdgeKind::Require, target)`.
    pub fn require(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.add_rule(source, EdgeKind::Require, target)
    }

    /// Merge another store's rules and edges into this one. `other` is
    /// copied, so later mutation of either store does not affect the other.
    pub fn import(&mut self, other: &RuleStore) -> &mut Self {
        self.rules.extend(other.rules.iter().cloned());
        self.edges.extend(other.edges.iter().cloned());
        self
    }

    /// Merge a role's declarations. The role's name is not carried over.
    pub fn import_role(&mut self, role: &Role) -> &mut Self {
        self.import(&role.store)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DerivationEdge> {
        self.edges.iter()
    }

    /// Every permission named by a rule or an edge, sorted.
    pub fn permissions(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .map(|r| r.permission.as_str())
            .chain(
                self.edges
                    .iter()
                    .flat_map(|e| [e.source.as_str(), e.target.as_str()]),
            )
            .collect()
    }

    /// Every dimension used by a declared scope, sorted.
    pub fn dimensions(&self) -> BTreeSet<&str> {
        self.rules.iter().flat_map(|r| r.scope.dimensions()).collect()
    }

    /// Number of rules plus edges.
    pub fn len(&self) -> usize {
        self.rules.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.edges.is_empty()
    }

    pub fn compile(&self) -> CompiledPolicy {
        compile::compile(self, &CompilerConfig::default())
    }

    pub fn compile_with(&self, config: &CompilerConfig) -> CompiledPolicy {
        compile::compile(self, config)
    }

    /// Compile and wrap the result in a reader.
    pub fn reader(&self) -> Reader {
        Reader::new(self.compile())
    }

    fn push(&mut self, permission: String, scope: Scope, decision: Decision) -> PolicyResult<&mut Self> {
        scope.ensure_concrete()?;
        self.rules.insert(Rule {
            permission,
            scope,
            decision,
        });
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Role — a named bundle of declarations
// ---------------------------------------------------------------------------

/// A named set of rules and edges, importable into any store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    name: String,
    store: RuleStore,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: RuleStore::new(),
        }
    }

    pub fn from_store(name: impl Into<String>, store: RuleStore) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RuleStore {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopegate_core::wildcard;

    #[test]
    fn test_allow_appends_rule() {
        let mut store = RuleStore::new();
        store.allow("read", Scope::from([("forum", 1)])).unwrap();
        let rules: Vec<_> = store.rules().collect();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].permission, "read");
        assert_eq!(rules[0].decision, Decision::Allow);
    }

    #[test]
    fn test_chaining() {
        let mut store = RuleStore::new();
        store
            .allow("read", Scope::global())
            .unwrap()
            .deny("read", Scope::from([("forum", 2)]))
            .unwrap()
            .grant("moderate", "read");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_wildcard_in_declared_scope_is_rejected() {
        let mut store = RuleStore::new();
        let err = store
            .allow("read", Scope::new().with("forum", wildcard()))
            .unwrap_err();
        assert!(matches!(err, crate::PolicyError::InvalidScope(_)));
        assert!(store.is_empty(), "failed declaration must not take effect");
    }

    #[test]
    fn test_duplicate_declarations_collapse() {
        let mut store = RuleStore::new();
        store.allow_global("read").allow_global("read");
        store.grant("a", "b").grant("a", "b");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_permissions_and_dimensions() {
        let mut store = RuleStore::new();
        store
            .allow("read", Scope::new().with("forum", 1).with("topic", 4))
            .unwrap();
        store.require("reply", "read");
        let perms: Vec<_> = store.permissions().into_iter().collect();
        assert_eq!(perms, vec!["read", "reply"]);
        let dims: Vec<_> = store.dimensions().into_iter().collect();
        assert_eq!(dims, vec!["forum", "topic"]);
    }

    #[test]
    fn test_import_is_a_copy() {
        let mut role = Role::new("member");
        role.store_mut().allow_global("read");

        let mut store = RuleStore::new();
        store.import_role(&role);
        store.allow_global("post");

        assert_eq!(store.len(), 2);
        assert_eq!(role.store().len(), 1);
        assert_eq!(role.name(), "member");
    }

    #[test]
    fn test_import_merges_rather_than_replaces() {
        let mut a = RuleStore::new();
        a.allow_global("read");
        let mut b = RuleStore::new();
        b.allow_global("post").grant("post", "read");
        a.import(&b);
        assert_eq!(a.len(), 3);
    }

    struct Forum(i64);

    impl Resource for Forum {
        fn builder_scope(&self) -> Scope {
            Scope::new().with("forum", self.0)
        }
    }

    #[test]
    fn test_allow_on_uses_builder_scope() {
        let mut store = RuleStore::new();
        store.allow_on("read", &Forum(7)).unwrap();
        let rule = store.rules().next().unwrap();
        assert_eq!(rule.scope, Scope::from([("forum", 7)]));
    }
}
