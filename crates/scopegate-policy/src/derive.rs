//! Derivation resolver.
//!
//! Computes, for one cell (a concrete scope), the effective outcome of every
//! permission: declared allow/deny facts first, then grant closure, then
//! require checks with transitive retraction, repeated until stable.

use scopegate_core::Scope;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::store::RuleStore;
use crate::types::{Decision, EdgeKind, Outcome};

/// Permissions linked by grant/require edges, with the declared scopes that
/// carry facts about any of them.
///
/// A group's outcomes depend only on its own facts, so each group is resolved
/// over its own dimensions.
#[derive(Debug)]
pub(crate) struct Group<'s> {
    /// Indexes into [`Resolver::permissions`], ascending.
    pub(crate) members: Vec<usize>,
    /// Sorted and distinct.
    pub(crate) scopes: Vec<&'s Scope>,
    pub(crate) dimensions: BTreeSet<&'s str>,
}

/// Per-store derivation state, built once and queried per cell.
#[derive(Debug)]
pub(crate) struct Resolver<'s> {
    permissions: Vec<&'s str>,
    /// Declared scopes, each with the (permission index, decision) facts
    /// declared at exactly that scope.
    facts: BTreeMap<&'s Scope, Vec<(usize, Decision)>>,
    /// grants[a] = permissions a grants.
    grants: Vec<Vec<usize>>,
    /// (source, required target) pairs.
    requires: Vec<(usize, usize)>,
}

impl<'s> Resolver<'s> {
    pub(crate) fn new(store: &'s RuleStore) -> Self {
        let permissions: Vec<&str> = store.permissions().into_iter().collect();
        let index: HashMap<&str, usize> = permissions
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, i))
            .collect();

        let mut facts: BTreeMap<&Scope, Vec<(usize, Decision)>> = BTreeMap::new();
        for rule in store.rules() {
            facts
                .entry(&rule.scope)
                .or_default()
                .push((index[rule.permission.as_str()], rule.decision));
        }

        let mut grants = vec![Vec::new(); permissions.len()];
        let mut requires = Vec::new();
        for edge in store.edges() {
            let source = index[edge.source.as_str()];
            let target = index[edge.target.as_str()];
            match edge.kind {
                EdgeKind::Grant => grants[source].push(target),
                EdgeKind::Require => requires.push((source, target)),
            }
        }

        let resolver = Self {
            permissions,
            facts,
            grants,
            requires,
        };
        resolver.warn_unreachable(store);
        resolver
    }

    pub(crate) fn permissions(&self) -> &[&'s str] {
        &self.permissions
    }

    /// Declared scopes, sorted and distinct.
    pub(crate) fn scopes(&self) -> impl Iterator<Item = &'s Scope> + '_ {
        self.facts.keys().copied()
    }

    /// Split the permissions into groups connected by derivation edges.
    ///
    /// Groups are ordered by their smallest member.
    pub(crate) fn groups(&self) -> Vec<Group<'s>> {
        let n = self.permissions.len();
        let mut parent: Vec<usize> = (0..n).collect();
        let edges = self
            .grants
            .iter()
            .enumerate()
            .flat_map(|(source, targets)| targets.iter().map(move |&t| (source, t)))
            .chain(self.requires.iter().copied());
        for (a, b) in edges {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }

        let mut groups: BTreeMap<usize, Group<'s>> = BTreeMap::new();
        for p in 0..n {
            let root = find(&mut parent, p);
            groups
                .entry(root)
                .or_insert_with(|| Group {
                    members: Vec::new(),
                    scopes: Vec::new(),
                    dimensions: BTreeSet::new(),
                })
                .members
                .push(p);
        }
        for (&scope, facts) in &self.facts {
            let roots: BTreeSet<usize> = facts.iter().map(|&(p, _)| find(&mut parent, p)).collect();
            for root in roots {
                if let Some(group) = groups.get_mut(&root) {
                    group.scopes.push(scope);
                    group.dimensions.extend(scope.dimensions());
                }
            }
        }
        groups.into_values().collect()
    }

    /// Resolve every permission for one cell.
    ///
    /// `matching` must be exactly the declared scopes that match the cell.
    /// The result is indexed like [`Resolver::permissions`].
    pub(crate) fn resolve(&self, cell: &Scope, matching: &[&Scope]) -> Vec<Outcome> {
        let n = self.permissions.len();
        let mut seeded = vec![false; n];
        let mut denied = vec![false; n];
        for scope in matching {
            for &(p, decision) in self.facts.get(*scope).into_iter().flatten() {
                match decision {
                    Decision::Allow => seeded[p] = true,
                    Decision::Deny => denied[p] = true,
                }
            }
        }

        let mut revoked = vec![false; n];
        loop {
            let allowed = self.grant_closure(&seeded, &denied, &revoked);

            let mut changed = false;
            for &(source, target) in &self.requires {
                if allowed[source] && !allowed[target] && !revoked[source] {
                    tracing::trace!(
                        permission = self.permissions[source],
                        requires = self.permissions[target],
                        %cell,
                        "requirement unmet; revoking"
                    );
                    revoked[source] = true;
                    changed = true;
                }
            }

            if !changed {
                return (0..n)
                    .map(|p| {
                        if denied[p] {
                            Outcome::Deny
                        } else if allowed[p] {
                            Outcome::Allow
                        } else {
                            Outcome::Unset
                        }
                    })
                    .collect();
            }
        }
    }

    /// Seeds that are neither denied nor revoked, closed under grants. A grant
    /// never reaches a denied or revoked target.
    fn grant_closure(&self, seeded: &[bool], denied: &[bool], revoked: &[bool]) -> Vec<bool> {
        let blocked = |p: usize| denied[p] || revoked[p];
        let mut allowed: Vec<bool> = (0..seeded.len())
            .map(|p| seeded[p] && !blocked(p))
            .collect();
        let mut queue: Vec<usize> = (0..allowed.len()).filter(|&p| allowed[p]).collect();
        while let Some(p) = queue.pop() {
            for &target in &self.grants[p] {
                if !allowed[target] && !blocked(target) {
                    allowed[target] = true;
                    queue.push(target);
                }
            }
        }
        allowed
    }

    /// Log edges that can never have an effect: a grant whose source is never
    /// declared nor granted, or a require whose target never can be.
    fn warn_unreachable(&self, store: &RuleStore) {
        let mut reachable: BTreeSet<usize> = self
            .facts
            .values()
            .flatten()
            .filter(|(_, d)| *d == Decision::Allow)
            .map(|(p, _)| *p)
            .collect();
        let mut queue: Vec<usize> = reachable.iter().copied().collect();
        while let Some(p) = queue.pop() {
            for &t in &self.grants[p] {
                if reachable.insert(t) {
                    queue.push(t);
                }
            }
        }

        for edge in store.edges() {
            let (endpoint, role) = match edge.kind {
                EdgeKind::Grant => (edge.source.as_str(), "source"),
                EdgeKind::Require => (edge.target.as_str(), "target"),
            };
            let idx = self.permissions.iter().position(|p| *p == endpoint);
            if idx.is_some_and(|i| !reachable.contains(&i)) {
                tracing::warn!(
                    edge = %edge,
                    permission = endpoint,
                    role,
                    "derivation edge references a permission that is never allowed"
                );
            }
        }
    }
}

/// Union-find root with path halving.
fn find(parent: &mut [usize], mut p: usize) -> usize {
    while parent[p] != p {
        parent[p] = parent[parent[p]];
        p = parent[p];
    }
    p
}
