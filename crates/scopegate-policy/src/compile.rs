//! Compiler: resolved cells in, shared decision trees out.

use scopegate_core::{Scope, ScopeValue};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::CompilerConfig;
use crate::derive::{Group, Resolver};
use crate::engine::{CompiledPolicy, Entry, Tables};
use crate::store::RuleStore;
use crate::tree::{Interner, NodeId};
use crate::types::CompileStats;

/// Compile a store's declarations under `config`.
///
/// Cannot fail: every declaration was validated when it entered the store.
pub(crate) fn compile(store: &RuleStore, config: &CompilerConfig) -> CompiledPolicy {
    let resolver = Resolver::new(store);
    let dimensions: Vec<String> = store.dimensions().into_iter().map(String::from).collect();

    let mut builder = TreeBuilder {
        resolver: &resolver,
        dimensions: &dimensions,
        interner: Interner::new(),
        prune_values: config.prune_values,
        cells: 0,
    };
    let mut roots: BTreeMap<usize, NodeId> = BTreeMap::new();
    for group in resolver.groups() {
        let ids = builder.build_group(&group);
        roots.extend(group.members.iter().copied().zip(ids));
    }
    let cells = builder.cells;
    let interner = builder.interner;

    if cells > config.warn_cells {
        tracing::warn!(
            cells,
            threshold = config.warn_cells,
            dimensions = dimensions.len(),
            "compilation visited an unusually large number of cells"
        );
    }

    let mut live = BTreeMap::new();
    let mut dropped = 0;
    for (i, permission) in resolver.permissions().iter().enumerate() {
        let Some(&root) = roots.get(&i) else {
            continue;
        };
        if config.drop_dead_permissions && !interner.summary(root).allow {
            tracing::trace!(permission, "dropping permission that is never allowed");
            dropped += 1;
            continue;
        }
        live.insert(permission.to_string(), root);
    }

    let arena = interner.freeze();
    let natural: BTreeMap<String, Vec<usize>> = live
        .iter()
        .map(|(p, root)| (p.clone(), arena.dimensions_under(*root)))
        .collect();
    let assigned = if config.share_spaces {
        share_spaces(natural)
    } else {
        natural
    };

    let spaces: Vec<Vec<usize>> = assigned
        .values()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let permissions: BTreeMap<String, Entry> = live
        .into_iter()
        .map(|(p, root)| {
            let space = spaces
                .binary_search(&assigned[&p])
                .unwrap_or_else(|i| i);
            (p, Entry { root, space })
        })
        .collect();

    let stats = CompileStats {
        cells,
        nodes: arena.len(),
        permissions: permissions.len(),
        dropped_permissions: dropped,
        spaces: spaces.len(),
    };
    tracing::debug!(
        cells = stats.cells,
        nodes = stats.nodes,
        permissions = stats.permissions,
        dropped = stats.dropped_permissions,
        spaces = stats.spaces,
        "compiled policy"
    );

    CompiledPolicy::from_tables(Tables {
        dimensions,
        arena,
        permissions,
        spaces,
        stats,
    })
}

// ---------------------------------------------------------------------------
// TreeBuilder — cell enumeration
// ---------------------------------------------------------------------------

struct TreeBuilder<'s> {
    resolver: &'s Resolver<'s>,
    dimensions: &'s [String],
    interner: Interner,
    prune_values: bool,
    cells: usize,
}

impl<'s> TreeBuilder<'s> {
    /// Build one tree per group member, testing only the dimensions the
    /// group's scopes use.
    fn build_group(&mut self, group: &Group<'s>) -> Vec<NodeId> {
        let axes: Vec<usize> = self
            .dimensions
            .iter()
            .enumerate()
            .filter(|(_, d)| group.dimensions.contains(d.as_str()))
            .map(|(i, _)| i)
            .collect();
        tracing::trace!(
            permissions = group.members.len(),
            dimensions = axes.len(),
            scopes = group.scopes.len(),
            "compiling permission group"
        );
        self.build(group, &axes, &mut Scope::global(), &group.scopes)
    }

    /// Build one subtree per group member for the dimensions in `axes`.
    ///
    /// `candidates` holds the declared scopes still compatible with `cell`.
    /// At each dimension the children are the values those candidates
    /// declare, plus `other` for every value none of them mentions. Once every
    /// axis is fixed the candidates are exactly the scopes that match the
    /// cell.
    fn build(
        &mut self,
        group: &Group<'s>,
        axes: &[usize],
        cell: &mut Scope,
        candidates: &[&'s Scope],
    ) -> Vec<NodeId> {
        let Some((&axis, rest_axes)) = axes.split_first() else {
            self.cells += 1;
            let outcomes = self.resolver.resolve(cell, candidates);
            return group
                .members
                .iter()
                .map(|&p| self.interner.leaf(outcomes[p]))
                .collect();
        };
        let dimensions = self.dimensions;
        let dimension = &dimensions[axis];

        let values: BTreeSet<&'s ScopeValue> = candidates
            .iter()
            .filter_map(|s| s.get(dimension))
            .collect();

        let mut children = Vec::with_capacity(values.len());
        for value in values {
            let narrowed: Vec<&Scope> = candidates
                .iter()
                .copied()
                .filter(|s| s.get(dimension).map_or(true, |v| v == value))
                .collect();
            cell.insert(dimension.clone(), value.clone());
            children.push((value, self.build(group, rest_axes, cell, &narrowed)));
        }
        cell.remove(dimension);

        let rest: Vec<&Scope> = candidates
            .iter()
            .copied()
            .filter(|s| !s.contains_dimension(dimension))
            .collect();
        let other = self.build(group, rest_axes, cell, &rest);

        other
            .iter()
            .enumerate()
            .map(|(m, &fallback)| {
                let values = children
                    .iter()
                    .map(|(value, ids)| ((*value).clone(), ids[m]))
                    .collect();
                self.interner
                    .branch(axis, values, fallback, self.prune_values)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Space sharing
// ---------------------------------------------------------------------------

/// Move every permission that is alone in its space into the smallest
/// occupied space that is a strict superset, if one exists. Larger spaces are
/// considered first; ties go to the lexicographically smallest target.
pub(crate) fn share_spaces(
    mut assigned: BTreeMap<String, Vec<usize>>,
) -> BTreeMap<String, Vec<usize>> {
    let occupancy = |assigned: &BTreeMap<String, Vec<usize>>| {
        let mut counts: BTreeMap<Vec<usize>, usize> = BTreeMap::new();
        for space in assigned.values() {
            *counts.entry(space.clone()).or_default() += 1;
        }
        counts
    };

    let mut singletons: Vec<(String, Vec<usize>)> = {
        let counts = occupancy(&assigned);
        assigned
            .iter()
            .filter(|(_, space)| counts[*space] == 1)
            .map(|(p, space)| (p.clone(), space.clone()))
            .collect()
    };
    singletons.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.cmp(b)));

    for (permission, space) in singletons {
        let counts = occupancy(&assigned);
        if counts.get(&space) != Some(&1) {
            continue;
        }
        let target = counts
            .keys()
            .filter(|other| other.len() > space.len() && is_subset(&space, other))
            .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .cloned();
        if let Some(target) = target {
            tracing::trace!(
                permission = %permission,
                ?space,
                ?target,
                "promoting permission into shared space"
            );
            assigned.insert(permission, target);
        }
    }
    assigned
}

/// Both slices are sorted.
fn is_subset(small: &[usize], large: &[usize]) -> bool {
    small.iter().all(|d| large.binary_search(d).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaces(pairs: &[(&str, &[usize])]) -> BTreeMap<String, Vec<usize>> {
        pairs
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_vec()))
            .collect()
    }

    #[test]
    fn test_single_occupant_promoted_into_superset() {
        let out = share_spaces(spaces(&[("a", &[0]), ("b", &[0, 1]), ("c", &[0, 1])]));
        assert_eq!(out["a"], vec![0, 1]);
    }

    #[test]
    fn test_shared_space_is_left_alone() {
        let out = share_spaces(spaces(&[("a", &[0]), ("b", &[0]), ("c", &[0, 1])]));
        assert_eq!(out["a"], vec![0]);
        assert_eq!(out["b"], vec![0]);
    }

    #[test]
    fn test_no_superset_keeps_space() {
        let out = share_spaces(spaces(&[("a", &[0]), ("b", &[1])]));
        assert_eq!(out["a"], vec![0]);
        assert_eq!(out["b"], vec![1]);
    }

    #[test]
    fn test_smallest_superset_wins() {
        let out = share_spaces(spaces(&[
            ("a", &[]),
            ("b", &[0, 1, 2]),
            ("c", &[0, 1, 2]),
            ("d", &[1]),
            ("e", &[1]),
        ]));
        assert_eq!(out["a"], vec![1]);
    }

    #[test]
    fn test_compile_stats_reflect_pruning() {
        let mut store = RuleStore::new();
        store.allow_global("read");
        store.deny_global("ghost");
        store.allow("post", Scope::from([("forum", 1)])).unwrap();

        let policy = compile(&store, &CompilerConfig::default());
        let stats = policy.stats();
        assert_eq!(stats.permissions, 2);
        assert_eq!(stats.dropped_permissions, 1);
        // one cell each for read and ghost, forum ∈ {1, other} for post
        assert_eq!(stats.cells, 4);

        let policy = compile(&store, &CompilerConfig::unoptimized());
        assert_eq!(policy.stats().permissions, 3);
        assert_eq!(policy.stats().dropped_permissions, 0);
    }

    #[test]
    fn test_value_pruning_drops_dimension_from_space() {
        let mut store = RuleStore::new();
        store.allow_global("read");
        store.allow("read", Scope::from([("forum", 1)])).unwrap();
        store.allow("post", Scope::from([("forum", 1)])).unwrap();

        let policy = compile(
            &store,
            &CompilerConfig {
                share_spaces: false,
                ..CompilerConfig::default()
            },
        );
        assert_eq!(policy.space("read"), Some(vec![]));
        assert_eq!(policy.space("post"), Some(vec!["forum"]));
        assert_eq!(policy.stats().spaces, 2);

        let policy = compile(&store, &CompilerConfig::unoptimized());
        assert_eq!(policy.space("read"), Some(vec!["forum"]));
    }

    #[test]
    fn test_lonely_space_is_promoted() {
        let mut store = RuleStore::new();
        store.allow_global("read");
        store.allow("read", Scope::from([("forum", 1)])).unwrap();
        store.allow("post", Scope::from([("forum", 1)])).unwrap();

        let policy = compile(&store, &CompilerConfig::default());
        assert_eq!(policy.space("read"), Some(vec!["forum"]));
        assert_eq!(policy.stats().spaces, 1);
    }

    #[test]
    fn test_identical_permissions_share_a_root() {
        let mut store = RuleStore::new();
        store.allow("a", Scope::from([("forum", 1)])).unwrap();
        store.allow("b", Scope::from([("forum", 1)])).unwrap();
        let policy = compile(&store, &CompilerConfig::default());
        assert_eq!(policy.root("a"), policy.root("b"));
        assert!(policy.root("a").is_some());
    }

    #[test]
    fn test_incompatible_scopes_are_not_combined() {
        let mut store = RuleStore::new();
        store.allow("a", Scope::from([("forum", 1)])).unwrap();
        store.allow("a", Scope::from([("forum", 2)])).unwrap();
        store.allow("a", Scope::from([("topic", 5)])).unwrap();
        let policy = compile(&store, &CompilerConfig::default());
        // forum ∈ {1, 2, other} × topic ∈ {5, other}
        assert_eq!(policy.stats().cells, 6);
    }

    #[test]
    fn test_unrelated_permissions_grow_cells_linearly() {
        let mut store = RuleStore::new();
        for d in 0..12 {
            for v in 0..3 {
                store
                    .allow(format!("p{d}"), Scope::from([(format!("d{d}"), v)]))
                    .unwrap();
            }
        }
        let policy = compile(&store, &CompilerConfig::default());
        // each permission sees only its own dimension: 3 values plus other
        assert_eq!(policy.stats().cells, 12 * 4);
        assert!(policy.is_allowed("p3", &Scope::from([("d3", 2)])));
        assert!(!policy.is_allowed("p3", &Scope::from([("d4", 2)])));
        assert_eq!(policy.space("p7"), Some(vec!["d7"]));
    }

    #[test]
    fn test_linked_permissions_share_their_dimensions() {
        let mut store = RuleStore::new();
        store.allow("post", Scope::from([("forum", 1)])).unwrap();
        store.allow("read", Scope::from([("topic", 7)])).unwrap();
        store.allow("audit", Scope::from([("author", 4)])).unwrap();
        store.require("post", "read");

        let policy = compile(&store, &CompilerConfig::default());
        // audit: author ∈ {4, other}; post/read: forum × topic, 2 × 2
        assert_eq!(policy.stats().cells, 2 + 4);
        assert!(!policy.is_allowed("post", &Scope::from([("forum", 1)])));
        assert!(policy.is_allowed("post", &Scope::from([("forum", 1), ("topic", 7)])));
    }
}
