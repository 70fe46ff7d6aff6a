//! Property tests: the compiled policy against a rule-by-rule evaluator,
//! optimized against unoptimized compilation, and the policy document
//! against the policy it was exported from.

use proptest::prelude::*;
use scopegate_policy::{
    CompiledPolicy, CompilerConfig, Decision, EdgeKind, PolicyDocument, RuleStore, Scope,
    ScopeValue, Target,
};

const DIMENSIONS: [&str; 3] = ["forum", "topic", "author"];
const PERMISSIONS: [&str; 4] = ["read", "post", "edit", "delete"];

fn arb_value() -> impl Strategy<Value = ScopeValue> {
    prop_oneof![
        (0..3i64).prop_map(ScopeValue::Int),
        Just(ScopeValue::Str("x".into())),
    ]
}

/// A concrete scope over a random subset of the dimensions.
fn arb_declared_scope() -> impl Strategy<Value = Scope> {
    proptest::collection::vec(proptest::option::of(arb_value()), DIMENSIONS.len()).prop_map(
        |values| {
            DIMENSIONS
                .iter()
                .zip(values)
                .filter_map(|(d, v)| v.map(|v| (*d, v)))
                .collect()
        },
    )
}

/// A query scope: each dimension absent, concrete (possibly never declared),
/// or a wildcard.
fn arb_query() -> impl Strategy<Value = Scope> {
    let member = prop_oneof![
        2 => Just(None),
        4 => arb_value().prop_map(Some),
        1 => Just(Some(ScopeValue::Int(99))),
        2 => Just(Some(ScopeValue::Wildcard)),
    ];
    proptest::collection::vec(member, DIMENSIONS.len()).prop_map(|values| {
        DIMENSIONS
            .iter()
            .zip(values)
            .filter_map(|(d, v)| v.map(|v| (*d, v)))
            .collect()
    })
}

fn arb_rule() -> impl Strategy<Value = (usize, Scope, Decision)> {
    (
        0..PERMISSIONS.len(),
        arb_declared_scope(),
        prop_oneof![3 => Just(Decision::Allow), 1 => Just(Decision::Deny)],
    )
}

fn arb_edge() -> impl Strategy<Value = (usize, EdgeKind, usize)> {
    (
        0..PERMISSIONS.len(),
        prop_oneof![Just(EdgeKind::Grant), Just(EdgeKind::Require)],
        0..PERMISSIONS.len(),
    )
}

fn build(rules: &[(usize, Scope, Decision)], edges: &[(usize, EdgeKind, usize)]) -> RuleStore {
    let mut store = RuleStore::new();
    for (p, scope, decision) in rules {
        let result = match decision {
            Decision::Allow => store.allow(PERMISSIONS[*p], scope.clone()),
            Decision::Deny => store.deny(PERMISSIONS[*p], scope.clone()),
        };
        result.expect("generated scopes are concrete");
    }
    for (source, kind, target) in edges {
        store.add_rule(PERMISSIONS[*source], *kind, PERMISSIONS[*target]);
    }
    store
}

/// Direct reading of the matching contract: any matching deny is false,
/// otherwise any matching allow is true.
fn naive_is_allowed(store: &RuleStore, permission: &str, query: &Scope) -> bool {
    let matching: Vec<Decision> = store
        .rules()
        .filter(|r| r.permission == permission && r.scope.matches(query))
        .map(|r| r.decision)
        .collect();
    !matching.contains(&Decision::Deny) && matching.contains(&Decision::Allow)
}

fn all_wildcards() -> Scope {
    DIMENSIONS
        .iter()
        .map(|d| (*d, ScopeValue::Wildcard))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_compiled_matches_naive_evaluator(
        rules in proptest::collection::vec(arb_rule(), 0..10),
        queries in proptest::collection::vec(arb_query(), 1..12),
    ) {
        let store = build(&rules, &[]);
        let optimized = store.compile();
        let plain = store.compile_with(&CompilerConfig::unoptimized());
        for perm in PERMISSIONS {
            for q in &queries {
                let expected = naive_is_allowed(&store, perm, q);
                prop_assert_eq!(optimized.is_allowed(perm, q), expected, "{} at {}", perm, q);
                prop_assert_eq!(plain.is_allowed(perm, q), expected, "{} at {}", perm, q);
            }
            prop_assert_eq!(
                optimized.is_allowed(perm, Target::Any),
                naive_is_allowed(&store, perm, &all_wildcards())
            );
        }
    }

    #[test]
    fn prop_optimizations_are_unobservable(
        rules in proptest::collection::vec(arb_rule(), 0..10),
        edges in proptest::collection::vec(arb_edge(), 0..6),
        queries in proptest::collection::vec(arb_query(), 1..12),
        prune_values in any::<bool>(),
        share_spaces in any::<bool>(),
        drop_dead_permissions in any::<bool>(),
    ) {
        let store = build(&rules, &edges);
        let reference = store.compile_with(&CompilerConfig::unoptimized());
        let config = CompilerConfig {
            prune_values,
            share_spaces,
            drop_dead_permissions,
            ..CompilerConfig::default()
        };
        let policy = store.compile_with(&config);
        for perm in PERMISSIONS {
            for q in &queries {
                prop_assert_eq!(policy.is_allowed(perm, q), reference.is_allowed(perm, q));
            }
            prop_assert_eq!(
                policy.is_allowed(perm, Target::Any),
                reference.is_allowed(perm, Target::Any)
            );
        }
    }

    #[test]
    fn prop_dead_permissions_are_dropped(
        rules in proptest::collection::vec(arb_rule(), 0..10),
        edges in proptest::collection::vec(arb_edge(), 0..6),
        queries in proptest::collection::vec(arb_query(), 1..12),
    ) {
        let store = build(&rules, &edges);
        let policy = store.compile();
        let reference = store.compile_with(&CompilerConfig::unoptimized());
        for perm in PERMISSIONS {
            if policy.contains(perm) {
                continue;
            }
            prop_assert!(!reference.is_allowed(perm, Target::Any));
            for q in &queries {
                prop_assert!(!reference.is_allowed(perm, q));
            }
        }
        prop_assert_eq!(
            policy.stats().permissions + policy.stats().dropped_permissions,
            store.permissions().len()
        );
    }

    #[test]
    fn prop_predicate_agrees_with_point_queries(
        rules in proptest::collection::vec(arb_rule(), 0..10),
        edges in proptest::collection::vec(arb_edge(), 0..4),
        free in 0..DIMENSIONS.len(),
        fixed in arb_query(),
    ) {
        let store = build(&rules, &edges);
        let reader = store.reader();
        let free = DIMENSIONS[free];
        let mut fixed = fixed;
        fixed.remove(free);

        let candidates = [
            ScopeValue::Int(0),
            ScopeValue::Int(1),
            ScopeValue::Int(2),
            ScopeValue::Int(99),
            ScopeValue::Str("x".into()),
            ScopeValue::Str("never".into()),
        ];
        for perm in PERMISSIONS {
            let predicate = reader.get_predicate(perm, free, &fixed).unwrap();
            for value in &candidates {
                let query = fixed.clone().with(free, value.clone());
                prop_assert_eq!(
                    predicate.contains(value),
                    reader.is_allowed(perm, &query),
                    "{} {} = {} under {}", perm, free, value, fixed
                );
            }
        }
    }

    #[test]
    fn prop_document_round_trip_preserves_answers(
        rules in proptest::collection::vec(arb_rule(), 0..10),
        edges in proptest::collection::vec(arb_edge(), 0..6),
        queries in proptest::collection::vec(arb_query(), 1..12),
    ) {
        let store = build(&rules, &edges);
        let policy = store.compile();
        let json = policy.to_document().to_json().unwrap();
        let document = PolicyDocument::from_json(&json).unwrap();
        let restored = CompiledPolicy::from_document(&document).unwrap();
        prop_assert_eq!(restored.to_document(), document.clone());

        for perm in PERMISSIONS {
            for q in &queries {
                let expected = policy.is_allowed(perm, q);
                prop_assert_eq!(document.is_allowed(perm, q), expected);
                prop_assert_eq!(restored.is_allowed(perm, q), expected);
            }
            prop_assert_eq!(
                document.is_allowed(perm, Target::Any),
                policy.is_allowed(perm, Target::Any)
            );
        }
    }
}
