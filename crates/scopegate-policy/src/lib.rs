//! Scopegate Policy Engine
//!
//! Scoped, multi-dimensional permissions. Applications declare allow/deny
//! facts about (permission, scope) pairs and grant/require relationships
//! between permissions, then compile them into an immutable policy that
//! answers point queries and per-dimension enumeration queries.
//!
//! Key features:
//! - Deny always beats allow, at any specificity
//! - Scopes over any number of independent dimensions, with wildcard queries
//! - Grant/require derivation resolved per scope, with transitive retraction
//! - Optimizing compiler: hash-consed decision trees, value pruning,
//!   dead-permission pruning, space sharing
//! - Portable JSON policy document with its own evaluator

mod compile;
pub mod config;
mod derive;
pub mod document;
pub mod engine;
pub mod error;
pub mod predicate;
pub mod registry;
pub mod store;
mod tree;
pub mod types;

// Re-export primary types for convenience
pub use config::CompilerConfig;
pub use document::{DocEdge, DocNode, DocPermission, PolicyDocument, FORMAT_VERSION};
pub use engine::{CompiledPolicy, Reader};
pub use error::{PolicyError, PolicyErrorKind, PolicyResult};
pub use predicate::Predicate;
pub use registry::RoleRegistry;
pub use store::{Role, RuleStore};
pub use types::{CompileStats, Decision, DerivationEdge, EdgeKind, Outcome, Rule};

pub use scopegate_core::{wildcard, Resource, Scope, ScopeValue, Target};
