use std::borrow::Cow;

use crate::scope::{Scope, ScopeValue};
use crate::traits::Resource;

/// What a query is evaluated against.
#[derive(Clone, Copy)]
pub enum Target<'a> {
    /// The global (empty) scope.
    Global,
    /// Every dimension is a wildcard: disregard all scoping.
    Any,
    Scope(&'a Scope),
    /// Evaluated through the resource's reader scope.
    Resource(&'a dyn Resource),
}

impl<'a> Target<'a> {
    /// Query through a resource's reader scope.
    pub fn resource<R: Resource>(resource: &'a R) -> Self {
        Target::Resource(resource)
    }

    pub fn resolve(self) -> QueryScope<'a> {
        match self {
            Target::Global => QueryScope::Scope(Cow::Owned(Scope::global())),
            Target::Any => QueryScope::Any,
            Target::Scope(scope) => QueryScope::Scope(Cow::Borrowed(scope)),
            Target::Resource(resource) => QueryScope::Scope(Cow::Owned(resource.reader_scope())),
        }
    }
}

impl std::fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Global => write!(f, "Global"),
            Target::Any => write!(f, "Any"),
            Target::Scope(scope) => write!(f, "Scope({})", scope),
            Target::Resource(resource) => write!(f, "Resource({})", resource.reader_scope()),
        }
    }
}

impl<'a> From<&'a Scope> for Target<'a> {
    fn from(scope: &'a Scope) -> Self {
        Target::Scope(scope)
    }
}

impl<'a> From<&'a dyn Resource> for Target<'a> {
    fn from(resource: &'a dyn Resource) -> Self {
        Target::Resource(resource)
    }
}

impl<'a> From<Option<&'a Scope>> for Target<'a> {
    fn from(scope: Option<&'a Scope>) -> Self {
        scope.map_or(Target::Global, Target::Scope)
    }
}

/// A resolved query scope.
#[derive(Debug, Clone)]
pub enum QueryScope<'a> {
    /// Every dimension reads as the wildcard.
    Any,
    Scope(Cow<'a, Scope>),
}

impl QueryScope<'_> {
    /// The query's value for a dimension. `None` means the dimension is
    /// absent and only rules that do not constrain it can match.
    pub fn value(&self, dimension: &str) -> Option<&ScopeValue> {
        const WILDCARD: &ScopeValue = &ScopeValue::Wildcard;
        match self {
            QueryScope::Any => Some(WILDCARD),
            QueryScope::Scope(scope) => scope.get(dimension),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, QueryScope::Any)
    }

    pub fn contains_dimension(&self, dimension: &str) -> bool {
        match self {
            QueryScope::Any => false,
            QueryScope::Scope(scope) => scope.contains_dimension(dimension),
        }
    }
}
