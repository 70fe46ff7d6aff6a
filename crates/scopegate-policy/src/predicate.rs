use scopegate_core::ScopeValue;
use serde::{Deserialize, Serialize};

/// For which values of one dimension a permission is allowed.
///
/// Serializes as `{"type": "all"}`, `{"type": "none"}`,
/// `{"type": "some", "which": [...]}` or `{"type": "all_but", "which": [...]}`.
/// Lists are sorted and hold no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "which", rename_all = "snake_case")]
pub enum Predicate {
    /// Allowed for every value, including values never declared.
    All,
    /// Allowed for no value.
    None,
    /// Allowed for exactly these values.
    Some(Vec<ScopeValue>),
    /// Allowed for every value except these.
    AllBut(Vec<ScopeValue>),
}

impl Predicate {
    /// Build from the outcome of undeclared values and the sorted values
    /// whose outcome differs from it.
    pub(crate) fn from_exceptions(default: bool, exceptions: Vec<ScopeValue>) -> Self {
        match (default, exceptions.is_empty()) {
            (true, true) => Predicate::All,
            (true, false) => Predicate::AllBut(exceptions),
            (false, true) => Predicate::None,
            (false, false) => Predicate::Some(exceptions),
        }
    }

    /// Does the predicate hold for a concrete `value`?
    pub fn contains(&self, value: &ScopeValue) -> bool {
        let value = &value.clone().normalized();
        match self {
            Predicate::All => true,
            Predicate::None => false,
            Predicate::Some(values) => values.binary_search(value).is_ok(),
            Predicate::AllBut(values) => values.binary_search(value).is_err(),
        }
    }

    /// The explicitly listed values, empty for `All` and `None`.
    pub fn which(&self) -> &[ScopeValue] {
        match self {
            Predicate::All | Predicate::None => &[],
            Predicate::Some(values) | Predicate::AllBut(values) => values,
        }
    }
}
