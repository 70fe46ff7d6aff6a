use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// ScopeValue — one dimension's value (or the wildcard sentinel)
// ---------------------------------------------------------------------------

/// The value of a single scope dimension.
///
/// Ordering: every `Int` (numeric order) sorts before every `Str`
/// (lexicographic order), and `Wildcard` sorts last. Predicate value lists
/// rely on this ordering.
///
/// Serialized untagged: integers as JSON numbers, strings as JSON strings,
/// and the wildcard as `null`. Deserialized values are normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ScopeValue {
    Int(i64),
    Str(String),
    /// Matches any concrete value of the dimension it appears under.
    /// Only valid in query scopes.
    Wildcard,
}

/// The process-wide wildcard sentinel.
pub fn wildcard() -> ScopeValue {
    ScopeValue::Wildcard
}

impl ScopeValue {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, ScopeValue::Wildcard)
    }

    /// Canonical form: a `Str` holding a canonical decimal integer (`"42"`,
    /// `"-7"`, but not `"042"` or `"+7"`) becomes `Int`, so ids taken from
    /// request parameters match ids declared as integers.
    pub fn normalized(self) -> Self {
        match self {
            ScopeValue::Str(s) => match s.parse::<i64>() {
                Ok(n) if n.to_string() == s => ScopeValue::Int(n),
                _ => ScopeValue::Str(s),
            },
            other => other,
        }
    }

    /// Whether a query value selects this declared value.
    pub fn accepts(&self, query: &ScopeValue) -> bool {
        query.is_wildcard() || self == query
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeValue::Int(n) => write!(f, "{}", n),
            ScopeValue::Str(s) => write!(f, "{:?}", s),
            ScopeValue::Wildcard => write!(f, "*"),
        }
    }
}

impl From<i64> for ScopeValue {
    fn from(n: i64) -> Self {
        ScopeValue::Int(n)
    }
}

impl From<i32> for ScopeValue {
    fn from(n: i32) -> Self {
        ScopeValue::Int(n.into())
    }
}

impl From<u32> for ScopeValue {
    fn from(n: u32) -> Self {
        ScopeValue::Int(n.into())
    }
}

impl From<&str> for ScopeValue {
    fn from(s: &str) -> Self {
        ScopeValue::Str(s.to_string()).normalized()
    }
}

impl From<String> for ScopeValue {
    fn from(s: String) -> Self {
        ScopeValue::Str(s).normalized()
    }
}

impl From<bool> for ScopeValue {
    fn from(b: bool) -> Self {
        ScopeValue::Int(i64::from(b))
    }
}

impl<'de> Deserialize<'de> for ScopeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Int(i64),
            Str(String),
            Wildcard,
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Int(n) => ScopeValue::Int(n),
            Wire::Str(s) => ScopeValue::from(s),
            Wire::Wildcard => ScopeValue::Wildcard,
        })
    }
}

// ---------------------------------------------------------------------------
// Scope — dimension name -> value
// ---------------------------------------------------------------------------

/// An unordered mapping from dimension name to value. The empty scope is the
/// global scope.
///
/// Backed by a `BTreeMap` so iteration, hashing and serialization are
/// deterministic. Every value is stored normalized (see
/// [`ScopeValue::normalized`]), however the scope was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(BTreeMap<String, ScopeValue>);

impl Scope {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The global (empty) scope.
    pub fn global() -> Self {
        Self::new()
    }

    /// Builder-style insert.
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        self.insert(dimension, value);
        self
    }

    pub fn insert(
        &mut self,
        dimension: impl Into<String>,
        value: impl Into<ScopeValue>,
    ) -> Option<ScopeValue> {
        self.0.insert(dimension.into(), value.into().normalized())
    }

    pub fn remove(&mut self, dimension: &str) -> Option<ScopeValue> {
        self.0.remove(dimension)
    }

    pub fn get(&self, dimension: &str) -> Option<&ScopeValue> {
        self.0.get(dimension)
    }

    pub fn contains_dimension(&self, dimension: &str) -> bool {
        self.0.contains_key(dimension)
    }

    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn has_wildcard(&self) -> bool {
        self.0.values().any(ScopeValue::is_wildcard)
    }

    /// Merge `other` into this scope; `other` wins on conflicting dimensions.
    pub fn extend(&mut self, other: &Scope) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// True if every dimension of `self` is present in `query` with a value
    /// it accepts. Extra dimensions in `query` are irrelevant; a dimension
    /// missing from `query` never matches.
    pub fn matches(&self, query: &Scope) -> bool {
        self.0
            .iter()
            .all(|(k, v)| query.get(k).is_some_and(|q| v.accepts(q)))
    }

    /// Two concrete scopes are compatible when they agree on every shared
    /// dimension, i.e. some query can match both.
    pub fn is_compatible_with(&self, other: &Scope) -> bool {
        self.0
            .iter()
            .all(|(k, v)| other.get(k).map_or(true, |o| o == v))
    }

    /// Reject wildcard values. Declared scopes must be concrete.
    pub fn ensure_concrete(&self) -> CoreResult<()> {
        match self.0.iter().find(|(_, v)| v.is_wildcard()) {
            Some((k, _)) => Err(CoreError::InvalidScope(format!(
                "dimension `{}` holds a wildcard; declared scopes must be concrete",
                k
            ))),
            None => Ok(()),
        }
    }

    /// Convert a dynamic JSON value into a scope.
    ///
    /// Accepts an object whose members are integers, strings, or `null`
    /// (the wildcard). Anything else is an `InvalidScope` error.
    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            CoreError::InvalidScope(format!("expected an object, got {}", json_kind(value)))
        })?;

        let mut scope = Scope::new();
        for (dimension, member) in object {
            let v = match member {
                Value::String(s) => ScopeValue::from(s.as_str()),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => ScopeValue::Int(i),
                    None => {
                        return Err(CoreError::InvalidScope(format!(
                            "dimension `{}` must be an integer, string or wildcard",
                            dimension
                        )))
                    }
                },
                Value::Null => ScopeValue::Wildcard,
                other => {
                    return Err(CoreError::InvalidScope(format!(
                        "dimension `{}` has unsupported {} value",
                        dimension,
                        json_kind(other)
                    )))
                }
            };
            scope.0.insert(dimension.clone(), v);
        }
        Ok(scope)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl<K, V> FromIterator<(K, V)> for Scope
where
    K: Into<String>,
    V: Into<ScopeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into().normalized()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Scope
where
    K: Into<String>,
    V: Into<ScopeValue>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
