use scopegate_core::Scope;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Decision — the effect of a declared rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny => write!(f, "deny"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule — (permission, scope, decision)
// ---------------------------------------------------------------------------

/// A declared fact: `permission` is allowed or denied in `scope`.
///
/// The scope never contains a wildcard; the store rejects those on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rule {
    pub permission: String,
    pub scope: Scope,
    pub decision: Decision,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.decision, self.permission, self.scope)
    }
}

// ---------------------------------------------------------------------------
// DerivationEdge — grant / require relationships between permissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// The target is allowed wherever the source is allowed.
    Grant,
    /// The source is allowed only where the target is also allowed.
    Require,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Grant => write!(f, "grant"),
            EdgeKind::Require => write!(f, "require"),
        }
    }
}

impl std::str::FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(EdgeKind::Grant),
            "require" => Ok(EdgeKind::Require),
            _ => Err(format!("unknown derivation kind: {s:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DerivationEdge {
    pub source: String,
    pub kind: EdgeKind,
    pub target: String,
}

impl fmt::Display for DerivationEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.source, self.kind, self.target)
    }
}

// ---------------------------------------------------------------------------
// Outcome — a permission's resolved state in one cell
// ---------------------------------------------------------------------------

/// Resolved state of a permission for one class of concrete scopes.
///
/// `Deny` is reserved for explicit denials; a permission that is simply not
/// allowed (no allow, or revoked by an unmet requirement) is `Unset`. The
/// distinction matters for wildcard queries: a wildcard fails as soon as any
/// cell it covers is denied, but succeeds if any covered cell is allowed and
/// the rest are merely unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Deny,
    Unset,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Allow => write!(f, "allow"),
            Outcome::Deny => write!(f, "deny"),
            Outcome::Unset => write!(f, "unset"),
        }
    }
}

// ---------------------------------------------------------------------------
// CompileStats — storage summary of a compiled policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Distinct cells the resolver evaluated.
    pub cells: usize,
    /// Nodes in the shared arena.
    pub nodes: usize,
    /// Permissions present in the compiled policy.
    pub permissions: usize,
    /// Permissions omitted because they are never allowed.
    pub dropped_permissions: usize,
    /// Distinct spaces after sharing.
    pub spaces: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_from_str() {
        assert_eq!("grant".parse::<EdgeKind>().unwrap(), EdgeKind::Grant);
        assert_eq!("require".parse::<EdgeKind>().unwrap(), EdgeKind::Require);
        assert!("Grant".parse::<EdgeKind>().is_err());
    }

    #[test]
    fn test_rule_display() {
        let rule = Rule {
            permission: "edit".into(),
            scope: Scope::new().with("forum", 3),
            decision: Decision::Deny,
        };
        assert_eq!(rule.to_string(), "deny edit {forum: 3}");
    }

    #[test]
    fn test_edge_serialization() {
        let edge = DerivationEdge {
            source: "moderate".into(),
            kind: EdgeKind::Grant,
            target: "edit".into(),
        };
        let json = serde_json::to_string(&edge).unwrap();
        assert_eq!(
            json,
            r#"{"source":"moderate","kind":"grant","target":"edit"}"#
        );
        let back: DerivationEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edge);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Allow.to_string(), "allow");
        assert_eq!(Outcome::Deny.to_string(), "deny");
        assert_eq!(Outcome::Unset.to_string(), "unset");
    }
}
