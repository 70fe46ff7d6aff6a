use std::collections::BTreeMap;

use crate::error::{PolicyError, PolicyResult};
use crate::store::Role;

/// Named roles, kept until removed.
///
/// Lookups hand out the stored role; importing it into a store copies its
/// declarations, so the registry entry is never affected by later mutation
/// of that store.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: BTreeMap<String, Role>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `role` under its name.
    ///
    /// Fails with `DuplicateRole` if the name is taken, unless `overwrite`.
    pub fn add(&mut self, role: Role, overwrite: bool) -> PolicyResult<()> {
        if !overwrite && self.roles.contains_key(role.name()) {
            return Err(PolicyError::DuplicateRole(role.name().to_string()));
        }
        tracing::debug!(role = role.name(), overwrite, "registering role");
        self.roles.insert(role.name().to_string(), role);
        Ok(())
    }

    pub fn get(&self, name: &str) -> PolicyResult<&Role> {
        self.roles
            .get(name)
            .ok_or_else(|| PolicyError::UnknownRole(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    /// Remove a role, returning it if it was registered.
    pub fn remove(&mut self, name: &str) -> Option<Role> {
        self.roles.remove(name)
    }

    pub fn clear(&mut self) {
        self.roles.clear();
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
