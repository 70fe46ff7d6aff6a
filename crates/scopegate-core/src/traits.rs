use crate::scope::Scope;

// ---------------------------------------------------------------------------
// Resource — domain objects that describe themselves as scopes
// ---------------------------------------------------------------------------

/// A domain object that can stand in for a scope.
///
/// The builder scope identifies the object itself and is used when declaring
/// rules about it. The reader scope is used when evaluating and should also
/// carry the dimensions of the object's ancestors: a post's reader scope
/// contributes its topic's and forum's dimensions as well as its own.
pub trait Resource {
    fn builder_scope(&self) -> Scope;

    fn reader_scope(&self) -> Scope {
        self.builder_scope()
    }
}
