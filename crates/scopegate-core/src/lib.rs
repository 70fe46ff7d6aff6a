//! Scopegate core types.
//!
//! The data model shared by the permission engine: scope values (with the
//! distinguished wildcard), scopes, query targets, and the capability trait
//! that lets domain objects describe themselves as scopes.

pub mod error;
pub mod scope;
pub mod target;
pub mod traits;

pub use error::*;
pub use scope::*;
pub use target::*;
pub use traits::*;
