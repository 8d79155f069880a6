//! Resolves declared functions to their latest published version.
//!
//! A [`VersionSource`] lists the versions of a single function one page at a
//! time. The [`FunctionResolver`] walks those pages for every function a
//! deployment references and returns the identity of the newest version of
//! each, keyed by the user-facing function name.

pub mod lambda;
pub mod metrics_defs;
pub mod resolver;
pub mod source;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
pub mod types;

pub use resolver::{FunctionResolver, ResolveError};
pub use source::{SourceError, VersionPage, VersionSource};
pub use types::{FunctionReference, ResolvedFunctions};
