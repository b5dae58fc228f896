//! Request-entry validation and the node-wide context.
//!
//! Every read and write passes through [`validate`] before touching a
//! region: epoch check, state gating, range membership and the
//! cluster-wide read-only switch. The [`ServerContext`] carries the
//! shared collaborators explicitly — there are no process singletons.

pub mod context;
pub mod validate;

pub use context::ServerContext;
