//! Request-scoped reconciliation state.

/// Temporary-to-persistent identifier resolver.
pub mod resolver;
