//! Error types for all multidyn operations.

use thiserror::Error;

/// Top-level error type for the virtualization layer.
///
/// Validation and mapping errors surface before any backing-store call;
/// backing-store errors pass through as [`Error::Backend`].
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed key, disallowed delimiter in a tenant or index name, or a
    /// missing required key attribute.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A rejected request option, or a request-wrapper capability that does
    /// not apply to its carrier.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// No physical table in the fixed set matches a virtual schema.
    #[error("no physical table matches virtual table '{virtual_table}': {reason}")]
    NoPhysicalTable {
        virtual_table: String,
        reason: String,
    },

    /// A decoded prefix lacks the expected delimiters or names a tenant
    /// other than the caller's.
    #[error("corrupt encoded value: {0}")]
    Corrupt(String),

    /// The description repo has no schema for the named virtual table.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Pass-through of a backing-store failure.
    #[error("backing store error: {0}")]
    Backend(String),

    /// Invariant violation inside the layer.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
