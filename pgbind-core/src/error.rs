//! Error types for pgbind-core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while parsing annotated `.sql` files or emitting code.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The file contained no non-empty query.
    #[error("{}: no queries found in file", path.display())]
    EmptyQuery { path: PathBuf },

    /// A `-- name:` annotation carried an unrecognised kind.
    #[error("{}:{line}: invalid query kind ':{kind}' (expected :one, :many, :exec or :execrows)", path.display())]
    InvalidKind {
        path: PathBuf,
        line: usize,
        kind: String,
    },

    /// A `-- name:` annotation was malformed.
    #[error("{}:{line}: malformed name annotation: {reason}", path.display())]
    MalformedAnnotation {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A query name (declared or filename-derived) is not usable as a
    /// TypeScript identifier.
    #[error("{}: '{name}' is not a valid TypeScript identifier", path.display())]
    InvalidQueryName { path: PathBuf, name: String },

    /// Two input files would emit the same output module.
    #[error("duplicate query group '{name}' ({} and {})", first.display(), second.display())]
    DuplicateGroup {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Result alias for pgbind-core operations.
pub type CoreResult<T> = Result<T, CoreError>;
