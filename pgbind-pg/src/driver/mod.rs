//! Async I/O layer: the owning connection and its authentication.
//!
//! One connection, strictly serialised round-trips. The extended query
//! protocol forbids overlapping Parse/Describe/Sync batches, and the
//! introspector issues its catalog queries on the same wire, so nothing
//! here is concurrent.

mod auth;
mod connection;
mod io;
mod query;

pub use connection::PgConnection;

use crate::protocol::{ErrorFields, ProtocolError};
use thiserror::Error;

/// Errors surfaced by the driver.
#[derive(Debug, Error)]
pub enum PgError {
    /// TCP refused, closed mid-stream, or host unreachable.
    #[error("connection error: {0}")]
    Connection(String),

    /// Unsupported method, bad credentials, or a server-signature
    /// mismatch.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A malformed or out-of-order frame. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server rejected a statement during Parse/Describe. Local to
    /// one query.
    #[error("{message}")]
    Query {
        message: String,
        detail: Option<String>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl PgError {
    pub(crate) fn query(fields: &ErrorFields) -> Self {
        PgError::Query {
            message: fields.message().to_string(),
            detail: fields.detail().map(String::from),
        }
    }
}

/// Result alias for driver operations.
pub type PgResult<T> = Result<T, PgError>;
