//! # pgbind-pg
//!
//! The live half of pgbind: a PostgreSQL v3 wire-protocol client that can
//! authenticate (cleartext, MD5, SCRAM-SHA-256) and drive the extended
//! query protocol far enough to *describe* statements, plus the
//! introspector that turns server descriptions into typed queries.
//!
//! No query execution happens here. The connection exists to ask the
//! server what a statement's parameters and result rows look like and to
//! run the handful of catalog lookups that resolves enums and nullability.
//!
//! ## Architecture
//!
//! - `protocol` — pure, synchronous: message encoding/decoding and SCRAM.
//! - `driver` — async I/O: the owning connection, auth dispatch, simple
//!   queries for catalog lookups.
//! - `introspect` — the Parse/Describe/Sync pipeline and catalog walker.

pub mod driver;
pub mod introspect;
pub mod protocol;

pub use driver::{PgConnection, PgError, PgResult};
pub use introspect::Introspector;
pub use protocol::{BackendMessage, ErrorFields, FrontendMessage, ProtocolError, RowField};
