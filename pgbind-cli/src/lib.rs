//! # pgbind-cli
//!
//! The `pgbind` binary: configuration, `.sql` discovery, and the
//! generate/check pipeline that ties the parser, the introspector and the
//! emitter together.

pub mod config;
pub mod discover;
pub mod run;
