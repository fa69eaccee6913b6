//! # pgbind-core
//!
//! The database-free half of pgbind: the query data model, the annotated
//! `.sql` file parser, the alias-hint tokenizer, the OID type table with its
//! per-run caches, and the deterministic TypeScript emitter.
//!
//! Everything here is pure computation. The wire protocol and the live
//! introspection live in `pgbind-pg`; orchestration lives in `pgbind-cli`.

pub mod codegen;
pub mod error;
pub mod hints;
pub mod keywords;
pub mod model;
pub mod query_file;
pub mod typemap;

pub use codegen::{CodeGenerator, GeneratedFile, QueryGroup, TypeScriptGenerator};
pub use error::CoreError;
pub use model::{Column, Param, QueryKind, TargetType, TypedQuery, UntypedQuery};
pub use query_file::parse_query_file;
pub use typemap::{NullabilityCache, TypeRegistry};
