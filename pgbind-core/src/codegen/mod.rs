//! Code generation.
//!
//! The emitter is a pure function from typed queries to file contents: the
//! same inputs always produce byte-identical outputs, which is what `check`
//! mode relies on.

use crate::error::CoreResult;
use crate::model::TypedQuery;
use std::path::PathBuf;

pub mod typescript;

pub use typescript::TypeScriptGenerator;

/// The queries of one input `.sql` file, emitted as one output module.
#[derive(Debug, Clone)]
pub struct QueryGroup {
    /// Module name, derived from the input filename stem.
    pub name: String,
    /// In file order.
    pub queries: Vec<TypedQuery>,
}

/// One rendered artifact, addressed relative to the destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// A language-specific code generator.
pub trait CodeGenerator {
    /// Render every artifact for the given groups: one module per group,
    /// the shared helper module, and the root index.
    fn generate(&self, groups: &[QueryGroup]) -> CoreResult<Vec<GeneratedFile>>;
}
