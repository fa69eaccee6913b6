//! Query data model shared by the parser, the introspector and the emitter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The call shape declared by the query author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// A single optional row.
    One,
    /// An ordered sequence of rows.
    Many,
    /// No result.
    Exec,
    /// The affected row count.
    ExecRows,
}

impl QueryKind {
    /// Parse the `:kind` suffix of a name annotation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one" => Some(QueryKind::One),
            "many" => Some(QueryKind::Many),
            "exec" => Some(QueryKind::Exec),
            "execrows" => Some(QueryKind::ExecRows),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::One => "one",
            QueryKind::Many => "many",
            QueryKind::Exec => "exec",
            QueryKind::ExecRows => "execrows",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query recovered from a `.sql` file, before the server has described it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UntypedQuery {
    /// Declared via `-- name:`, or derived from the filename stem.
    pub name: String,
    /// The file the query came from.
    pub file_path: PathBuf,
    /// The SQL body, whitespace- and semicolon-trimmed. Never empty.
    pub sql: String,
    /// Leading comment lines between the annotation and the SQL body.
    pub doc: Option<String>,
    /// Declared kind, if any. Resolved to a concrete kind at introspection.
    pub kind: Option<QueryKind>,
    /// 1-based line of the annotation (or 1 in single-query mode), for
    /// diagnostics.
    pub line: usize,
}

/// One `$n` placeholder of a described query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// 1-based index matching `$1..$N` in the SQL.
    pub index: usize,
    /// Recovered from surrounding SQL context, or `param_N`.
    pub name: String,
    pub ty: TargetType,
}

/// One result column of a described query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name with any `!`/`?` hint suffix stripped.
    pub name: String,
    pub ty: TargetType,
    pub nullable: bool,
    /// Originating table OID; 0 means a computed expression.
    pub table_oid: u32,
    /// Originating attribute number; <= 0 means a computed expression.
    pub column_attr: i16,
}

/// A query the server has described: parameters and columns are known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedQuery {
    pub source: UntypedQuery,
    /// Concrete kind: declared, else `many` when columns exist, else `exec`.
    pub kind: QueryKind,
    /// Dense, indexed 1..N.
    pub params: Vec<Param>,
    /// In `RowDescription` order. Empty for `exec` and `execrows`.
    pub columns: Vec<Column>,
}

impl TypedQuery {
    pub fn name(&self) -> &str {
        &self.source.name
    }
}

/// The target-language type a PostgreSQL OID resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Bytea,
    Uuid,
    Json,
    Date,
    Time,
    Timestamp,
    /// A 1-D array of the element type.
    Array(Box<TargetType>),
    /// A nullable wrapper around the base type.
    Optional(Box<TargetType>),
    /// A user-defined enum resolved from `pg_type`/`pg_enum`.
    Enum { name: String, variants: Vec<String> },
    /// An OID no lookup resolved.
    Unknown { oid: u32 },
}

impl TargetType {
    /// Wrap in `Optional`, unless already optional.
    pub fn nullable(self) -> Self {
        match self {
            TargetType::Optional(_) => self,
            other => TargetType::Optional(Box::new(other)),
        }
    }

    pub fn array(self) -> Self {
        TargetType::Array(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_all_four() {
        assert_eq!(QueryKind::parse("one"), Some(QueryKind::One));
        assert_eq!(QueryKind::parse("many"), Some(QueryKind::Many));
        assert_eq!(QueryKind::parse("exec"), Some(QueryKind::Exec));
        assert_eq!(QueryKind::parse("execrows"), Some(QueryKind::ExecRows));
        assert_eq!(QueryKind::parse("all"), None);
    }

    #[test]
    fn nullable_does_not_double_wrap() {
        let ty = TargetType::Int32.nullable().nullable();
        assert_eq!(ty, TargetType::Optional(Box::new(TargetType::Int32)));
    }

    #[test]
    fn optional_array_nests_in_order() {
        let ty = TargetType::Text.array().nullable();
        assert_eq!(
            ty,
            TargetType::Optional(Box::new(TargetType::Array(Box::new(TargetType::Text))))
        );
    }
}
