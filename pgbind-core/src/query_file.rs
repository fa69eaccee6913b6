//! Parser for annotated `.sql` files.
//!
//! Files carry one or more blocks of the form:
//!
//! ```text
//! -- name: FindUserById :one
//! -- Fetch a single user row.
//! SELECT id, name, email FROM users WHERE id = $1;
//! ```
//!
//! A file without any `-- name:` annotation is a single query named after
//! the filename stem.

use crate::error::CoreError;
use crate::keywords;
use crate::model::{QueryKind, UntypedQuery};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^name:\s*([A-Za-z_$][A-Za-z0-9_$]*)\s+:([a-z]+)\s*$").expect("annotation regex")
    })
}

/// The `name: <Name> :<kind>` remainder of an annotation line, if the line
/// is one.
fn annotation_body(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("--")?.trim();
    if rest.starts_with("name:") {
        Some(rest)
    } else {
        None
    }
}

struct Block {
    name: String,
    kind: QueryKind,
    line: usize,
    doc: Vec<String>,
    body: Vec<String>,
    in_body: bool,
}

/// Parse the text of one `.sql` file into its untyped queries, in file
/// order.
pub fn parse_query_file(path: &Path, text: &str) -> Result<Vec<UntypedQuery>, CoreError> {
    let annotated = text.lines().any(|l| annotation_body(l).is_some());
    if !annotated {
        return parse_single_query(path, text);
    }

    let mut queries = Vec::new();
    let mut current: Option<Block> = None;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if let Some(body) = annotation_body(line) {
            let caps = annotation_re().captures(body).ok_or_else(|| {
                CoreError::MalformedAnnotation {
                    path: path.to_path_buf(),
                    line: lineno,
                    reason: format!("expected '-- name: <Name> :<kind>', got '{}'", line.trim()),
                }
            })?;
            let name = caps[1].to_string();
            let kind = QueryKind::parse(&caps[2]).ok_or_else(|| CoreError::InvalidKind {
                path: path.to_path_buf(),
                line: lineno,
                kind: caps[2].to_string(),
            })?;

            flush(path, current.take(), &mut queries);
            current = Some(Block {
                name: keywords::escape_reserved(&name),
                kind,
                line: lineno,
                doc: Vec::new(),
                body: Vec::new(),
                in_body: false,
            });
            continue;
        }

        let Some(block) = current.as_mut() else {
            // Prose before the first annotation is ignored.
            continue;
        };

        if !block.in_body {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(comment) = trimmed.strip_prefix("--") {
                block.doc.push(comment.trim().to_string());
                continue;
            }
            block.in_body = true;
            block.body.push(line.to_string());
        } else {
            // Blank lines and comments inside the body stay part of it.
            block.body.push(line.to_string());
        }
    }
    flush(path, current.take(), &mut queries);

    if queries.is_empty() {
        return Err(CoreError::EmptyQuery {
            path: path.to_path_buf(),
        });
    }
    Ok(queries)
}

fn flush(path: &Path, block: Option<Block>, queries: &mut Vec<UntypedQuery>) {
    let Some(block) = block else { return };
    let sql = trim_statement(&block.body.join("\n"));
    if sql.is_empty() {
        // An annotation with no SQL under it is dropped.
        return;
    }
    let doc = if block.doc.is_empty() {
        None
    } else {
        Some(block.doc.join("\n"))
    };
    queries.push(UntypedQuery {
        name: block.name,
        file_path: path.to_path_buf(),
        sql,
        doc,
        kind: Some(block.kind),
        line: block.line,
    });
}

/// Single-query mode: the whole file is one query named after the filename
/// stem, with leading comment lines as its doc comment.
fn parse_single_query(path: &Path, text: &str) -> Result<Vec<UntypedQuery>, CoreError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    if !keywords::is_valid_identifier(&stem) {
        return Err(CoreError::InvalidQueryName {
            path: path.to_path_buf(),
            name: stem,
        });
    }
    let name = keywords::escape_reserved(&stem);

    let mut doc = Vec::new();
    let mut body = Vec::new();
    let mut line = 1;
    let mut in_body = false;
    for (idx, raw) in text.lines().enumerate() {
        if in_body {
            body.push(raw.to_string());
            continue;
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix("--") {
            doc.push(comment.trim().to_string());
            continue;
        }
        in_body = true;
        line = idx + 1;
        body.push(raw.to_string());
    }

    let sql = trim_statement(&body.join("\n"));
    if sql.is_empty() {
        return Err(CoreError::EmptyQuery {
            path: path.to_path_buf(),
        });
    }
    let doc = if doc.is_empty() { None } else { Some(doc.join("\n")) };
    Ok(vec![UntypedQuery {
        name,
        file_path: path.to_path_buf(),
        sql,
        doc,
        kind: None,
        line,
    }])
}

/// Trim surrounding whitespace and any trailing semicolons.
fn trim_statement(sql: &str) -> String {
    let mut s = sql.trim();
    loop {
        let stripped = s.trim_end_matches(';').trim_end();
        if stripped.len() == s.len() {
            break;
        }
        s = stripped;
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("queries/users.sql")
    }

    #[test]
    fn parses_three_annotated_blocks_in_order() {
        let text = "\
-- name: FindUserById :one
SELECT id, name FROM users WHERE id = $1;

-- name: ListUsers :many
SELECT id, name FROM users ORDER BY created_at DESC;

-- name: DeactivateUser :execrows
UPDATE users SET is_active = false WHERE id = $1;
";
        let queries = parse_query_file(&path(), text).unwrap();
        assert_eq!(queries.len(), 3);

        assert_eq!(queries[0].name, "FindUserById");
        assert_eq!(queries[0].kind, Some(QueryKind::One));
        assert_eq!(queries[0].sql, "SELECT id, name FROM users WHERE id = $1");
        assert_eq!(queries[0].line, 1);

        assert_eq!(queries[1].name, "ListUsers");
        assert_eq!(queries[1].kind, Some(QueryKind::Many));

        assert_eq!(queries[2].name, "DeactivateUser");
        assert_eq!(queries[2].kind, Some(QueryKind::ExecRows));
        assert!(!queries[2].sql.ends_with(';'));
    }

    #[test]
    fn collects_doc_comments() {
        let text = "\
-- name: FindUserById :one
-- Fetch a single user.
-- Returns null when absent.
SELECT id FROM users WHERE id = $1;
";
        let queries = parse_query_file(&path(), text).unwrap();
        assert_eq!(
            queries[0].doc.as_deref(),
            Some("Fetch a single user.\nReturns null when absent.")
        );
    }

    #[test]
    fn preserves_comments_and_blanks_inside_body() {
        let text = "\
-- name: Report :many
SELECT id,
       -- running total
       sum(amount) OVER (ORDER BY id)

FROM ledger;
";
        let queries = parse_query_file(&path(), text).unwrap();
        assert!(queries[0].sql.contains("-- running total"));
        assert!(queries[0].sql.contains("\n\nFROM ledger"));
    }

    #[test]
    fn single_query_mode_names_after_stem() {
        let text = "-- All users, most recent first.\nSELECT * FROM users ORDER BY created_at DESC;\n";
        let queries = parse_query_file(Path::new("sql/list_users.sql"), text).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].name, "list_users");
        assert_eq!(queries[0].kind, None);
        assert_eq!(queries[0].doc.as_deref(), Some("All users, most recent first."));
        assert_eq!(queries[0].sql, "SELECT * FROM users ORDER BY created_at DESC");
    }

    #[test]
    fn single_query_mode_escapes_reserved_stems() {
        let queries =
            parse_query_file(Path::new("sql/delete.sql"), "DELETE FROM users;").unwrap();
        assert_eq!(queries[0].name, "delete_");
    }

    #[test]
    fn single_query_mode_rejects_invalid_stems() {
        let err = parse_query_file(Path::new("sql/list-users.sql"), "SELECT 1;").unwrap_err();
        assert!(matches!(err, CoreError::InvalidQueryName { .. }));
    }

    #[test]
    fn empty_file_is_an_error() {
        let err = parse_query_file(&path(), "\n\n-- just a comment\n").unwrap_err();
        assert!(matches!(err, CoreError::EmptyQuery { .. }));
    }

    #[test]
    fn annotated_block_without_sql_is_dropped() {
        let text = "\
-- name: Empty :exec

-- name: Real :exec
DELETE FROM sessions;
";
        let queries = parse_query_file(&path(), text).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].name, "Real");
    }

    #[test]
    fn invalid_kind_is_an_error() {
        let err =
            parse_query_file(&path(), "-- name: Foo :all\nSELECT 1;\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidKind { .. }));
    }

    #[test]
    fn malformed_annotation_is_an_error() {
        let err = parse_query_file(&path(), "-- name: Foo\nSELECT 1;\n").unwrap_err();
        assert!(matches!(err, CoreError::MalformedAnnotation { .. }));
    }

    #[test]
    fn trailing_semicolons_and_whitespace_are_trimmed() {
        assert_eq!(trim_statement("  SELECT 1 ;;  \n"), "SELECT 1");
    }
}
