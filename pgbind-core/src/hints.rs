//! Alias-hint quoting and parameter-name recovery.
//!
//! Both tools operate on raw SQL text with a character-class scanner, not a
//! SQL parser. String literals (with `''` escapes) and already-quoted
//! identifiers are opaque to the scanner.

use regex::Regex;
use std::sync::OnceLock;

/// A `!` or `?` suffix on a column alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullabilityHint {
    /// `ident!` — force not-null.
    NotNull,
    /// `ident?` — force nullable.
    Nullable,
}

/// Split a column name from its trailing hint, if any.
pub fn strip_hint(name: &str) -> (&str, Option<NullabilityHint>) {
    if let Some(base) = name.strip_suffix('!') {
        (base, Some(NullabilityHint::NotNull))
    } else if let Some(base) = name.strip_suffix('?') {
        (base, Some(NullabilityHint::Nullable))
    } else {
        (name, None)
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Rewrite each bare `ident!` / `ident?` as the quoted identifier
/// `"ident!"` / `"ident?"` so PostgreSQL accepts the statement and echoes
/// the hint back in `RowDescription`.
///
/// Only a bare identifier immediately followed by `!` or `?` is rewritten.
/// String literals and quoted identifiers are copied verbatim;
/// schema-qualified names (preceded by `.`) and the `!=` operator are left
/// alone.
pub fn quote_alias_hints(sql: &str) -> String {
    let b = sql.as_bytes();
    let mut out = Vec::with_capacity(b.len() + 16);
    let mut i = 0;

    while i < b.len() {
        match b[i] {
            b'\'' | b'"' => i = copy_quoted(b, i, &mut out),
            c if is_ident_start(c) => {
                let start = i;
                while i < b.len() && is_ident_char(b[i]) {
                    i += 1;
                }
                let hinted = i < b.len()
                    && (b[i] == b'!' || b[i] == b'?')
                    // not the != operator
                    && !(b[i] == b'!' && i + 1 < b.len() && b[i + 1] == b'=')
                    // not schema-qualified
                    && !(start > 0 && b[start - 1] == b'.');
                if hinted {
                    out.push(b'"');
                    out.extend_from_slice(&b[start..=i]);
                    out.push(b'"');
                    i += 1;
                } else {
                    out.extend_from_slice(&b[start..i]);
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    // Only ASCII quotes were inserted around ASCII runs.
    String::from_utf8(out).unwrap_or_else(|_| sql.to_string())
}

/// Copy a `'...'` or `"..."` section verbatim, honouring doubled-delimiter
/// escapes. Returns the index just past the closing delimiter.
fn copy_quoted(b: &[u8], mut i: usize, out: &mut Vec<u8>) -> usize {
    let delim = b[i];
    out.push(delim);
    i += 1;
    while i < b.len() {
        if b[i] == delim {
            if i + 1 < b.len() && b[i + 1] == delim {
                out.push(delim);
                out.push(delim);
                i += 2;
                continue;
            }
            out.push(delim);
            return i + 1;
        }
        out.push(b[i]);
        i += 1;
    }
    i
}

/// SQL keywords that must not be mistaken for a parameter name during the
/// backward scan.
const REJECTED_KEYWORDS: &[&str] = &[
    "and", "or", "not", "is", "in", "like", "set", "where", "having", "on", "then", "when",
    "else", "null",
];

const MAX_INSERT_COLUMNS: usize = 64;

fn insert_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)\binsert\s+into\s+(?:[A-Za-z_][A-Za-z0-9_$]*\.)?(?:"[^"]+"|[A-Za-z_][A-Za-z0-9_$]*)\s*\(([^)]*)\)\s*values\s*\("#,
        )
        .expect("insert shape regex")
    })
}

/// Recover a name for each of the `count` parameters of `sql`.
///
/// Strategy, in order: the `INSERT INTO t (...) VALUES (...)` shape names
/// placeholders after their column; a backward scan from `$n` over one
/// binary operator names it after the compared identifier; a trailing
/// `LIMIT` / `OFFSET` keyword names it after the keyword; anything left is
/// `param_n`. Names are de-duplicated with an index suffix.
pub fn parameter_names(sql: &str, count: usize) -> Vec<String> {
    let mut names: Vec<Option<String>> = vec![None; count];

    assign_insert_columns(sql, &mut names);

    let b = sql.as_bytes();
    for (pos, n) in placeholders(sql) {
        if n == 0 || n > count || names[n - 1].is_some() {
            continue;
        }
        names[n - 1] = name_before(b, pos);
    }

    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut name = name.unwrap_or_else(|| format!("param_{}", idx + 1));
            if !seen.insert(name.clone()) {
                name = format!("{}_{}", name, idx + 1);
            }
            name
        })
        .collect()
}

/// Locate every `$n` placeholder outside string literals and quoted
/// identifiers. Returns `(byte_offset_of_dollar, n)` pairs in text order.
fn placeholders(sql: &str) -> Vec<(usize, usize)> {
    let b = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\'' | b'"' => i = skip_quoted(b, i),
            b'$' => {
                let start = i;
                let mut j = i + 1;
                while j < b.len() && b[j].is_ascii_digit() {
                    j += 1;
                }
                if j > i + 1 {
                    if let Ok(n) = sql[i + 1..j].parse::<usize>() {
                        found.push((start, n));
                    }
                }
                i = j.max(i + 1);
            }
            _ => i += 1,
        }
    }
    found
}

fn skip_quoted(b: &[u8], mut i: usize) -> usize {
    let delim = b[i];
    i += 1;
    while i < b.len() {
        if b[i] == delim {
            if i + 1 < b.len() && b[i + 1] == delim {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    i
}

/// Match the `INSERT INTO t (c1, c2, ...) VALUES (...)` shape and name the
/// placeholder in each VALUES item after the column at the same position.
fn assign_insert_columns(sql: &str, names: &mut [Option<String>]) {
    let Some(caps) = insert_shape_re().captures(sql) else {
        return;
    };
    let columns: Vec<String> = caps[1]
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .take(MAX_INSERT_COLUMNS)
        .collect();
    if columns.is_empty() {
        return;
    }

    // The regex ends just past the opening paren of VALUES.
    let values_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
    for (item_idx, item) in values_items(sql, values_start).iter().enumerate() {
        let Some(column) = columns.get(item_idx) else {
            break;
        };
        for (_, n) in placeholders(item) {
            if n >= 1 && n <= names.len() && names[n - 1].is_none() {
                names[n - 1] = Some(column.clone());
            }
        }
    }
}

/// Split the VALUES tuple starting at `start` (just inside its opening
/// paren) into top-level comma-separated items.
fn values_items(sql: &str, start: usize) -> Vec<String> {
    let b = sql.as_bytes();
    let mut items = Vec::new();
    let mut item_start = start;
    let mut depth = 0usize;
    let mut i = start;
    while i < b.len() {
        match b[i] {
            b'\'' | b'"' => {
                i = skip_quoted(b, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                if depth == 0 {
                    items.push(sql[item_start..i].to_string());
                    return items;
                }
                depth -= 1;
            }
            b',' if depth == 0 => {
                items.push(sql[item_start..i].to_string());
                item_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    items
}

/// Scan backward from the `$` at `dollar_pos`: optional whitespace, one
/// binary operator, whitespace, then the identifier being compared. With no
/// operator, a trailing `LIMIT` / `OFFSET` keyword names the parameter.
fn name_before(b: &[u8], dollar_pos: usize) -> Option<String> {
    let mut end = dollar_pos;
    while end > 0 && b[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end == 0 {
        return None;
    }

    let op_len = operator_len(b, end);
    if op_len == 0 {
        // No operator: accept a trailing keyword instead.
        let word = ident_ending_at(b, end)?;
        let lower = word.to_ascii_lowercase();
        if lower == "limit" || lower == "offset" {
            return Some(lower);
        }
        return None;
    }

    let mut end = end - op_len;
    while end > 0 && b[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let word = ident_ending_at(b, end)?;
    if REJECTED_KEYWORDS.contains(&word.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(word)
}

/// Length of the binary operator ending at `end`, or 0.
fn operator_len(b: &[u8], end: usize) -> usize {
    if end >= 2 {
        match &b[end - 2..end] {
            b">=" | b"<=" | b"!=" | b"<>" => return 2,
            _ => {}
        }
    }
    if end >= 1 && matches!(b[end - 1], b'=' | b'<' | b'>') {
        return 1;
    }
    0
}

/// The bare identifier whose last byte is at `end - 1`, if any.
fn ident_ending_at(b: &[u8], end: usize) -> Option<String> {
    if end == 0 {
        return None;
    }
    let mut start = end;
    while start > 0 && is_ident_char(b[start - 1]) {
        start -= 1;
    }
    if start == end || !is_ident_start(b[start]) {
        return None;
    }
    std::str::from_utf8(&b[start..end]).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_alias_hints() {
        assert_eq!(
            quote_alias_hints("SELECT COUNT(*) AS total!, name FROM t"),
            "SELECT COUNT(*) AS \"total!\", name FROM t"
        );
        assert_eq!(
            quote_alias_hints("SELECT bio? FROM users"),
            "SELECT \"bio?\" FROM users"
        );
    }

    #[test]
    fn leaves_string_literals_alone() {
        assert_eq!(
            quote_alias_hints("SELECT 'hello!' AS greeting"),
            "SELECT 'hello!' AS greeting"
        );
        assert_eq!(
            quote_alias_hints("SELECT 'it''s fine!' AS s"),
            "SELECT 'it''s fine!' AS s"
        );
    }

    #[test]
    fn leaves_quoted_identifiers_alone() {
        assert_eq!(
            quote_alias_hints("SELECT \"weird name!\" FROM t"),
            "SELECT \"weird name!\" FROM t"
        );
    }

    #[test]
    fn leaves_not_equals_operator_alone() {
        assert_eq!(
            quote_alias_hints("SELECT * FROM t WHERE a!=1"),
            "SELECT * FROM t WHERE a!=1"
        );
    }

    #[test]
    fn leaves_qualified_names_alone() {
        assert_eq!(
            quote_alias_hints("SELECT u.name! FROM users u"),
            "SELECT u.name! FROM users u"
        );
    }

    #[test]
    fn strips_hints() {
        assert_eq!(strip_hint("total!"), ("total", Some(NullabilityHint::NotNull)));
        assert_eq!(strip_hint("bio?"), ("bio", Some(NullabilityHint::Nullable)));
        assert_eq!(strip_hint("name"), ("name", None));
    }

    #[test]
    fn names_from_update_where() {
        let names = parameter_names("UPDATE users SET email = $2 WHERE id = $1", 2);
        assert_eq!(names, ["id", "email"]);
    }

    #[test]
    fn names_from_insert_values() {
        let names = parameter_names(
            "INSERT INTO users (name, email, bio) VALUES ($1, $2, $3)",
            3,
        );
        assert_eq!(names, ["name", "email", "bio"]);
    }

    #[test]
    fn names_from_insert_with_expressions() {
        let names = parameter_names(
            "INSERT INTO users (name, created_at, bio) VALUES ($1, now(), $2)",
            2,
        );
        assert_eq!(names, ["name", "bio"]);
    }

    #[test]
    fn names_from_limit_offset() {
        let names = parameter_names("SELECT * FROM users LIMIT $1 OFFSET $2", 2);
        assert_eq!(names, ["limit", "offset"]);
    }

    #[test]
    fn names_from_comparison_operators() {
        let names = parameter_names(
            "SELECT * FROM orders WHERE total >= $1 AND status != $2",
            2,
        );
        assert_eq!(names, ["total", "status"]);
    }

    #[test]
    fn rejects_keywords_as_names() {
        let names = parameter_names("SELECT * FROM t WHERE x IS NOT NULL AND $1 = id", 1);
        assert_eq!(names, ["param_1"]);
    }

    #[test]
    fn falls_back_to_positional_names() {
        let names = parameter_names("SELECT coalesce($1, $2)", 2);
        assert_eq!(names, ["param_1", "param_2"]);
    }

    #[test]
    fn skips_dollars_inside_literals() {
        let names = parameter_names("SELECT * FROM t WHERE note = '$9' AND id = $1", 1);
        assert_eq!(names, ["id"]);
    }

    #[test]
    fn deduplicates_repeated_names() {
        let names = parameter_names("SELECT * FROM t WHERE a = $1 OR a = $2", 2);
        assert_eq!(names, ["a", "a_2"]);
    }
}
