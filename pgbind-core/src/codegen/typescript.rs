//! TypeScript code generator.
//!
//! Emits one `.ts` module per query group, a `helpers.ts` runtime shim the
//! generated functions import, and an `index.ts` that re-exports
//! everything. Output is deterministic: groups are sorted by name and all
//! rendering walks input order.

use crate::codegen::{CodeGenerator, GeneratedFile, QueryGroup};
use crate::error::CoreResult;
use crate::keywords;
use crate::model::{Column, Param, QueryKind, TargetType, TypedQuery};
use std::fmt::Write as _;
use std::path::PathBuf;

const HEADER: &str = "// Code generated by pgbind. DO NOT EDIT.\n";

/// TypeScript emitter.
#[derive(Debug, Default)]
pub struct TypeScriptGenerator;

impl TypeScriptGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGenerator for TypeScriptGenerator {
    fn generate(&self, groups: &[QueryGroup]) -> CoreResult<Vec<GeneratedFile>> {
        let mut sorted: Vec<&QueryGroup> = groups.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut files = Vec::with_capacity(sorted.len() + 2);
        for group in &sorted {
            files.push(GeneratedFile {
                path: PathBuf::from(format!("{}.ts", group.name)),
                contents: render_group(group),
            });
        }
        files.push(GeneratedFile {
            path: PathBuf::from("helpers.ts"),
            contents: render_helpers(),
        });
        files.push(GeneratedFile {
            path: PathBuf::from("index.ts"),
            contents: render_index(&sorted),
        });
        Ok(files)
    }
}

fn render_index(groups: &[&QueryGroup]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    out.push_str("export * from \"./helpers\";\n");
    for group in groups {
        let _ = writeln!(out, "export * from \"./{}\";", group.name);
    }
    out
}

fn render_helpers() -> String {
    let mut out = String::from(HEADER);
    out.push_str(
        r#"
/** Result shape the querying client must deliver. */
export interface QueryResult {
  rows: unknown[][];
  rowCount: number | null;
}

/**
 * Minimal querying interface. `pg.Client` and `pg.Pool` both satisfy it;
 * rows are requested positionally so column mapping stays explicit.
 */
export interface Client {
  query(config: { text: string; values: unknown[]; rowMode: "array" }): Promise<QueryResult>;
}

export async function query(client: Client, text: string, values: unknown[]): Promise<unknown[][]> {
  const result = await client.query({ text, values, rowMode: "array" });
  return result.rows;
}

export async function execute(client: Client, text: string, values: unknown[]): Promise<void> {
  await client.query({ text, values, rowMode: "array" });
}

export async function executeRows(client: Client, text: string, values: unknown[]): Promise<number> {
  const result = await client.query({ text, values, rowMode: "array" });
  return result.rowCount ?? 0;
}
"#,
    );
    out
}

fn render_group(group: &QueryGroup) -> String {
    let mut out = String::from(HEADER);
    if let Some(first) = group.queries.first() {
        let _ = writeln!(out, "// Source: {}", first.source.file_path.display());
    }
    out.push('\n');

    let imports = collect_helper_imports(&group.queries);
    let _ = writeln!(out, "import {{ {} }} from \"./helpers\";", imports.join(", "));

    for enum_ty in collect_enums(&group.queries) {
        if let TargetType::Enum { name, variants } = enum_ty {
            let union = variants
                .iter()
                .map(|v| format!("\"{}\"", escape_string(v)))
                .collect::<Vec<_>>()
                .join(" | ");
            let _ = write!(out, "\nexport type {} = {};\n", pascal_case(&name), union);
        }
    }

    for query in &group.queries {
        out.push('\n');
        render_query(&mut out, query);
    }
    out
}

fn collect_helper_imports(queries: &[TypedQuery]) -> Vec<&'static str> {
    let mut imports = vec!["Client"];
    if queries
        .iter()
        .any(|q| matches!(q.kind, QueryKind::One | QueryKind::Many))
    {
        imports.push("query");
    }
    if queries.iter().any(|q| q.kind == QueryKind::Exec) {
        imports.push("execute");
    }
    if queries.iter().any(|q| q.kind == QueryKind::ExecRows) {
        imports.push("executeRows");
    }
    imports
}

/// Every distinct enum type referenced by the group, in first-appearance
/// order.
fn collect_enums(queries: &[TypedQuery]) -> Vec<TargetType> {
    let mut seen = std::collections::HashSet::new();
    let mut enums = Vec::new();
    for query in queries {
        for param in &query.params {
            collect_enums_from(&param.ty, &mut enums, &mut seen);
        }
        for column in &query.columns {
            collect_enums_from(&column.ty, &mut enums, &mut seen);
        }
    }
    enums
}

fn collect_enums_from(
    ty: &TargetType,
    enums: &mut Vec<TargetType>,
    seen: &mut std::collections::HashSet<String>,
) {
    match ty {
        TargetType::Enum { name, .. } => {
            if seen.insert(name.clone()) {
                enums.push(ty.clone());
            }
        }
        TargetType::Array(inner) | TargetType::Optional(inner) => {
            collect_enums_from(inner, enums, seen);
        }
        _ => {}
    }
}

/// Helper names imported into every module; generated functions must not
/// shadow them.
const HELPER_NAMES: &[&str] = &["Client", "query", "execute", "executeRows"];

fn render_query(out: &mut String, query: &TypedQuery) {
    let mut fn_name = keywords::escape_reserved(&camel_case(query.name()));
    if HELPER_NAMES.contains(&fn_name.as_str()) {
        fn_name.push('_');
    }
    let type_base = pascal_case(query.name());
    let params_ty = format!("{type_base}Params");
    let row_ty = format!("{type_base}Row");

    // execrows drops any columns the statement happens to return.
    let columns: &[Column] = match query.kind {
        QueryKind::Exec | QueryKind::ExecRows => &[],
        _ => &query.columns,
    };

    if !query.params.is_empty() {
        let _ = writeln!(out, "export interface {params_ty} {{");
        for param in &query.params {
            let _ = writeln!(out, "  {}: {};", property(&param.name), ts_type(&param.ty));
        }
        out.push_str("}\n\n");
    }

    if matches!(query.kind, QueryKind::One | QueryKind::Many) {
        let _ = writeln!(out, "export interface {row_ty} {{");
        for column in columns {
            let _ = writeln!(out, "  {}: {};", property(&column.name), column_type(column));
        }
        out.push_str("}\n\n");
    }

    let sql_const = format!("{fn_name}Sql");
    let _ = writeln!(out, "const {sql_const} = \"{}\";", escape_string(&query.source.sql));
    out.push('\n');

    if let Some(doc) = &query.source.doc {
        render_doc(out, doc);
    }

    let args = if query.params.is_empty() {
        "client: Client".to_string()
    } else {
        format!("client: Client, params: {params_ty}")
    };
    let values = values_list(&query.params);

    match query.kind {
        QueryKind::One => {
            let _ = writeln!(
                out,
                "export async function {fn_name}({args}): Promise<{row_ty} | null> {{"
            );
            let _ = writeln!(out, "  const rows = await query(client, {sql_const}, {values});");
            let _ = writeln!(out, "  const row = rows[0];");
            let _ = writeln!(out, "  return row === undefined ? null : {{");
            render_row_fields(out, columns);
            out.push_str("  };\n}\n");
        }
        QueryKind::Many => {
            let _ = writeln!(
                out,
                "export async function {fn_name}({args}): Promise<{row_ty}[]> {{"
            );
            let _ = writeln!(out, "  const rows = await query(client, {sql_const}, {values});");
            let _ = writeln!(out, "  return rows.map((row) => ({{");
            render_row_fields(out, columns);
            out.push_str("  }));\n}\n");
        }
        QueryKind::Exec => {
            let _ = writeln!(
                out,
                "export async function {fn_name}({args}): Promise<void> {{"
            );
            let _ = writeln!(out, "  await execute(client, {sql_const}, {values});");
            out.push_str("}\n");
        }
        QueryKind::ExecRows => {
            let _ = writeln!(
                out,
                "export async function {fn_name}({args}): Promise<number> {{"
            );
            let _ = writeln!(out, "  return executeRows(client, {sql_const}, {values});");
            out.push_str("}\n");
        }
    }
}

fn render_doc(out: &mut String, doc: &str) {
    let lines: Vec<&str> = doc.lines().collect();
    if lines.len() == 1 {
        let _ = writeln!(out, "/** {} */", lines[0]);
    } else {
        out.push_str("/**\n");
        for line in lines {
            let _ = writeln!(out, " * {line}");
        }
        out.push_str(" */\n");
    }
}

fn render_row_fields(out: &mut String, columns: &[Column]) {
    for (idx, column) in columns.iter().enumerate() {
        let _ = writeln!(
            out,
            "    {}: row[{idx}] as {},",
            property(&column.name),
            column_type(column)
        );
    }
}

fn values_list(params: &[Param]) -> String {
    if params.is_empty() {
        return "[]".to_string();
    }
    let items = params
        .iter()
        .map(|p| format!("params{}", property_access(&p.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{items}]")
}

/// A column's emitted type: the resolved base wrapped in `| null` when the
/// column is nullable.
fn column_type(column: &Column) -> String {
    if column.nullable {
        ts_type(&column.ty.clone().nullable())
    } else {
        ts_type(&column.ty)
    }
}

fn ts_type(ty: &TargetType) -> String {
    match ty {
        TargetType::Bool => "boolean".into(),
        TargetType::Int16 | TargetType::Int32 | TargetType::Float32 | TargetType::Float64 => {
            "number".into()
        }
        // bigint values exceed Number.MAX_SAFE_INTEGER; drivers deliver text
        TargetType::Int64 => "string".into(),
        TargetType::Text | TargetType::Uuid | TargetType::Time => "string".into(),
        TargetType::Bytea => "Uint8Array".into(),
        TargetType::Json | TargetType::Unknown { .. } => "unknown".into(),
        TargetType::Date | TargetType::Timestamp => "Date".into(),
        TargetType::Array(inner) => {
            let elem = ts_type(inner);
            if elem.contains(' ') {
                format!("({elem})[]")
            } else {
                format!("{elem}[]")
            }
        }
        TargetType::Optional(inner) => format!("{} | null", ts_type(inner)),
        TargetType::Enum { name, .. } => pascal_case(name),
    }
}

/// An interface property: bare when it is a valid identifier, quoted
/// otherwise. Reserved words are legal property names.
fn property(name: &str) -> String {
    if keywords::is_valid_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", escape_string(name))
    }
}

/// A property access on `params`; invalid identifiers use index syntax.
fn property_access(name: &str) -> String {
    if keywords::is_valid_identifier(name) {
        format!(".{name}")
    } else {
        format!("[\"{}\"]", escape_string(name))
    }
}

fn pascal_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for part in name.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() {
        name.to_string()
    } else {
        out
    }
}

fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => pascal,
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UntypedQuery;
    use std::path::PathBuf;

    fn untyped(name: &str, sql: &str) -> UntypedQuery {
        UntypedQuery {
            name: name.to_string(),
            file_path: PathBuf::from("queries/users.sql"),
            sql: sql.to_string(),
            doc: Some("Fetch a single user.".to_string()),
            kind: None,
            line: 1,
        }
    }

    fn find_user_by_id() -> TypedQuery {
        TypedQuery {
            source: untyped("FindUserById", "SELECT id, name, bio FROM users WHERE id = $1"),
            kind: QueryKind::One,
            params: vec![Param {
                index: 1,
                name: "id".to_string(),
                ty: TargetType::Int32,
            }],
            columns: vec![
                Column {
                    name: "id".to_string(),
                    ty: TargetType::Int32,
                    nullable: false,
                    table_oid: 51342,
                    column_attr: 1,
                },
                Column {
                    name: "name".to_string(),
                    ty: TargetType::Text,
                    nullable: false,
                    table_oid: 51342,
                    column_attr: 2,
                },
                Column {
                    name: "bio".to_string(),
                    ty: TargetType::Text,
                    nullable: true,
                    table_oid: 51342,
                    column_attr: 4,
                },
            ],
        }
    }

    fn group() -> QueryGroup {
        QueryGroup {
            name: "users".to_string(),
            queries: vec![find_user_by_id()],
        }
    }

    #[test]
    fn output_is_deterministic() {
        let generator = TypeScriptGenerator::new();
        let first = generator.generate(&[group()]).unwrap();
        let second = generator.generate(&[group()]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn emits_module_helper_and_index() {
        let files = TypeScriptGenerator::new().generate(&[group()]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.display().to_string()).collect();
        assert_eq!(paths, ["users.ts", "helpers.ts", "index.ts"]);
    }

    #[test]
    fn index_sorts_groups_by_name() {
        let mut b = group();
        b.name = "billing".to_string();
        let files = TypeScriptGenerator::new().generate(&[group(), b]).unwrap();
        let index = &files.last().unwrap().contents;
        let billing = index.find("./billing").unwrap();
        let users = index.find("./users").unwrap();
        assert!(billing < users);
        assert!(index.contains("export * from \"./helpers\";"));
    }

    #[test]
    fn one_kind_returns_optional_row() {
        let files = TypeScriptGenerator::new().generate(&[group()]).unwrap();
        let module = &files[0].contents;
        assert!(module.contains("export interface FindUserByIdParams {\n  id: number;\n}"));
        assert!(module.contains("export interface FindUserByIdRow {"));
        assert!(module.contains("bio: string | null;"));
        assert!(module.contains(
            "export async function findUserById(client: Client, params: FindUserByIdParams): Promise<FindUserByIdRow | null> {"
        ));
        assert!(module.contains("/** Fetch a single user. */"));
    }

    #[test]
    fn execrows_drops_columns_and_returns_number() {
        let mut query = find_user_by_id();
        query.kind = QueryKind::ExecRows;
        let files = TypeScriptGenerator::new()
            .generate(&[QueryGroup {
                name: "users".to_string(),
                queries: vec![query],
            }])
            .unwrap();
        let module = &files[0].contents;
        assert!(!module.contains("FindUserByIdRow"));
        assert!(module.contains("Promise<number>"));
        assert!(module.contains("executeRows(client, findUserByIdSql, [params.id]);"));
    }

    #[test]
    fn enum_alias_preserves_server_order() {
        let mut query = find_user_by_id();
        query.columns[1].ty = TargetType::Enum {
            name: "user_role".to_string(),
            variants: vec!["owner".into(), "admin".into(), "member".into()],
        };
        let files = TypeScriptGenerator::new()
            .generate(&[QueryGroup {
                name: "users".to_string(),
                queries: vec![query],
            }])
            .unwrap();
        let module = &files[0].contents;
        assert!(module.contains("export type UserRole = \"owner\" | \"admin\" | \"member\";"));
        assert!(module.contains("name: UserRole;"));
    }

    #[test]
    fn reserved_function_names_get_escaped() {
        let mut query = find_user_by_id();
        query.source.name = "Delete".to_string();
        query.kind = QueryKind::Exec;
        query.params.clear();
        query.columns.clear();
        let files = TypeScriptGenerator::new()
            .generate(&[QueryGroup {
                name: "users".to_string(),
                queries: vec![query],
            }])
            .unwrap();
        assert!(files[0]
            .contents
            .contains("export async function delete_(client: Client): Promise<void> {"));
    }

    #[test]
    fn sql_text_is_escaped_into_one_literal() {
        let mut query = find_user_by_id();
        query.source.sql = "SELECT \"a\"\nFROM t".to_string();
        query.kind = QueryKind::Many;
        let files = TypeScriptGenerator::new()
            .generate(&[QueryGroup {
                name: "users".to_string(),
                queries: vec![query],
            }])
            .unwrap();
        assert!(files[0]
            .contents
            .contains("const findUserByIdSql = \"SELECT \\\"a\\\"\\nFROM t\";"));
    }

    #[test]
    fn quoted_properties_for_awkward_column_names() {
        let mut query = find_user_by_id();
        query.columns[0].name = "user count".to_string();
        let files = TypeScriptGenerator::new()
            .generate(&[QueryGroup {
                name: "users".to_string(),
                queries: vec![query],
            }])
            .unwrap();
        assert!(files[0].contents.contains("\"user count\": number;"));
    }
}
