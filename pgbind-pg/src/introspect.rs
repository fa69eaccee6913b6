//! Statement introspection: Parse/Describe round-trips plus the catalog
//! lookups that resolve enums and column nullability.
//!
//! One introspector owns the connection and both per-run caches for the
//! whole run; every user statement and every catalog lookup is serialised
//! on the same wire.

use crate::driver::{PgConnection, PgError, PgResult};
use crate::protocol::{BackendMessage, DescribeTarget, FrontendMessage, RowField};
use pgbind_core::hints::{self, NullabilityHint};
use pgbind_core::model::{Column, Param, QueryKind, TargetType, TypedQuery, UntypedQuery};
use pgbind_core::typemap::{NullabilityCache, TypeRegistry};
use tracing::{debug, warn};

/// Turns untyped queries into typed ones by asking the server.
pub struct Introspector {
    conn: PgConnection,
    types: TypeRegistry,
    nullability: NullabilityCache,
}

/// What one Describe round-trip reported.
#[derive(Debug)]
struct Description {
    param_oids: Vec<u32>,
    fields: Vec<RowField>,
}

impl Introspector {
    pub fn new(conn: PgConnection) -> Self {
        Self {
            conn,
            types: TypeRegistry::new(),
            nullability: NullabilityCache::new(),
        }
    }

    /// Describe one query and assemble its typed form.
    ///
    /// Failures caused by the statement itself (`ErrorResponse` during
    /// Parse/Describe) come back as [`PgError::Query`] and leave the
    /// connection usable for the next query.
    pub async fn introspect(&mut self, query: &UntypedQuery) -> PgResult<TypedQuery> {
        debug!(name = %query.name, file = %query.file_path.display(), "describing query");
        let sql = hints::quote_alias_hints(&query.sql);
        let description = self.describe(&sql).await?;

        let names = hints::parameter_names(&query.sql, description.param_oids.len());
        let mut params = Vec::with_capacity(description.param_oids.len());
        for (idx, (oid, name)) in description
            .param_oids
            .iter()
            .zip(names.into_iter())
            .enumerate()
        {
            params.push(Param {
                index: idx + 1,
                name,
                ty: self.resolve_type(*oid).await?,
            });
        }

        let mut columns = Vec::with_capacity(description.fields.len());
        for field in &description.fields {
            let (name, hint) = hints::strip_hint(&field.name);
            let attnotnull = match hint {
                None if catalog_backed(field) => {
                    Some(self.attnotnull(field.table_oid, field.column_attr).await?)
                }
                _ => None,
            };
            columns.push(Column {
                name: name.to_string(),
                ty: self.resolve_type(field.type_oid).await?,
                nullable: column_nullability(hint, field.table_oid, field.column_attr, attnotnull),
                table_oid: field.table_oid,
                column_attr: field.column_attr,
            });
        }

        let kind = resolve_kind(query.kind, !columns.is_empty());
        if kind == QueryKind::ExecRows && !columns.is_empty() {
            warn!(
                name = %query.name,
                "execrows query returns columns; they will not be emitted"
            );
            columns.clear();
        }

        Ok(TypedQuery {
            source: query.clone(),
            kind,
            params,
            columns,
        })
    }

    /// Send Terminate and close the socket.
    pub async fn finish(self) -> PgResult<()> {
        self.conn.close().await
    }

    /// One extended-protocol round-trip: Parse, Describe, Close, Sync in a
    /// single write, then collect until `ReadyForQuery`.
    async fn describe(&mut self, sql: &str) -> PgResult<Description> {
        self.conn.buffer_msg(&FrontendMessage::Parse {
            statement: String::new(),
            sql: sql.to_string(),
        });
        self.conn.buffer_msg(&FrontendMessage::Describe {
            target: DescribeTarget::Statement,
            name: String::new(),
        });
        self.conn.buffer_msg(&FrontendMessage::Close {
            target: DescribeTarget::Statement,
            name: String::new(),
        });
        self.conn.buffer_msg(&FrontendMessage::Sync);
        self.conn.flush().await?;

        let messages = self.conn.recv_until_ready().await?;
        classify_describe(messages)
    }

    /// Registry first, then the catalog (enums), then `unknown`.
    async fn resolve_type(&mut self, oid: u32) -> PgResult<TargetType> {
        if let Some(ty) = self.types.resolve(oid) {
            return Ok(ty);
        }
        if let Some(ty) = self.resolve_enum(oid).await? {
            self.types.put(oid, ty.clone());
            return Ok(ty);
        }
        debug!(oid, "no type mapping; emitting unknown");
        Ok(TargetType::Unknown { oid })
    }

    /// Look the OID up in `pg_type`/`pg_enum`; variants come back in
    /// `enumsortorder`, which is the order the generated code must keep.
    async fn resolve_enum(&mut self, oid: u32) -> PgResult<Option<TargetType>> {
        let sql = format!(
            "SELECT t.typname, e.enumlabel \
             FROM pg_type t JOIN pg_enum e ON e.enumtypid = t.oid \
             WHERE t.oid = {oid} ORDER BY e.enumsortorder"
        );
        let rows = self.conn.simple_query(&sql).await?;
        let mut name = None;
        let mut variants = Vec::with_capacity(rows.len());
        for row in rows {
            let mut row = row.into_iter();
            let typname = row.next().flatten();
            let label = row.next().flatten();
            if let (Some(typname), Some(label)) = (typname, label) {
                name.get_or_insert(typname);
                variants.push(label);
            }
        }
        Ok(name.map(|name| {
            debug!(enum_name = %name, count = variants.len(), "resolved enum type");
            TargetType::Enum { name, variants }
        }))
    }

    /// `pg_attribute.attnotnull` for one column, via the per-run cache.
    async fn attnotnull(&mut self, table_oid: u32, column_attr: i16) -> PgResult<bool> {
        if let Some(cached) = self.nullability.lookup(table_oid, column_attr) {
            return Ok(cached);
        }
        let sql = format!(
            "SELECT attnotnull FROM pg_attribute \
             WHERE attrelid = {table_oid} AND attnum = {column_attr}"
        );
        let rows = self.conn.simple_query(&sql).await?;
        let not_null = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_deref())
            .map(|v| v == "t")
            .unwrap_or(false);
        self.nullability.insert(table_oid, column_attr, not_null);
        Ok(not_null)
    }
}

/// Whether a row field traces back to a real table column.
fn catalog_backed(field: &RowField) -> bool {
    field.table_oid != 0 && field.column_attr > 0
}

/// The nullability policy, in order: an alias hint wins outright; a
/// catalog-backed column follows `attnotnull`; everything else (computed
/// expressions) is assumed nullable.
fn column_nullability(
    hint: Option<NullabilityHint>,
    table_oid: u32,
    column_attr: i16,
    attnotnull: Option<bool>,
) -> bool {
    match hint {
        Some(NullabilityHint::NotNull) => false,
        Some(NullabilityHint::Nullable) => true,
        None if table_oid != 0 && column_attr > 0 => !attnotnull.unwrap_or(false),
        None => true,
    }
}

/// Declared kind if present, else `many` when the statement returns rows,
/// else `exec`.
fn resolve_kind(declared: Option<QueryKind>, has_columns: bool) -> QueryKind {
    match declared {
        Some(kind) => kind,
        None if has_columns => QueryKind::Many,
        None => QueryKind::Exec,
    }
}

/// Sort one round-trip's messages into parameter OIDs and row fields.
///
/// The expected order (`ParseComplete`, optional `ParameterDescription`,
/// then `RowDescription` or `NoData`) is not revalidated: collect
/// everything, classify, and let any `ErrorResponse` win.
fn classify_describe(messages: Vec<BackendMessage>) -> PgResult<Description> {
    let mut param_oids = Vec::new();
    let mut fields = Vec::new();
    let mut error: Option<PgError> = None;

    for msg in messages {
        match msg {
            BackendMessage::ParameterDescription { type_oids } => param_oids = type_oids,
            BackendMessage::RowDescription { fields: f } => fields = f,
            BackendMessage::ErrorResponse(e) => error = Some(PgError::query(&e)),
            BackendMessage::ParseComplete
            | BackendMessage::CloseComplete
            | BackendMessage::NoData
            | BackendMessage::NoticeResponse(_)
            | BackendMessage::ParameterStatus { .. }
            | BackendMessage::ReadyForQuery(_) => {}
            other => {
                return Err(PgError::Connection(format!(
                    "unexpected {other:?} while describing a statement"
                )))
            }
        }
    }

    match error {
        Some(err) => Err(err),
        None => Ok(Description { param_oids, fields }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorFields, TransactionStatus};

    fn field(name: &str, table_oid: u32, column_attr: i16, type_oid: u32) -> RowField {
        RowField {
            name: name.to_string(),
            table_oid,
            column_attr,
            type_oid,
            type_len: -1,
            type_mod: -1,
            format_code: 0,
        }
    }

    #[test]
    fn classify_collects_params_and_fields() {
        let description = classify_describe(vec![
            BackendMessage::ParseComplete,
            BackendMessage::ParameterDescription {
                type_oids: vec![23],
            },
            BackendMessage::RowDescription {
                fields: vec![field("id", 51342, 1, 23)],
            },
            BackendMessage::CloseComplete,
            BackendMessage::ReadyForQuery(TransactionStatus::Idle),
        ])
        .unwrap();
        assert_eq!(description.param_oids, [23]);
        assert_eq!(description.fields.len(), 1);
        assert_eq!(description.fields[0].name, "id");
    }

    #[test]
    fn classify_treats_no_data_as_no_columns() {
        let description = classify_describe(vec![
            BackendMessage::ParseComplete,
            BackendMessage::ParameterDescription {
                type_oids: vec![23],
            },
            BackendMessage::NoData,
            BackendMessage::CloseComplete,
            BackendMessage::ReadyForQuery(TransactionStatus::Idle),
        ])
        .unwrap();
        assert!(description.fields.is_empty());
    }

    #[test]
    fn classify_surfaces_server_errors() {
        let err = classify_describe(vec![
            BackendMessage::ErrorResponse(ErrorFields(vec![
                (b'M', "relation \"userz\" does not exist".to_string()),
                (b'D', "typo?".to_string()),
            ])),
            BackendMessage::ReadyForQuery(TransactionStatus::Idle),
        ])
        .unwrap_err();
        match err {
            PgError::Query { message, detail } => {
                assert_eq!(message, "relation \"userz\" does not exist");
                assert_eq!(detail.as_deref(), Some("typo?"));
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn hint_overrides_beat_the_catalog() {
        // `!` wins even when the catalog says nullable
        assert!(!column_nullability(
            Some(NullabilityHint::NotNull),
            51342,
            1,
            Some(false)
        ));
        // `?` wins even when the catalog says not-null
        assert!(column_nullability(
            Some(NullabilityHint::Nullable),
            51342,
            1,
            Some(true)
        ));
    }

    #[test]
    fn catalog_backed_columns_follow_attnotnull() {
        assert!(!column_nullability(None, 51342, 1, Some(true)));
        assert!(column_nullability(None, 51342, 1, Some(false)));
    }

    #[test]
    fn computed_expressions_are_nullable() {
        assert!(column_nullability(None, 0, 0, None));
        assert!(column_nullability(None, 51342, -1, None));
    }

    #[test]
    fn undeclared_kind_defaults_by_columns() {
        assert_eq!(resolve_kind(None, true), QueryKind::Many);
        assert_eq!(resolve_kind(None, false), QueryKind::Exec);
        assert_eq!(resolve_kind(Some(QueryKind::One), false), QueryKind::One);
    }
}
