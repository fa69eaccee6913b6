//! Simple-query support for catalog lookups.

use super::{PgConnection, PgError, PgResult};
use crate::protocol::{BackendMessage, FrontendMessage};
use tracing::trace;

impl PgConnection {
    /// Run one statement over the simple query protocol and collect its
    /// text-format rows. Used only for catalog lookups; user queries are
    /// never executed.
    pub(crate) async fn simple_query(&mut self, sql: &str) -> PgResult<Vec<Vec<Option<String>>>> {
        trace!(sql, "simple query");
        self.send(&FrontendMessage::Query(sql.to_string())).await?;

        let mut rows = Vec::new();
        let mut error: Option<PgError> = None;
        for msg in self.recv_until_ready().await? {
            match msg {
                BackendMessage::RowDescription { .. } => {}
                BackendMessage::DataRow { columns } => {
                    let mut row = Vec::with_capacity(columns.len());
                    for column in columns {
                        match column {
                            None => row.push(None),
                            Some(bytes) => {
                                let text = String::from_utf8(bytes).map_err(|_| {
                                    PgError::Connection(
                                        "catalog row is not valid UTF-8".to_string(),
                                    )
                                })?;
                                row.push(Some(text));
                            }
                        }
                    }
                    rows.push(row);
                }
                BackendMessage::ErrorResponse(fields) => {
                    error = Some(PgError::query(&fields));
                }
                BackendMessage::CommandComplete { .. }
                | BackendMessage::EmptyQueryResponse
                | BackendMessage::NoticeResponse(_)
                | BackendMessage::ParameterStatus { .. }
                | BackendMessage::ReadyForQuery(_) => {}
                other => {
                    return Err(PgError::Connection(format!(
                        "unexpected {other:?} during simple query"
                    )))
                }
            }
        }
        match error {
            Some(err) => Err(err),
            None => Ok(rows),
        }
    }
}
