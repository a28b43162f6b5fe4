//! Executes one built statement and wraps the outcome in a result envelope.

use crate::sql::{Driver, Outcome, Query, StatementKind, StorageError};
use serde::Serialize;
use serde_json::Value;

/// `{data, size | num_rows_affected, last_insert_id?, error?}`. Success is the absence of `error`.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StorageError>,
}

impl Envelope {
    fn failed(error: StorageError) -> Self {
        Envelope {
            data: Value::Null,
            size: None,
            num_rows_affected: None,
            last_insert_id: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Moves a populated `error` out as `Err`, for callers that propagate with `?`.
    pub fn into_result(self) -> Result<Envelope, StorageError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

pub struct QueryRunner;

impl QueryRunner {
    /// Run `query` on `driver`. Driver failures land in `error`; this never fails itself.
    pub async fn exec<D: Driver + ?Sized>(driver: &mut D, query: &Query) -> Envelope {
        tracing::debug!(sql = %query.sql, "query");
        let outcome = match driver.execute(query).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(sql = %query.sql, error = %e, "statement failed");
                return Envelope::failed(e);
            }
        };
        match outcome {
            Outcome::Rows(rows) => {
                let size = rows.len() as u64;
                let data = if query.array {
                    Value::Array(rows.into_iter().map(Value::Object).collect())
                } else {
                    rows.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
                };
                Envelope {
                    data,
                    size: Some(size),
                    num_rows_affected: None,
                    last_insert_id: None,
                    error: None,
                }
            }
            Outcome::Affected {
                rows,
                last_insert_id,
            } => Envelope {
                data: if query.array {
                    Value::Array(Vec::new())
                } else {
                    Value::Null
                },
                size: None,
                num_rows_affected: Some(rows),
                last_insert_id: last_insert_id
                    .filter(|_| query.kind == StatementKind::Insert),
                error: None,
            },
        }
    }
}
