//! Storage driver seam: statement execution, transactions and name translation.

use crate::sql::Query;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Category of a storage failure, as reported in the envelope's `error.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageErrorKind {
    Connection,
    Statement,
    Transaction,
    Unknown,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageErrorKind::Connection => "connection",
            StorageErrorKind::Statement => "statement",
            StorageErrorKind::Transaction => "transaction",
            StorageErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Driver-level failure with the native code and message.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[error("{kind} error ({code}): {message}")]
pub struct StorageError {
    pub code: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: StorageErrorKind,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError {
            code: code.into(),
            message: message.into(),
            kind,
        }
    }
}

/// Raw result of one statement.
#[derive(Clone, Debug)]
pub enum Outcome {
    Rows(Vec<Map<String, Value>>),
    Affected {
        rows: u64,
        last_insert_id: Option<Value>,
    },
}

/// Logical-to-physical name translation. Identity unless a backend overrides it.
pub trait Naming: Send {
    fn table_name(&self, table: &str) -> String {
        table.to_string()
    }

    fn column_name(&self, field: &str) -> String {
        field.to_string()
    }
}

/// Identity naming.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultNaming;

impl Naming for DefaultNaming {}

/// One database session. Never shared between in-flight requests.
#[async_trait]
pub trait Driver: Naming {
    async fn execute(&mut self, query: &Query) -> Result<Outcome, StorageError>;

    async fn begin(&mut self) -> Result<(), StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;

    async fn rollback(&mut self) -> Result<(), StorageError>;
}
