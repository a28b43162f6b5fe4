//! Scripted in-memory driver that records every statement, plus shared fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use restmap_sdk::clock::FixedClock;
use restmap_sdk::config::{load_from_str, resolve, RelationGraph};
use restmap_sdk::sql::{Driver, Naming, Outcome, Query, StatementKind, StorageError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const STORE: &str = r#"{
    "resources": {
        "categories": {
            "table": "Categories",
            "relations": {"products": {"type": "has_many", "resource": "products"}}
        },
        "products": {
            "table": "Products",
            "timestamps": true,
            "relations": {
                "category": {"type": "belongs_to", "resource": "categories"},
                "sales": {"type": "belongs_to_many", "resource": "sales", "pivot": "SaleItems"}
            }
        },
        "stocks": {
            "table": "Stocks",
            "fields": ["quantity"],
            "relations": {"product": {"type": "belongs_to", "resource": "products", "owned": true}}
        },
        "sales": {
            "table": "Sales",
            "hidden": ["notes"],
            "relations": {
                "items": {"type": "has_many", "resource": "sale_items"},
                "products": {"type": "belongs_to_many", "resource": "products", "pivot": "SaleItems"}
            }
        },
        "sale_items": {"table": "SaleItems"},
        "tokens": {"table": "Tokens", "key_type": "uuid"}
    }
}"#;

pub fn graph() -> Arc<RelationGraph> {
    Arc::new(resolve(&load_from_str(STORE).unwrap()).unwrap())
}

pub const NOW: &str = "2024-03-09 14:05:07.000";

pub fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap())
}

pub fn later_clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap())
}

pub fn rows(v: Value) -> Vec<Map<String, Value>> {
    match v {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|i| match i {
                Value::Object(m) => Some(m),
                _ => None,
            })
            .collect(),
        Value::Object(m) => vec![m],
        _ => Vec::new(),
    }
}

/// Answers SELECTs from scripted rows keyed by exact SQL (empty otherwise), numbers
/// INSERTs from an incrementing counter and reports one affected row for UPDATE/DELETE.
#[derive(Default)]
pub struct MockDriver {
    pub statements: Vec<String>,
    pub transactions: Vec<&'static str>,
    responses: HashMap<String, Vec<Map<String, Value>>>,
    failures: HashMap<String, StorageError>,
    fail_begin: Option<StorageError>,
    last_id: i64,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, sql: &str, data: Value) -> Self {
        self.responses.insert(sql.to_string(), rows(data));
        self
    }

    pub fn fail(mut self, sql: &str, err: StorageError) -> Self {
        self.failures.insert(sql.to_string(), err);
        self
    }

    pub fn fail_begin(mut self, err: StorageError) -> Self {
        self.fail_begin = Some(err);
        self
    }

    pub fn starting_id(mut self, id: i64) -> Self {
        self.last_id = id;
        self
    }

    pub fn log(&self) -> Vec<&str> {
        self.statements.iter().map(String::as_str).collect()
    }
}

impl Naming for MockDriver {}

#[async_trait]
impl Driver for MockDriver {
    async fn execute(&mut self, query: &Query) -> Result<Outcome, StorageError> {
        self.statements.push(query.sql.clone());
        if let Some(err) = self.failures.get(&query.sql) {
            return Err(err.clone());
        }
        Ok(match query.kind {
            StatementKind::Select | StatementKind::Count => {
                Outcome::Rows(self.responses.get(&query.sql).cloned().unwrap_or_default())
            }
            StatementKind::Insert => {
                self.last_id += 1;
                Outcome::Affected {
                    rows: 1,
                    last_insert_id: Some(Value::from(self.last_id)),
                }
            }
            StatementKind::Update | StatementKind::Delete => Outcome::Affected {
                rows: 1,
                last_insert_id: None,
            },
        })
    }

    async fn begin(&mut self) -> Result<(), StorageError> {
        if let Some(err) = self.fail_begin.clone() {
            return Err(err);
        }
        self.transactions.push("BEGIN");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.transactions.push("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.transactions.push("ROLLBACK");
        Ok(())
    }
}
