//! Builds SELECT, COUNT, INSERT, UPDATE, DELETE text from a table name and an ordered field map.
//! Values are rendered as SQL literals; table and column names go through the driver's [`Naming`].

use crate::sql::Naming;
use serde_json::{Map, Value};

/// What a statement does; drivers use it to pick a fetch strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

/// One statement, built once and executed once.
#[derive(Clone, Debug)]
pub struct Query {
    pub sql: String,
    pub kind: StatementKind,
    /// `false`: only the first row is returned as `data`. `true`: all rows as a list.
    pub array: bool,
    /// Values rendered into `sql`, in order of appearance.
    pub params: Vec<Value>,
    /// Physical column holding the generated key, for inserts.
    pub returning: Option<String>,
}

impl Query {
    /// Raw statement, e.g. for ad-hoc queries. Kind is inferred from the leading keyword.
    pub fn raw(sql: impl Into<String>, array: bool) -> Self {
        let sql = sql.into();
        let head = sql.trim_start().to_ascii_uppercase();
        let kind = if head.starts_with("INSERT") {
            StatementKind::Insert
        } else if head.starts_with("UPDATE") {
            StatementKind::Update
        } else if head.starts_with("DELETE") {
            StatementKind::Delete
        } else {
            StatementKind::Select
        };
        Query {
            sql,
            kind,
            array,
            params: Vec::new(),
            returning: None,
        }
    }

    fn new(kind: StatementKind, array: bool) -> Self {
        Query {
            sql: String::new(),
            kind,
            array,
            params: Vec::new(),
            returning: None,
        }
    }

    fn push_value(&mut self, v: &Value) -> String {
        self.params.push(v.clone());
        format_value(v)
    }
}

/// WHERE condition on a logical field name.
#[derive(Clone, Debug)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(field: &str, value: Value) -> Self {
        Filter::Eq(field.to_string(), value)
    }
}

/// Quote identifier (embedded quotes doubled).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// SQL literal for a JSON value: strings single-quoted, numbers and booleans bare.
pub fn format_value(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_text(s),
        Value::Array(_) | Value::Object(_) => quote_text(&v.to_string()),
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn table<N: Naming + ?Sized>(naming: &N, name: &str) -> String {
    quoted(&naming.table_name(name))
}

fn column<N: Naming + ?Sized>(naming: &N, name: &str) -> String {
    quoted(&naming.column_name(name))
}

fn where_clause<N: Naming + ?Sized>(naming: &N, q: &mut Query, filters: &[Filter]) -> String {
    let mut parts = Vec::with_capacity(filters.len());
    for f in filters {
        match f {
            Filter::Eq(field, v) => {
                let lit = q.push_value(v);
                parts.push(format!("{} = {}", column(naming, field), lit));
            }
            Filter::In(field, values) => {
                let lits: Vec<String> = values.iter().map(|v| q.push_value(v)).collect();
                parts.push(format!("{} IN ({})", column(naming, field), lits.join(", ")));
            }
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// `SELECT * FROM "T" [WHERE …] LIMIT 1`, single-row intent.
pub fn select_one<N: Naming + ?Sized>(naming: &N, table_name: &str, filters: &[Filter]) -> Query {
    let mut q = Query::new(StatementKind::Select, false);
    let where_ = where_clause(naming, &mut q, filters);
    q.sql = format!("SELECT * FROM {}{} LIMIT 1", table(naming, table_name), where_);
    q
}

/// `SELECT * FROM "T" [WHERE …] [LIMIT n] [OFFSET m]`, array intent.
pub fn select_many<N: Naming + ?Sized>(
    naming: &N,
    table_name: &str,
    filters: &[Filter],
    limit: Option<u64>,
    offset: Option<u64>,
) -> Query {
    let mut q = Query::new(StatementKind::Select, true);
    let where_ = where_clause(naming, &mut q, filters);
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = offset
        .filter(|n| *n > 0)
        .map(|n| format!(" OFFSET {}", n))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT * FROM {}{}{}{}",
        table(naming, table_name),
        where_,
        limit_clause,
        offset_clause
    );
    q
}

/// `SELECT COUNT(*) AS "count" FROM "T" [WHERE …]`.
pub fn count<N: Naming + ?Sized>(naming: &N, table_name: &str, filters: &[Filter]) -> Query {
    let mut q = Query::new(StatementKind::Count, false);
    let where_ = where_clause(naming, &mut q, filters);
    q.sql = format!(
        "SELECT COUNT(*) AS {} FROM {}{}",
        quoted("count"),
        table(naming, table_name),
        where_
    );
    q
}

/// INSERT with columns in field-map order. `returning` names the generated-key field.
pub fn insert<N: Naming + ?Sized>(
    naming: &N,
    table_name: &str,
    fields: &Map<String, Value>,
    returning: Option<&str>,
) -> Query {
    let mut q = Query::new(StatementKind::Insert, false);
    let mut cols = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    for (name, v) in fields {
        cols.push(column(naming, name));
        values.push(q.push_value(v));
    }
    q.returning = returning.map(|r| naming.column_name(r));
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table(naming, table_name),
        cols.join(", "),
        values.join(", ")
    );
    q
}

/// UPDATE by primary key; the key itself never appears in SET.
pub fn update<N: Naming + ?Sized>(
    naming: &N,
    table_name: &str,
    fields: &Map<String, Value>,
    pk: &str,
    id: &Value,
) -> Query {
    let mut q = Query::new(StatementKind::Update, false);
    let mut sets = Vec::with_capacity(fields.len());
    for (name, v) in fields {
        if name == pk {
            continue;
        }
        let lit = q.push_value(v);
        sets.push(format!("{} = {}", column(naming, name), lit));
    }
    let id_lit = q.push_value(id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table(naming, table_name),
        sets.join(", "),
        column(naming, pk),
        id_lit
    );
    q
}

/// `DELETE FROM "T" WHERE …`.
pub fn delete<N: Naming + ?Sized>(naming: &N, table_name: &str, filters: &[Filter]) -> Query {
    let mut q = Query::new(StatementKind::Delete, false);
    let where_ = where_clause(naming, &mut q, filters);
    q.sql = format!("DELETE FROM {}{}", table(naming, table_name), where_);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::DefaultNaming;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn select_single_by_primary_key() {
        let q = select_one(&DefaultNaming, "Stocks", &[Filter::eq("id", json!(1))]);
        assert_eq!(q.sql, r#"SELECT * FROM "Stocks" WHERE "id" = 1 LIMIT 1"#);
        assert!(!q.array);
        assert_eq!(q.params, vec![json!(1)]);
    }

    #[test]
    fn select_many_with_in_filter_and_paging() {
        let q = select_many(
            &DefaultNaming,
            "Sales",
            &[Filter::In("id".into(), vec![json!(1), json!(2)])],
            Some(20),
            Some(40),
        );
        assert_eq!(q.sql, r#"SELECT * FROM "Sales" WHERE "id" IN (1, 2) LIMIT 20 OFFSET 40"#);
        assert!(q.array);
    }

    #[test]
    fn insert_keeps_field_order_and_quotes_strings() {
        let fields = map(json!({"name": "O'Neil", "price": 0.5, "active": true, "note": null}));
        let q = insert(&DefaultNaming, "Products", &fields, Some("id"));
        assert_eq!(
            q.sql,
            r#"INSERT INTO "Products" ("name", "price", "active", "note") VALUES ('O''Neil', 0.5, TRUE, NULL)"#
        );
        assert_eq!(q.returning.as_deref(), Some("id"));
        assert_eq!(q.kind, StatementKind::Insert);
    }

    #[test]
    fn update_skips_primary_key_in_set() {
        let fields = map(json!({"id": 3, "name": "Pear", "category_id": 1}));
        let q = update(&DefaultNaming, "Products", &fields, "id", &json!(3));
        assert_eq!(q.sql, r#"UPDATE "Products" SET "name" = 'Pear', "category_id" = 1 WHERE "id" = 3"#);
    }

    #[test]
    fn delete_and_count() {
        let q = delete(&DefaultNaming, "SaleItems", &[Filter::eq("sale_id", json!(7))]);
        assert_eq!(q.sql, r#"DELETE FROM "SaleItems" WHERE "sale_id" = 7"#);
        let q = count(&DefaultNaming, "Sales", &[]);
        assert_eq!(q.sql, r#"SELECT COUNT(*) AS "count" FROM "Sales""#);
    }

    struct Prefixed;

    impl Naming for Prefixed {
        fn table_name(&self, table: &str) -> String {
            format!("app_{}", table.to_lowercase())
        }
    }

    #[test]
    fn naming_hook_translates_tables() {
        let q = select_one(&Prefixed, "Stocks", &[]);
        assert_eq!(q.sql, r#"SELECT * FROM "app_stocks" LIMIT 1"#);
    }

    #[test]
    fn raw_infers_kind() {
        assert_eq!(Query::raw("delete from x", false).kind, StatementKind::Delete);
        assert_eq!(Query::raw("SELECT 1", true).kind, StatementKind::Select);
    }
}
