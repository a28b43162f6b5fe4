//! One row of a resource plus the relation subtrees loaded or filled into it.
//!
//! A [`Model`] owns its field map and its related sub-models exclusively. Storage is
//! reached through a [`Driver`] passed into every call; statements are awaited one after
//! another, parents before children on writes and children before parents on deletes.

use crate::clock::{self, Clock};
use crate::config::{KeyType, RelationGraph, RelationKind, ResolvedResource};
use crate::error::AppError;
use crate::locator::Identifier;
use crate::sql::{self, Driver, Envelope, Filter, Query, QueryRunner, StorageError, StorageErrorKind};
use futures_util::future::BoxFuture;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Loaded or filled content of one relation.
#[derive(Clone, Debug)]
pub enum Related {
    One(Box<Model>),
    Many(Vec<Model>),
    /// Nothing matched, or the caller sent `null`.
    Empty,
}

impl Related {
    pub fn to_json(&self) -> Value {
        match self {
            Related::One(m) => m.to_json(),
            Related::Many(items) => Value::Array(items.iter().map(Model::to_json).collect()),
            Related::Empty => Value::Null,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Model {
    graph: Arc<RelationGraph>,
    resource: String,
    fields: Map<String, Value>,
    /// Fields set since the row was read or last written; an UPDATE sets only these.
    changed: IndexSet<String>,
    relations: IndexMap<String, Related>,
    deleted: bool,
}

fn resource_in<'g>(graph: &'g RelationGraph, name: &str) -> Result<&'g ResolvedResource, AppError> {
    graph
        .resource(name)
        .ok_or_else(|| AppError::NotFound(format!("resource '{}'", name)))
}

async fn run(driver: &mut dyn Driver, query: Query) -> Result<Envelope, AppError> {
    Ok(QueryRunner::exec(driver, &query).await.into_result()?)
}

fn into_rows(data: Value) -> Vec<Map<String, Value>> {
    match data {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(m) => Some(m),
                _ => None,
            })
            .collect(),
        Value::Object(m) => vec![m],
        _ => Vec::new(),
    }
}

async fn clear_pivot(driver: &mut dyn Driver, pivot: &str, column: &str, key: &Value) -> Result<(), AppError> {
    let q = sql::delete(&*driver, pivot, &[Filter::eq(column, key.clone())]);
    run(driver, q).await?;
    Ok(())
}

impl Model {
    /// Empty model of `resource`. Fails when the graph does not declare it.
    pub fn new(graph: Arc<RelationGraph>, resource: &str) -> Result<Self, AppError> {
        resource_in(&graph, resource)?;
        Ok(Model {
            graph,
            resource: resource.to_string(),
            fields: Map::new(),
            changed: IndexSet::new(),
            relations: IndexMap::new(),
            deleted: false,
        })
    }

    fn from_row(graph: &Arc<RelationGraph>, resource: &str, row: Map<String, Value>) -> Self {
        Model {
            graph: Arc::clone(graph),
            resource: resource.to_string(),
            fields: row,
            changed: IndexSet::new(),
            relations: IndexMap::new(),
            deleted: false,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Pin the primary key. The key is never part of an UPDATE column list.
    pub fn set_key(&mut self, value: Value) {
        let pk = self.primary_key().to_string();
        self.fields.insert(pk, value);
    }

    fn assign(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
        self.changed.insert(name.to_string());
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn primary_key(&self) -> &str {
        self.graph
            .resource(&self.resource)
            .map(|r| r.primary_key.as_str())
            .unwrap_or("id")
    }

    /// Non-null value of `name`.
    fn value(&self, name: &str) -> Option<Value> {
        self.fields.get(name).filter(|v| !v.is_null()).cloned()
    }

    /// Primary-key value, if set.
    pub fn key(&self) -> Option<Value> {
        self.value(self.primary_key())
    }

    pub fn identifier(&self) -> Option<Identifier> {
        self.key().as_ref().and_then(Identifier::from_value)
    }

    fn has_key(&self) -> bool {
        self.key().is_some()
    }

    /// Has fields other than its key set since it was read.
    fn has_payload(&self) -> bool {
        let pk = self.primary_key();
        self.changed.iter().any(|k| k != pk)
    }

    fn require_key(&self) -> Result<Value, AppError> {
        self.key()
            .ok_or_else(|| AppError::Validation(format!("{} has no primary key", self.resource)))
    }

    fn ensure_writable(&self) -> Result<(), AppError> {
        if self.deleted {
            return Err(AppError::Validation(format!(
                "{} was deleted and can no longer be written",
                self.resource
            )));
        }
        Ok(())
    }

    /// Fields that go into an INSERT/UPDATE column list, in field-map order.
    fn writable(&self, res: &ResolvedResource, with_key: bool) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(k, _)| res.is_writable(k) && (with_key || **k != res.primary_key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// JSON view: fields minus hidden ones, then every loaded or filled relation.
    pub fn to_json(&self) -> Value {
        let hidden = self.graph.resource(&self.resource).map(|r| &r.hidden);
        let mut out: Map<String, Value> = self
            .fields
            .iter()
            .filter(|(k, _)| !hidden.map(|h| h.contains(k.as_str())).unwrap_or(false))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, related) in &self.relations {
            out.insert(name.clone(), related.to_json());
        }
        Value::Object(out)
    }

    /// Merge caller JSON. Keys naming a relation become sub-models; all others are fields.
    pub fn fill(&mut self, data: &Value) -> Result<(), AppError> {
        self.ensure_writable()?;
        let obj = data
            .as_object()
            .ok_or_else(|| AppError::Validation(format!("{} payload must be a JSON object", self.resource)))?;
        let graph = Arc::clone(&self.graph);
        let res = resource_in(&graph, &self.resource)?;

        for (key, value) in obj {
            let Some(rel) = res.relation(key) else {
                self.assign(key, value.clone());
                continue;
            };
            let filled = match (&rel.kind, value) {
                (RelationKind::BelongsTo, Value::Null) => {
                    self.assign(&rel.local_key, Value::Null);
                    Related::Empty
                }
                (_, Value::Null) => Related::Empty,
                (RelationKind::BelongsTo, Value::Object(_)) => {
                    if let Some(Related::One(existing)) = self.relations.get_mut(key) {
                        existing.fill(value)?;
                        continue;
                    }
                    let mut parent = Model::new(Arc::clone(&graph), &rel.related)?;
                    parent.fill(value)?;
                    Related::One(Box::new(parent))
                }
                (RelationKind::HasMany | RelationKind::BelongsToMany { .. }, Value::Array(items)) => {
                    let children = items
                        .iter()
                        .map(|item| {
                            let mut child = Model::new(Arc::clone(&graph), &rel.related)?;
                            child.fill(item)?;
                            Ok(child)
                        })
                        .collect::<Result<Vec<_>, AppError>>()?;
                    Related::Many(children)
                }
                _ => {
                    return Err(AppError::Validation(format!(
                        "relation '{}' of {} has the wrong shape",
                        key, self.resource
                    )))
                }
            };
            self.relations.insert(key.clone(), filled);
        }
        Ok(())
    }

    /// Replace the field map with the row whose primary key is `id`. `false` when none matches.
    pub async fn get(&mut self, driver: &mut dyn Driver, id: &Identifier) -> Result<bool, AppError> {
        let graph = Arc::clone(&self.graph);
        let res = resource_in(&graph, &self.resource)?;
        let q = sql::select_one(&*driver, &res.table, &[Filter::eq(&res.primary_key, id.to_value())]);
        match run(driver, q).await?.data {
            Value::Object(row) => {
                self.fields = row;
                self.changed.clear();
                self.relations.clear();
                self.deleted = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Load the named relations, in order. Unknown names are logged and skipped.
    pub async fn load(&mut self, driver: &mut dyn Driver, names: &[String]) -> Result<(), AppError> {
        let graph = Arc::clone(&self.graph);
        let res = resource_in(&graph, &self.resource)?;
        let key = self.require_key()?;

        for name in names {
            let Some(rel) = res.relation(name) else {
                tracing::warn!(resource = %self.resource, relation = %name, "unknown relation, skipped");
                continue;
            };
            let related = resource_in(&graph, &rel.related)?;
            let loaded = match &rel.kind {
                RelationKind::BelongsTo => match self.value(&rel.local_key) {
                    None => Related::Empty,
                    Some(v) => {
                        let q = sql::select_one(&*driver, &related.table, &[Filter::eq(&rel.foreign_key, v)]);
                        match run(driver, q).await?.data {
                            Value::Object(row) => Related::One(Box::new(Model::from_row(&graph, &rel.related, row))),
                            _ => Related::Empty,
                        }
                    }
                },
                RelationKind::HasMany => match self.value(&rel.local_key) {
                    None => Related::Many(Vec::new()),
                    Some(v) => {
                        let q = sql::select_many(&*driver, &related.table, &[Filter::eq(&rel.foreign_key, v)], None, None);
                        let rows = into_rows(run(driver, q).await?.data);
                        Related::Many(rows.into_iter().map(|r| Model::from_row(&graph, &rel.related, r)).collect())
                    }
                },
                RelationKind::BelongsToMany { pivot } => {
                    let q = sql::select_many(&*driver, pivot, &[Filter::eq(&rel.local_key, key.clone())], None, None);
                    let ids: Vec<Value> = into_rows(run(driver, q).await?.data)
                        .iter()
                        .filter_map(|link| link.get(&rel.foreign_key).filter(|v| !v.is_null()).cloned())
                        .collect();
                    if ids.is_empty() {
                        Related::Many(Vec::new())
                    } else {
                        let filter = Filter::In(related.primary_key.clone(), ids);
                        let q = sql::select_many(&*driver, &related.table, &[filter], None, None);
                        let rows = into_rows(run(driver, q).await?.data);
                        Related::Many(rows.into_iter().map(|r| Model::from_row(&graph, &rel.related, r)).collect())
                    }
                }
            };
            self.relations.insert(name.clone(), loaded);
        }
        Ok(())
    }

    /// Persist BelongsTo sub-models and copy their keys into this row.
    /// On insert an already-keyed parent is only rewritten when the relation is owned.
    async fn write_parents(
        &mut self,
        res: &ResolvedResource,
        driver: &mut dyn Driver,
        clock: &dyn Clock,
        inserting: bool,
    ) -> Result<(), AppError> {
        for rel in res.relations.values().filter(|r| r.is_belongs_to()) {
            let Some(Related::One(parent)) = self.relations.get_mut(&rel.name) else {
                continue;
            };
            if !parent.has_key() {
                parent.insert(&mut *driver, clock).await?;
            } else if parent.has_payload() && (rel.owned || !inserting) {
                parent.update(&mut *driver, clock).await?;
            }
            let linked = parent.fields.get(&rel.foreign_key).cloned().unwrap_or(Value::Null);
            self.assign(&rel.local_key, linked);
        }
        Ok(())
    }

    /// Persist HasMany and BelongsToMany sub-models after this row has a key.
    /// `replacing` is the update path: keyed children are updated and pivot rows re-synced.
    async fn write_children(
        &mut self,
        res: &ResolvedResource,
        driver: &mut dyn Driver,
        clock: &dyn Clock,
        replacing: bool,
    ) -> Result<(), AppError> {
        let key = self.require_key()?;
        for rel in res.relations.values() {
            match &rel.kind {
                RelationKind::BelongsTo => {}
                RelationKind::HasMany => {
                    let parent_value = self.fields.get(&rel.local_key).cloned().unwrap_or(Value::Null);
                    let Some(Related::Many(children)) = self.relations.get_mut(&rel.name) else {
                        continue;
                    };
                    for child in children.iter_mut() {
                        child.assign(&rel.foreign_key, parent_value.clone());
                        if replacing && child.has_key() {
                            child.update(&mut *driver, clock).await?;
                        } else {
                            child.insert(&mut *driver, clock).await?;
                        }
                    }
                }
                RelationKind::BelongsToMany { pivot } => {
                    let children = match self.relations.get_mut(&rel.name) {
                        Some(Related::Many(children)) => children,
                        Some(Related::Empty) if replacing => {
                            clear_pivot(driver, pivot, &rel.local_key, &key).await?;
                            continue;
                        }
                        _ => continue,
                    };
                    if replacing {
                        clear_pivot(driver, pivot, &rel.local_key, &key).await?;
                    }
                    for child in children.iter_mut() {
                        if !child.has_key() {
                            child.insert(&mut *driver, clock).await?;
                        }
                        let mut link = Map::new();
                        link.insert(rel.local_key.clone(), key.clone());
                        link.insert(rel.foreign_key.clone(), child.require_key()?);
                        let q = sql::insert(&*driver, pivot, &link, None);
                        run(driver, q).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Insert this row and cascade: BelongsTo parents first, then HasMany children,
    /// then BelongsToMany elements with their pivot rows.
    pub fn insert<'a>(
        &'a mut self,
        driver: &'a mut dyn Driver,
        clock: &'a dyn Clock,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            self.ensure_writable()?;
            let graph = Arc::clone(&self.graph);
            let res = resource_in(&graph, &self.resource)?;
            tracing::debug!(resource = %self.resource, "insert");

            if res.key_type == KeyType::Uuid && !self.has_key() {
                let id = Value::String(uuid::Uuid::new_v4().to_string());
                self.fields.insert(res.primary_key.clone(), id);
            }

            self.write_parents(res, driver, clock, true).await?;

            let now = Value::String(clock::format(&clock.now()));
            for field in [&res.created_at, &res.updated_at].into_iter().flatten() {
                self.assign(field, now.clone());
            }

            let generated = res.key_type == KeyType::Integer;
            let row = self.writable(res, !generated);
            let returning = generated.then_some(res.primary_key.as_str());
            let q = sql::insert(&*driver, &res.table, &row, returning);
            let env = run(driver, q).await?;
            if generated {
                let id = env.last_insert_id.filter(|v| !v.is_null()).ok_or_else(|| {
                    StorageError::new(
                        StorageErrorKind::Unknown,
                        "no_insert_id",
                        format!("insert into {} returned no key", res.table),
                    )
                })?;
                self.fields.insert(res.primary_key.clone(), id);
            }
            self.changed.clear();

            self.write_children(res, driver, clock, false).await
        })
    }

    /// Update this row by primary key and cascade over filled or loaded relations.
    /// Only changed fields are written. Children missing from a HasMany list are left in place.
    pub fn update<'a>(
        &'a mut self,
        driver: &'a mut dyn Driver,
        clock: &'a dyn Clock,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            self.ensure_writable()?;
            let graph = Arc::clone(&self.graph);
            let res = resource_in(&graph, &self.resource)?;
            let key = self.require_key()?;
            tracing::debug!(resource = %self.resource, key = %key, "update");

            self.write_parents(res, driver, clock, false).await?;

            if let Some(field) = &res.updated_at {
                self.assign(field, Value::String(clock::format(&clock.now())));
            }

            let row: Map<String, Value> = self
                .writable(res, false)
                .into_iter()
                .filter(|(k, _)| self.changed.contains(k))
                .collect();
            if row.is_empty() {
                tracing::debug!(resource = %self.resource, "nothing to update");
            } else {
                let q = sql::update(&*driver, &res.table, &row, &res.primary_key, &key);
                run(driver, q).await?;
            }
            self.changed.clear();

            self.write_children(res, driver, clock, true).await
        })
    }

    /// Delete this row: loaded HasMany children, then loaded pivot links, then the row,
    /// then owned BelongsTo parents. The model stays readable afterwards.
    pub fn delete<'a>(&'a mut self, driver: &'a mut dyn Driver) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            self.ensure_writable()?;
            let graph = Arc::clone(&self.graph);
            let res = resource_in(&graph, &self.resource)?;
            let key = self.require_key()?;
            tracing::debug!(resource = %self.resource, key = %key, "delete");

            for rel in res.relations.values() {
                if rel.kind != RelationKind::HasMany {
                    continue;
                }
                if let Some(Related::Many(children)) = self.relations.get_mut(&rel.name) {
                    for child in children.iter_mut() {
                        child.delete(&mut *driver).await?;
                    }
                }
            }

            for rel in res.relations.values() {
                if let (Some(pivot), Some(Related::Many(_))) = (rel.pivot(), self.relations.get(&rel.name)) {
                    clear_pivot(driver, pivot, &rel.local_key, &key).await?;
                }
            }

            let q = sql::delete(&*driver, &res.table, &[Filter::eq(&res.primary_key, key)]);
            run(driver, q).await?;

            for rel in res.relations.values().filter(|r| r.is_belongs_to() && r.owned) {
                if let Some(Related::One(parent)) = self.relations.get_mut(&rel.name) {
                    if parent.has_key() {
                        parent.delete(&mut *driver).await?;
                    }
                }
            }

            self.deleted = true;
            Ok::<_, AppError>(())
        })
    }

    /// One page of rows of `resource`, in storage order.
    pub async fn list(
        graph: &Arc<RelationGraph>,
        resource: &str,
        driver: &mut dyn Driver,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Model>, AppError> {
        let res = resource_in(graph, resource)?;
        let q = sql::select_many(&*driver, &res.table, &[], limit, offset);
        let rows = into_rows(run(driver, q).await?.data);
        Ok(rows.into_iter().map(|r| Model::from_row(graph, resource, r)).collect())
    }

    pub async fn count(graph: &RelationGraph, resource: &str, driver: &mut dyn Driver) -> Result<u64, AppError> {
        let res = resource_in(graph, resource)?;
        let q = sql::count(&*driver, &res.table, &[]);
        let env = run(driver, q).await?;
        let total = match env.data.get("count") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        Ok(total.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_from_str, resolve};
    use serde_json::json;

    fn graph() -> Arc<RelationGraph> {
        let config = load_from_str(
            r#"{"resources": {
                "stocks": {"table": "Stocks", "relations": {"product": {"type": "belongs_to", "resource": "products"}}},
                "products": {"table": "Products", "hidden": ["cost"]}
            }}"#,
        )
        .unwrap();
        Arc::new(resolve(&config).unwrap())
    }

    #[test]
    fn fill_splits_fields_and_relations() {
        let mut stock = Model::new(graph(), "stocks").unwrap();
        stock
            .fill(&json!({"quantity": 3, "product": {"name": "Pen", "cost": 2}}))
            .unwrap();
        assert_eq!(stock.field("quantity"), Some(&json!(3)));
        assert!(stock.field("product").is_none());
        assert!(matches!(stock.relation("product"), Some(Related::One(_))));
        assert_eq!(
            stock.to_json(),
            json!({"quantity": 3, "product": {"name": "Pen"}})
        );
    }

    #[test]
    fn fill_merges_into_existing_parent() {
        let mut stock = Model::new(graph(), "stocks").unwrap();
        stock.fill(&json!({"product": {"name": "Pen"}})).unwrap();
        stock.fill(&json!({"product": {"price": 1.5}})).unwrap();
        assert_eq!(stock.to_json()["product"], json!({"name": "Pen", "price": 1.5}));

        stock.fill(&json!({"product": null})).unwrap();
        assert_eq!(stock.to_json()["product"], Value::Null);
    }

    #[test]
    fn fill_rejects_wrong_shapes() {
        let mut stock = Model::new(graph(), "stocks").unwrap();
        assert!(matches!(stock.fill(&json!([1])), Err(AppError::Validation(_))));
        assert!(matches!(stock.fill(&json!({"product": [1]})), Err(AppError::Validation(_))));
    }

    #[test]
    fn unknown_resource_is_not_found() {
        assert!(matches!(Model::new(graph(), "ghosts"), Err(AppError::NotFound(_))));
    }
}
