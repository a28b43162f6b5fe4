//! Load resource declarations from JSON and resolve them into a [`RelationGraph`].

use crate::case::key_column_for;
use crate::config::resolved::{Relation, RelationGraph, RelationKind, ResolvedResource};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::path::Path;

/// Build the relation graph from config (validates first).
pub fn resolve(config: &FullConfig) -> Result<RelationGraph, ConfigError> {
    validate(config)?;

    let table_of = |name: &str, res: &ResourceConfig| res.table.clone().unwrap_or_else(|| name.to_string());
    let local_key_of = |name: &str, res: &ResourceConfig| {
        res.local_key
            .clone()
            .unwrap_or_else(|| key_column_for(&table_of(name, res)))
    };

    let mut resources = IndexMap::with_capacity(config.resources.len());
    for (name, res) in &config.resources {
        let table = table_of(name, res);
        let local_key = local_key_of(name, res);
        let (created_at, updated_at) = res
            .timestamps
            .as_ref()
            .map(TimestampsConfig::fields)
            .unwrap_or((None, None));

        let mut relations = IndexMap::with_capacity(res.relations.len());
        for (rel_name, rel) in &res.relations {
            let related = config
                .resources
                .get(&rel.resource)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "resource",
                    id: rel.resource.clone(),
                })?;
            let related_local_key = local_key_of(&rel.resource, related);
            let (kind, default_local, default_foreign) = match rel.type_ {
                RelationType::BelongsTo => (
                    RelationKind::BelongsTo,
                    related_local_key,
                    related.primary_key.clone(),
                ),
                RelationType::HasMany => (
                    RelationKind::HasMany,
                    res.primary_key.clone(),
                    local_key.clone(),
                ),
                RelationType::BelongsToMany => (
                    RelationKind::BelongsToMany {
                        pivot: rel.pivot.clone().unwrap_or_default(),
                    },
                    local_key.clone(),
                    related_local_key,
                ),
            };
            relations.insert(
                rel_name.clone(),
                Relation {
                    name: rel_name.clone(),
                    kind,
                    related: rel.resource.clone(),
                    local_key: rel.local_key.clone().unwrap_or(default_local),
                    foreign_key: rel.foreign_key.clone().unwrap_or(default_foreign),
                    owned: rel.owned,
                },
            );
        }

        resources.insert(
            name.clone(),
            ResolvedResource {
                name: name.clone(),
                table,
                primary_key: res.primary_key.clone(),
                key_type: res.key_type,
                local_key,
                fields: res.fields.clone(),
                hidden: res.hidden.iter().cloned().collect(),
                created_at,
                updated_at,
                relations,
            },
        );
    }

    Ok(RelationGraph { resources })
}

pub fn load_from_str(text: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read the config document from a JSON file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading resource config");
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    load_from_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"{
        "resources": {
            "products": {
                "table": "Products",
                "hidden": ["category_id"],
                "timestamps": true,
                "relations": {
                    "category": {"type": "belongs_to", "resource": "categories"},
                    "sales": {"type": "belongs_to_many", "resource": "sales", "pivot": "SaleItems"}
                }
            },
            "categories": {
                "table": "Categories",
                "relations": {"products": {"type": "has_many", "resource": "products"}}
            },
            "sales": {"table": "Sales", "timestamps": {"created_at": "sold_at"}}
        }
    }"#;

    #[test]
    fn fills_in_default_keys() {
        let graph = resolve(&load_from_str(STORE).unwrap()).unwrap();
        let products = graph.resource("products").unwrap();
        assert_eq!(products.local_key, "product_id");
        assert_eq!(products.created_at.as_deref(), Some("created_at"));
        assert!(products.hidden.contains("category_id"));

        let category = products.relation("category").unwrap();
        assert_eq!(category.kind, RelationKind::BelongsTo);
        assert_eq!(category.local_key, "category_id");
        assert_eq!(category.foreign_key, "id");

        let sales = products.relation("sales").unwrap();
        assert_eq!(sales.pivot(), Some("SaleItems"));
        assert_eq!(sales.local_key, "product_id");
        assert_eq!(sales.foreign_key, "sale_id");

        let has_many = graph.relation("categories", "products").unwrap();
        assert_eq!(has_many.local_key, "id");
        assert_eq!(has_many.foreign_key, "category_id");
    }

    #[test]
    fn partial_timestamps_and_declaration_order() {
        let graph = resolve(&load_from_str(STORE).unwrap()).unwrap();
        let sales = graph.resource("sales").unwrap();
        assert_eq!(sales.created_at.as_deref(), Some("sold_at"));
        assert_eq!(sales.updated_at, None);
        assert_eq!(
            graph.resource("products").unwrap().relation_names(),
            vec!["category".to_string(), "sales".to_string()]
        );
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        assert!(matches!(load_from_str("{"), Err(ConfigError::Load(_))));
    }
}
