//! Config validation: referential integrity of relations and resource names.

use crate::config::{FullConfig, RelationType};
use crate::error::ConfigError;

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.resources.is_empty() {
        return Err(ConfigError::Validation("at least one resource required".into()));
    }

    for (name, res) in &config.resources {
        if name.is_empty() || name.contains('/') {
            return Err(ConfigError::Validation(format!("invalid resource name '{}'", name)));
        }
        if res.primary_key.is_empty() {
            return Err(ConfigError::InvalidPrimaryKey {
                resource: name.clone(),
                key: res.primary_key.clone(),
            });
        }
        if !res.fields.is_empty() && res.fields.iter().any(|f| res.relations.contains_key(f)) {
            return Err(ConfigError::Validation(format!(
                "resource '{}' declares a field with the same name as a relation",
                name
            )));
        }

        for (rel_name, rel) in &res.relations {
            let invalid = |reason: &str| ConfigError::InvalidRelation {
                resource: name.clone(),
                relation: rel_name.clone(),
                reason: reason.to_string(),
            };
            if !config.resources.contains_key(&rel.resource) {
                return Err(ConfigError::MissingReference {
                    kind: "resource",
                    id: rel.resource.clone(),
                });
            }
            match rel.type_ {
                RelationType::BelongsToMany => {
                    if rel.pivot.as_deref().map(str::is_empty).unwrap_or(true) {
                        return Err(invalid("belongs_to_many requires a pivot table"));
                    }
                }
                RelationType::BelongsTo | RelationType::HasMany => {
                    if rel.pivot.is_some() {
                        return Err(invalid("pivot is only valid on belongs_to_many"));
                    }
                }
            }
        }
    }

    Ok(())
}
