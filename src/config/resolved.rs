//! Resolved relation graph: config validated, defaults filled in, ready for runtime lookups.

use crate::config::KeyType;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Per-kind payload of a relation. The set is closed; callers match on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// This row holds `local_key` pointing at the related row's `foreign_key`.
    BelongsTo,
    /// Related rows hold `foreign_key` pointing at this row's `local_key`.
    HasMany,
    /// Rows of `pivot` link `local_key` (this row) to `foreign_key` (related row).
    BelongsToMany { pivot: String },
}

#[derive(Clone, Debug)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Related resource name (key into the graph).
    pub related: String,
    pub local_key: String,
    pub foreign_key: String,
    pub owned: bool,
}

impl Relation {
    pub fn is_belongs_to(&self) -> bool {
        matches!(self.kind, RelationKind::BelongsTo)
    }

    pub fn pivot(&self) -> Option<&str> {
        match &self.kind {
            RelationKind::BelongsToMany { pivot } => Some(pivot),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub key_type: KeyType,
    pub local_key: String,
    pub fields: Vec<String>,
    pub hidden: HashSet<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Declaration order is kept; it is the order of `?with_relations=true`.
    pub relations: IndexMap<String, Relation>,
}

impl ResolvedResource {
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.relations.keys().cloned().collect()
    }

    /// Route this resource is served under, e.g. "/stocks".
    pub fn endpoint(&self) -> String {
        format!("/{}", self.name)
    }

    /// Whether `field` may appear in an INSERT/UPDATE column list.
    pub fn is_writable(&self, field: &str) -> bool {
        if self.relations.contains_key(field) {
            return false;
        }
        if self.fields.is_empty() {
            return true;
        }
        self.fields.iter().any(|f| f == field)
            || field == self.primary_key
            || self.created_at.as_deref() == Some(field)
            || self.updated_at.as_deref() == Some(field)
            || self
                .relations
                .values()
                .any(|r| r.is_belongs_to() && r.local_key == field)
    }
}

/// Static map resource -> relations. Mutual references are allowed; traversal is always caller-driven.
#[derive(Clone, Debug, Default)]
pub struct RelationGraph {
    pub resources: IndexMap<String, ResolvedResource>,
}

impl RelationGraph {
    pub fn resource(&self, name: &str) -> Option<&ResolvedResource> {
        self.resources.get(name)
    }
}
