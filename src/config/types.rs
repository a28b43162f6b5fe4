//! Raw resource declarations as they appear in the JSON config document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Shape of a resource's primary key. Decides how path identifiers and generated keys are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    #[default]
    Integer,
    Uuid,
}

/// `true` enables `created_at`/`updated_at`; an object names the fields explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampsConfig {
    Enabled(bool),
    Fields {
        #[serde(default)]
        created_at: Option<String>,
        #[serde(default)]
        updated_at: Option<String>,
    },
}

impl TimestampsConfig {
    /// (created field, updated field).
    pub fn fields(&self) -> (Option<String>, Option<String>) {
        match self {
            TimestampsConfig::Enabled(true) => (Some("created_at".into()), Some("updated_at".into())),
            TimestampsConfig::Enabled(false) => (None, None),
            TimestampsConfig::Fields {
                created_at,
                updated_at,
            } => (created_at.clone(), updated_at.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    BelongsTo,
    HasMany,
    BelongsToMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    #[serde(rename = "type")]
    pub type_: RelationType,
    /// Name of the related resource.
    pub resource: String,
    #[serde(default)]
    pub local_key: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Link table; required for belongs_to_many only.
    #[serde(default)]
    pub pivot: Option<String>,
    /// The related rows are written and deleted together with this row.
    #[serde(default)]
    pub owned: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Physical table; defaults to the resource name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub key_type: KeyType,
    /// Column name other tables use to reference this one; defaults to `<singular table>_id`.
    #[serde(default)]
    pub local_key: Option<String>,
    /// Writable fields. Empty means every non-relation key of the payload is written.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Fields never exposed in responses.
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default)]
    pub timestamps: Option<TimestampsConfig>,
    #[serde(default)]
    pub relations: IndexMap<String, RelationConfig>,
}

fn default_primary_key() -> String {
    "id".into()
}

/// The whole config document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub resources: IndexMap<String, ResourceConfig>,
}
