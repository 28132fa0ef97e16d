//! The annotation-server seam.
//!
//! Everything tatorsync needs from the remote server goes through the
//! [`AnnotationApi`] trait. [`client::TatorClient`] implements it over Tator's
//! REST API; tests substitute an in-memory implementation.

pub mod client;
mod records;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::TatorError;

pub use records::{
    Localization, LocalizationQuery, LocalizationSpec, State, StateQuery, StateSpec,
};

/// The kinds of catalog entities that can be looked up by name or ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Project,
    Media,
    MediaType,
    Version,
    LocalizationType,
    StateType,
    LeafType,
    Leaf,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Project,
        EntityKind::Media,
        EntityKind::MediaType,
        EntityKind::Version,
        EntityKind::LocalizationType,
        EntityKind::StateType,
        EntityKind::LeafType,
        EntityKind::Leaf,
        EntityKind::User,
    ];

    /// Human-readable kind name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Project => "Project",
            EntityKind::Media => "Media",
            EntityKind::MediaType => "MediaType",
            EntityKind::Version => "Version",
            EntityKind::LocalizationType => "LocalizationType",
            EntityKind::StateType => "StateType",
            EntityKind::LeafType => "LeafType",
            EntityKind::Leaf => "Leaf",
            EntityKind::User => "User",
        }
    }

    /// Whether name lookups of this kind are disambiguated by a project.
    pub fn is_scoped(self) -> bool {
        !matches!(self, EntityKind::Project | EntityKind::User)
    }

    /// The display name of an entity of this kind.
    pub fn name_of(self, entity: &Entity) -> Option<&str> {
        match self {
            EntityKind::User => entity.username.as_deref(),
            _ => entity.name.as_deref(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A remote catalog record (project, media, version, ...).
///
/// Only the fields the resolver needs are typed; everything else the server
/// sends is kept in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Map::is_empty"
    )]
    pub attributes: Map<String, Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates a bare entity with an ID and a name.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            path: None,
            username: None,
            attributes: Map::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Looks up a field by name: typed fields first, then user attributes,
    /// then any other server field. Values are rendered as plain strings.
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "name" => self.name.clone(),
            "path" => self.path.clone(),
            "username" => self.username.clone(),
            _ => self
                .attributes
                .get(key)
                .or_else(|| self.extra.get(key))
                .and_then(value_to_string),
        }
    }

    /// The name, or an empty string for unnamed records.
    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Returns a string-valued user attribute.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Renders a scalar JSON value as CSV-friendly text.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        other => Some(other.to_string()),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Server-side narrowing for entity listings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Exact name (or username) filter, where the endpoint supports one.
    pub name: Option<String>,
    /// Media dtype filter ("video", "image", ...), media listings only.
    pub media_dtype: Option<String>,
}

/// Body of an entity create request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Synchronous access to an annotation server.
pub trait AnnotationApi {
    /// Lists the entities of `kind` in `scope` (a project ID for scoped kinds).
    fn list_entities(
        &self,
        kind: EntityKind,
        scope: Option<u64>,
        filter: &ListFilter,
    ) -> Result<Vec<Entity>, TatorError>;

    fn get_entity(&self, kind: EntityKind, id: u64) -> Result<Entity, TatorError>;

    /// Creates an entity in `scope` and returns its new ID.
    fn create_entity(
        &self,
        kind: EntityKind,
        scope: u64,
        spec: &NewEntity,
    ) -> Result<u64, TatorError>;

    fn list_localizations(
        &self,
        project: u64,
        query: &LocalizationQuery,
    ) -> Result<Vec<Localization>, TatorError>;

    fn create_localizations(
        &self,
        project: u64,
        specs: &[LocalizationSpec],
    ) -> Result<Vec<u64>, TatorError>;

    fn list_states(&self, project: u64, query: &StateQuery) -> Result<Vec<State>, TatorError>;

    fn create_states(&self, project: u64, specs: &[StateSpec]) -> Result<Vec<u64>, TatorError>;

    /// Fetches a single video frame as PNG bytes.
    fn get_frame(&self, media: u64, frame: u64) -> Result<Vec<u8>, TatorError>;

    /// Fetches the cropped image of a localization as PNG bytes.
    fn get_localization_graphic(&self, id: u64) -> Result<Vec<u8>, TatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_deserializes_with_extra_fields() {
        let entity: Entity = serde_json::from_str(
            r#"{"id": 7, "name": "clip.mp4", "attributes": {"tiff_dir": "/data"}, "fps": 15}"#,
        )
        .expect("parse entity");

        assert_eq!(entity.id, 7);
        assert_eq!(entity.name.as_deref(), Some("clip.mp4"));
        assert_eq!(entity.attribute_str("tiff_dir"), Some("/data"));
        assert_eq!(entity.field("fps").as_deref(), Some("15"));
    }

    #[test]
    fn entity_accepts_null_attributes() {
        let entity: Entity =
            serde_json::from_str(r#"{"id": 1, "username": "ann", "attributes": null}"#)
                .expect("parse entity");
        assert!(entity.attributes.is_empty());
        assert_eq!(EntityKind::User.name_of(&entity), Some("ann"));
        assert_eq!(EntityKind::Project.name_of(&entity), None);
    }

    #[test]
    fn only_project_and_user_are_global() {
        let global: Vec<_> = EntityKind::ALL
            .iter()
            .filter(|kind| !kind.is_scoped())
            .collect();
        assert_eq!(global, vec![&EntityKind::Project, &EntityKind::User]);
    }
}
