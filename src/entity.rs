//! Entity records
//!
//! An entity is an open map of named fields. A handful of field names carry
//! meaning for the graph: `id`, the draft flag `unreleased`, and the lineage
//! bookkeeping written by the mutation engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque entity identifier (usually a UUID string)
pub type EntityId = String;

/// The reserved section every schema carries for retired entities
pub const DEPRECATED_SECTION: &str = "deprecated";

/// Suffix that marks a reference field
pub const REFERENCE_SUFFIX: &str = "_id";

pub const ID: &str = "id";
pub const UNRELEASED: &str = "unreleased";
pub const DIRTY: &str = "dirty";
pub const DELETED: &str = "deleted";
pub const REPLACES: &str = "replaces";
pub const REPLACED_BY: &str = "replacedBy";
pub const TYPES: &str = "types";

/// Generate a fresh collision-resistant id
pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

/// A schema-described record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value; only objects are entities
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// The entity's id, if it has a non-empty string id
    pub fn id(&self) -> Option<&str> {
        self.0
            .get(ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID.to_string(), Value::String(id.into()));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn flag(&self, field: &str) -> bool {
        self.0.get(field).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Drafts carry `unreleased: true`; absence or false means released
    pub fn is_unreleased(&self) -> bool {
        self.flag(UNRELEASED)
    }

    pub fn is_released(&self) -> bool {
        !self.is_unreleased()
    }

    pub fn is_dirty(&self) -> bool {
        self.flag(DIRTY)
    }

    pub fn is_deleted(&self) -> bool {
        self.flag(DELETED)
    }

    /// String items of a list field (missing or non-list fields are empty)
    pub fn string_list(&self, field: &str) -> Vec<&str> {
        self.0
            .get(field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn replaced_by(&self) -> Vec<&str> {
        self.string_list(REPLACED_BY)
    }

    pub fn replaces(&self) -> Vec<&str> {
        self.string_list(REPLACES)
    }

    pub fn types(&self) -> Vec<&str> {
        self.string_list(TYPES)
    }

    /// Edit the list held by `field`, creating it first. A single value
    /// already there becomes the first item.
    pub(crate) fn update_list(&mut self, field: &str, edit: impl FnOnce(&mut Vec<Value>)) {
        let mut items = match self.0.remove(field) {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(single) => vec![single],
        };
        edit(&mut items);
        self.0.insert(field.to_string(), Value::Array(items));
    }

    pub(crate) fn ensure_list(&mut self, field: &str) {
        self.update_list(field, |_| {});
    }

    pub(crate) fn push_to_list(&mut self, field: &str, value: &str) {
        self.update_list(field, |items| items.push(Value::String(value.to_string())));
    }

    pub(crate) fn push_unique_to_list(&mut self, field: &str, value: &str) {
        self.update_list(field, |items| {
            if !items.iter().any(|v| v.as_str() == Some(value)) {
                items.push(Value::String(value.to_string()));
            }
        });
    }

    /// Drop lineage bookkeeping so a forked clone starts a fresh history
    pub(crate) fn clear_lineage(&mut self) {
        for field in [DIRTY, DELETED, REPLACES, REPLACED_BY, TYPES] {
            self.0.remove(field);
        }
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Ids held by a reference field value: a single id or a list of ids
pub(crate) fn reference_ids(value: &Value) -> Vec<&str> {
    match value {
        Value::String(id) => vec![id.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Short name for a JSON value's shape, used in error messages
pub(crate) fn shape_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "missing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_released_by_default() {
        let entity = Entity::new().with(ID, "a");
        assert!(entity.is_released());
        assert!(!entity.is_dirty());

        let draft = entity.with(UNRELEASED, true);
        assert!(draft.is_unreleased());
    }

    #[test]
    fn test_empty_id_is_missing() {
        let entity = Entity::new().with(ID, "");
        assert_eq!(entity.id(), None);
        let entity = Entity::new().with(ID, 42);
        assert_eq!(entity.id(), None);
    }

    #[test]
    fn test_push_unique_to_list() {
        let mut entity = Entity::new();
        entity.push_unique_to_list(TYPES, "goal");
        entity.push_unique_to_list(TYPES, "goal");
        entity.push_unique_to_list(TYPES, "level");
        assert_eq!(entity.types(), vec!["goal", "level"]);
    }

    #[test]
    fn test_list_keeps_existing_scalar() {
        let mut entity = Entity::new().with(REPLACED_BY, "x").with(REPLACES, "w");
        entity.push_to_list(REPLACED_BY, "y");
        entity.ensure_list(REPLACES);
        assert_eq!(entity.replaced_by(), vec!["x", "y"]);
        assert_eq!(entity.replaces(), vec!["w"]);

        let mut empty = Entity::new().with(TYPES, Value::Null);
        empty.push_unique_to_list(TYPES, "goal");
        assert_eq!(empty.types(), vec!["goal"]);
    }

    #[test]
    fn test_reference_ids() {
        assert_eq!(reference_ids(&json!("a")), vec!["a"]);
        assert_eq!(reference_ids(&json!(["a", "b"])), vec!["a", "b"]);
        assert!(reference_ids(&json!(3)).is_empty());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let entity = Entity::new().with(ID, "a").with("title", "Reading");
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value, json!({"id": "a", "title": "Reading"}));
    }
}
