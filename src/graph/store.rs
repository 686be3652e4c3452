//! Entity store
//!
//! One arena keyed by id holds each entity together with its current
//! section, owning schema and deprecated flag, so the lookups can never
//! drift apart. Section lists (global and per schema) hold ids in
//! insertion order.

use std::collections::{BTreeMap, HashMap};

use crate::entity::{reference_ids, Entity, EntityId, DEPRECATED_SECTION, REFERENCE_SUFFIX};
use crate::error::{GraphError, Result};
use crate::schema::{ContextSchema, SectionDef};

/// An indexed entity and everything known about where it lives
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub entity: Entity,
    pub section: String,
    pub schema: String,
    pub deprecated: bool,
}

#[derive(Debug, Clone)]
struct SchemaSlot {
    definition: ContextSchema,
    sections: BTreeMap<String, Vec<EntityId>>,
}

impl SchemaSlot {
    fn new(definition: ContextSchema) -> Self {
        let sections = definition
            .section_names()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        Self {
            definition,
            sections,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    records: HashMap<EntityId, EntityRecord>,
    sections: BTreeMap<String, Vec<EntityId>>,
    schemas: BTreeMap<String, SchemaSlot>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a schema definition. Existing section
    /// lists are kept.
    pub fn register_schema(&mut self, definition: ContextSchema) {
        let name = definition.name.clone();
        for section in definition.section_names() {
            self.sections.entry(section.to_string()).or_default();
        }
        match self.schemas.get_mut(&name) {
            Some(slot) => {
                let mut definition = definition;
                for section in definition.section_names() {
                    slot.sections.entry(section.to_string()).or_default();
                }
                for section in slot.sections.keys() {
                    definition.ensure_section(section);
                }
                slot.definition = definition;
            }
            None => {
                self.schemas.insert(name, SchemaSlot::new(definition));
            }
        }
    }

    /// Make sure `schema.section` exists, creating either as needed
    pub fn ensure_section(&mut self, schema: &str, section: &str) {
        let slot = self
            .schemas
            .entry(schema.to_string())
            .or_insert_with(|| SchemaSlot::new(ContextSchema::implicit(schema)));
        slot.definition.ensure_section(section);
        slot.sections.entry(section.to_string()).or_default();
        self.sections.entry(section.to_string()).or_default();
    }

    /// Fail unless `schema.section` is a known section list
    pub fn check_section(&self, schema: &str, section: &str) -> Result<()> {
        let slot = self
            .schemas
            .get(schema)
            .ok_or_else(|| GraphError::UnknownSchema(schema.to_string()))?;
        if slot.sections.contains_key(section) {
            Ok(())
        } else {
            Err(GraphError::UnknownSection {
                schema: schema.to_string(),
                section: section.to_string(),
            })
        }
    }

    pub fn schema(&self, name: &str) -> Option<&ContextSchema> {
        self.schemas.get(name).map(|slot| &slot.definition)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &ContextSchema> {
        self.schemas.values().map(|slot| &slot.definition)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn record(&self, id: &str) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    pub fn record_mut(&mut self, id: &str) -> Option<&mut EntityRecord> {
        self.records.get_mut(id)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.records.get(id).map(|r| &r.entity)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.records.get_mut(id).map(|r| &mut r.entity)
    }

    pub fn records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index an entity that has an unused id into an existing section
    pub fn insert(&mut self, schema: &str, section: &str, entity: Entity, deprecated: bool) -> Result<EntityId> {
        let id = entity
            .id()
            .map(String::from)
            .ok_or_else(|| GraphError::InvalidFormat("entity has no id".to_string()))?;
        if self.records.contains_key(&id) {
            return Err(GraphError::DuplicateId { id });
        }
        self.check_section(schema, section)?;

        self.sections
            .entry(section.to_string())
            .or_default()
            .push(id.clone());
        if let Some(list) = self
            .schemas
            .get_mut(schema)
            .and_then(|slot| slot.sections.get_mut(section))
        {
            list.push(id.clone());
        }
        self.records.insert(
            id.clone(),
            EntityRecord {
                entity,
                section: section.to_string(),
                schema: schema.to_string(),
                deprecated,
            },
        );
        Ok(id)
    }

    /// Take an entity out of its current section lists. Its record stays.
    pub fn detach(&mut self, id: &str) {
        let Some(record) = self.records.get(id) else {
            return;
        };
        if let Some(list) = self.sections.get_mut(&record.section) {
            list.retain(|e| e != id);
        }
        if let Some(list) = self
            .schemas
            .get_mut(&record.schema)
            .and_then(|slot| slot.sections.get_mut(&record.section))
        {
            list.retain(|e| e != id);
        }
    }

    /// File an entity under `deprecated`, globally and in its schema
    pub fn move_to_deprecated(&mut self, id: &str) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        record.deprecated = true;
        if record.section == DEPRECATED_SECTION {
            return;
        }
        record.section = DEPRECATED_SECTION.to_string();
        let schema = record.schema.clone();

        self.sections
            .entry(DEPRECATED_SECTION.to_string())
            .or_default()
            .push(id.to_string());
        if let Some(slot) = self.schemas.get_mut(&schema) {
            slot.sections
                .entry(DEPRECATED_SECTION.to_string())
                .or_default()
                .push(id.to_string());
        }
    }

    /// Ids in `schema.section`, in order
    pub fn section_ids(&self, schema: &str, section: &str) -> &[EntityId] {
        self.schemas
            .get(schema)
            .and_then(|slot| slot.sections.get(section))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids in `section` across every schema, in order
    pub fn global_section_ids(&self, section: &str) -> &[EntityId] {
        self.sections
            .get(section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn global_sections(&self) -> impl Iterator<Item = (&str, &[EntityId])> {
        self.sections
            .iter()
            .map(|(name, ids)| (name.as_str(), ids.as_slice()))
    }

    /// Ids an entity points at through its reference fields. Uses the
    /// section's declared reference fields when the schema describes them
    /// and falls back to every `*_id` field otherwise.
    pub fn reference_targets(&self, schema: &str, section: &str, entity: &Entity) -> Vec<EntityId> {
        let declared = self
            .schema(schema)
            .and_then(|def| def.section(section))
            .and_then(SectionDef::reference_fields);

        match declared {
            Some(fields) => fields
                .into_iter()
                .filter_map(|field| entity.get(field))
                .flat_map(reference_ids)
                .map(String::from)
                .collect(),
            None => entity
                .fields()
                .filter(|(field, _)| field.ends_with(REFERENCE_SUFFIX))
                .flat_map(|(_, value)| reference_ids(value))
                .map(String::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> EntityStore {
        let mut store = EntityStore::new();
        store.ensure_section("c", "goal");
        store.ensure_section("c", "level");
        store
    }

    #[test]
    fn test_insert_registers_everywhere() {
        let mut store = store();
        let id = store
            .insert("c", "goal", Entity::new().with("id", "g1"), false)
            .unwrap();
        assert_eq!(id, "g1");
        assert_eq!(store.section_ids("c", "goal"), ["g1"]);
        assert_eq!(store.global_section_ids("goal"), ["g1"]);
        let record = store.record("g1").unwrap();
        assert_eq!(record.section, "goal");
        assert_eq!(record.schema, "c");
    }

    #[test]
    fn test_insert_rejects_duplicates_and_unknown_sections() {
        let mut store = store();
        store.insert("c", "goal", Entity::new().with("id", "g1"), false).unwrap();
        assert!(matches!(
            store.insert("c", "level", Entity::new().with("id", "g1"), false),
            Err(GraphError::DuplicateId { .. })
        ));
        assert!(matches!(
            store.insert("c", "topic", Entity::new().with("id", "t1"), false),
            Err(GraphError::UnknownSection { .. })
        ));
        assert!(matches!(
            store.insert("x", "goal", Entity::new().with("id", "t1"), false),
            Err(GraphError::UnknownSchema(_))
        ));
    }

    #[test]
    fn test_every_schema_has_deprecated() {
        let store = store();
        assert!(store.check_section("c", DEPRECATED_SECTION).is_ok());
    }

    #[test]
    fn test_detach_and_deprecate() {
        let mut store = store();
        store.insert("c", "goal", Entity::new().with("id", "g1"), false).unwrap();
        store.detach("g1");
        store.move_to_deprecated("g1");
        store.move_to_deprecated("g1");
        assert!(store.section_ids("c", "goal").is_empty());
        assert_eq!(store.section_ids("c", DEPRECATED_SECTION), ["g1"]);
        assert_eq!(store.global_section_ids(DEPRECATED_SECTION), ["g1"]);
        assert!(store.record("g1").unwrap().deprecated);
    }

    #[test]
    fn test_reference_targets_fallback_scans_suffix() {
        let store = store();
        let entity = Entity::new()
            .with("id", "g1")
            .with("level_id", json!(["l1", "l2"]))
            .with("parent_id", "g0")
            .with("count_id", 3);
        let mut targets = store.reference_targets("c", "goal", &entity);
        targets.sort();
        assert_eq!(targets, vec!["g0", "l1", "l2"]);
    }

    #[test]
    fn test_reference_targets_use_declared_fields() {
        let mut store = EntityStore::new();
        let schema = ContextSchema::from_json(
            "c",
            &json!({
                "properties": { "goal": { "items": { "properties": { "id": {}, "level_id": {} } } } }
            }),
        )
        .unwrap();
        store.register_schema(schema);
        let entity = Entity::new()
            .with("id", "g1")
            .with("level_id", "l1")
            .with("stray_id", "x");
        assert_eq!(store.reference_targets("c", "goal", &entity), vec!["l1"]);
    }
}
