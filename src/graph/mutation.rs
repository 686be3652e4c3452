//! Mutation engine
//!
//! ## Lifecycle
//! ```text
//!   add ──> draft (unreleased) ──update──> draft, patched in place
//!              │
//!              │ released by an outside workflow (unreleased cleared)
//!              v
//!           released ──update──> new draft + replace(old, new)
//!              │
//!              └──replace / deprecate──> deprecated (terminal)
//! ```
//!
//! Preconditions of every operation are checked before anything is
//! written, so a failed call leaves the graph as it was.

use serde_json::Value;
use tracing::{debug, warn};

use super::CurriculumGraph;
use crate::config::ScrubPolicy;
use crate::entity::{
    new_id, shape_name, Entity, EntityId, DELETED, DEPRECATED_SECTION, DIRTY, REPLACED_BY,
    REPLACES, TYPES, UNRELEASED,
};
use crate::error::{GraphError, Result};
use crate::patch::Patch;
use crate::schema::parent_property;

/// Referrers of an entity being replaced, split by what happens to them
struct Referrers {
    rewrite: Vec<EntityId>,
    skipped: Vec<EntityId>,
}

impl CurriculumGraph {
    /// Add a new draft entity to `schema.section` and return its id.
    ///
    /// An id is generated if the entity has none. The entity always starts
    /// as a draft (`unreleased: true`).
    pub fn add(&mut self, schema: &str, section: &str, mut entity: Entity) -> Result<EntityId> {
        if section == DEPRECATED_SECTION {
            return Err(GraphError::DeprecatedSectionWrite);
        }
        self.store.check_section(schema, section)?;

        let id = match entity.id() {
            Some(id) => id.to_string(),
            None => {
                let id = new_id();
                entity.set_id(id.clone());
                id
            }
        };
        if self.store.contains(&id) {
            return Err(GraphError::DuplicateId { id });
        }
        entity.set(UNRELEASED, true);

        let targets = self.store.reference_targets(schema, section, &entity);
        self.store.insert(schema, section, entity, false)?;
        self.references.register(&id, &targets);

        debug!(id = %id, schema, section, "added draft");
        Ok(id)
    }

    /// Apply `patch` to the entity `id` and return the id of the result.
    ///
    /// A draft is patched in place and keeps its id. A released entity is
    /// forked: the patched clone is added under a new id and replaces the
    /// original. A deprecated entity only accepts a single `replacedBy` edit.
    pub fn update(&mut self, section: &str, id: &str, patch: &Patch) -> Result<EntityId> {
        if section == DEPRECATED_SECTION {
            return Err(GraphError::DeprecatedSectionWrite);
        }
        let record = self
            .store
            .record(id)
            .ok_or_else(|| GraphError::UnknownEntity { id: id.to_string() })?;
        let schema = record.schema.clone();
        let current_section = record.section.clone();
        let deprecated = record.deprecated;
        let current = record.entity.clone();
        self.store.check_section(&schema, section)?;

        if deprecated {
            if !patch.only_repoints_successor() {
                return Err(GraphError::IllegalDeprecatedEdit { id: id.to_string() });
            }
            let mut patched = current;
            patch.apply(&mut patched)?;
            self.put_entity(id, patched);
            debug!(id, "re-pointed deprecated entity");
            return Ok(id.to_string());
        }

        if current.is_released() {
            let mut clone = current;
            patch.apply(&mut clone)?;
            if clone.id().map_or(true, |new| new == id) {
                clone.set_id(new_id());
            }
            clone.clear_lineage();
            // the replace below must not fail after the fork is added
            self.check_replaceable(id, &current_section, &schema)?;
            self.collect_referrers(id, &parent_property(&current_section))?;

            let forked = self.add(&schema, section, clone)?;
            self.replace(id, Some(&forked))?;
            debug!(old = id, new = %forked, "forked released entity");
            return Ok(forked);
        }

        if patch.changes_identity(&current) {
            return Err(GraphError::IdentityChangeOnUpdate { id: id.to_string() });
        }
        if current_section != section {
            return Err(GraphError::SectionMismatch {
                id: id.to_string(),
                current: current_section,
                requested: section.to_string(),
            });
        }
        let mut patched = current.clone();
        patch.apply(&mut patched)?;

        let old_targets = self.store.reference_targets(&schema, section, &current);
        let new_targets = self.store.reference_targets(&schema, section, &patched);
        self.references.unregister(id, &old_targets);
        self.references.register(id, &new_targets);
        self.put_entity(id, patched);

        debug!(id, "patched draft in place");
        Ok(id.to_string())
    }

    /// Retire an entity, optionally naming its successor
    pub fn deprecate(&mut self, id: &str, replaced_by: Option<&str>) -> Result<()> {
        if !self.store.contains(id) {
            return Err(GraphError::UntrackedEntity { id: id.to_string() });
        }
        self.replace(id, replaced_by)
    }

    /// Retire `id` and point everything that referenced it at `new_id`
    /// (or drop those references when there is no successor).
    ///
    /// A released entity moves to `deprecated` with `replacedBy` /
    /// `replaces` linking it to its successor. A draft is detached and
    /// marked deleted. Released referrers whose reference field was
    /// rewritten are marked dirty.
    pub fn replace(&mut self, id: &str, new_id: Option<&str>) -> Result<()> {
        let record = self
            .store
            .record(id)
            .ok_or_else(|| GraphError::UnknownEntity { id: id.to_string() })?;
        let section = record.section.clone();
        let schema = record.schema.clone();
        let released = record.entity.is_released();
        self.check_replaceable(id, &section, &schema)?;
        if let Some(new_id) = new_id {
            if new_id == id {
                return Err(GraphError::SelfReplacement { id: id.to_string() });
            }
            if !self.store.contains(new_id) {
                return Err(GraphError::UnknownEntity {
                    id: new_id.to_string(),
                });
            }
        }

        // computed before the entity can be refiled under `deprecated`
        let prop = parent_property(&section);
        let referrers = self.collect_referrers(id, &prop)?;
        let outgoing = self
            .store
            .entity(id)
            .map(|old| self.store.reference_targets(&schema, &section, old))
            .unwrap_or_default();

        if released {
            if let Some(successor) = new_id.and_then(|n| self.store.entity_mut(n)) {
                successor.push_to_list(REPLACES, id);
            }
        }
        if let Some(old) = self.store.entity_mut(id) {
            if released {
                old.ensure_list(REPLACED_BY);
                if let Some(new_id) = new_id {
                    old.push_to_list(REPLACED_BY, new_id);
                }
            }
            old.push_unique_to_list(TYPES, &section);
        }

        self.store.detach(id);
        if released {
            self.store.move_to_deprecated(id);
        } else if let Some(old) = self.store.entity_mut(id) {
            old.set(DELETED, true);
        }

        for referrer in &referrers.rewrite {
            self.rewrite_referrer(referrer, id, new_id, &prop);
        }
        for referrer in &referrers.skipped {
            self.references.remove_source(id, referrer);
        }

        if released || self.scrub_outgoing == ScrubPolicy::Always {
            self.references.unregister(id, &outgoing);
        }

        debug!(
            id,
            new_id = new_id.unwrap_or("-"),
            released,
            rewritten = referrers.rewrite.len(),
            "replaced entity"
        );
        Ok(())
    }

    /// Released entities whose references were rewritten by a replace
    pub fn get_dirty(&self) -> Vec<&Entity> {
        self.store
            .global_sections()
            .filter(|(section, _)| *section != DEPRECATED_SECTION)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.store.record(id))
            .filter(|r| !r.deprecated)
            .map(|r| &r.entity)
            .filter(|e| e.is_dirty() && e.is_released() && !e.is_deleted())
            .collect()
    }

    fn check_replaceable(&self, id: &str, section: &str, schema: &str) -> Result<()> {
        let retired = self
            .store
            .record(id)
            .map(|r| r.deprecated || r.entity.is_deleted())
            .unwrap_or(false);
        if retired || section == DEPRECATED_SECTION {
            return Err(GraphError::AlreadyDeprecated { id: id.to_string() });
        }
        self.store.check_section(schema, section)
    }

    /// Split the referrers of `id` into those to rewrite and those whose
    /// edges are moot, and check every rewrite target field has a legal
    /// shape before anything is changed.
    fn collect_referrers(&self, id: &str, prop: &str) -> Result<Referrers> {
        let mut rewrite = Vec::new();
        let mut skipped = Vec::new();

        for referrer in self.references.distinct_referrers(id) {
            let Some(record) = self.store.record(&referrer) else {
                warn!(referrer = %referrer, target = id, "reference index holds an unknown entity");
                continue;
            };
            if record.entity.is_deleted() || record.deprecated {
                skipped.push(referrer);
                continue;
            }
            let field = record.entity.get(prop);
            let legal = match field {
                Some(Value::String(_)) => true,
                Some(Value::Array(items)) => items.iter().all(Value::is_string),
                _ => false,
            };
            if !legal {
                return Err(GraphError::BadReferenceFieldType {
                    id: referrer,
                    field: prop.to_string(),
                    found: shape_name(field),
                });
            }
            rewrite.push(referrer);
        }

        Ok(Referrers { rewrite, skipped })
    }

    /// Point `referrer.prop` at `new_id` instead of `old_id`, then rebuild
    /// the referrer's edges in the index
    fn rewrite_referrer(&mut self, referrer: &str, old_id: &str, new_id: Option<&str>, prop: &str) {
        let Some(record) = self.store.record(referrer) else {
            return;
        };
        let (schema, section) = (record.schema.clone(), record.section.clone());
        let before = self.store.reference_targets(&schema, &section, &record.entity);

        let Some(entity) = self.store.entity_mut(referrer) else {
            return;
        };
        if entity.is_released() {
            entity.set(DIRTY, true);
        }
        match entity.get(prop).cloned() {
            Some(Value::Array(items)) => {
                let mut rewritten: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    let is_old = item.as_str() == Some(old_id);
                    let item = match (is_old, new_id) {
                        (true, Some(new_id)) => Value::String(new_id.to_string()),
                        (true, None) => continue,
                        (false, _) => item,
                    };
                    if !rewritten.contains(&item) {
                        rewritten.push(item);
                    }
                }
                entity.set(prop, Value::Array(rewritten));
            }
            Some(Value::String(s)) if s == old_id => match new_id {
                Some(new_id) => entity.set(prop, new_id),
                None => {
                    entity.remove(prop);
                }
            },
            _ => {}
        }

        let after = match self.store.entity(referrer) {
            Some(entity) => self.store.reference_targets(&schema, &section, entity),
            None => return,
        };
        self.references.unregister(referrer, &before);
        self.references.register(referrer, &after);
    }

    fn put_entity(&mut self, id: &str, entity: Entity) {
        if let Some(slot) = self.store.entity_mut(id) {
            *slot = entity;
        }
    }
}
