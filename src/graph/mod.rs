//! Curriculum Entity Graph
//!
//! [`CurriculumGraph`] owns the entity store and the reverse reference
//! index and runs every mutation against both. Loaders feed it through
//! [`CurriculumGraph::index_entities`]; exporters read it back through
//! [`CurriculumGraph::section_entities`].
//!
//! The graph is single-writer: every method that mutates takes `&mut self`,
//! so one mutation is in flight per graph and no reader observes a
//! half-updated index. Hosts that share a graph across threads wrap it in
//! their own lock.

pub mod mutation;
pub mod references;
pub mod store;

pub use references::ReferenceIndex;
pub use store::{EntityRecord, EntityStore};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{info, warn};

use crate::config::{GraphSettings, ScrubPolicy};
use crate::entity::{Entity, EntityId, DEPRECATED_SECTION};
use crate::error::{GraphError, IndexingError, Result};
use crate::loader::SourceInfo;
use crate::schema::ContextSchema;

/// Node in a dependents walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureNode {
    pub id: EntityId,
    pub depth: usize,
}

/// The entity graph: store, reference index and mutation engine
#[derive(Debug, Clone)]
pub struct CurriculumGraph {
    pub(crate) store: EntityStore,
    pub(crate) references: ReferenceIndex,
    /// Load errors, in the order they were found
    errors: Vec<IndexingError>,
    /// Where each schema was loaded from
    sources: BTreeMap<String, SourceInfo>,
    deprecated_marker: Regex,
    pub(crate) scrub_outgoing: ScrubPolicy,
}

impl Default for CurriculumGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CurriculumGraph {
    pub fn new() -> Self {
        Self {
            store: EntityStore::new(),
            references: ReferenceIndex::new(),
            errors: Vec::new(),
            sources: BTreeMap::new(),
            deprecated_marker: Regex::new(DEPRECATED_SECTION).expect("literal pattern"),
            scrub_outgoing: ScrubPolicy::default(),
        }
    }

    /// Build an empty graph from configuration
    pub fn with_settings(settings: &GraphSettings) -> Result<Self> {
        let deprecated_marker = Regex::new(&settings.deprecated_pattern).map_err(|e| {
            GraphError::InvalidFormat(format!(
                "bad deprecated_pattern {:?}: {}",
                settings.deprecated_pattern, e
            ))
        })?;
        Ok(Self {
            deprecated_marker,
            scrub_outgoing: settings.scrub_outgoing,
            ..Self::new()
        })
    }

    // ========== Schemas & sources ==========

    /// Register a context schema so its sections become valid targets
    pub fn register_schema(&mut self, schema: ContextSchema) {
        self.store.register_schema(schema);
    }

    pub fn schema(&self, name: &str) -> Option<&ContextSchema> {
        self.store.schema(name)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &ContextSchema> {
        self.store.schemas()
    }

    pub fn source(&self, schema: &str) -> Option<&SourceInfo> {
        self.sources.get(schema)
    }

    pub(crate) fn set_source(&mut self, schema: &str, info: SourceInfo) {
        self.sources.insert(schema.to_string(), info);
    }

    pub(crate) fn source_mut(&mut self, schema: &str) -> Option<&mut SourceInfo> {
        self.sources.get_mut(schema)
    }

    /// Sections, across all schemas, whose items point into `section`
    pub fn parent_sections(&self, section: &str) -> Vec<String> {
        let mut parents: Vec<String> = Vec::new();
        for schema in self.store.schemas() {
            for parent in schema.parent_sections(section) {
                if !parents.iter().any(|p| p == parent) {
                    parents.push(parent.to_string());
                }
            }
        }
        parents
    }

    // ========== Bulk indexing ==========

    /// Index loaded entities for one schema, section by section.
    ///
    /// Never fails: entities without an id, with an id already indexed, or
    /// that are not objects are skipped and reported. The first entity to
    /// claim an id wins.
    pub fn index_entities<I>(&mut self, entities_by_section: I, schema_name: &str) -> Vec<IndexingError>
    where
        I: IntoIterator<Item = (String, Vec<Value>)>,
    {
        let mut errors = Vec::new();

        for (section, entities) in entities_by_section {
            self.store.ensure_section(schema_name, &section);
            let deprecated = self.is_deprecated_section(&section);
            let before = self.store.len();
            info!(
                schema = schema_name,
                section = %section,
                count = entities.len(),
                index_size = before,
                "indexing section"
            );

            for (position, value) in entities.into_iter().enumerate() {
                let Some(entity) = Entity::from_value(value) else {
                    errors.push(IndexingError::NotAnObject {
                        schema: schema_name.to_string(),
                        section: section.clone(),
                        position,
                    });
                    continue;
                };
                let Some(id) = entity.id().map(String::from) else {
                    errors.push(IndexingError::MissingId {
                        schema: schema_name.to_string(),
                        section: section.clone(),
                        position,
                    });
                    continue;
                };
                if self.store.contains(&id) {
                    errors.push(IndexingError::DuplicateId {
                        schema: schema_name.to_string(),
                        section: section.clone(),
                        id,
                    });
                    continue;
                }

                let targets = if deprecated {
                    Vec::new()
                } else {
                    self.store.reference_targets(schema_name, &section, &entity)
                };
                match self.store.insert(schema_name, &section, entity, deprecated) {
                    Ok(id) => self.references.register(&id, &targets),
                    Err(e) => warn!(id = %id, error = %e, "could not index entity"),
                }
            }
        }

        for error in &errors {
            warn!("{}", error);
        }
        self.errors.extend(errors.iter().cloned());
        errors
    }

    fn is_deprecated_section(&self, section: &str) -> bool {
        section == DEPRECATED_SECTION || self.deprecated_marker.is_match(section)
    }

    /// Every load error recorded so far
    pub fn errors(&self) -> &[IndexingError] {
        &self.errors
    }

    // ========== Lookups ==========

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.store.entity(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.contains(id)
    }

    /// Current section of an entity
    pub fn section_of(&self, id: &str) -> Option<&str> {
        self.store.record(id).map(|r| r.section.as_str())
    }

    /// Owning schema of an entity
    pub fn schema_of(&self, id: &str) -> Option<&str> {
        self.store.record(id).map(|r| r.schema.as_str())
    }

    pub fn is_deprecated(&self, id: &str) -> bool {
        self.store.record(id).map(|r| r.deprecated).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Entities of `schema.section`, in order
    pub fn section_entities(&self, schema: &str, section: &str) -> Vec<&Entity> {
        self.store
            .section_ids(schema, section)
            .iter()
            .filter_map(|id| self.store.entity(id))
            .collect()
    }

    /// Entities of `section` across every schema, in order
    pub fn entities_in(&self, section: &str) -> Vec<&Entity> {
        self.store
            .global_section_ids(section)
            .iter()
            .filter_map(|id| self.store.entity(id))
            .collect()
    }

    // ========== Graph walks ==========

    /// Ids of entities whose reference fields hold `id`
    pub fn referrers(&self, id: &str) -> &[EntityId] {
        self.references.referrers(id)
    }

    pub fn reference_index(&self) -> &ReferenceIndex {
        &self.references
    }

    /// Everything that depends on `id`, directly or transitively, each at
    /// its shortest distance from `id`
    pub fn dependents(&self, id: &str, max_depth: Option<usize>) -> Vec<ClosureNode> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([id]);
        let mut queue = VecDeque::from([(id, 0usize)]);

        while let Some((node, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for referrer in self.references.referrers(node) {
                if visited.insert(referrer.as_str()) {
                    result.push(ClosureNode {
                        id: referrer.clone(),
                        depth: depth + 1,
                    });
                    queue.push_back((referrer.as_str(), depth + 1));
                }
            }
        }

        result.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.id.cmp(&b.id)));
        result
    }
}
