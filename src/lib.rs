//! Curriculum Graph
//!
//! An in-memory graph of curriculum entities (goals, levels, topics, ...)
//! loaded from one or more context schemas, with a mutation engine that
//! keeps released entities immutable and every reference consistent.
//!
//! ## Features
//!
//! - **Entity Store**: every entity indexed by id, section and owning schema
//! - **Reference Index**: reverse lookup from an entity to everything whose
//!   `*_id` fields point at it
//! - **Versioned Mutations**: editing a released entity forks a draft and
//!   deprecates the original, rewriting referrers and marking them dirty
//! - **Sources**: contexts load from disk or from a Git revision
//! - **Export & Validation**: sections write back to their `#file` and
//!   validate against the context JSON Schema
//!
//! ## Layout
//!
//! ```text
//! context.json            properties.<section>["#file"] -> data/<section>.json
//! data/
//! ├── goal.json           [{ "id": "...", "level_id": ["..."] }, ...]
//! ├── level.json
//! └── deprecated.json     retired entities, replacedBy -> successor
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod export;
pub mod graph;
pub mod loader;
pub mod patch;
pub mod schema;
pub mod validate;

pub use config::{CurriculumConfig, ExportConfig, GraphSettings, OutputFormat, ScrubPolicy};
pub use entity::{Entity, EntityId};
pub use error::{GraphError, IndexingError, Result};
pub use export::export_schema;
pub use graph::{ClosureNode, CurriculumGraph};
pub use loader::{load_context, ContextSource, FileSource, GitSource, LoadReport, SourceInfo, SourceState};
pub use patch::{Patch, PatchOp};
pub use schema::{parent_property, ContextSchema, SectionDef};
pub use validate::{validate_schema, ValidationIssue};
