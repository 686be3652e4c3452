//! Error types for the curriculum graph

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that abort a single graph operation
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("You cannot write to the deprecated section directly, use deprecate or replace instead")]
    DeprecatedSectionWrite,

    #[error("Illegal deprecated entity update {id}: only replacedBy may be changed")]
    IllegalDeprecatedEdit { id: String },

    #[error("Update cannot change the id of draft entity {id}")]
    IdentityChangeOnUpdate { id: String },

    #[error("Entity {id} is not part of any schema")]
    UntrackedEntity { id: String },

    #[error("Refusing to replace {id}: it is already deprecated")]
    AlreadyDeprecated { id: String },

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    #[error("Section {section} is not part of schema {schema}")]
    UnknownSection { schema: String, section: String },

    #[error("Could not find entity with id {id}")]
    UnknownEntity { id: String },

    #[error("Unexpected property type for {field} ({found}) on {id}")]
    BadReferenceFieldType {
        id: String,
        field: String,
        found: &'static str,
    },

    #[error("Duplicate id: {id}")]
    DuplicateId { id: String },

    #[error("Entity {id} cannot replace itself")]
    SelfReplacement { id: String },

    #[error("Draft {id} belongs to section {current}, not {requested}")]
    SectionMismatch {
        id: String,
        current: String,
        requested: String,
    },

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

/// Soft errors collected while bulk-indexing entities.
///
/// Indexing never stops on one of these; they are returned to the caller
/// and kept in the graph's error log.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexingError {
    #[error("Missing id in {schema}.{section}: {position}")]
    MissingId {
        schema: String,
        section: String,
        position: usize,
    },

    #[error("Duplicate id in {schema}.{section}: {id}")]
    DuplicateId {
        schema: String,
        section: String,
        id: String,
    },

    #[error("Not an object in {schema}.{section}: {position}")]
    NotAnObject {
        schema: String,
        section: String,
        position: usize,
    },
}
