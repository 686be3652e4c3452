//! Field-level patches
//!
//! A [`Patch`] is an ordered list of tagged operations applied to an entity
//! by a small interpreter. Keeping the operations explicit lets the mutation
//! engine inspect a patch before it runs, e.g. to reject identity changes on
//! drafts or anything but a `replacedBy` edit on a deprecated entity.
//!
//! Patches serialize as a JSON array of ops:
//!
//! ```json
//! [
//!   { "op": "set", "field": "title", "value": "Reading" },
//!   { "op": "delete", "field": "dirty" },
//!   { "op": "splice", "field": "niveau_id", "index": 0, "remove": 1, "insert": ["b"] }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{shape_name, Entity, ID, REPLACED_BY};
use crate::error::{GraphError, Result};

/// A single field-level operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Set a field, creating it if absent
    Set { field: String, value: Value },
    /// Remove a field (no-op if absent)
    Delete { field: String },
    /// Replace `remove` items at `index` of a list field with `insert`
    Splice {
        field: String,
        index: usize,
        #[serde(default)]
        remove: usize,
        #[serde(default)]
        insert: Vec<Value>,
    },
}

impl PatchOp {
    pub fn field(&self) -> &str {
        match self {
            PatchOp::Set { field, .. } | PatchOp::Delete { field } | PatchOp::Splice { field, .. } => {
                field
            }
        }
    }
}

/// An ordered set of field operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(mut self, field: impl Into<String>) -> Self {
        self.ops.push(PatchOp::Delete { field: field.into() });
        self
    }

    pub fn splice(
        mut self,
        field: impl Into<String>,
        index: usize,
        remove: usize,
        insert: Vec<Value>,
    ) -> Self {
        self.ops.push(PatchOp::Splice {
            field: field.into(),
            index,
            remove,
            insert,
        });
        self
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Derive the top-level patch that turns `old` into `new`
    pub fn between(old: &Entity, new: &Entity) -> Self {
        let mut patch = Self::new();
        for (field, value) in new.fields() {
            if old.get(field) != Some(value) {
                patch = patch.set(field.clone(), value.clone());
            }
        }
        for (field, _) in old.fields() {
            if !new.contains(field) {
                patch = patch.delete(field.clone());
            }
        }
        patch
    }

    /// Whether applying this patch would give `entity` a different id
    pub fn changes_identity(&self, entity: &Entity) -> bool {
        self.ops.iter().any(|op| match op {
            PatchOp::Set { field, value } if field == ID => value.as_str() != entity.id(),
            PatchOp::Delete { field } | PatchOp::Splice { field, .. } => field == ID,
            PatchOp::Set { .. } => false,
        })
    }

    /// A deprecated entity may only have its successor re-pointed: exactly
    /// one op, and it must touch `replacedBy`
    pub fn only_repoints_successor(&self) -> bool {
        matches!(self.ops.as_slice(), [op] if op.field() == REPLACED_BY && !matches!(op, PatchOp::Delete { .. }))
    }

    /// Apply every op to `entity`. Either all ops apply or the entity is
    /// left untouched.
    pub fn apply(&self, entity: &mut Entity) -> Result<()> {
        let mut working = entity.clone();
        for op in &self.ops {
            apply_op(&mut working, op)?;
        }
        *entity = working;
        Ok(())
    }
}

impl From<Vec<PatchOp>> for Patch {
    fn from(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }
}

fn apply_op(entity: &mut Entity, op: &PatchOp) -> Result<()> {
    match op {
        PatchOp::Set { field, value } => {
            entity.set(field.clone(), value.clone());
        }
        PatchOp::Delete { field } => {
            entity.remove(field);
        }
        PatchOp::Splice {
            field,
            index,
            remove,
            insert,
        } => {
            if !entity.contains(field) && *index == 0 && *remove == 0 {
                entity.set(field.clone(), Value::Array(insert.clone()));
                return Ok(());
            }
            let items = match entity.get_mut(field) {
                Some(Value::Array(items)) => items,
                other => {
                    return Err(GraphError::InvalidPatch(format!(
                        "cannot splice {} field {}",
                        shape_name(other.as_deref()),
                        field
                    )))
                }
            };
            let end = index.checked_add(*remove).filter(|end| *end <= items.len());
            let Some(end) = end else {
                return Err(GraphError::InvalidPatch(format!(
                    "splice {}..+{} out of bounds for {} (length {})",
                    index,
                    remove,
                    field,
                    items.len()
                )));
            };
            items.splice(*index..end, insert.iter().cloned());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Entity {
        Entity::new()
            .with("id", "g1")
            .with("title", "Reading")
            .with("niveau_id", json!(["l1", "l2"]))
    }

    #[test]
    fn test_set_and_delete() {
        let mut entity = sample();
        Patch::new()
            .set("title", "Writing")
            .delete("niveau_id")
            .apply(&mut entity)
            .unwrap();
        assert_eq!(entity.get("title"), Some(&json!("Writing")));
        assert!(!entity.contains("niveau_id"));
    }

    #[test]
    fn test_splice() {
        let mut entity = sample();
        Patch::new()
            .splice("niveau_id", 1, 1, vec![json!("l3"), json!("l4")])
            .apply(&mut entity)
            .unwrap();
        assert_eq!(entity.get("niveau_id"), Some(&json!(["l1", "l3", "l4"])));
    }

    #[test]
    fn test_splice_out_of_bounds_leaves_entity_untouched() {
        let mut entity = sample();
        let result = Patch::new()
            .set("title", "Writing")
            .splice("niveau_id", 1, 5, vec![])
            .apply(&mut entity);
        assert!(matches!(result, Err(GraphError::InvalidPatch(_))));
        assert_eq!(entity, sample());
    }

    #[test]
    fn test_splice_non_list_fails() {
        let mut entity = sample();
        let result = Patch::new().splice("title", 0, 0, vec![json!("x")]).apply(&mut entity);
        assert!(result.is_err());
    }

    #[test]
    fn test_changes_identity() {
        let entity = sample();
        assert!(!Patch::new().set("title", "x").changes_identity(&entity));
        assert!(!Patch::new().set("id", "g1").changes_identity(&entity));
        assert!(Patch::new().set("id", "g2").changes_identity(&entity));
        assert!(Patch::new().delete("id").changes_identity(&entity));
    }

    #[test]
    fn test_only_repoints_successor() {
        assert!(Patch::new().set("replacedBy", json!(["x"])).only_repoints_successor());
        assert!(!Patch::new().delete("replacedBy").only_repoints_successor());
        assert!(!Patch::new()
            .set("replacedBy", json!(["x"]))
            .set("title", "y")
            .only_repoints_successor());
        assert!(!Patch::new().set("title", "y").only_repoints_successor());
    }

    #[test]
    fn test_between() {
        let old = sample();
        let new = sample().with("title", "Writing");
        let mut new = new;
        new.remove("niveau_id");

        let patch = Patch::between(&old, &new);
        let mut patched = old.clone();
        patch.apply(&mut patched).unwrap();
        assert_eq!(patched, new);
        assert_eq!(patch.ops().len(), 2);
    }

    #[test]
    fn test_deserialize_ops() {
        let patch: Patch = serde_json::from_value(json!([
            { "op": "set", "field": "title", "value": "Writing" },
            { "op": "splice", "field": "niveau_id", "index": 0, "remove": 1 }
        ]))
        .unwrap();
        let mut entity = sample();
        patch.apply(&mut entity).unwrap();
        assert_eq!(entity.get("niveau_id"), Some(&json!(["l2"])));
    }
}
