//! Context schemas
//!
//! A context schema names the sections of one curriculum context and says,
//! per section, which file backs it and which of its properties are
//! reference fields. The JSON Schema itself is consumed as given; only the
//! parts the graph needs are extracted here, once, at load time.
//!
//! ## Expected shape
//! ```json
//! {
//!   "properties": {
//!     "goal":  { "#file": "data/goal.json",  "type": "array", "items": { "$ref": "#/definitions/goal" } },
//!     "level": { "#file": "data/level.json", "type": "array", "items": { "$ref": "#/definitions/level" } }
//!   },
//!   "definitions": {
//!     "goal":  { "properties": { "id": {}, "title": {}, "level_id": {} } },
//!     "level": { "properties": { "id": {}, "title": {} } }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::entity::{DEPRECATED_SECTION, REFERENCE_SUFFIX};
use crate::error::{GraphError, Result};

/// Name of the field other entities use to point into `section`
pub fn parent_property(section: &str) -> String {
    format!("{}{}", section, REFERENCE_SUFFIX)
}

/// One section of a context schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDef {
    pub name: String,
    /// Data file backing this section, relative to the context file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Declared property names; `None` when the schema does not describe
    /// the section's items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
}

impl SectionDef {
    pub fn undeclared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            properties: None,
        }
    }

    /// Declared reference fields, or `None` if the section is undeclared
    pub fn reference_fields(&self) -> Option<Vec<&str>> {
        self.properties.as_ref().map(|props| {
            props
                .iter()
                .map(String::as_str)
                .filter(|p| p.ends_with(REFERENCE_SUFFIX) && p.len() > REFERENCE_SUFFIX.len())
                .collect()
        })
    }

    pub fn declares(&self, property: &str) -> bool {
        self.properties
            .as_ref()
            .map(|props| props.iter().any(|p| p == property))
            .unwrap_or(false)
    }
}

/// The sections of one named context
#[derive(Debug, Clone)]
pub struct ContextSchema {
    pub name: String,
    sections: BTreeMap<String, SectionDef>,
    raw: Option<Value>,
}

impl ContextSchema {
    /// A schema with only the reserved `deprecated` section; sections are
    /// added as entities arrive
    pub fn implicit(name: impl Into<String>) -> Self {
        let mut sections = BTreeMap::new();
        sections.insert(
            DEPRECATED_SECTION.to_string(),
            SectionDef::undeclared(DEPRECATED_SECTION),
        );
        Self {
            name: name.into(),
            sections,
            raw: None,
        }
    }

    /// Extract sections from a (dereferenced) context JSON Schema
    pub fn from_json(name: impl Into<String>, json: &Value) -> Result<Self> {
        let name = name.into();
        let properties = json
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                GraphError::InvalidFormat(format!("No properties defined in context {}", name))
            })?;

        let mut schema = Self::implicit(name);
        for (section, prop) in properties {
            let file = prop.get("#file").and_then(Value::as_str).map(String::from);
            let properties = item_definition(json, section, prop)
                .and_then(|def| declared_properties(json, def));
            schema.sections.insert(
                section.clone(),
                SectionDef {
                    name: section.clone(),
                    file,
                    properties,
                },
            );
        }
        schema.raw = Some(json.clone());
        Ok(schema)
    }

    pub fn section(&self, name: &str) -> Option<&SectionDef> {
        self.sections.get(name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionDef> {
        self.sections.values()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// The JSON Schema this context was built from, if any
    pub fn raw(&self) -> Option<&Value> {
        self.raw.as_ref()
    }

    /// Register a section the schema did not declare
    pub(crate) fn ensure_section(&mut self, name: &str) {
        if !self.sections.contains_key(name) {
            self.sections
                .insert(name.to_string(), SectionDef::undeclared(name));
        }
    }

    /// Sections (other than `deprecated`) whose items declare `<section>_id`
    pub fn parent_sections(&self, section: &str) -> Vec<&str> {
        let property = parent_property(section);
        self.sections
            .values()
            .filter(|def| def.name != DEPRECATED_SECTION && def.declares(&property))
            .map(|def| def.name.as_str())
            .collect()
    }
}

/// Find the schema describing one item of `section`
fn item_definition<'a>(root: &'a Value, section: &str, prop: &'a Value) -> Option<&'a Value> {
    for defs in ["definitions", "$defs"] {
        if let Some(def) = root.get(defs).and_then(|d| d.get(section)) {
            return Some(def);
        }
    }
    prop.get("items")
}

/// Nesting limit for `$ref` / `allOf` chains
const MAX_SCHEMA_DEPTH: usize = 32;

/// Property names an item schema declares, following local `$ref`s and
/// merging `allOf` members.
///
/// `None` when nothing in the definition declares properties, or when part
/// of it cannot be resolved, so callers fall back to scanning fields.
fn declared_properties(root: &Value, def: &Value) -> Option<Vec<String>> {
    let mut names = Vec::new();
    match collect_properties(root, def, 0, &mut names)? {
        true => Some(names),
        false => None,
    }
}

/// Returns whether anything declared properties, or `None` on an
/// unresolvable reference
fn collect_properties(root: &Value, def: &Value, depth: usize, names: &mut Vec<String>) -> Option<bool> {
    if depth > MAX_SCHEMA_DEPTH {
        return None;
    }
    let mut found = false;

    if let Some(reference) = def.get("$ref").and_then(Value::as_str) {
        let target = reference
            .strip_prefix('#')
            .and_then(|pointer| root.pointer(pointer))?;
        found |= collect_properties(root, target, depth + 1, names)?;
    }
    if let Some(props) = def.get("properties").and_then(Value::as_object) {
        found = true;
        for name in props.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    if let Some(members) = def.get("allOf").and_then(Value::as_array) {
        for member in members {
            found |= collect_properties(root, member, depth + 1, names)?;
        }
    }

    Some(found)
}
