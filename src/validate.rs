//! Structural validation of loaded data against its context JSON Schema

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GraphError, Result};
use crate::graph::CurriculumGraph;

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer into the section data, e.g. `/goal/0/title`
    pub instance_path: String,
    pub message: String,
}

/// Validate the current data of `schema_name` against the JSON Schema it
/// was loaded from. Only the sections the schema declares are checked.
pub fn validate_schema(graph: &CurriculumGraph, schema_name: &str) -> Result<Vec<ValidationIssue>> {
    let schema = graph
        .schema(schema_name)
        .ok_or_else(|| GraphError::UnknownSchema(schema_name.to_string()))?;
    let raw = schema.raw().ok_or_else(|| {
        GraphError::InvalidFormat(format!("schema {} has no JSON Schema to validate against", schema_name))
    })?;

    let compiled = JSONSchema::compile(raw)
        .map_err(|e| GraphError::InvalidFormat(format!("invalid JSON Schema for {}: {}", schema_name, e)))?;

    let mut instance = Map::new();
    if let Some(properties) = raw.get("properties").and_then(Value::as_object) {
        for section in properties.keys() {
            let entities = graph
                .section_entities(schema_name, section)
                .into_iter()
                .map(|entity| Value::Object(entity.as_map().clone()))
                .collect();
            instance.insert(section.clone(), Value::Array(entities));
        }
    }
    let instance = Value::Object(instance);

    let issues = match compiled.validate(&instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| ValidationIssue {
                instance_path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect(),
    };
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ContextSchema;
    use serde_json::json;

    fn graph(level: Value) -> CurriculumGraph {
        let mut graph = CurriculumGraph::new();
        graph.register_schema(
            ContextSchema::from_json(
                "c",
                &json!({
                    "type": "object",
                    "properties": {
                        "level": {
                            "#file": "data/level.json",
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": { "id": { "type": "string" }, "title": { "type": "string" } },
                                "required": ["id", "title"]
                            }
                        }
                    }
                }),
            )
            .unwrap(),
        );
        graph.index_entities(vec![("level".to_string(), vec![level])], "c");
        graph
    }

    #[test]
    fn test_valid_data() {
        let graph = graph(json!({ "id": "l1", "title": "One" }));
        assert!(validate_schema(&graph, "c").unwrap().is_empty());
    }

    #[test]
    fn test_reports_instance_path() {
        let graph = graph(json!({ "id": "l1", "title": 3 }));
        let issues = validate_schema(&graph, "c").unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].instance_path, "/level/0/title");
    }

    #[test]
    fn test_implicit_schema_cannot_be_validated() {
        let mut graph = CurriculumGraph::new();
        graph.index_entities(vec![("level".to_string(), vec![json!({ "id": "l1" })])], "c");
        assert!(matches!(
            validate_schema(&graph, "c"),
            Err(GraphError::InvalidFormat(_))
        ));
        assert!(matches!(
            validate_schema(&graph, "x"),
            Err(GraphError::UnknownSchema(_))
        ));
    }
}
