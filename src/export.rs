//! Export a schema's sections back to their `#file` locations

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{ExportConfig, OutputFormat};
use crate::entity::DEPRECATED_SECTION;
use crate::error::{GraphError, Result};
use crate::graph::CurriculumGraph;

/// Write every file-backed section of `schema_name` under `dir`.
///
/// Returns the paths written, in section order.
pub fn export_schema(
    graph: &CurriculumGraph,
    schema_name: &str,
    dir: &Path,
    config: &ExportConfig,
) -> Result<Vec<PathBuf>> {
    let schema = graph
        .schema(schema_name)
        .ok_or_else(|| GraphError::UnknownSchema(schema_name.to_string()))?;

    let mut written = Vec::new();
    for section in schema.sections() {
        let Some(file) = section.file.as_deref() else {
            if section.name != DEPRECATED_SECTION {
                warn!(schema = schema_name, section = %section.name, "skipping export, no source file defined");
            }
            continue;
        };

        let entities = graph.section_entities(schema_name, &section.name);
        let path = dir.join(file.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, render(&entities, config)?)?;
        debug!(section = %section.name, count = entities.len(), path = %path.display(), "exported section");
        written.push(path);
    }

    Ok(written)
}

/// Serialize `value` in the configured output format
pub fn render<T: Serialize + ?Sized>(value: &T, config: &ExportConfig) -> Result<Vec<u8>> {
    match config.output_format {
        OutputFormat::Compact => Ok(serde_json::to_vec(value)?),
        OutputFormat::Pretty => {
            let mut out = Vec::new();
            let formatter = PrettyFormatter::with_indent(config.indent.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
            value.serialize(&mut serializer)?;
            Ok(out)
        }
    }
}
