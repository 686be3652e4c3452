//! Context Loading
//!
//! Reads a context schema (`context.json`) and the per-section entity files
//! it names through `#file`, then indexes everything into a
//! [`CurriculumGraph`]. Files come from a [`ContextSource`]: a directory on
//! disk or a revision of a Git repository.
//!
//! A section that cannot be read or parsed is reported in the
//! [`LoadReport`] and skipped; the rest of the context still loads.

use git2::Repository;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::entity::DEPRECATED_SECTION;
use crate::error::{GraphError, IndexingError, Result};
use crate::graph::CurriculumGraph;
use crate::schema::ContextSchema;

/// How a schema's files are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMethod {
    File,
    Git,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Loading,
    Available,
    Failed,
}

/// Where a schema was loaded from, and how far loading got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub method: SourceMethod,
    pub location: String,
    pub state: SourceState,
}

/// Somewhere context files can be read from, by relative path
pub trait ContextSource {
    fn method(&self) -> SourceMethod;

    /// Human-readable location, recorded in [`SourceInfo`]
    fn describe(&self) -> String;

    fn read(&self, path: &str) -> Result<String>;
}

/// Files under a directory
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ContextSource for FileSource {
    fn method(&self) -> SourceMethod {
        SourceMethod::File
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn read(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.root.join(relative(path)))?)
    }
}

/// Files at a revision of a Git repository
pub struct GitSource {
    repo: Repository,
    revision: String,
}

impl GitSource {
    /// Open the repository at `path` and read from `revision` (a branch,
    /// tag or commit)
    pub fn open(path: impl AsRef<Path>, revision: impl Into<String>) -> Result<Self> {
        let repo = Repository::open(path.as_ref())?;
        let revision = revision.into();
        // fail now rather than on the first read
        repo.revparse_single(&revision)?;
        Ok(Self { repo, revision })
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The commit the revision currently resolves to
    pub fn commit_id(&self) -> Result<String> {
        let commit = self.repo.revparse_single(&self.revision)?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }
}

impl ContextSource for GitSource {
    fn method(&self) -> SourceMethod {
        SourceMethod::Git
    }

    fn describe(&self) -> String {
        let root = self.repo.workdir().unwrap_or_else(|| self.repo.path());
        format!("{}@{}", root.display(), self.revision)
    }

    fn read(&self, path: &str) -> Result<String> {
        let spec = format!("{}:{}", self.revision, relative(path));
        let blob = self.repo.revparse_single(&spec)?.peel_to_blob()?;
        String::from_utf8(blob.content().to_vec())
            .map_err(|_| GraphError::InvalidFormat(format!("{} is not valid UTF-8", spec)))
    }
}

fn relative(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// A section whose file could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFailure {
    pub section: String,
    pub file: String,
    pub message: String,
}

/// Outcome of loading one context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub schema: String,
    /// Entities read per file-backed section, in section order
    pub sections: Vec<(String, usize)>,
    pub indexing_errors: Vec<IndexingError>,
    pub failures: Vec<SectionFailure>,
    /// SHA-256 over the context and every section file read
    pub bundle_hash: String,
}

impl LoadReport {
    /// Whether everything read and indexed cleanly
    pub fn is_clean(&self) -> bool {
        self.indexing_errors.is_empty() && self.failures.is_empty()
    }
}

/// Load the context `context_file` from `source` as `schema_name`
pub fn load_context(
    graph: &mut CurriculumGraph,
    schema_name: &str,
    source: &dyn ContextSource,
    context_file: &str,
) -> Result<LoadReport> {
    graph.set_source(
        schema_name,
        SourceInfo {
            method: source.method(),
            location: format!("{}/{}", source.describe(), relative(context_file)),
            state: SourceState::Loading,
        },
    );

    let result = load_sections(graph, schema_name, source, context_file);
    if let Some(info) = graph.source_mut(schema_name) {
        info.state = if result.is_ok() {
            SourceState::Available
        } else {
            SourceState::Failed
        };
    }
    result
}

fn load_sections(
    graph: &mut CurriculumGraph,
    schema_name: &str,
    source: &dyn ContextSource,
    context_file: &str,
) -> Result<LoadReport> {
    let mut hasher = Sha256::new();

    let content = source.read(context_file)?;
    hasher.update(content.as_bytes());
    let json: Value = serde_json::from_str(&content).map_err(|e| {
        GraphError::InvalidFormat(format!("JSON parse error in {}: {}", schema_name, e))
    })?;
    let schema = ContextSchema::from_json(schema_name, &json)?;

    let mut loaded: Vec<(String, Vec<Value>)> = Vec::new();
    let mut failures = Vec::new();

    for section in schema.sections() {
        let Some(file) = section.file.as_deref() else {
            if section.name != DEPRECATED_SECTION {
                warn!(schema = schema_name, section = %section.name, "no entities defined for section");
            }
            continue;
        };

        let entities = source.read(file).and_then(|content| {
            hasher.update(content.as_bytes());
            serde_json::from_str::<Vec<Value>>(&content).map_err(GraphError::from)
        });
        match entities {
            Ok(entities) => loaded.push((section.name.clone(), entities)),
            Err(e) => {
                warn!(schema = schema_name, section = %section.name, file, error = %e, "could not load section");
                failures.push(SectionFailure {
                    section: section.name.clone(),
                    file: file.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    graph.register_schema(schema);
    let sections = loaded
        .iter()
        .map(|(name, entities)| (name.clone(), entities.len()))
        .collect();
    let indexing_errors = graph.index_entities(loaded, schema_name);
    let bundle_hash = format!("{:x}", hasher.finalize());

    info!(
        schema = schema_name,
        entities = graph.len(),
        failures = failures.len(),
        errors = indexing_errors.len(),
        "loaded context"
    );

    Ok(LoadReport {
        schema: schema_name.to_string(),
        sections,
        indexing_errors,
        failures,
        bundle_hash,
    })
}

impl CurriculumGraph {
    /// Load a context from a `context.json` path on disk; section files are
    /// resolved relative to its directory
    pub fn load_from_file(&mut self, schema_name: &str, context_path: impl AsRef<Path>) -> Result<LoadReport> {
        let context_path = context_path.as_ref();
        let root = context_path.parent().unwrap_or_else(|| Path::new("."));
        let file = context_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                GraphError::InvalidFormat(format!("not a context file: {}", context_path.display()))
            })?;
        load_context(self, schema_name, &FileSource::new(root), file)
    }

    /// Load a context from `revision` of the Git repository at `repo_path`
    pub fn load_from_git(
        &mut self,
        schema_name: &str,
        repo_path: impl AsRef<Path>,
        revision: &str,
        context_file: &str,
    ) -> Result<LoadReport> {
        let source = GitSource::open(repo_path, revision)?;
        load_context(self, schema_name, &source, context_file)
    }
}
