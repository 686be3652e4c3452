//! Configuration management for the curriculum graph
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (curriculum.toml)
//! - Environment variables (CURRICULUM__*)
//!
//! ## Example config file (curriculum.toml):
//! ```toml
//! [graph]
//! deprecated_pattern = "deprecated"
//! scrub_outgoing = "always"
//!
//! [source]
//! context_file = "context.json"
//! default_branch = "master"
//!
//! [export]
//! output_format = "pretty"
//! indent = "\t"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurriculumConfig {
    /// Mutation engine settings
    #[serde(default)]
    pub graph: GraphSettings,

    /// Where contexts are read from
    #[serde(default)]
    pub source: SourceConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,
}

/// Mutation engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Sections whose name matches this regex are loaded as deprecated
    #[serde(default = "default_deprecated_pattern")]
    pub deprecated_pattern: String,

    /// When a replaced entity's own outgoing edges leave the reference index
    #[serde(default)]
    pub scrub_outgoing: ScrubPolicy,
}

/// Cleanup of a replaced entity's outgoing reference edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrubPolicy {
    /// Always remove them, released or draft
    #[default]
    Always,
    /// Only when the replaced entity was released
    ReleasedOnly,
}

/// Source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Name of the context schema file at the source root
    #[serde(default = "default_context_file")]
    pub context_file: String,

    /// Branch read from Git sources when none is given
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output format (pretty or compact)
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Indentation for pretty output
    #[serde(default = "default_indent")]
    pub indent: String,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

// Default value functions
fn default_deprecated_pattern() -> String {
    "deprecated".to_string()
}

fn default_context_file() -> String {
    "context.json".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_indent() -> String {
    "\t".to_string()
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            deprecated_pattern: default_deprecated_pattern(),
            scrub_outgoing: ScrubPolicy::Always,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            context_file: default_context_file(),
            default_branch: default_branch(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Pretty,
            indent: default_indent(),
        }
    }
}

impl CurriculumConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "curriculum.toml",
            ".curriculum.toml",
            "config/curriculum.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "curriculum", "curriculum-graph") {
            let xdg_config = config_dir.config_dir().join("curriculum.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // CURRICULUM__GRAPH__SCRUB_OUTGOING=released_only
        builder = builder.add_source(
            Environment::with_prefix("CURRICULUM")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
