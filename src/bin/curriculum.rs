//! Curriculum Graph CLI
//!
//! Loads a context from disk or from a Git revision and inspects or edits it.
//!
//! Usage:
//!   curriculum --context data/context.json check
//!   curriculum --git ./curriculum-repo --branch main refs <id> --depth 2
//!   curriculum --context data/context.json replace <id> --by <id> --out ./out

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use curriculum_graph::{
    export_schema, validate_schema, CurriculumConfig, CurriculumGraph, LoadReport, Patch,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "curriculum")]
#[command(about = "Inspect and edit a curriculum entity graph")]
struct Cli {
    /// Schema name the context is loaded as
    #[arg(short, long, default_value = "curriculum")]
    schema: String,

    /// Path to the context file on disk
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Load from this Git repository instead of the working tree
    #[arg(long)]
    git: Option<PathBuf>,

    /// Branch or revision to read from --git (default from config)
    #[arg(short, long)]
    branch: Option<String>,

    /// Explicit config file
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the context and report indexing errors and failed sections
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List released entities with rewritten references
    Dirty,

    /// Show what references an entity
    Refs {
        id: String,
        /// Follow referrers transitively up to this depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Deprecate an entity, optionally naming its successor, and export
    Replace {
        id: String,
        /// Successor id
        #[arg(long)]
        by: Option<String>,
        /// Export directory
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Apply a JSON patch file to an entity and export
    Update {
        section: String,
        id: String,
        /// File holding a list of patch ops
        #[arg(short, long)]
        patch: PathBuf,
        /// Export directory
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Write every file-backed section to a directory
    Export {
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Validate the data against the context JSON Schema
    Validate,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CurriculumConfig::load_from(cli.config.as_deref()).context("loading config")?;
    let mut graph = CurriculumGraph::with_settings(&config.graph)?;

    let report = load(&cli, &config, &mut graph)?;

    match cli.command {
        Commands::Check { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if !report.is_clean() {
                std::process::exit(2);
            }
        }

        Commands::Dirty => {
            let dirty = graph.get_dirty();
            if dirty.is_empty() {
                println!("✅ No dirty entities");
            }
            for entity in dirty {
                let id = entity.id().unwrap_or("?");
                println!("  {} ({})", id, graph.section_of(id).unwrap_or("?"));
            }
        }

        Commands::Refs { id, depth } => {
            if !graph.contains(&id) {
                bail!("no entity with id {}", id);
            }
            for node in graph.dependents(&id, Some(depth.unwrap_or(1))) {
                let section = graph.section_of(&node.id).unwrap_or("?");
                println!("{}{} ({})", "  ".repeat(node.depth), node.id, section);
            }
        }

        Commands::Replace { id, by, out } => {
            graph.replace(&id, by.as_deref())?;
            println!("✅ Replaced {} by {}", id, by.as_deref().unwrap_or("nothing"));
            export(&graph, &cli.schema, &out, &config)?;
        }

        Commands::Update { section, id, patch, out } => {
            let content = std::fs::read_to_string(&patch)
                .with_context(|| format!("reading patch {}", patch.display()))?;
            let patch: Patch = serde_json::from_str(&content)?;
            let result = graph.update(&section, &id, &patch)?;
            if result == id {
                println!("✅ Updated draft {}", id);
            } else {
                println!("✅ Released {} forked as {}", id, result);
            }
            export(&graph, &cli.schema, &out, &config)?;
        }

        Commands::Export { out } => {
            export(&graph, &cli.schema, &out, &config)?;
        }

        Commands::Validate => {
            let issues = validate_schema(&graph, &cli.schema)?;
            if issues.is_empty() {
                println!("✅ {} is valid", cli.schema);
            } else {
                for issue in &issues {
                    println!("  {}: {}", issue.instance_path, issue.message);
                }
                eprintln!("\n❌ {} validation issue(s)", issues.len());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load(cli: &Cli, config: &CurriculumConfig, graph: &mut CurriculumGraph) -> anyhow::Result<LoadReport> {
    let report = match (&cli.git, &cli.context) {
        (Some(repo), context) => {
            let branch = cli.branch.as_deref().unwrap_or(&config.source.default_branch);
            let context_file = context
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| config.source.context_file.clone());
            graph
                .load_from_git(&cli.schema, repo, branch, &context_file)
                .with_context(|| format!("loading {} from {}@{}", context_file, repo.display(), branch))?
        }
        (None, Some(context)) => graph
            .load_from_file(&cli.schema, context)
            .with_context(|| format!("loading {}", context.display()))?,
        (None, None) => {
            let context = PathBuf::from(&config.source.context_file);
            graph
                .load_from_file(&cli.schema, &context)
                .with_context(|| format!("loading {}", context.display()))?
        }
    };
    Ok(report)
}

fn export(graph: &CurriculumGraph, schema: &str, out: &Path, config: &CurriculumConfig) -> anyhow::Result<()> {
    let written = export_schema(graph, schema, out, &config.export)?;
    for path in &written {
        println!("  📝 {}", path.display());
    }
    Ok(())
}

fn print_report(report: &LoadReport) {
    println!("📦 {} ({})", report.schema, &report.bundle_hash[..12.min(report.bundle_hash.len())]);
    for (section, count) in &report.sections {
        println!("  {}: {}", section, count);
    }
    for failure in &report.failures {
        println!("  ⚠️  {} ({}): {}", failure.section, failure.file, failure.message);
    }
    for error in &report.indexing_errors {
        println!("  ❌ {}", error);
    }
    if report.is_clean() {
        println!("✅ No errors");
    }
}
