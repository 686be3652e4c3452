//! End-to-end tests: load the fixture context, mutate, export, reload.

use std::path::{Path, PathBuf};

use curriculum_graph::entity::DEPRECATED_SECTION;
use curriculum_graph::{
    export_schema, validate_schema, CurriculumGraph, Entity, ExportConfig, GraphError, Patch,
};
use serde_json::json;

const L1: &str = "0f1e2d3c-4b5a-4968-8776-a5b4c3d2e101";
const L2: &str = "0f1e2d3c-4b5a-4968-8776-a5b4c3d2e102";
const L3: &str = "0f1e2d3c-4b5a-4968-8776-a5b4c3d2e103";
const G1: &str = "5bb6d3a1-8b7b-4a49-9b3c-6f0a1c2d3e01";
const G2: &str = "5bb6d3a1-8b7b-4a49-9b3c-6f0a1c2d3e02";

fn context_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/context.json")
}

fn load() -> CurriculumGraph {
    let mut graph = CurriculumGraph::new();
    let report = graph.load_from_file("c", context_path()).unwrap();
    assert!(report.is_clean(), "fixture should load cleanly: {:?}", report);
    graph
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_fixture() {
    let graph = load();
    assert_eq!(graph.section_entities("c", "goal").len(), 2);
    assert_eq!(graph.section_entities("c", "level").len(), 3);
    assert!(graph.section_entities("c", DEPRECATED_SECTION).is_empty());
    assert_eq!(graph.referrers(L1), [G1, G2]);
    assert_eq!(graph.referrers(L2), [G2]);
    assert_eq!(graph.parent_sections("level"), vec!["goal".to_string()]);
}

#[test]
fn test_fixture_validates() {
    let graph = load();
    assert!(validate_schema(&graph, "c").unwrap().is_empty());
}

// =============================================================================
// Mutations
// =============================================================================

#[test]
fn test_replace_released_level() {
    let mut graph = load();
    graph.replace(L1, Some(L3)).unwrap();

    let old = graph.get(L1).unwrap();
    assert_eq!(old.replaced_by(), vec![L3]);
    assert_eq!(old.types(), vec!["level"]);
    assert!(graph.is_deprecated(L1));
    assert_eq!(graph.section_of(L1), Some(DEPRECATED_SECTION));
    assert_eq!(graph.get(L3).unwrap().replaces(), vec![L1]);

    let g1 = graph.get(G1).unwrap();
    assert_eq!(g1.get("level_id"), Some(&json!([L3])));
    assert!(g1.is_dirty());
    let g2 = graph.get(G2).unwrap();
    assert_eq!(g2.get("level_id"), Some(&json!([L3, L2])));

    assert!(graph.referrers(L1).is_empty());
    assert_eq!(graph.referrers(L3), [G1, G2]);
    assert_eq!(graph.get_dirty().len(), 2);
}

#[test]
fn test_replace_twice_is_rejected() {
    let mut graph = load();
    graph.replace(L1, Some(L3)).unwrap();
    assert!(matches!(
        graph.replace(L1, Some(L2)),
        Err(GraphError::AlreadyDeprecated { .. })
    ));
}

#[test]
fn test_edit_released_goal_then_draft() {
    let mut graph = load();

    let fork = graph
        .update("goal", G1, &Patch::new().set("title", "Reads longer texts"))
        .unwrap();
    assert_ne!(fork, G1);
    assert!(graph.is_deprecated(G1));
    assert_eq!(graph.referrers(L1), [G2.to_string(), fork.clone()]);

    // editing the fork again stays on the same draft
    let again = graph
        .update("goal", &fork, &Patch::new().set("level_id", json!([L2])))
        .unwrap();
    assert_eq!(again, fork);
    assert!(!graph.referrers(L1).contains(&fork));
    assert!(graph.referrers(L2).contains(&fork));
}

#[test]
fn test_add_then_replace_draft() {
    let mut graph = load();
    let draft = graph
        .add("c", "level", Entity::new().with("title", "Level 0"))
        .unwrap();
    let goal = graph
        .add(
            "c",
            "goal",
            Entity::new().with("title", "Listens").with("level_id", json!([draft.clone()])),
        )
        .unwrap();

    graph.replace(&draft, Some(L1)).unwrap();
    assert!(graph.get(&draft).unwrap().is_deleted());
    assert_eq!(graph.get(&goal).unwrap().get("level_id"), Some(&json!([L1])));
    assert!(graph.get_dirty().is_empty());
}

// =============================================================================
// Export round trip
// =============================================================================

#[test]
fn test_export_and_reload() {
    let mut graph = load();
    graph.replace(L1, Some(L3)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    // export needs the context next to the data to reload it
    std::fs::copy(context_path(), dir.path().join("context.json")).unwrap();
    let written = export_schema(&graph, "c", dir.path(), &ExportConfig::default()).unwrap();
    assert_eq!(written.len(), 3);

    let deprecated = std::fs::read_to_string(dir.path().join("data/deprecated.json")).unwrap();
    assert!(deprecated.contains(&format!("\t\t\"id\": \"{}\"", L1)));

    let mut reloaded = CurriculumGraph::new();
    let report = reloaded
        .load_from_file("c", dir.path().join("context.json"))
        .unwrap();
    assert!(report.is_clean());
    assert!(reloaded.is_deprecated(L1));
    assert_eq!(reloaded.section_entities("c", "level").len(), 2);
    assert_eq!(reloaded.referrers(L3), [G1, G2]);
    assert_eq!(reloaded.get_dirty().len(), 2);
    assert!(validate_schema(&reloaded, "c").unwrap().is_empty());
}

// =============================================================================
// Doel / niveau walkthrough
// =============================================================================

fn doel_niveau() -> CurriculumGraph {
    let mut graph = CurriculumGraph::new();
    let errors = graph.index_entities(
        vec![
            (
                "niveau".to_string(),
                vec![json!({ "id": "n1", "title": "Niveau 1" }), json!({ "id": "n2", "title": "Niveau 2" })],
            ),
            (
                "doel".to_string(),
                vec![json!({ "id": "d1", "title": "Doel 1", "niveau_id": ["n1"] })],
            ),
        ],
        "c",
    );
    assert!(errors.is_empty());
    graph
}

#[test]
fn test_doel_niveau_replace_rewires_and_marks_dirty() {
    let mut graph = doel_niveau();
    assert_eq!(graph.referrers("n1"), ["d1"]);

    let clone = graph
        .add("c", "niveau", Entity::new().with("title", "Niveau 1 (nieuw)"))
        .unwrap();
    assert!(graph.get(&clone).unwrap().is_unreleased());

    graph.replace("n1", Some(&clone)).unwrap();

    let doel = graph.get("d1").unwrap();
    assert_eq!(doel.get("niveau_id"), Some(&json!([clone.clone()])));
    assert!(doel.is_dirty());
    assert_eq!(graph.get("n1").unwrap().replaced_by(), vec![clone.as_str()]);
    assert_eq!(graph.get(&clone).unwrap().replaces(), vec!["n1"]);
    assert_eq!(graph.section_of("n1"), Some(DEPRECATED_SECTION));
    assert_eq!(graph.referrers(&clone), ["d1"]);

    assert!(matches!(
        graph.replace("n1", Some("n2")),
        Err(GraphError::AlreadyDeprecated { .. })
    ));
    assert!(matches!(
        graph.add("c", DEPRECATED_SECTION, Entity::new()),
        Err(GraphError::DeprecatedSectionWrite)
    ));
}

#[test]
fn test_doel_niveau_draft_and_released_update() {
    let mut graph = doel_niveau();
    let patch = Patch::new().set("title", "Niveau 2 (herzien)");

    let draft = graph
        .add("c", "niveau", Entity::new().with("title", "Concept"))
        .unwrap();
    assert_eq!(graph.update("niveau", &draft, &patch).unwrap(), draft);
    assert!(!graph.get(&draft).unwrap().is_dirty());

    let fork = graph.update("niveau", "n2", &patch).unwrap();
    assert_ne!(fork, "n2");
    assert_eq!(graph.get("n2").unwrap().replaced_by(), vec![fork.as_str()]);
    assert!(graph.is_deprecated("n2"));
}
