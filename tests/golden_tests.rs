//! Golden Tests for Schema Insight
//!
//! End-to-end behavior over the fixtures in `tests/fixtures`: indexing,
//! search, introspection, query analysis and field usage.

use std::sync::Arc;
use std::thread;

use graphql_insight::graph::{TypeKind, parse_type_ref};
use graphql_insight::query::IssueType;
use graphql_insight::{InsightConfig, LoadConfig, SchemaInsight, SchemaStore, index_schema};

const CLINIC: &str = include_str!("fixtures/clinic.graphql");
const NESTED_LIST: &str = include_str!("fixtures/nested_list.graphql");
const BROKEN: &str = include_str!("fixtures/broken.graphql");

const PATIENT_SDL: &str = "type Patient { id: ID! name: String appointments: [Appointment!] }";

fn insight_with(sdl: &str) -> SchemaInsight {
    let insight = SchemaInsight::new(InsightConfig::default()).unwrap();
    insight.load_schema(sdl, "test").unwrap();
    insight
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_search_single_line_type() {
    let insight = insight_with(PATIENT_SDL);
    let response = insight.search("Patient", "type", Some(2)).unwrap();
    assert_eq!(response.total_matches, 1);
    assert!(response.matches[0].content.contains("type Patient"));
}

#[test]
fn test_analyze_nested_list_query() {
    let insight = SchemaInsight::new(InsightConfig::default()).unwrap();
    let report = insight.analyze("{ patients { id appointments { id provider { id } } } }", true);

    assert_eq!(report.depth, 4);
    assert!(report
        .issues
        .iter()
        .any(|i| i.issue_type == IssueType::NPlusOne && i.field == "appointments"));
    assert!(report
        .issues
        .iter()
        .any(|i| i.issue_type == IssueType::MissingPagination && i.field == "patients"));
}

#[test]
fn test_introspect_has_many() {
    let insight = insight_with(PATIENT_SDL);
    let detail = insight.introspect("Patient", true, false).unwrap();
    let relationships = detail.relationships.unwrap();
    assert!(relationships.has_many.contains(&"appointments".to_string()));
}

#[test]
fn test_field_usage_percentages() {
    let insight = SchemaInsight::new(InsightConfig::default()).unwrap();
    let queries = [
        "{ patient { id firstName } }",
        "{ patient { id firstName lastName email } }",
    ];
    let report = insight.field_usage("patient", &queries, None, true).unwrap();

    let pct = |field: &str| {
        report
            .field_statistics
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.usage_percentage)
            .unwrap()
    };
    assert_eq!(pct("firstName"), 100.0);
    assert_eq!(pct("email"), 50.0);
    assert_eq!(pct("lastName"), 50.0);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_indexing_is_idempotent() {
    let first = index_schema(CLINIC, &LoadConfig::default()).unwrap();
    let second = index_schema(CLINIC, &LoadConfig::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_search_hits_always_introspect() {
    let insight = insight_with(CLINIC);
    for term in ["a", "e", "i", "o", "t", "Patient", "status"] {
        let response = insight.search(term, "type", Some(0)).unwrap();
        for m in &response.matches {
            let name = m.name.as_deref().unwrap();
            assert!(
                insight.introspect(name, true, true).is_ok(),
                "search returned '{}' but introspection failed",
                name
            );
        }
    }
}

#[test]
fn test_exact_type_name_is_always_found() {
    let insight = insight_with(CLINIC);
    let schema = index_schema(CLINIC, &LoadConfig::default()).unwrap();
    for name in schema.graph.type_names() {
        let response = insight.search(name, "type", Some(0)).unwrap();
        assert!(
            response.matches.iter().any(|m| m.name.as_deref() == Some(name.as_str())),
            "type {} not found by exact search",
            name
        );
    }
}

#[test]
fn test_uniform_nesting_depth() {
    let insight = SchemaInsight::new(InsightConfig::default()).unwrap();
    for k in 1..=8 {
        // { f0 { f1 { ... f(k-1) } } }
        let mut selection = format!("f{}", k - 1);
        for level in (0..k - 1).rev() {
            selection = format!("f{} {{ {} }}", level, selection);
        }
        let query = format!("{{ {} }}", selection);

        let report = insight.analyze(&query, false);
        assert!(report.error.is_none(), "{:?} for {}", report.error, query);
        assert_eq!(report.depth, k, "query {}", query);
    }
}

#[test]
fn test_type_refs_round_trip() {
    let insight = insight_with(CLINIC);
    let schema = index_schema(CLINIC, &LoadConfig::default()).unwrap();
    for def in schema.graph.all_types() {
        let detail = insight.introspect(&def.name, false, true).unwrap();
        for field in &detail.fields {
            let reparsed = parse_type_ref(&field.ty).unwrap();
            let original = &schema.graph.field(&def.name, &field.name).unwrap().ty;
            assert_eq!(&reparsed, original);
            assert_eq!(reparsed.to_string(), field.ty);
        }
    }
}

#[test]
fn test_adding_high_severity_issues_never_raises_score() {
    let insight = SchemaInsight::new(InsightConfig::default()).unwrap();
    let paginated = insight.analyze("{ items(first: 5) { id } }", false);
    let unpaginated = insight.analyze("{ items { id } }", false);
    assert!(unpaginated.overall_score <= paginated.overall_score);
}

// =============================================================================
// Clinic Fixture
// =============================================================================

#[test]
fn test_clinic_schema_shape() {
    let schema = index_schema(CLINIC, &LoadConfig::default()).unwrap();
    let graph = &schema.graph;

    assert_eq!(graph.get("HistoryEntry").unwrap().possible_types, vec!["Appointment", "Note"]);
    assert_eq!(graph.get("Patient").unwrap().interfaces, vec!["Node"]);
    assert_eq!(graph.get("BookAppointmentInput").unwrap().kind, TypeKind::InputObject);
    assert!(graph.field("Provider", "rating").is_some());

    let no_show = graph
        .get("AppointmentStatus")
        .unwrap()
        .enum_values
        .iter()
        .find(|v| v.name == "NO_SHOW")
        .unwrap();
    assert_eq!(no_show.deprecation_reason.as_deref(), Some("No longer supported"));
    assert!(graph.scc_count() >= 1);
}

#[test]
fn test_clinic_introspection() {
    let insight = insight_with(CLINIC);
    let patient = insight.introspect("patient", true, false).unwrap();
    assert_eq!(patient.description.as_deref(), Some("A person receiving care."));
    assert!(patient.fields.iter().all(|f| f.name != "ssn"));

    let rels = patient.relationships.unwrap();
    assert_eq!(rels.has_one, vec!["primaryProvider"]);
    assert_eq!(rels.has_many, vec!["appointments", "fullMedicalHistory"]);

    let node = insight.introspect("Node", false, false).unwrap();
    assert!(node.referenced_by.contains(&"Patient".to_string()));
    assert!(node.referenced_by.contains(&"Query".to_string()));
}

#[test]
fn test_clinic_search_filters() {
    let insight = insight_with(CLINIC);

    let mutations = insight.search("appointment", "mutation", Some(0)).unwrap();
    let names: Vec<_> = mutations.matches.iter().filter_map(|m| m.name.as_deref()).collect();
    assert_eq!(names, vec!["bookAppointment", "cancelAppointment"]);

    let enums = insight.search("cardio", "enum", Some(0)).unwrap();
    assert_eq!(enums.total_matches, 1);

    let text = insight.search("receiving care", "any", Some(1)).unwrap();
    assert_eq!(text.total_matches, 1);
    assert_eq!(text.matches[0].context.len(), 3);
}

#[test]
fn test_schema_aware_analysis() {
    let insight = insight_with(CLINIC);
    let report = insight.analyze(NESTED_LIST, true);
    assert!(report.schema_aware);
    assert_eq!(report.depth, 4);
    assert!(report
        .issues
        .iter()
        .any(|i| i.issue_type == IssueType::MissingPagination && i.location == "patients"));
    assert!(report
        .issues
        .iter()
        .any(|i| i.issue_type == IssueType::NPlusOne && i.location == "patients.appointments"));

    let query = "{ patient(id: 1) { fullMedicalHistory { ... on Note { text } } } }";
    let expensive = insight.analyze(query, true);
    assert!(expensive
        .issues
        .iter()
        .any(|i| i.issue_type == IssueType::ExpensiveField && i.field == "fullMedicalHistory"));
}

#[test]
fn test_broken_query_partial_report() {
    let insight = insight_with(CLINIC);
    let report = insight.analyze(BROKEN, true);
    let error = report.error.expect("parse error expected");
    assert_eq!((error.line, error.column), (Some(4), Some(27)));
    assert_eq!(report.depth, 2);
    assert_eq!(report.field_count, 3);
}

#[test]
fn test_pathological_nesting_is_a_parse_error() {
    let insight = insight_with(CLINIC);
    for n in [1_000, 50_000] {
        let query = "{ a ".repeat(n) + &"}".repeat(n);
        let report = insight.analyze(&query, false);
        let error = report.error.expect("nesting error expected");
        assert_eq!(error.line, Some(1));
        assert_eq!(report.depth, 128);
    }

    let sdl = format!("type Query {{ grid: {}Int{} }}", "[".repeat(10_000), "]".repeat(10_000));
    assert!(insight.load_schema(&sdl, "deep").is_err());
    assert_eq!(insight.store().snapshot().unwrap().version, "test");
}

// =============================================================================
// Snapshot Swap
// =============================================================================

#[test]
fn test_readers_never_see_partial_snapshot() {
    let store = Arc::new(SchemaStore::default());
    store.publish(PATIENT_SDL, "v1").unwrap();
    let v1_types = store.snapshot().unwrap().schema.graph.type_count();
    let v2_types = index_schema(CLINIC, &LoadConfig::default()).unwrap().graph.type_count();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = store.snapshot().unwrap();
                    let count = snapshot.schema.graph.type_count();
                    let expected = if snapshot.version == "v1" { v1_types } else { v2_types };
                    assert_eq!(count, expected);
                }
            })
        })
        .collect();

    store.publish(CLINIC, "v2").unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.snapshot().unwrap().version, "v2");
}
