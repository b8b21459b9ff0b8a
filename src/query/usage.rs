//! Field usage aggregation
//!
//! Counts, across a batch of queries, how often each field path under one
//! root field is selected. Counts are per query: a path selected twice in
//! the same query counts once. Fragment spreads are expanded one level from
//! the fragments defined in the same document.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{QueryDocument, SelectionKind, SelectionNode};
use crate::graph::{TypeDefinition, TypeGraph, to_pascal_case};

/// Spread expansion depth
const FRAGMENT_EXPANSION: usize = 1;

/// Usage of one field path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistic {
    /// Dot-joined path below the root field, e.g. `appointments.provider`
    pub field: String,
    pub usage_count: usize,
    /// `usage_count / queries touching the root * 100`, in `[0, 100]`
    pub usage_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverfetchingAnalysis {
    /// Selected by every query that touches the root
    pub always_used: Vec<String>,
    /// Top-level fields of the root type that no query selected
    pub never_used_in_batch: Vec<String>,
    /// Selected by some queries, at or below the threshold
    pub overfetching: Vec<FieldStatistic>,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ExtractFragment,
    ReviewRarelyUsed,
    UnusedSchemaFields,
}

/// Ranked advice; lower rank comes first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub rank: usize,
    pub kind: RecommendationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUsageReport {
    pub field_name: String,
    pub total_queries: usize,
    pub queries_touching_field: usize,
    pub parse_failures: usize,
    /// Sorted by usage, most used first
    pub field_statistics: Vec<FieldStatistic>,
    pub overfetching_analysis: OverfetchingAnalysis,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
}

/// Accumulates usage for one root field
#[derive(Debug, Clone)]
pub struct FieldUsageTracker {
    root_field: String,
    total_queries: usize,
    touching: usize,
    parse_failures: usize,
    counts: BTreeMap<String, usize>,
}

impl FieldUsageTracker {
    pub fn new(root_field: impl Into<String>) -> Self {
        Self {
            root_field: root_field.into(),
            total_queries: 0,
            touching: 0,
            parse_failures: 0,
            counts: BTreeMap::new(),
        }
    }

    pub fn queries_touching_root(&self) -> usize {
        self.touching
    }

    /// Record a query whose text did not parse cleanly
    pub fn record_parse_failure(&mut self) {
        self.parse_failures += 1;
    }

    /// Add one query; returns whether it selects the root field
    pub fn ingest(&mut self, document: &QueryDocument) -> bool {
        self.total_queries += 1;

        let mut roots = Vec::new();
        for operation in &document.operations {
            find_roots(&operation.selections, document, &self.root_field, FRAGMENT_EXPANSION, &mut roots);
        }
        if roots.is_empty() {
            return false;
        }

        let mut paths = BTreeSet::new();
        for root in roots {
            collect_paths(&root.children, document, "", FRAGMENT_EXPANSION, &mut paths);
        }

        self.touching += 1;
        for path in paths {
            *self.counts.entry(path).or_default() += 1;
        }
        true
    }

    pub fn statistics(&self) -> Vec<FieldStatistic> {
        let mut stats: Vec<FieldStatistic> = self
            .counts
            .iter()
            .map(|(field, &count)| FieldStatistic {
                field: field.clone(),
                usage_count: count,
                usage_percentage: percentage(count, self.touching),
            })
            .collect();
        stats.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.field.cmp(&b.field)));
        stats
    }

    /// Build the report. `schema` enables `never_used_in_batch`.
    pub fn report(
        &self,
        schema: Option<&TypeGraph>,
        overfetch_threshold: f64,
        include_recommendations: bool,
    ) -> FieldUsageReport {
        let statistics = self.statistics();

        let always_used: Vec<String> = statistics
            .iter()
            .filter(|s| s.usage_count == self.touching)
            .map(|s| s.field.clone())
            .collect();

        let overfetching: Vec<FieldStatistic> = statistics
            .iter()
            .filter(|s| {
                s.usage_count > 0
                    && s.usage_count < self.touching
                    && s.usage_percentage <= overfetch_threshold
            })
            .cloned()
            .collect();

        let root_type = schema.and_then(|graph| root_field_type(graph, &self.root_field));
        let never_used_in_batch: Vec<String> = root_type
            .map(|def| {
                def.fields
                    .iter()
                    .filter(|f| !self.counts.contains_key(&f.name))
                    .map(|f| f.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        let analysis = OverfetchingAnalysis {
            always_used,
            never_used_in_batch,
            overfetching,
            threshold: overfetch_threshold,
        };

        let recommendations = if include_recommendations {
            let type_name = root_type
                .map(|def| def.name.clone())
                .unwrap_or_else(|| to_pascal_case(&self.root_field));
            self.recommendations(&analysis, &type_name)
        } else {
            Vec::new()
        };

        debug!(
            field = %self.root_field,
            queries = self.total_queries,
            touching = self.touching,
            paths = statistics.len(),
            "field usage report"
        );

        FieldUsageReport {
            field_name: self.root_field.clone(),
            total_queries: self.total_queries,
            queries_touching_field: self.touching,
            parse_failures: self.parse_failures,
            field_statistics: statistics,
            overfetching_analysis: analysis,
            recommendations,
            time_range: None,
        }
    }

    fn recommendations(&self, analysis: &OverfetchingAnalysis, type_name: &str) -> Vec<Recommendation> {
        let mut out = Vec::new();

        if self.touching >= 2 && !analysis.always_used.is_empty() {
            let fragment_name = format!("{}Core", type_name);
            let fragment = format!(
                "fragment {} on {} {}",
                fragment_name,
                type_name,
                render_selection(&analysis.always_used)
            );
            out.push(Recommendation {
                rank: 0,
                kind: RecommendationKind::ExtractFragment,
                message: format!(
                    "Every query selects the same {} field(s) of '{}'; extract them into fragment {}",
                    analysis.always_used.len(),
                    self.root_field,
                    fragment_name
                ),
                fragment: Some(fragment),
            });
        }

        if !analysis.overfetching.is_empty() {
            let fields: Vec<String> = analysis
                .overfetching
                .iter()
                .map(|s| format!("{} ({:.0}%)", s.field, s.usage_percentage))
                .collect();
            out.push(Recommendation {
                rank: 0,
                kind: RecommendationKind::ReviewRarelyUsed,
                message: format!(
                    "Review rarely used fields and request them only where needed: {}",
                    fields.join(", ")
                ),
                fragment: None,
            });
        }

        if !analysis.never_used_in_batch.is_empty() {
            out.push(Recommendation {
                rank: 0,
                kind: RecommendationKind::UnusedSchemaFields,
                message: format!(
                    "Schema fields never requested in this batch: {}",
                    analysis.never_used_in_batch.join(", ")
                ),
                fragment: None,
            });
        }

        for (rank, rec) in out.iter_mut().enumerate() {
            rec.rank = rank + 1;
        }
        out
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = count as f64 / total as f64 * 100.0;
    ((pct * 100.0).round() / 100.0).clamp(0.0, 100.0)
}

/// Return type of `root_field`, looked up on the query root first
fn root_field_type<'a>(graph: &'a TypeGraph, root_field: &str) -> Option<&'a TypeDefinition> {
    let field = graph
        .query_type()
        .and_then(|def| def.field(root_field))
        .or_else(|| graph.all_types().find_map(|def| def.field(root_field)))?;
    graph.get(field.ty.base_name())
}

/// Every selection named `root_field`, at any depth, not nested in another
fn find_roots<'a>(
    nodes: &'a [SelectionNode],
    document: &'a QueryDocument,
    root_field: &str,
    budget: usize,
    out: &mut Vec<&'a SelectionNode>,
) {
    for node in nodes {
        match &node.kind {
            SelectionKind::Field if node.field_name == root_field => out.push(node),
            SelectionKind::Field | SelectionKind::InlineFragment { .. } => {
                find_roots(&node.children, document, root_field, budget, out)
            }
            SelectionKind::FragmentSpread => {
                if let (true, Some(fragment)) = (budget > 0, document.fragment(&node.field_name)) {
                    find_roots(&fragment.selections, document, root_field, budget - 1, out);
                }
            }
        }
    }
}

fn collect_paths(
    nodes: &[SelectionNode],
    document: &QueryDocument,
    prefix: &str,
    budget: usize,
    out: &mut BTreeSet<String>,
) {
    for node in nodes {
        match &node.kind {
            SelectionKind::Field => {
                let path = if prefix.is_empty() {
                    node.field_name.clone()
                } else {
                    format!("{}.{}", prefix, node.field_name)
                };
                collect_paths(&node.children, document, &path, budget, out);
                out.insert(path);
            }
            SelectionKind::InlineFragment { .. } => {
                collect_paths(&node.children, document, prefix, budget, out)
            }
            SelectionKind::FragmentSpread => {
                if let (true, Some(fragment)) = (budget > 0, document.fragment(&node.field_name)) {
                    collect_paths(&fragment.selections, document, prefix, budget - 1, out);
                }
            }
        }
    }
}

/// Render dot-joined paths as a selection set: `a`, `b.c` -> `{ a b { c } }`
fn render_selection(paths: &[String]) -> String {
    #[derive(Default)]
    struct Tree(BTreeMap<String, Tree>);

    fn render(tree: &Tree) -> String {
        let parts: Vec<String> = tree
            .0
            .iter()
            .map(|(name, child)| {
                if child.0.is_empty() {
                    name.clone()
                } else {
                    format!("{} {}", name, render(child))
                }
            })
            .collect();
        format!("{{ {} }}", parts.join(" "))
    }

    let mut root = Tree::default();
    for path in paths {
        let mut node = &mut root;
        for segment in path.split('.') {
            node = node.0.entry(segment.to_string()).or_default();
        }
    }
    render(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LoadConfig, parse_schema};
    use crate::query::parse_query;

    fn tracker(root: &str, queries: &[&str]) -> FieldUsageTracker {
        let mut tracker = FieldUsageTracker::new(root);
        for query in queries {
            let parsed = parse_query(query);
            assert!(parsed.is_complete());
            tracker.ingest(&parsed.document);
        }
        tracker
    }

    fn pct(report: &FieldUsageReport, field: &str) -> f64 {
        report
            .field_statistics
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.usage_percentage)
            .unwrap()
    }

    #[test]
    fn test_usage_percentages() {
        let t = tracker(
            "patient",
            &[
                "{ patient { id firstName } }",
                "{ patient { id firstName lastName email } }",
            ],
        );
        let report = t.report(None, 50.0, true);
        assert_eq!(report.queries_touching_field, 2);
        assert_eq!(pct(&report, "firstName"), 100.0);
        assert_eq!(pct(&report, "email"), 50.0);
        assert_eq!(pct(&report, "lastName"), 50.0);
        assert_eq!(report.overfetching_analysis.always_used, vec!["firstName", "id"]);

        let overfetching: Vec<_> = report
            .overfetching_analysis
            .overfetching
            .iter()
            .map(|s| s.field.as_str())
            .collect();
        assert_eq!(overfetching, vec!["email", "lastName"]);
    }

    #[test]
    fn test_counts_once_per_query() {
        let t = tracker(
            "patient",
            &["{ a: patient(id: 1) { id } b: patient(id: 2) { id name } }", "{ patient { id } }"],
        );
        let report = t.report(None, 50.0, false);
        assert_eq!(pct(&report, "id"), 100.0);
        assert_eq!(pct(&report, "name"), 50.0);
        assert!(report.field_statistics.iter().all(|s| (0.0..=100.0).contains(&s.usage_percentage)));
    }

    #[test]
    fn test_nested_paths_and_fragments() {
        let t = tracker(
            "patient",
            &[
                "{ viewer { patient { ...Core appointments { provider { id } } } } }
                 fragment Core on Patient { id }",
                "{ patient { id } }",
                "{ other { id } }",
            ],
        );
        assert_eq!(t.queries_touching_root(), 2);
        let report = t.report(None, 50.0, false);
        assert_eq!(report.total_queries, 3);
        assert_eq!(pct(&report, "id"), 100.0);
        assert_eq!(pct(&report, "appointments.provider.id"), 50.0);
    }

    #[test]
    fn test_never_used_requires_schema() {
        let graph = parse_schema(
            "type Query { patient: Patient } type Patient { id: ID firstName: String ssn: String }",
            &LoadConfig::default(),
        )
        .unwrap();
        let t = tracker("patient", &["{ patient { id firstName } }"]);

        assert!(t.report(None, 50.0, true).overfetching_analysis.never_used_in_batch.is_empty());
        let report = t.report(Some(&graph), 50.0, true);
        assert_eq!(report.overfetching_analysis.never_used_in_batch, vec!["ssn"]);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.kind == RecommendationKind::UnusedSchemaFields));
    }

    #[test]
    fn test_fragment_recommendation() {
        let t = tracker(
            "patient",
            &["{ patient { id name { given } } }", "{ patient { id name { given } email } }"],
        );
        let report = t.report(None, 50.0, true);
        let first = &report.recommendations[0];
        assert_eq!(first.rank, 1);
        assert_eq!(first.kind, RecommendationKind::ExtractFragment);
        assert_eq!(
            first.fragment.as_deref(),
            Some("fragment PatientCore on Patient { id name { given } }")
        );
        assert_eq!(report.recommendations[1].kind, RecommendationKind::ReviewRarelyUsed);
    }

    #[test]
    fn test_empty_batch() {
        let report = FieldUsageTracker::new("patient").report(None, 50.0, true);
        assert_eq!(report.queries_touching_field, 0);
        assert!(report.field_statistics.is_empty());
        assert!(report.recommendations.is_empty());
    }
}
