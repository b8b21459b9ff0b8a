//! Static query analysis
//!
//! Scores a client query by shape: nesting depth, distinct field count and
//! the issues raised by [`Heuristic`]s. With a type graph the walk resolves
//! field types from the operation's root type; without one (or for fields
//! the graph does not know) it falls back to name-based guesses.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::heuristics::{FieldShape, Heuristic, HeuristicRules, IssueType, SelectionSite};
use super::parser::parse_query_with_limit;
use super::{OperationKind, QueryDocument, SelectionKind, SelectionNode};
use crate::config::AnalyzerConfig;
use crate::error::{ErrorEntry, Result};
use crate::graph::TypeGraph;

const MAX_COMPLEXITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

/// A problem found at one selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_type: IssueType,
    pub severity: IssueSeverity,
    pub description: String,
    /// Dot-joined path of response names, e.g. `patients.appointments`
    pub location: String,
    pub field: String,
    pub line: usize,
    pub column: usize,
    pub suggestion: String,
    pub estimated_impact: String,
}

/// Result of analyzing one query text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// `100 - complexity_score`
    pub overall_score: u32,
    pub complexity_score: u32,
    pub depth: usize,
    pub field_count: usize,
    pub operation_count: usize,
    /// Field types were resolved against a schema
    pub schema_aware: bool,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub estimated_execution_time: String,
    /// Parse error; the report then covers the parsed prefix only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEntry>,
}

impl AnalysisReport {
    pub fn issues_of(&self, issue_type: IssueType) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.issue_type == issue_type)
    }

    pub fn count(&self, issue_type: IssueType) -> usize {
        self.issues_of(issue_type).count()
    }
}

/// `clip(fields + depth*5 + missing_pagination*10 + n_plus_one*15, 0, 100)`
pub fn complexity_score(
    field_count: usize,
    depth: usize,
    missing_pagination: usize,
    n_plus_one: usize,
) -> u32 {
    let raw = field_count + depth * 5 + missing_pagination * 10 + n_plus_one * 15;
    raw.min(MAX_COMPLEXITY) as u32
}

pub fn execution_time_bucket(complexity: u32) -> &'static str {
    match complexity {
        0..=19 => "very fast",
        20..=49 => "fast",
        50..=75 => "moderate",
        _ => "potentially slow",
    }
}

/// Stateless analyzer holding compiled heuristics
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    rules: HeuristicRules,
    max_nesting: usize,
}

impl QueryAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            rules: HeuristicRules::from_config(config)?,
            max_nesting: config.max_nesting,
        })
    }

    /// Parse and analyze `text`. Parse errors are reported in the result.
    pub fn analyze(
        &self,
        text: &str,
        schema: Option<&TypeGraph>,
        include_suggestions: bool,
    ) -> AnalysisReport {
        let parsed = parse_query_with_limit(text, self.max_nesting);
        let mut report = self.analyze_document(&parsed.document, schema, include_suggestions);
        report.error = parsed.error.as_ref().map(|e| e.to_entry());
        report
    }

    pub fn analyze_document(
        &self,
        document: &QueryDocument,
        schema: Option<&TypeGraph>,
        include_suggestions: bool,
    ) -> AnalysisReport {
        let mut issues = Vec::new();
        for operation in &document.operations {
            let root = schema.and_then(|graph| root_type(graph, operation.kind));
            let walk = Walk {
                rules: &self.rules,
                schema,
            };
            walk.selections(&operation.selections, root, 1, "", &mut issues);
        }

        let depth = document.depth();
        let field_count = document.field_names().len();
        let complexity = complexity_score(
            field_count,
            depth,
            issues.iter().filter(|i| i.issue_type == IssueType::MissingPagination).count(),
            issues.iter().filter(|i| i.issue_type == IssueType::NPlusOne).count(),
        );

        let suggestions = if include_suggestions {
            self.suggestions(document, &issues, complexity)
        } else {
            Vec::new()
        };

        debug!(
            depth,
            field_count,
            complexity,
            issues = issues.len(),
            schema_aware = schema.is_some(),
            "analyzed query"
        );

        AnalysisReport {
            overall_score: MAX_COMPLEXITY as u32 - complexity,
            complexity_score: complexity,
            depth,
            field_count,
            operation_count: document.operations.len(),
            schema_aware: schema.is_some(),
            issues,
            suggestions,
            estimated_execution_time: execution_time_bucket(complexity).to_string(),
            error: None,
        }
    }

    fn suggestions(&self, document: &QueryDocument, issues: &[Issue], complexity: u32) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for issue in issues {
            if !out.contains(&issue.suggestion) {
                out.push(issue.suggestion.clone());
            }
        }

        for spread in document.unresolved_spreads() {
            out.push(format!(
                "Fragment '{}' is not defined in this document; its selections were not analyzed",
                spread
            ));
        }

        if complexity > 75 {
            out.push(format!(
                "Complexity score is {}; consider splitting this query into smaller requests",
                complexity
            ));
        }
        out
    }
}

fn root_type(graph: &TypeGraph, kind: OperationKind) -> Option<&str> {
    let def = match kind {
        OperationKind::Query => graph.query_type(),
        OperationKind::Mutation => graph.mutation_type(),
        OperationKind::Subscription => graph.subscription_type(),
    };
    def.map(|d| d.name.as_str())
}

/// One traversal over a selection tree, evaluating every heuristic per field
struct Walk<'a> {
    rules: &'a HeuristicRules,
    schema: Option<&'a TypeGraph>,
}

impl<'a> Walk<'a> {
    fn selections(
        &self,
        nodes: &[SelectionNode],
        parent: Option<&str>,
        depth: usize,
        prefix: &str,
        issues: &mut Vec<Issue>,
    ) {
        for node in nodes {
            match &node.kind {
                SelectionKind::FragmentSpread => {}
                SelectionKind::InlineFragment { type_condition } => {
                    let parent = type_condition.as_deref().or(parent);
                    self.selections(&node.children, parent, depth, prefix, issues);
                }
                SelectionKind::Field => {
                    let shape = self.shape(node, parent);
                    let path = if prefix.is_empty() {
                        node.response_name().to_string()
                    } else {
                        format!("{}.{}", prefix, node.response_name())
                    };

                    let child_parent = shape.type_name.clone();
                    let nested_objects = node
                        .child_fields()
                        .into_iter()
                        .filter(|child| {
                            child.has_children() || {
                                let child_shape = self.shape(child, child_parent.as_deref());
                                child_shape.resolved() && child_shape.is_object
                            }
                        })
                        .count();

                    let site = SelectionSite {
                        node,
                        path,
                        depth,
                        shape,
                        nested_objects,
                    };
                    issues.extend(Heuristic::ALL.iter().filter_map(|h| h.check(&site, self.rules)));

                    self.selections(&node.children, child_parent.as_deref(), depth + 1, &site.path, issues);
                }
            }
        }
    }

    /// Resolve through the schema when possible, otherwise guess
    fn shape(&self, node: &SelectionNode, parent: Option<&str>) -> FieldShape {
        let field = match (self.schema, parent) {
            (Some(graph), Some(parent)) => graph.field(parent, &node.field_name).map(|f| (graph, f)),
            _ => None,
        };

        match field {
            Some((graph, field)) => {
                let base = field.ty.base_name();
                FieldShape {
                    is_list: field.ty.is_list(),
                    is_object: graph.is_object_like(base),
                    type_name: Some(base.to_string()),
                }
            }
            None => FieldShape::guess(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LoadConfig, parse_schema};

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(&AnalyzerConfig::default()).unwrap()
    }

    const SCHEMA: &str = r#"
type Query {
  patient(id: ID!): Patient
  patients(first: Int): [Patient!]!
  census: [Patient!]!
}
type Patient {
  id: ID!
  name: String
  aliases: [String!]
  address: Address
  preferences: Preferences
  appointments: [Appointment!]
}
type Address { city: String }
type Preferences { language: String }
type Appointment {
  id: ID!
  provider: Provider
}
type Provider { id: ID! }
"#;

    #[test]
    fn test_nested_list_query_without_schema() {
        let report = analyzer().analyze(
            "{ patients { id appointments { id provider { id } } } }",
            None,
            true,
        );
        assert_eq!(report.depth, 4);
        assert_eq!(report.field_count, 4);
        assert!(report.issues_of(IssueType::NPlusOne).any(|i| i.field == "appointments"));
        assert!(report
            .issues_of(IssueType::MissingPagination)
            .any(|i| i.location == "patients"));
        assert!(!report.schema_aware);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_score_formula() {
        // 4 fields, depth 4, 2 missing pagination, 2 n+1
        let report = analyzer().analyze(
            "{ patients { id appointments { id provider { id } } } }",
            None,
            false,
        );
        assert_eq!(report.count(IssueType::MissingPagination), 2);
        assert_eq!(report.count(IssueType::NPlusOne), 2);
        assert_eq!(report.complexity_score, 4 + 20 + 20 + 30);
        assert_eq!(report.overall_score, 100 - report.complexity_score);
        assert_eq!(report.estimated_execution_time, "moderate");
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_complexity_is_clipped() {
        assert_eq!(complexity_score(50, 10, 3, 3), 100);
        assert_eq!(complexity_score(0, 0, 0, 0), 0);
    }

    #[test]
    fn test_execution_time_buckets() {
        assert_eq!(execution_time_bucket(0), "very fast");
        assert_eq!(execution_time_bucket(19), "very fast");
        assert_eq!(execution_time_bucket(20), "fast");
        assert_eq!(execution_time_bucket(50), "moderate");
        assert_eq!(execution_time_bucket(75), "moderate");
        assert_eq!(execution_time_bucket(76), "potentially slow");
    }

    #[test]
    fn test_pagination_argument_suppresses_issue() {
        let report = analyzer().analyze("{ patients(first: 10) { id } }", None, true);
        assert_eq!(report.count(IssueType::MissingPagination), 0);
        assert_eq!(report.overall_score, 100 - (2 + 10));
        assert_eq!(report.estimated_execution_time, "very fast");
    }

    #[test]
    fn test_schema_resolves_non_plural_lists() {
        let graph = parse_schema(SCHEMA, &LoadConfig::default()).unwrap();
        let report = analyzer().analyze("{ census { address { city } } }", Some(&graph), false);
        assert!(report.schema_aware);
        assert_eq!(report.count(IssueType::MissingPagination), 1);
        assert_eq!(report.count(IssueType::NPlusOne), 1);

        // `preferences` reads as plural but the schema says single object
        let query = "{ patient(id: 1) { preferences { language } } }";
        let report = analyzer().analyze(query, Some(&graph), false);
        assert_eq!(report.count(IssueType::MissingPagination), 0);
        let guessed = analyzer().analyze(query, None, false);
        assert_eq!(guessed.count(IssueType::MissingPagination), 1);
    }

    #[test]
    fn test_schema_scalar_lists_are_not_flagged() {
        let graph = parse_schema(SCHEMA, &LoadConfig::default()).unwrap();
        let report = analyzer().analyze("{ patients(first: 5) { aliases } }", Some(&graph), false);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_expensive_and_deep_nesting() {
        let report = analyzer().analyze(
            "{ searchPatients { a { b { c { d { e { f } } } } } } }",
            None,
            true,
        );
        assert_eq!(report.count(IssueType::ExpensiveField), 1);
        let deep: Vec<_> = report.issues_of(IssueType::DeepNesting).collect();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].location, "searchPatients.a.b.c.d.e");
    }

    #[test]
    fn test_parse_error_yields_partial_report() {
        let report = analyzer().analyze("{ patients { id appointments { id ", None, true);
        let error = report.error.as_ref().expect("parse error expected");
        assert_eq!(error.kind.to_string(), "parse");
        assert_eq!(error.line, Some(1));
        assert_eq!(report.depth, 3);
        assert!(report.count(IssueType::MissingPagination) >= 1);
    }

    #[test]
    fn test_more_high_severity_issues_never_raise_score() {
        let a = analyzer();
        let base = a.analyze("{ patients(first: 1) { id } }", None, false);
        let worse = a.analyze("{ patients { id } }", None, false);
        assert!(worse.overall_score <= base.overall_score);
    }

    #[test]
    fn test_unresolved_fragment_suggestion() {
        let report = analyzer().analyze("{ patient { ...Missing } }", None, true);
        assert!(report.suggestions.iter().any(|s| s.contains("'Missing'")));
    }

    #[test]
    fn test_globs_are_escaped() {
        let config = AnalyzerConfig {
            expensive_patterns: vec!["(".to_string()],
            ..AnalyzerConfig::default()
        };
        assert!(QueryAnalyzer::new(&config).is_ok());
    }
}
