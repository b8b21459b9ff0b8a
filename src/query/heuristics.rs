//! Query Performance Heuristics
//!
//! Each heuristic is a predicate over one field selection plus the issue it
//! raises. The analyzer walks the selection tree once and evaluates
//! [`Heuristic::ALL`] in order at every field, so adding a check means adding
//! a variant here and nothing in the traversal.
//!
//! ## Heuristics
//! 1. **Missing pagination**: list of objects without a size-limiting argument
//! 2. **N+1**: list of objects whose items select further relationships
//! 3. **Expensive field**: field name matches a configured glob
//! 4. **Deep nesting**: selection nested past the configured depth
//!
//! These look at query shape only. Without a schema, list-ness is guessed
//! from plural-looking names, so both false positives and misses are expected.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::analyzer::{Issue, IssueSeverity};
use super::SelectionNode;
use crate::config::AnalyzerConfig;
use crate::error::{InsightError, Result};

/// Category of a reported issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingPagination,
    NPlusOne,
    ExpensiveField,
    DeepNesting,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::MissingPagination => "missing_pagination",
            IssueType::NPlusOne => "n_plus_one",
            IssueType::ExpensiveField => "expensive_field",
            IssueType::DeepNesting => "deep_nesting",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Selection Sites
// =============================================================================

/// What is known about the type a field returns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldShape {
    pub is_list: bool,
    pub is_object: bool,
    /// Named return type, when the schema resolved the field
    pub type_name: Option<String>,
}

impl FieldShape {
    pub fn resolved(&self) -> bool {
        self.type_name.is_some()
    }

    pub fn is_list_of_objects(&self) -> bool {
        self.is_list && self.is_object
    }

    /// Shape guessed from the selection alone
    pub fn guess(node: &SelectionNode) -> Self {
        Self {
            is_list: looks_plural(&node.field_name),
            is_object: node.has_children(),
            type_name: None,
        }
    }
}

/// One field selection as seen by the heuristics
#[derive(Debug)]
pub struct SelectionSite<'a> {
    pub node: &'a SelectionNode,
    /// Dot-joined response names from the operation root
    pub path: String,
    /// Top-level fields are depth 1
    pub depth: usize,
    pub shape: FieldShape,
    /// Direct children that are themselves object selections
    pub nested_objects: usize,
}

// =============================================================================
// Rules
// =============================================================================

/// Compiled thresholds and patterns
#[derive(Debug, Clone)]
pub struct HeuristicRules {
    /// (glob, compiled) pairs
    expensive: Vec<(String, Regex)>,
    pagination: HashSet<String>,
    pagination_hint: String,
    max_depth: usize,
    n_plus_one_min_nested: usize,
}

impl HeuristicRules {
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let expensive = config
            .expensive_patterns
            .iter()
            .map(|glob| glob_to_regex(glob).map(|re| (glob.clone(), re)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            expensive,
            pagination: config.pagination_arguments.iter().cloned().collect(),
            pagination_hint: config
                .pagination_arguments
                .first()
                .cloned()
                .unwrap_or_else(|| "first".to_string()),
            max_depth: config.max_depth,
            n_plus_one_min_nested: config.n_plus_one_min_nested.max(1),
        })
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn is_paginated(&self, node: &SelectionNode) -> bool {
        node.arguments.iter().any(|a| self.pagination.contains(&a.name))
    }

    fn expensive_match(&self, name: &str) -> Option<&str> {
        self.expensive
            .iter()
            .find(|(_, re)| re.is_match(name))
            .map(|(glob, _)| glob.as_str())
    }
}

/// Compile a `*`-wildcard glob into an anchored, case-insensitive regex
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let body: Vec<String> = glob.split('*').map(regex::escape).collect();
    Regex::new(&format!("(?i)^{}$", body.join(".*")))
        .map_err(|e| InsightError::Validation(format!("invalid field pattern '{}': {}", glob, e)))
}

/// Whether a field name reads as a collection (`patients`, `appointmentList`)
pub fn looks_plural(name: &str) -> bool {
    const COLLECTION_SUFFIXES: &[&str] = &["list", "connection", "collection", "edges", "nodes"];
    const IRREGULAR: &[&str] = &["people", "children", "data", "media", "criteria", "men", "women"];
    const SINGULAR_ENDINGS: &[&str] = &["ss", "us", "is"];

    let lower = name.to_lowercase();
    if COLLECTION_SUFFIXES.iter().any(|s| lower.ends_with(s))
        || IRREGULAR.iter().any(|w| lower.ends_with(w))
    {
        return true;
    }
    lower.len() > 2
        && lower.ends_with('s')
        && !SINGULAR_ENDINGS.iter().any(|s| lower.ends_with(s))
}

// =============================================================================
// Heuristics
// =============================================================================

/// A per-selection check and the issue it raises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    MissingPagination,
    NPlusOne,
    ExpensiveField,
    DeepNesting,
}

impl Heuristic {
    /// Evaluation order
    pub const ALL: [Heuristic; 4] = [
        Heuristic::MissingPagination,
        Heuristic::NPlusOne,
        Heuristic::ExpensiveField,
        Heuristic::DeepNesting,
    ];

    pub fn issue_type(&self) -> IssueType {
        match self {
            Heuristic::MissingPagination => IssueType::MissingPagination,
            Heuristic::NPlusOne => IssueType::NPlusOne,
            Heuristic::ExpensiveField => IssueType::ExpensiveField,
            Heuristic::DeepNesting => IssueType::DeepNesting,
        }
    }

    pub fn severity(&self) -> IssueSeverity {
        match self {
            Heuristic::MissingPagination | Heuristic::NPlusOne => IssueSeverity::High,
            Heuristic::ExpensiveField | Heuristic::DeepNesting => IssueSeverity::Medium,
        }
    }

    /// Run the predicate; `Some` when the site trips it
    pub fn check(&self, site: &SelectionSite<'_>, rules: &HeuristicRules) -> Option<Issue> {
        let name = &site.node.field_name;
        let (description, suggestion, impact) = match self {
            Heuristic::MissingPagination => {
                if !site.shape.is_list_of_objects()
                    || !site.node.has_children()
                    || rules.is_paginated(site.node)
                {
                    return None;
                }
                (
                    format!("List field '{}' is requested without a pagination argument", name),
                    format!(
                        "Add a pagination argument such as '{}' to '{}'",
                        rules.pagination_hint, name
                    ),
                    "Response size and resolver time grow with the number of stored records",
                )
            }
            Heuristic::NPlusOne => {
                if !site.shape.is_list_of_objects()
                    || site.nested_objects < rules.n_plus_one_min_nested
                {
                    return None;
                }
                (
                    format!(
                        "List field '{}' selects {} nested relationship(s); each item may trigger its own fetch",
                        name, site.nested_objects
                    ),
                    format!(
                        "Batch the nested lookups under '{}' (DataLoader) or fetch them in a separate paginated query",
                        name
                    ),
                    "One extra resolver round-trip per list item",
                )
            }
            Heuristic::ExpensiveField => {
                let glob = rules.expensive_match(name)?;
                (
                    format!("Field '{}' matches expensive pattern '{}'", name, glob),
                    format!("Cache '{}' or narrow its arguments; keep it out of hot paths", name),
                    "Costly resolver work on every request",
                )
            }
            Heuristic::DeepNesting => {
                if rules.max_depth.checked_add(1) != Some(site.depth) {
                    return None;
                }
                (
                    format!(
                        "Selection '{}' is nested {} levels deep (limit {})",
                        site.path, site.depth, rules.max_depth
                    ),
                    "Flatten the selection or split it into separate queries".to_string(),
                    "Resolver work multiplies at each nesting level",
                )
            }
        };

        Some(Issue {
            issue_type: self.issue_type(),
            severity: self.severity(),
            description,
            location: site.path.clone(),
            field: name.clone(),
            line: site.node.line,
            column: site.node.column,
            suggestion,
            estimated_impact: impact.to_string(),
        })
    }
}
