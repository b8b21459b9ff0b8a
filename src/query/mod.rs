//! Client Query Model
//!
//! Selection trees parsed from client query text, plus the analyzers that
//! consume them:
//!
//! - [`parser`]: query text to [`QueryDocument`], keeping partial trees on error
//! - [`heuristics`]: per-selection performance checks
//! - [`analyzer`]: depth, field count, issues and complexity score
//! - [`usage`]: per-field usage across a batch of queries

pub mod analyzer;
pub mod heuristics;
pub mod parser;
pub mod usage;

pub use analyzer::{AnalysisReport, Issue, IssueSeverity, QueryAnalyzer};
pub use heuristics::{Heuristic, IssueType, looks_plural};
pub use parser::{ParsedQuery, parse_query, parse_query_with_limit};
pub use usage::{FieldStatistic, FieldUsageReport, FieldUsageTracker, Recommendation};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// `query`, `mutation` or `subscription`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        };
        f.write_str(s)
    }
}

/// Field argument with its value rendered as text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: String,
}

impl From<(String, String)> for Argument {
    fn from((name, value): (String, String)) -> Self {
        Self { name, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionKind {
    Field,
    /// `...Name`; never expanded by the analyzer
    FragmentSpread,
    /// `... on Type { }` or `... @dir { }`
    InlineFragment { type_condition: Option<String> },
}

/// One entry of a selection set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionNode {
    /// Field name, or fragment name for spreads
    pub field_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SelectionNode>,
    #[serde(flatten)]
    pub kind: SelectionKind,
    pub line: usize,
    pub column: usize,
}

impl SelectionNode {
    pub fn field(name: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            field_name: name.into(),
            alias: None,
            arguments: Vec::new(),
            children: Vec::new(),
            kind: SelectionKind::Field,
            line,
            column,
        }
    }

    pub fn is_field(&self) -> bool {
        self.kind == SelectionKind::Field
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Key the field appears under in the response
    pub fn response_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field_name)
    }

    /// Direct field children, looking through inline fragments
    pub fn child_fields(&self) -> Vec<&SelectionNode> {
        let mut out = Vec::new();
        collect_fields(&self.children, &mut out);
        out
    }
}

fn collect_fields<'a>(nodes: &'a [SelectionNode], out: &mut Vec<&'a SelectionNode>) {
    for node in nodes {
        match node.kind {
            SelectionKind::Field => out.push(node),
            SelectionKind::InlineFragment { .. } => collect_fields(&node.children, out),
            SelectionKind::FragmentSpread => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub selections: Vec<SelectionNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selections: Vec<SelectionNode>,
}

/// A parsed query text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryDocument {
    pub operations: Vec<Operation>,
    pub fragments: Vec<FragmentDefinition>,
}

impl QueryDocument {
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.iter().find(|f| f.name == name)
    }

    /// Deepest field nesting across all operations.
    ///
    /// A top-level field is depth 1. Inline fragments add no level and
    /// fragment spreads count as leaves.
    pub fn depth(&self) -> usize {
        self.operations
            .iter()
            .map(|op| selection_depth(&op.selections))
            .max()
            .unwrap_or(0)
    }

    /// Distinct field names in operations and fragment definitions
    pub fn field_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for op in &self.operations {
            collect_names(&op.selections, &mut names);
        }
        for fragment in &self.fragments {
            collect_names(&fragment.selections, &mut names);
        }
        names
    }

    /// Spreads naming fragments this document does not define
    pub fn unresolved_spreads(&self) -> BTreeSet<&str> {
        let mut spreads = BTreeSet::new();
        for op in &self.operations {
            collect_spreads(&op.selections, &mut spreads);
        }
        for fragment in &self.fragments {
            collect_spreads(&fragment.selections, &mut spreads);
        }
        spreads.retain(|name| self.fragment(name).is_none());
        spreads
    }
}

fn selection_depth(nodes: &[SelectionNode]) -> usize {
    nodes
        .iter()
        .map(|node| match node.kind {
            SelectionKind::Field => 1 + selection_depth(&node.children),
            SelectionKind::InlineFragment { .. } => selection_depth(&node.children),
            SelectionKind::FragmentSpread => 0,
        })
        .max()
        .unwrap_or(0)
}

fn collect_names<'a>(nodes: &'a [SelectionNode], names: &mut BTreeSet<&'a str>) {
    for node in nodes {
        if node.is_field() {
            names.insert(&node.field_name);
        }
        collect_names(&node.children, names);
    }
}

fn collect_spreads<'a>(nodes: &'a [SelectionNode], spreads: &mut BTreeSet<&'a str>) {
    for node in nodes {
        if node.kind == SelectionKind::FragmentSpread {
            spreads.insert(&node.field_name);
        }
        collect_spreads(&node.children, spreads);
    }
}
