//! Schema Search
//!
//! Case-insensitive substring search over types, fields and enum values,
//! with context windows sliced from the raw SDL text.

pub mod index;

pub use index::{EntityKind, IndexEntry, SearchIndex};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::config::SearchConfig;
use crate::error::{InsightError, Result};
use crate::schema::IndexedSchema;
use crate::store::SchemaStore;

/// Which entities a search considers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFilter {
    /// Type declarations (enums included)
    Type,
    /// Fields on any type, root fields included
    Field,
    /// Fields on the mutation root
    Mutation,
    /// Fields on the query root
    Query,
    /// Enum declarations and enum values
    Enum,
    /// Every entity plus free-text lines
    #[default]
    Any,
}

impl SearchFilter {
    pub fn accepts(&self, kind: EntityKind) -> bool {
        match self {
            SearchFilter::Type => matches!(kind, EntityKind::Type | EntityKind::Enum),
            SearchFilter::Field => matches!(
                kind,
                EntityKind::Field | EntityKind::Query | EntityKind::Mutation | EntityKind::Subscription
            ),
            SearchFilter::Mutation => kind == EntityKind::Mutation,
            SearchFilter::Query => kind == EntityKind::Query,
            SearchFilter::Enum => matches!(kind, EntityKind::Enum | EntityKind::EnumValue),
            SearchFilter::Any => true,
        }
    }
}

impl FromStr for SearchFilter {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "type" | "types" => Ok(SearchFilter::Type),
            "field" | "fields" => Ok(SearchFilter::Field),
            "mutation" | "mutations" => Ok(SearchFilter::Mutation),
            "query" | "queries" => Ok(SearchFilter::Query),
            "enum" | "enums" => Ok(SearchFilter::Enum),
            "any" | "all" | "" => Ok(SearchFilter::Any),
            other => Err(InsightError::Validation(format!(
                "unknown search filter '{}' (expected type, field, mutation, query, enum or any)",
                other
            ))),
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchFilter::Type => "type",
            SearchFilter::Field => "field",
            SearchFilter::Mutation => "mutation",
            SearchFilter::Query => "query",
            SearchFilter::Enum => "enum",
            SearchFilter::Any => "any",
        };
        f.write_str(s)
    }
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub line: usize,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// The matched source line, trimmed
    pub content: String,
    /// Surrounding lines, matched line included
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total_matches: usize,
    pub matches: Vec<SearchMatch>,
    /// The result cap was reached before the scan finished
    pub truncated: bool,
}

/// Term search over one schema snapshot
pub struct SearchEngine {
    schema: Arc<IndexedSchema>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(schema: Arc<IndexedSchema>, config: SearchConfig) -> Self {
        Self { schema, config }
    }

    /// Engine over the store's current snapshot; fails if nothing is published
    pub fn from_store(store: &SchemaStore, config: SearchConfig) -> Result<Self> {
        let snapshot = store.snapshot()?;
        Ok(Self::new(snapshot.schema.clone(), config))
    }

    pub fn schema(&self) -> &IndexedSchema {
        &self.schema
    }

    /// Search for `term`, returning matches in ascending source-line order
    pub fn search(
        &self,
        term: &str,
        filter: SearchFilter,
        context_lines: usize,
    ) -> Result<SearchResponse> {
        let term = term.trim();
        if term.is_empty() {
            return Err(InsightError::Validation("search term must not be empty".to_string()));
        }
        let needle = term.to_lowercase();
        let cap = self.config.max_results;
        let index = &self.schema.index;

        let mut matches = Vec::new();
        let mut covered_lines = HashSet::new();
        let mut truncated = false;

        for entry in index.lookup(&needle) {
            if !filter.accepts(entry.kind) {
                continue;
            }
            if matches.len() >= cap {
                truncated = true;
                break;
            }
            covered_lines.insert(entry.line);
            matches.push(self.to_match(
                entry.line,
                entry.kind,
                Some(entry.name.clone()),
                entry.parent.clone(),
                context_lines,
            ));
        }

        if filter == SearchFilter::Any {
            let mut text_hits = 0;
            for (i, line) in index.lines().iter().enumerate() {
                let number = i + 1;
                if covered_lines.contains(&number) || !line.to_lowercase().contains(&needle) {
                    continue;
                }
                if text_hits >= cap {
                    truncated = true;
                    break;
                }
                text_hits += 1;
                matches.push(self.to_match(number, EntityKind::Text, None, None, context_lines));
            }

            matches.sort_by(|a, b| {
                (a.line, a.kind, &a.name, &a.parent).cmp(&(b.line, b.kind, &b.name, &b.parent))
            });
            if matches.len() > cap {
                matches.truncate(cap);
                truncated = true;
            }
        }

        debug!(term, %filter, matches = matches.len(), truncated, "search");

        Ok(SearchResponse {
            total_matches: matches.len(),
            matches,
            truncated,
        })
    }

    fn to_match(
        &self,
        line: usize,
        kind: EntityKind,
        name: Option<String>,
        parent: Option<String>,
        context_lines: usize,
    ) -> SearchMatch {
        let index = &self.schema.index;
        SearchMatch {
            line,
            kind,
            content: index.line(line).unwrap_or_default().trim().to_string(),
            context: index.context(line, context_lines),
            name,
            parent,
        }
    }

    /// Nearest type names for a term that matched nothing exactly
    pub fn suggest_types(&self, term: &str, limit: usize) -> Vec<String> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut suggestions: Vec<String> = Vec::new();
        let push = |name: &str, suggestions: &mut Vec<String>| {
            if suggestions.len() < limit && !suggestions.iter().any(|s| s == name) {
                suggestions.push(name.to_string());
            }
        };

        // Type names containing the term
        for entry in self.schema.index.lookup(&needle) {
            if SearchFilter::Type.accepts(entry.kind) {
                push(&entry.name, &mut suggestions);
            }
        }

        // Type names contained in the term ("patients" -> "Patient")
        let graph = &self.schema.graph;
        for name in graph.type_names() {
            if needle.contains(&name.to_lowercase()) {
                push(name, &mut suggestions);
            }
        }

        // Fuzzy matches on the full term, then on its first three characters
        let matcher = SkimMatcherV2::default();
        let prefix: String = needle.chars().take(3).collect();
        for pattern in [needle.as_str(), prefix.as_str()] {
            let mut scored: Vec<(i64, &String)> = graph
                .type_names()
                .filter_map(|name| matcher.fuzzy_match(name, pattern).map(|score| (score, name)))
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
            for (_, name) in scored {
                push(name, &mut suggestions);
            }
        }

        suggestions
    }
}
