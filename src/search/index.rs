//! Inverted substring index over schema entities.
//!
//! Every lowercased substring of every entity name is a key, so a partial
//! term such as `appoint` is a single map lookup. Postings are stored in
//! ascending source-line order.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::graph::{TypeGraph, TypeKind};

/// What an index entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Object, input, interface, union or scalar declaration
    Type,
    /// Enum declaration
    Enum,
    /// Field on the query root
    Query,
    /// Field on the mutation root
    Mutation,
    /// Field on the subscription root
    Subscription,
    /// Field on any other type
    Field,
    EnumValue,
    /// Raw line of SDL text (descriptions, directives, comments)
    Text,
}

/// One posting in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub kind: EntityKind,
    pub name: String,
    /// Owning type, for fields and enum values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Source line (1-indexed)
    pub line: usize,
}

impl IndexEntry {
    fn sort_key(&self) -> (usize, EntityKind, &str, Option<&str>) {
        (self.line, self.kind, &self.name, self.parent.as_deref())
    }
}

/// Substring index plus the line-split SDL text used for context windows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchIndex {
    /// Every entity once, in (line, kind, name) order; postings hold offsets
    entities: Vec<IndexEntry>,
    postings: HashMap<String, Vec<u32>>,
    lines: Vec<String>,
}

impl SearchIndex {
    /// Index every type, field and enum value of `graph`
    pub fn build(graph: &TypeGraph, sdl: &str) -> Self {
        let roots = graph.roots();
        let mut entities = Vec::new();

        for def in graph.all_types() {
            let kind = if def.kind == TypeKind::Enum {
                EntityKind::Enum
            } else {
                EntityKind::Type
            };
            entities.push(IndexEntry {
                kind,
                name: def.name.clone(),
                parent: None,
                line: def.line,
            });

            let field_kind = if def.name == roots.query {
                EntityKind::Query
            } else if def.name == roots.mutation {
                EntityKind::Mutation
            } else if def.name == roots.subscription {
                EntityKind::Subscription
            } else {
                EntityKind::Field
            };
            for field in &def.fields {
                entities.push(IndexEntry {
                    kind: field_kind,
                    name: field.name.clone(),
                    parent: Some(def.name.clone()),
                    line: field.line,
                });
            }
            for value in &def.enum_values {
                entities.push(IndexEntry {
                    kind: EntityKind::EnumValue,
                    name: value.name.clone(),
                    parent: Some(def.name.clone()),
                    line: value.line,
                });
            }
        }

        // Ids are assigned in sorted order, so every posting list is sorted too
        entities.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut postings: HashMap<String, Vec<u32>> = HashMap::new();
        for (id, entry) in entities.iter().enumerate() {
            let id = id as u32;
            let lower = entry.name.to_lowercase();
            for key in substrings(&lower) {
                match postings.get_mut(key) {
                    Some(ids) => ids.push(id),
                    None => {
                        postings.insert(key.to_string(), vec![id]);
                    }
                }
            }
        }

        Self {
            entities,
            postings,
            lines: sdl.lines().map(str::to_string).collect(),
        }
    }

    /// Entries whose name contains `needle` (already lowercased), by line
    pub fn lookup<'a>(&'a self, needle: &str) -> impl Iterator<Item = &'a IndexEntry> + 'a {
        self.postings
            .get(needle)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|&id| self.entities.get(id as usize))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Source line by 1-indexed number
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    /// Lines `line - radius ..= line + radius`, clamped to the document
    pub fn context(&self, line: usize, radius: usize) -> Vec<String> {
        if line == 0 || line > self.lines.len() {
            return Vec::new();
        }
        let start = line.saturating_sub(radius).max(1);
        let end = line.saturating_add(radius).min(self.lines.len());
        self.lines[start - 1..end].to_vec()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn key_count(&self) -> usize {
        self.postings.len()
    }
}

/// Distinct substrings of `s`, split on char boundaries
fn substrings(s: &str) -> HashSet<&str> {
    let mut bounds: Vec<usize> = s.char_indices().map(|(i, _)| i).collect();
    bounds.push(s.len());

    let mut keys = HashSet::new();
    for (i, &start) in bounds.iter().enumerate() {
        for &end in &bounds[i + 1..] {
            keys.insert(&s[start..end]);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LoadConfig, parse_schema};

    const SDL: &str = "type Query {\n  patients: [Patient]\n}\ntype Patient {\n  id: ID!\n  appointments: [Appointment]\n}\ntype Appointment {\n  status: Status\n}\nenum Status {\n  BOOKED\n}";

    fn index() -> SearchIndex {
        let graph = parse_schema(SDL, &LoadConfig::default()).unwrap();
        SearchIndex::build(&graph, SDL)
    }

    #[test]
    fn test_substrings_are_distinct() {
        let keys = substrings("aab");
        assert_eq!(keys.len(), 5);
        assert!(keys.contains("ab"));
    }

    #[test]
    fn test_partial_term_lookup() {
        let index = index();
        let names: Vec<_> = index.lookup("appoint").map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["appointments", "Appointment"]);
    }

    #[test]
    fn test_root_fields_are_tagged() {
        let index = index();
        let entry = index.lookup("patients").next().unwrap();
        assert_eq!(entry.kind, EntityKind::Query);
        assert_eq!(entry.parent.as_deref(), Some("Query"));
    }

    #[test]
    fn test_postings_sorted_by_line() {
        let index = index();
        let lines: Vec<usize> = index.lookup("t").map(|e| e.line).collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn test_context_window_is_clamped() {
        let index = index();
        assert_eq!(index.context(1, 1), vec!["type Query {", "  patients: [Patient]"]);
        assert_eq!(index.context(2, 0), vec!["  patients: [Patient]"]);
        assert!(index.context(99, 2).is_empty());
    }

    #[test]
    fn test_huge_context_radius_returns_whole_text() {
        let index = index();
        assert_eq!(index.context(1, usize::MAX).len(), index.lines().len());
        assert_eq!(index.context(5, usize::MAX).len(), index.lines().len());
    }

    #[test]
    fn test_long_field_names_share_postings() {
        let fields: String = (0..500)
            .map(|i| format!("  appointmentReminderDeliveryChannelPreference{:04}: String\n", i))
            .collect();
        let sdl = format!("type Settings {{\n{}}}", fields);
        let graph = parse_schema(&sdl, &LoadConfig::default()).unwrap();
        let index = SearchIndex::build(&graph, &sdl);

        assert_eq!(index.entity_count(), 501);
        assert_eq!(index.lookup("reminderdelivery").count(), 500);
        let hit = index.lookup("preference0420").next().unwrap();
        assert_eq!(hit.parent.as_deref(), Some("Settings"));
        assert_eq!(hit.line, 422);
    }

    #[test]
    fn test_entities_stored_once() {
        let index = index();
        // 4 types, 4 fields, 1 enum value
        assert_eq!(index.entity_count(), 9);
        let shared: Vec<_> = index.lookup("a").collect();
        assert!(shared.len() > 1);
        assert!(index.lookup("zzz").next().is_none());
    }
}
