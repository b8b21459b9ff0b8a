//! Indexed schema: the type graph and search index built from one SDL text

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::graph::{LoadConfig, TypeGraph, parse_schema};
use crate::search::SearchIndex;

/// Everything derived from one schema version. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedSchema {
    pub graph: TypeGraph,
    pub index: SearchIndex,
}

impl IndexedSchema {
    /// Content hash of the SDL this schema was built from
    pub fn bundle_hash(&self) -> &str {
        &self.graph.bundle_hash
    }

    /// Read and index an SDL file
    pub fn from_file(path: &Path, config: &LoadConfig) -> Result<Self> {
        let sdl = fs::read_to_string(path)?;
        index_schema(&sdl, config)
    }
}

/// Parse SDL and build its search index.
///
/// Pure function of the text: identical input yields identical output.
pub fn index_schema(sdl: &str, config: &LoadConfig) -> Result<IndexedSchema> {
    let graph = parse_schema(sdl, config)?;
    let index = SearchIndex::build(&graph, sdl);

    debug!(
        types = graph.type_count(),
        entities = index.entity_count(),
        keys = index.key_count(),
        "indexed schema"
    );

    Ok(IndexedSchema { graph, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SDL: &str = "type Patient { id: ID! name: String appointments: [Appointment!] }";

    #[test]
    fn test_indexing_is_idempotent() {
        let first = index_schema(SDL, &LoadConfig::default()).unwrap();
        let second = index_schema(SDL, &LoadConfig::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.bundle_hash(), second.bundle_hash());
    }

    #[test]
    fn test_different_text_changes_hash() {
        let first = index_schema(SDL, &LoadConfig::default()).unwrap();
        let second = index_schema("type Patient { id: ID! }", &LoadConfig::default()).unwrap();
        assert_ne!(first.bundle_hash(), second.bundle_hash());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SDL.as_bytes()).unwrap();
        let schema = IndexedSchema::from_file(file.path(), &LoadConfig::default()).unwrap();
        assert!(schema.graph.contains("Patient"));
        assert_eq!(schema.index.lines().len(), 1);
    }
}
