//! Configuration for schema insight
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (insight.toml)
//! - Environment variables (INSIGHT__*)
//!
//! ## Example config file (insight.toml):
//! ```toml
//! [schema]
//! path = "./schema.graphql"
//! strict_references = false
//!
//! [search]
//! default_context_lines = 2
//! max_results = 100
//!
//! [analyzer]
//! expensive_patterns = ["search*", "aggregate*", "full*History"]
//! pagination_arguments = ["first", "last", "limit"]
//! max_depth = 5
//! n_plus_one_min_nested = 1
//! max_nesting = 128
//!
//! [usage]
//! overfetch_threshold = 50.0
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::graph::LoadConfig;
use crate::lexer::DEFAULT_MAX_NESTING;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub usage: UsageConfig,
}

/// Schema source settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// SDL file to load at startup
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Treat references to undeclared types as errors
    #[serde(default)]
    pub strict_references: bool,
}

impl SchemaConfig {
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            strict_references: self.strict_references,
        }
    }
}

/// Search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Context lines returned around each match when the caller gives none
    #[serde(default = "default_context_lines")]
    pub default_context_lines: usize,

    /// Stop scanning once this many matches are collected
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Nearest-name suggestions attached to not-found errors
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
}

/// Query analyzer heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Glob patterns (`*` wildcard, case-insensitive) for costly fields
    #[serde(default = "default_expensive_patterns")]
    pub expensive_patterns: Vec<String>,

    /// Argument names that bound the size of a list
    #[serde(default = "default_pagination_arguments")]
    pub pagination_arguments: Vec<String>,

    /// Selections nested deeper than this are reported
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Nested object selections under a list needed to report N+1
    #[serde(default = "default_n_plus_one_min_nested")]
    pub n_plus_one_min_nested: usize,

    /// Queries nesting selection sets or values deeper than this fail to parse
    #[serde(default = "default_max_nesting")]
    pub max_nesting: usize,
}

/// Field usage tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Fields used by at most this percentage of queries are over-fetch candidates
    #[serde(default = "default_overfetch_threshold")]
    pub overfetch_threshold: f64,
}

// Default value functions
fn default_context_lines() -> usize {
    2
}

fn default_max_results() -> usize {
    100
}

fn default_suggestion_limit() -> usize {
    5
}

fn default_expensive_patterns() -> Vec<String> {
    ["search*", "aggregate*", "full*History", "bulk*"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_pagination_arguments() -> Vec<String> {
    [
        "first", "last", "limit", "take", "top", "pageSize", "page_size", "perPage", "per_page",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_depth() -> usize {
    5
}

fn default_n_plus_one_min_nested() -> usize {
    1
}

fn default_max_nesting() -> usize {
    DEFAULT_MAX_NESTING
}

fn default_overfetch_threshold() -> f64 {
    50.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_context_lines: default_context_lines(),
            max_results: default_max_results(),
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            expensive_patterns: default_expensive_patterns(),
            pagination_arguments: default_pagination_arguments(),
            max_depth: default_max_depth(),
            n_plus_one_min_nested: default_n_plus_one_min_nested(),
            max_nesting: default_max_nesting(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            overfetch_threshold: default_overfetch_threshold(),
        }
    }
}

impl InsightConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["insight.toml", ".insight.toml", "config/insight.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "graphql-insight") {
            let xdg_config = config_dir.config_dir().join("insight.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // INSIGHT__SEARCH__MAX_RESULTS=50
        builder = builder.add_source(
            Environment::with_prefix("INSIGHT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("analyzer.expensive_patterns")
                .with_list_parse_key("analyzer.pagination_arguments"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InsightConfig::default();
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.analyzer.max_depth, 5);
        assert!(config.analyzer.expensive_patterns.contains(&"search*".to_string()));
        assert!(config.analyzer.pagination_arguments.contains(&"first".to_string()));
        assert!(!config.schema.strict_references);
    }

    #[test]
    fn test_serialize_config() {
        let config = InsightConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[search]"));
        assert!(toml_str.contains("[analyzer]"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[search]\nmax_results = 7\n\n[analyzer]\nmax_depth = 3\n",
        )
        .unwrap();

        let config = InsightConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.search.max_results, 7);
        assert_eq!(config.search.default_context_lines, 2);
        assert_eq!(config.analyzer.max_depth, 3);
        assert_eq!(config.usage.overfetch_threshold, 50.0);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = InsightConfig::default();
        config.usage.overfetch_threshold = 25.0;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = InsightConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.usage.overfetch_threshold, 25.0);
    }
}
