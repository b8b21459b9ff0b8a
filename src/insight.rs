//! Schema insight service
//!
//! Entry point exposing search, introspection, query analysis and field
//! usage over the currently published schema snapshot. Every call loads the
//! snapshot once and works on it alone, so a concurrent reload never mixes
//! two schema versions within one response.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::InsightConfig;
use crate::error::{InsightError, Result};
use crate::introspect::{TypeDetail, TypeIntrospector};
use crate::query::{AnalysisReport, FieldUsageReport, FieldUsageTracker, QueryAnalyzer, parse_query_with_limit};
use crate::search::{SearchEngine, SearchFilter, SearchResponse};
use crate::store::{FileSource, RefreshOutcome, SchemaSnapshot, SchemaSource, SchemaStore};

pub struct SchemaInsight {
    config: InsightConfig,
    store: Arc<SchemaStore>,
    analyzer: QueryAnalyzer,
}

impl SchemaInsight {
    /// Create a service with an empty store
    pub fn new(config: InsightConfig) -> Result<Self> {
        let store = Arc::new(SchemaStore::new(config.schema.load_config()));
        Self::with_store(config, store)
    }

    /// Create a service over a store shared with a reloader
    pub fn with_store(config: InsightConfig, store: Arc<SchemaStore>) -> Result<Self> {
        let analyzer = QueryAnalyzer::new(&config.analyzer)?;
        Ok(Self {
            config,
            store,
            analyzer,
        })
    }

    /// Create a service and load the schema file named in the config
    pub fn from_config(config: InsightConfig) -> Result<Self> {
        let path = config.schema.path.clone();
        let insight = Self::new(config)?;
        if let Some(path) = path {
            insight.refresh(&FileSource::new(path))?;
        }
        Ok(insight)
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.store
    }

    /// Index and publish SDL text
    pub fn load_schema(&self, sdl: &str, version: impl Into<String>) -> Result<Arc<SchemaSnapshot>> {
        self.store.publish(sdl, version)
    }

    pub fn refresh(&self, source: &dyn SchemaSource) -> Result<RefreshOutcome> {
        let outcome = self.store.refresh(source)?;
        info!(source = %source.describe(), ?outcome, "schema refresh");
        Ok(outcome)
    }

    /// Term search; `filter` is parsed from its text form (`type`, `field`, ...)
    pub fn search(&self, term: &str, filter: &str, context_lines: Option<usize>) -> Result<SearchResponse> {
        let filter: SearchFilter = filter.parse()?;
        let engine = SearchEngine::from_store(&self.store, self.config.search.clone())?;
        engine.search(
            term,
            filter,
            context_lines.unwrap_or(self.config.search.default_context_lines),
        )
    }

    pub fn introspect(
        &self,
        type_name: &str,
        include_relationships: bool,
        include_deprecated: bool,
    ) -> Result<TypeDetail> {
        let snapshot = self.store.snapshot()?;
        TypeIntrospector::new(Arc::clone(&snapshot.schema), self.config.search.clone()).introspect(
            type_name,
            include_relationships,
            include_deprecated,
        )
    }

    /// Analyze a query; schema-aware when a snapshot is published.
    ///
    /// Never fails: parse problems are carried in `AnalysisReport::error`.
    pub fn analyze(&self, query_text: &str, include_suggestions: bool) -> AnalysisReport {
        let snapshot = self.store.snapshot().ok();
        let graph = snapshot.as_ref().map(|s| &s.schema.graph);
        self.analyzer.analyze(query_text, graph, include_suggestions)
    }

    /// Aggregate usage of `field_name` across `queries`
    pub fn field_usage<S: AsRef<str>>(
        &self,
        field_name: &str,
        queries: &[S],
        time_range: Option<&str>,
        include_recommendations: bool,
    ) -> Result<FieldUsageReport> {
        let field_name = field_name.trim();
        if field_name.is_empty() {
            return Err(InsightError::Validation("field name must not be empty".to_string()));
        }

        let mut tracker = FieldUsageTracker::new(field_name);
        for query in queries {
            let parsed = parse_query_with_limit(query.as_ref(), self.config.analyzer.max_nesting);
            if !parsed.is_complete() {
                tracker.record_parse_failure();
            }
            tracker.ingest(&parsed.document);
        }

        let snapshot = self.store.snapshot().ok();
        let graph = snapshot.as_ref().map(|s| &s.schema.graph);
        let mut report = tracker.report(
            graph,
            self.config.usage.overfetch_threshold,
            include_recommendations,
        );
        report.time_range = time_range.map(str::to_string);

        debug!(field = field_name, parse_failures = report.parse_failures, "field usage");
        Ok(report)
    }
}
