//! Schema snapshot store
//!
//! Holds the current [`IndexedSchema`] behind an atomic pointer. A new
//! version is fully built off to the side and then published with a single
//! swap, so readers always see either the old or the new snapshot. A failed
//! refresh keeps the last good snapshot and marks it stale.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{InsightError, Result};
use crate::graph::{DiagnosticItem, LoadConfig, content_hash};
use crate::schema::{IndexedSchema, index_schema};

// =============================================================================
// Snapshot
// =============================================================================

/// One published schema version
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub schema: Arc<IndexedSchema>,
    /// Change token supplied by the schema source
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    /// The last refresh failed; this is the last good version
    pub stale: bool,
}

impl SchemaSnapshot {
    fn as_stale(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            version: self.version.clone(),
            loaded_at: self.loaded_at,
            stale: true,
        }
    }

    pub fn status(&self) -> SnapshotStatus {
        SnapshotStatus {
            version: self.version.clone(),
            loaded_at: self.loaded_at,
            stale: self.stale,
            type_count: self.schema.graph.type_count(),
            diagnostics: self.schema.graph.diagnostics().all().to_vec(),
        }
    }
}

/// Serializable summary of a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    pub stale: bool,
    pub type_count: usize,
    pub diagnostics: Vec<DiagnosticItem>,
}

// =============================================================================
// Sources
// =============================================================================

/// Schema text plus its change token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPayload {
    pub sdl: String,
    pub version: String,
}

impl SchemaPayload {
    /// Payload whose version is the content hash of the text
    pub fn hashed(sdl: impl Into<String>) -> Self {
        let sdl = sdl.into();
        let version = content_hash(&sdl);
        Self { sdl, version }
    }
}

/// Supplies schema text to the store.
///
/// Implementations that do network I/O must bound it with their own timeout
/// and return an error rather than block.
pub trait SchemaSource: Send + Sync {
    fn fetch(&self) -> Result<SchemaPayload>;

    /// Human-readable origin, for logs
    fn describe(&self) -> String {
        "schema source".to_string()
    }
}

/// In-memory schema text
#[derive(Debug, Clone)]
pub struct StaticSource {
    payload: SchemaPayload,
}

impl StaticSource {
    pub fn new(sdl: impl Into<String>) -> Self {
        Self {
            payload: SchemaPayload::hashed(sdl),
        }
    }
}

impl SchemaSource for StaticSource {
    fn fetch(&self) -> Result<SchemaPayload> {
        Ok(self.payload.clone())
    }

    fn describe(&self) -> String {
        "static schema".to_string()
    }
}

/// SDL file on disk, versioned by content hash
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchemaSource for FileSource {
    fn fetch(&self) -> Result<SchemaPayload> {
        let sdl = fs::read_to_string(&self.path)?;
        Ok(SchemaPayload::hashed(sdl))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// =============================================================================
// Store
// =============================================================================

/// What a refresh did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was published
    Updated,
    /// The source reported the version already loaded
    Unchanged,
}

/// Lock-free holder of the current schema snapshot
pub struct SchemaStore {
    current: ArcSwapOption<SchemaSnapshot>,
    load_config: LoadConfig,
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new(LoadConfig::default())
    }
}

impl SchemaStore {
    pub fn new(load_config: LoadConfig) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            load_config,
        }
    }

    /// Current snapshot; `NotReady` until the first publish
    pub fn snapshot(&self) -> Result<Arc<SchemaSnapshot>> {
        self.current.load_full().ok_or(InsightError::NotReady)
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    /// Index `sdl` and swap it in. On failure the current snapshot is kept.
    pub fn publish(&self, sdl: &str, version: impl Into<String>) -> Result<Arc<SchemaSnapshot>> {
        let schema = index_schema(sdl, &self.load_config)?;
        Ok(self.publish_indexed(schema, version.into()))
    }

    fn publish_indexed(&self, schema: IndexedSchema, version: String) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(SchemaSnapshot {
            schema: Arc::new(schema),
            version,
            loaded_at: Utc::now(),
            stale: false,
        });
        self.current.store(Some(Arc::clone(&snapshot)));

        info!(
            version = %snapshot.version,
            types = snapshot.schema.graph.type_count(),
            "published schema snapshot"
        );
        snapshot
    }

    /// Pull from `source` and publish if the version changed.
    ///
    /// Fetch or build failures mark the current snapshot stale and return
    /// the error; readers keep the last good snapshot.
    pub fn refresh(&self, source: &dyn SchemaSource) -> Result<RefreshOutcome> {
        let payload = match source.fetch() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(source = %source.describe(), error = %err, "schema fetch failed");
                self.mark_stale();
                return Err(err);
            }
        };

        if let Some(current) = self.current.load_full() {
            if current.version == payload.version {
                if current.stale {
                    self.current.store(Some(Arc::new(SchemaSnapshot {
                        stale: false,
                        ..(*current).clone()
                    })));
                }
                return Ok(RefreshOutcome::Unchanged);
            }
        }

        match index_schema(&payload.sdl, &self.load_config) {
            Ok(schema) => {
                self.publish_indexed(schema, payload.version);
                Ok(RefreshOutcome::Updated)
            }
            Err(err) => {
                warn!(source = %source.describe(), error = %err, "schema rebuild failed");
                self.mark_stale();
                Err(err)
            }
        }
    }

    /// Replace the current snapshot with a stale copy sharing its schema
    pub fn mark_stale(&self) {
        let mut marked = false;
        self.current.rcu(|current| {
            let current: &Option<Arc<SchemaSnapshot>> = current;
            marked = current.is_some();
            current.as_ref().map(|snapshot| Arc::new(snapshot.as_stale()))
        });
        if marked {
            info!("schema snapshot marked stale");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const V1: &str = "type Query { patient: Patient } type Patient { id: ID! }";
    const V2: &str = "type Query { patient: Patient } type Patient { id: ID! name: String }";

    struct FailingSource;

    impl SchemaSource for FailingSource {
        fn fetch(&self) -> Result<SchemaPayload> {
            Err(InsightError::Internal("upstream timed out".to_string()))
        }
    }

    #[test]
    fn test_empty_store_is_not_ready() {
        let store = SchemaStore::default();
        assert!(!store.is_ready());
        assert!(matches!(store.snapshot(), Err(InsightError::NotReady)));
    }

    #[test]
    fn test_publish_swaps_snapshot() {
        let store = SchemaStore::default();
        store.publish(V1, "v1").unwrap();
        let old = store.snapshot().unwrap();

        store.publish(V2, "v2").unwrap();
        let new = store.snapshot().unwrap();

        // Readers holding the old snapshot still see the old schema
        assert!(old.schema.graph.field("Patient", "name").is_none());
        assert!(new.schema.graph.field("Patient", "name").is_some());
        assert_eq!(new.version, "v2");
    }

    #[test]
    fn test_failed_publish_keeps_current() {
        let store = SchemaStore::default();
        store.publish(V1, "v1").unwrap();
        assert!(store.publish("type {", "broken").is_err());
        assert_eq!(store.snapshot().unwrap().version, "v1");
    }

    #[test]
    fn test_refresh_skips_unchanged_version() {
        let store = SchemaStore::default();
        let source = StaticSource::new(V1);
        assert_eq!(store.refresh(&source).unwrap(), RefreshOutcome::Updated);
        let first = store.snapshot().unwrap();
        assert_eq!(store.refresh(&source).unwrap(), RefreshOutcome::Unchanged);
        assert!(Arc::ptr_eq(&first.schema, &store.snapshot().unwrap().schema));
    }

    #[test]
    fn test_fetch_failure_marks_stale() {
        let store = SchemaStore::default();
        store.refresh(&StaticSource::new(V1)).unwrap();
        let before = store.snapshot().unwrap();

        assert!(store.refresh(&FailingSource).is_err());
        let after = store.snapshot().unwrap();
        assert!(after.stale);
        assert!(!before.stale);
        assert!(Arc::ptr_eq(&before.schema, &after.schema));

        // Recovery clears the marker
        store.refresh(&StaticSource::new(V1)).unwrap();
        assert!(!store.snapshot().unwrap().stale);
    }

    #[test]
    fn test_fetch_failure_on_empty_store_stays_empty() {
        let store = SchemaStore::default();
        assert!(store.refresh(&FailingSource).is_err());
        assert!(!store.is_ready());
    }

    #[test]
    fn test_file_source_versions_by_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(V1.as_bytes()).unwrap();
        let source = FileSource::new(file.path());

        let store = SchemaStore::default();
        store.refresh(&source).unwrap();
        assert_eq!(store.snapshot().unwrap().version, content_hash(V1));
        let status = store.snapshot().unwrap().status();
        assert_eq!(status.type_count, 2);
        assert!(status.diagnostics.is_empty());
    }
}
