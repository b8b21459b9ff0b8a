//! GraphQL Schema Insight
//!
//! Indexes a large GraphQL schema for search and introspection, and
//! statically analyzes client queries for performance and field-usage
//! problems.
//!
//! ## Features
//!
//! - **Schema Indexing**: SDL text parsed into a name-keyed type graph with cycle groups
//! - **Search**: Case-insensitive substring search with source context windows
//! - **Introspection**: Relationship classification (belongs_to, has_one, has_many)
//! - **Query Analysis**: Depth, N+1, missing pagination and expensive field checks
//! - **Field Usage**: Per-field usage and over-fetching across a batch of queries
//! - **Hot Reload**: Snapshots published by atomic swap; failed reloads keep the last good one
//!
//! ## Architecture
//!
//! ```text
//! SDL text ──> graph::loader ──> IndexedSchema { TypeGraph, SearchIndex }
//!                                    │
//!                     SchemaStore (ArcSwap snapshot)
//!                                    │
//!              ┌─────────────┬───────┴──────┬──────────────┐
//!         SearchEngine  TypeIntrospector  QueryAnalyzer  FieldUsageTracker
//!                                              ^               ^
//! query text ──> query::parser ──> QueryDocument ──────────────┘
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod insight;
pub mod introspect;
pub mod lexer;
pub mod query;
pub mod schema;
pub mod search;
pub mod store;

pub use config::InsightConfig;
pub use error::{ErrorEntry, ErrorKind, InsightError, Result};
pub use graph::{LoadConfig, TypeGraph, TypeKind, TypeRef, parse_schema};
pub use insight::SchemaInsight;
pub use introspect::{TypeDetail, TypeIntrospector};
pub use query::{AnalysisReport, FieldUsageReport, FieldUsageTracker, QueryAnalyzer, parse_query};
pub use schema::{IndexedSchema, index_schema};
pub use search::{SearchEngine, SearchFilter, SearchResponse};
pub use store::{FileSource, SchemaSnapshot, SchemaSource, SchemaStore, StaticSource};
