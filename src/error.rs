//! Error types for schema indexing and query analysis

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for insight operations
pub type Result<T> = std::result::Result<T, InsightError>;

/// Errors raised by the indexer, search, introspection and analysis layers
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Not found: {name}{}", format_suggestions(.suggestions))]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("Schema index is not ready: no schema has been loaded")]
    NotReady,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

impl InsightError {
    pub fn parse(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Machine-readable error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotReady => ErrorKind::NotReady,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io(_) | Self::Json(_) | Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Source position, for parse errors
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Parse { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }

    pub fn to_entry(&self) -> ErrorEntry {
        let position = self.position();
        ErrorEntry {
            kind: self.kind(),
            message: self.to_string(),
            line: position.map(|(line, _)| line),
            column: position.map(|(_, column)| column),
        }
    }
}

/// Machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    NotFound,
    NotReady,
    Validation,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::NotFound => "not_found",
            Self::NotReady => "not_ready",
            Self::Validation => "validation",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Serializable error record embedded in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}
