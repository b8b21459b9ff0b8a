//! Diagnostics
//!
//! Non-fatal findings collected while building a type graph. Fatal problems
//! (syntax errors, duplicate names) are returned as errors instead.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Field, argument, interface or union member names an undeclared type
    UnresolvedRef,
    /// `schema { query: X }` names an undeclared type
    UndefinedRootType,
    /// Object or interface declared without fields
    EmptyFieldSet,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedRef => "W001",
            Self::UndefinedRootType => "W002",
            Self::EmptyFieldSet => "I001",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnresolvedRef | Self::UndefinedRootType => Severity::Warning,
            Self::EmptyFieldSet => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Type that caused this diagnostic
    pub type_name: String,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(type_name: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.type_name
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from a schema load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Add diagnostic for a reference to an undeclared type
    pub fn unresolved_ref(&mut self, type_name: &str, target: &str) {
        self.push(DiagnosticItem::new(
            type_name,
            DiagnosticCode::UnresolvedRef,
            format!("type '{}' is referenced but not declared", target),
        ));
    }

    /// Add diagnostic for a root operation naming an undeclared type
    pub fn undefined_root_type(&mut self, operation: &str, type_name: &str) {
        self.push(
            DiagnosticItem::new(
                type_name,
                DiagnosticCode::UndefinedRootType,
                format!("{} root type '{}' is not declared", operation, type_name),
            )
            .with_context(format!("schema {{ {}: {} }}", operation, type_name)),
        );
    }

    pub fn empty_field_set(&mut self, type_name: &str) {
        self.push(DiagnosticItem::new(
            type_name,
            DiagnosticCode::EmptyFieldSet,
            "type declares no fields",
        ));
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if !self.is_empty() {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::UnresolvedRef.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::EmptyFieldSet.severity(), Severity::Info);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.unresolved_ref("Patient", "Appointment");
        diags.empty_field_set("Marker");

        assert_eq!(diags.len(), 2);
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.to_string().contains("[W001] warning"));
    }
}
