//! Relationship Classification
//!
//! Determines how a field relates its owner to the type it returns, from the
//! shape of its [`TypeRef`] alone:
//!
//! | Field type            | Relationship |
//! |-----------------------|--------------|
//! | `Provider!`           | belongs_to   |
//! | `Provider`            | has_one      |
//! | `[Appointment!]`      | has_many     |
//! | `String`, enums, ...  | scalar       |
//!
//! Classification looks at one field at a time and never follows the target
//! type, so cyclic schemas need no special handling.

use serde::{Deserialize, Serialize};

use super::{TypeGraph, TypeRef};

// =============================================================================
// Relationship
// =============================================================================

/// How a field relates its owner to its target type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// Non-null single object
    BelongsTo,
    /// Nullable single object
    HasOne,
    /// List of objects
    HasMany,
    /// Scalars, enums, and input types
    Scalar,
}

/// Classification result for a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRelationship {
    pub field: String,
    pub target: String,
    pub relationship: Relationship,
}

// =============================================================================
// Classifier
// =============================================================================

/// Classifies fields against a type graph
pub struct Classifier<'a> {
    graph: &'a TypeGraph,
}

impl<'a> Classifier<'a> {
    pub fn new(graph: &'a TypeGraph) -> Self {
        Self { graph }
    }

    /// Classify a single type reference
    pub fn classify(&self, ty: &TypeRef) -> Relationship {
        if !self.graph.is_object_like(ty.base_name()) {
            return Relationship::Scalar;
        }
        match ty {
            TypeRef::List { .. } => Relationship::HasMany,
            TypeRef::Named { nullable: false, .. } => Relationship::BelongsTo,
            TypeRef::Named { nullable: true, .. } => Relationship::HasOne,
        }
    }

    /// Classify every field of a type, in declaration order
    pub fn classify_type(&self, type_name: &str) -> Vec<FieldRelationship> {
        let Some(def) = self.graph.get(type_name) else {
            return Vec::new();
        };

        def.fields
            .iter()
            .map(|field| FieldRelationship {
                field: field.name.clone(),
                target: field.ty.base_name().to_string(),
                relationship: self.classify(&field.ty),
            })
            .collect()
    }
}

// =============================================================================
// Naming Utilities
// =============================================================================

/// Convert string to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = true;

    // SCREAMING_SNAKE_CASE input is lowered after the first letter of each word
    let is_all_caps = s.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c == '-');

    for c in s.chars() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else if is_all_caps {
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}
