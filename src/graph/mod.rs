//! GraphQL Type Graph
//!
//! Name-keyed map of type definitions parsed from SDL, plus a petgraph
//! reference graph for one-hop lookups and cycle (SCC) groups.
//!
//! The graph is legitimately cyclic (`Patient -> Appointment -> Patient`).
//! Types refer to each other only by name; every lookup goes through the
//! map, and nothing here walks the transitive closure.
//!
//! This module is shared between:
//! - Search and introspection (read-only lookups)
//! - Query analysis (schema-aware type resolution)

pub mod loader;
pub mod classify;
pub mod diagnostics;

pub use classify::{Classifier, FieldRelationship, Relationship, to_pascal_case};
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use loader::{LoadConfig, content_hash, parse_schema, parse_type_ref};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Scalars every GraphQL schema has without declaring them
pub const BUILT_IN_SCALARS: &[&str] = &["Int", "Float", "String", "Boolean", "ID"];

pub fn is_built_in_scalar(name: &str) -> bool {
    BUILT_IN_SCALARS.contains(&name)
}

// =============================================================================
// Type References
// =============================================================================

/// Recursive descriptor of a field or argument type.
///
/// `[Appointment!]!` is `List { of: Named { Appointment, nullable: false }, nullable: false }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRef {
    Named { name: String, nullable: bool },
    List { of: Box<TypeRef>, nullable: bool },
}

impl TypeRef {
    pub fn named(name: impl Into<String>, nullable: bool) -> Self {
        TypeRef::Named {
            name: name.into(),
            nullable,
        }
    }

    pub fn list(of: TypeRef, nullable: bool) -> Self {
        TypeRef::List {
            of: Box::new(of),
            nullable,
        }
    }

    /// Innermost named type
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named { name, .. } => name,
            TypeRef::List { of, .. } => of.base_name(),
        }
    }

    /// Nullability of the outermost wrapper
    pub fn is_nullable(&self) -> bool {
        match self {
            TypeRef::Named { nullable, .. } | TypeRef::List { nullable, .. } => *nullable,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, TypeRef::List { .. })
    }

    /// Number of list wrappers (`[[Int]]` is 2)
    pub fn list_depth(&self) -> usize {
        match self {
            TypeRef::Named { .. } => 0,
            TypeRef::List { of, .. } => 1 + of.list_depth(),
        }
    }

    /// Render back to SDL syntax
    pub fn to_sdl(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, nullable } => {
                write!(f, "{}", name)?;
                if !nullable {
                    write!(f, "!")?;
                }
            }
            TypeRef::List { of, nullable } => {
                write!(f, "[{}]", of)?;
                if !nullable {
                    write!(f, "!")?;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Definitions
// =============================================================================

/// Kind of a named type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Object,
    InputObject,
    Enum,
    Interface,
    Union,
    Scalar,
}

impl TypeKind {
    /// SDL keyword introducing this kind
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeKind::Object => "type",
            TypeKind::InputObject => "input",
            TypeKind::Enum => "enum",
            TypeKind::Interface => "interface",
            TypeKind::Union => "union",
            TypeKind::Scalar => "scalar",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "type" => Some(TypeKind::Object),
            "input" => Some(TypeKind::InputObject),
            "enum" => Some(TypeKind::Enum),
            "interface" => Some(TypeKind::Interface),
            "union" => Some(TypeKind::Union),
            "scalar" => Some(TypeKind::Scalar),
            _ => None,
        }
    }

    /// Types whose selections need a sub-selection
    pub fn is_composite(&self) -> bool {
        matches!(self, TypeKind::Object | TypeKind::Interface | TypeKind::Union)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeKind::Object => "OBJECT",
            TypeKind::InputObject => "INPUT_OBJECT",
            TypeKind::Enum => "ENUM",
            TypeKind::Interface => "INTERFACE",
            TypeKind::Union => "UNION",
            TypeKind::Scalar => "SCALAR",
        };
        f.write_str(s)
    }
}

/// Argument of a field, or a field of an input object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ArgumentDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    /// Source line of the field name (1-indexed)
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    pub line: usize,
}

/// A named type declaration, with any `extend` blocks merged in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<EnumValue>,
    /// `implements A & B`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    /// Union members
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_types: Vec<String>,
    /// Source line of the type name (1-indexed)
    pub line: usize,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeKind, line: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            fields: Vec::new(),
            enum_values: Vec::new(),
            interfaces: Vec::new(),
            possible_types: Vec::new(),
            line,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Root operation type names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootTypes {
    pub query: String,
    pub mutation: String,
    pub subscription: String,
}

impl Default for RootTypes {
    fn default() -> Self {
        Self {
            query: "Query".to_string(),
            mutation: "Mutation".to_string(),
            subscription: "Subscription".to_string(),
        }
    }
}

/// Types of edges in the reference graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Field return type
    Field,
    /// Field argument or input field type
    Argument,
    /// `implements` clause
    Implements,
    /// Union member
    UnionMember,
}

// =============================================================================
// Type Graph
// =============================================================================

/// The parsed schema: immutable once built
#[derive(Debug, Clone)]
pub struct TypeGraph {
    /// Type definitions keyed by name
    pub(crate) types: BTreeMap<String, TypeDefinition>,

    pub(crate) roots: RootTypes,

    /// Reference graph; node weights are type names
    pub(crate) graph: DiGraph<String, EdgeKind>,

    /// Node index lookup: name -> NodeIndex
    pub(crate) node_indices: HashMap<String, NodeIndex>,

    /// Strongly connected components (mutually referencing type groups)
    pub(crate) scc_groups: Vec<Vec<String>>,

    pub(crate) diagnostics: Diagnostics,

    /// SHA256 of the SDL text, usable as a version token
    pub bundle_hash: String,
}

impl PartialEq for TypeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
            && self.roots == other.roots
            && self.scc_groups == other.scc_groups
            && self.diagnostics == other.diagnostics
            && self.bundle_hash == other.bundle_hash
            && self.graph.edge_count() == other.graph.edge_count()
    }
}

impl TypeGraph {
    // ========== Public API ==========

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of cycle groups
    pub fn scc_count(&self) -> usize {
        self.scc_groups.len()
    }

    /// Groups of types that reference each other in a cycle
    pub fn scc_groups(&self) -> &[Vec<String>] {
        &self.scc_groups
    }

    pub fn roots(&self) -> &RootTypes {
        &self.roots
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Get type definition by exact name
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Resolve a name exactly, then case-insensitively
    pub fn resolve(&self, query: &str) -> Option<&TypeDefinition> {
        if let Some(def) = self.types.get(query) {
            return Some(def);
        }

        let query_lower = query.to_lowercase();
        self.types
            .values()
            .find(|def| def.name.to_lowercase() == query_lower)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Field `field_name` declared on `type_name`
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.types.get(type_name)?.field(field_name)
    }

    /// Query root definition, if the schema declares one
    pub fn query_type(&self) -> Option<&TypeDefinition> {
        self.types.get(&self.roots.query)
    }

    pub fn mutation_type(&self) -> Option<&TypeDefinition> {
        self.types.get(&self.roots.mutation)
    }

    pub fn subscription_type(&self) -> Option<&TypeDefinition> {
        self.types.get(&self.roots.subscription)
    }

    /// Whether a named type needs a sub-selection.
    ///
    /// Undeclared names that are not built-in scalars count as objects, so a
    /// partial schema still classifies its relationships.
    pub fn is_object_like(&self, name: &str) -> bool {
        match self.types.get(name) {
            Some(def) => def.kind.is_composite(),
            None => !is_built_in_scalar(name),
        }
    }

    /// Immediate outgoing references (types this type uses)
    pub fn refs_out(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Immediate incoming references (types that use this type)
    pub fn refs_in(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&node_idx) = self.node_indices.get(name) else {
            return Vec::new();
        };

        let names: BTreeSet<&str> = self
            .graph
            .edges_directed(node_idx, direction)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                self.graph.node_weight(other).map(String::as_str)
            })
            .collect();

        names.into_iter().collect()
    }

    /// All type definitions, ordered by name
    pub fn all_types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.types.keys()
    }
}
