//! Schema Loading
//!
//! Parses SDL text into type definitions, merges `extend` blocks, builds the
//! reference graph, and computes SCCs.
//!
//! A malformed document never produces a partial graph: the first syntax
//! error aborts the load with its line and column.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::DiGraph;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::{
    ArgumentDefinition, Diagnostics, EdgeKind, EnumValue, FieldDefinition, RootTypes,
    TypeDefinition, TypeGraph, TypeKind, TypeRef, is_built_in_scalar,
};
use crate::error::{InsightError, Result};
use crate::lexer::{Directive, TokenKind, TokenStream};

const DEFAULT_DEPRECATION_REASON: &str = "No longer supported";

/// Configuration for schema loading
#[derive(Debug, Clone, Default)]
pub struct LoadConfig {
    /// Fail on references to undeclared types instead of recording a diagnostic
    pub strict_references: bool,
}

/// Parse SDL text into a [`TypeGraph`]
pub fn parse_schema(sdl: &str, config: &LoadConfig) -> Result<TypeGraph> {
    let (stream, lex_error) = TokenStream::from_source(sdl);
    if let Some(err) = lex_error {
        return Err(err);
    }

    let mut parser = SdlParser::new(stream);
    parser.parse_document()?;

    let SdlParser {
        definitions,
        extensions,
        roots,
        declared_roots,
        ..
    } = parser;

    let types = merge_definitions(definitions, extensions)?;

    let mut graph = build_graph(types, roots, content_hash(sdl), config)?;
    for (operation, name) in declared_roots {
        if !graph.types.contains_key(&name) {
            graph.diagnostics.undefined_root_type(&operation, &name);
        }
    }
    Ok(graph)
}

/// SHA-256 of schema text, hex encoded
pub fn content_hash(sdl: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sdl.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parse a standalone type signature such as `[Appointment!]!`
pub fn parse_type_ref(text: &str) -> Result<TypeRef> {
    let (mut stream, lex_error) = TokenStream::from_source(text);
    if let Some(err) = lex_error {
        return Err(err);
    }
    let ty = parse_type(&mut stream)?;
    if !stream.is_eof() {
        return Err(stream.unexpected("end of type"));
    }
    Ok(ty)
}

pub(crate) fn parse_type(stream: &mut TokenStream) -> Result<TypeRef> {
    if stream.at_punct("[") {
        stream.descend()?;
        stream.next();
        let inner = parse_type(stream)?;
        stream.expect_punct("]")?;
        stream.ascend();
        let nullable = !stream.eat_punct("!");
        Ok(TypeRef::list(inner, nullable))
    } else {
        let name = stream.expect_name()?;
        let nullable = !stream.eat_punct("!");
        Ok(TypeRef::named(name.value, nullable))
    }
}

/// `@deprecated` presence and reason
fn deprecation(directives: &[Directive]) -> (bool, Option<String>) {
    match directives.iter().find(|d| d.name == "deprecated") {
        Some(directive) => {
            let reason = directive
                .argument("reason")
                .map(|raw| serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string()))
                .unwrap_or_else(|| DEFAULT_DEPRECATION_REASON.to_string());
            (true, Some(reason))
        }
        None => (false, None),
    }
}

// =============================================================================
// Parser
// =============================================================================

struct SdlParser {
    stream: TokenStream,
    definitions: Vec<TypeDefinition>,
    extensions: Vec<TypeDefinition>,
    roots: RootTypes,
    /// Operation and type name pairs from `schema { ... }` blocks
    declared_roots: Vec<(String, String)>,
}

impl SdlParser {
    fn new(stream: TokenStream) -> Self {
        Self {
            stream,
            definitions: Vec::new(),
            extensions: Vec::new(),
            roots: RootTypes::default(),
            declared_roots: Vec::new(),
        }
    }

    fn parse_document(&mut self) -> Result<()> {
        while !self.stream.is_eof() {
            let description = self.stream.description();

            let keyword = match self.stream.peek() {
                Some(t) if t.kind == TokenKind::Name => t.value.clone(),
                _ => return Err(self.stream.unexpected("definition")),
            };

            match keyword.as_str() {
                "extend" => {
                    self.stream.next();
                    if self.stream.at_name("schema") {
                        self.parse_schema_block()?;
                    } else {
                        let def = self.parse_type_definition(None)?;
                        self.extensions.push(def);
                    }
                }
                "schema" => self.parse_schema_block()?,
                "directive" => self.skip_directive_definition()?,
                _ if TypeKind::from_keyword(&keyword).is_some() => {
                    let def = self.parse_type_definition(description)?;
                    self.definitions.push(def);
                }
                _ => return Err(self.stream.unexpected("definition keyword")),
            }
        }
        Ok(())
    }

    fn parse_schema_block(&mut self) -> Result<()> {
        self.stream.expect_name()?;
        self.stream.parse_directives()?;

        if self.stream.eat_punct("{") {
            while !self.stream.eat_punct("}") {
                let operation = self.stream.expect_name()?;
                self.stream.expect_punct(":")?;
                let type_name = self.stream.expect_name()?.value;
                match operation.value.as_str() {
                    "query" => self.roots.query = type_name.clone(),
                    "mutation" => self.roots.mutation = type_name.clone(),
                    "subscription" => self.roots.subscription = type_name.clone(),
                    other => {
                        return Err(InsightError::parse(
                            operation.line,
                            operation.column,
                            format!("unknown root operation '{}'", other),
                        ))
                    }
                }
                self.declared_roots.push((operation.value, type_name));
            }
        }
        Ok(())
    }

    fn skip_directive_definition(&mut self) -> Result<()> {
        self.stream.expect_name()?;
        self.stream.expect_punct("@")?;
        self.stream.expect_name()?;
        if self.stream.at_punct("(") {
            self.parse_input_values("(", ")")?;
        }
        if self.stream.at_name("repeatable") {
            self.stream.next();
        }
        let on = self.stream.expect_name()?;
        if on.value != "on" {
            return Err(InsightError::parse(on.line, on.column, "expected 'on'"));
        }
        self.stream.eat_punct("|");
        self.stream.expect_name()?;
        while self.stream.eat_punct("|") {
            self.stream.expect_name()?;
        }
        Ok(())
    }

    fn parse_type_definition(&mut self, description: Option<String>) -> Result<TypeDefinition> {
        let keyword = self.stream.expect_name()?;
        let kind = TypeKind::from_keyword(&keyword.value).ok_or_else(|| {
            InsightError::parse(
                keyword.line,
                keyword.column,
                format!("expected type keyword, found '{}'", keyword.value),
            )
        })?;

        let name = self.stream.expect_name()?;
        let mut def = TypeDefinition::new(name.value, kind, name.line);
        def.description = description;

        match kind {
            TypeKind::Object | TypeKind::Interface => {
                def.interfaces = self.parse_implements()?;
                self.stream.parse_directives()?;
                if self.stream.at_punct("{") {
                    def.fields = self.parse_fields()?;
                }
            }
            TypeKind::InputObject => {
                self.stream.parse_directives()?;
                if self.stream.at_punct("{") {
                    def.fields = self
                        .parse_input_values("{", "}")?
                        .into_iter()
                        .map(|(arg, line, deprecated, reason)| FieldDefinition {
                            name: arg.name,
                            ty: arg.ty,
                            arguments: Vec::new(),
                            description: arg.description,
                            deprecated,
                            deprecation_reason: reason,
                            line,
                        })
                        .collect();
                }
            }
            TypeKind::Enum => {
                self.stream.parse_directives()?;
                if self.stream.at_punct("{") {
                    def.enum_values = self.parse_enum_values()?;
                }
            }
            TypeKind::Union => {
                self.stream.parse_directives()?;
                if self.stream.eat_punct("=") {
                    self.stream.eat_punct("|");
                    def.possible_types.push(self.stream.expect_name()?.value);
                    while self.stream.eat_punct("|") {
                        def.possible_types.push(self.stream.expect_name()?.value);
                    }
                }
            }
            TypeKind::Scalar => {
                self.stream.parse_directives()?;
            }
        }

        Ok(def)
    }

    fn parse_implements(&mut self) -> Result<Vec<String>> {
        let mut interfaces = Vec::new();
        if !self.stream.at_name("implements") {
            return Ok(interfaces);
        }
        self.stream.next();
        self.stream.eat_punct("&");
        interfaces.push(self.stream.expect_name()?.value);
        while self.stream.eat_punct("&") {
            interfaces.push(self.stream.expect_name()?.value);
        }
        Ok(interfaces)
    }

    fn parse_fields(&mut self) -> Result<Vec<FieldDefinition>> {
        self.stream.expect_punct("{")?;
        let mut fields = Vec::new();
        while !self.stream.eat_punct("}") {
            if self.stream.is_eof() {
                return Err(self.stream.unexpected("'}'"));
            }
            let description = self.stream.description();
            let name = self.stream.expect_name()?;
            let arguments = if self.stream.at_punct("(") {
                self.parse_input_values("(", ")")?
                    .into_iter()
                    .map(|(arg, ..)| arg)
                    .collect()
            } else {
                Vec::new()
            };
            self.stream.expect_punct(":")?;
            let ty = parse_type(&mut self.stream)?;
            let directives = self.stream.parse_directives()?;
            let (deprecated, deprecation_reason) = deprecation(&directives);

            fields.push(FieldDefinition {
                name: name.value,
                ty,
                arguments,
                description,
                deprecated,
                deprecation_reason,
                line: name.line,
            });
        }
        Ok(fields)
    }

    /// Argument lists and input object bodies share one grammar
    fn parse_input_values(
        &mut self,
        open: &str,
        close: &str,
    ) -> Result<Vec<(ArgumentDefinition, usize, bool, Option<String>)>> {
        self.stream.expect_punct(open)?;
        let mut values = Vec::new();
        while !self.stream.eat_punct(close) {
            if self.stream.is_eof() {
                return Err(self.stream.unexpected(&format!("'{}'", close)));
            }
            let description = self.stream.description();
            let name = self.stream.expect_name()?;
            self.stream.expect_punct(":")?;
            let ty = parse_type(&mut self.stream)?;
            let default_value = if self.stream.eat_punct("=") {
                Some(self.stream.parse_value()?)
            } else {
                None
            };
            let directives = self.stream.parse_directives()?;
            let (deprecated, reason) = deprecation(&directives);

            values.push((
                ArgumentDefinition {
                    name: name.value,
                    ty,
                    default_value,
                    description,
                },
                name.line,
                deprecated,
                reason,
            ));
        }
        Ok(values)
    }

    fn parse_enum_values(&mut self) -> Result<Vec<EnumValue>> {
        self.stream.expect_punct("{")?;
        let mut values = Vec::new();
        while !self.stream.eat_punct("}") {
            if self.stream.is_eof() {
                return Err(self.stream.unexpected("'}'"));
            }
            let description = self.stream.description();
            let name = self.stream.expect_name()?;
            if matches!(name.value.as_str(), "true" | "false" | "null") {
                return Err(InsightError::parse(
                    name.line,
                    name.column,
                    format!("'{}' cannot be an enum value", name.value),
                ));
            }
            let directives = self.stream.parse_directives()?;
            let (deprecated, deprecation_reason) = deprecation(&directives);

            values.push(EnumValue {
                name: name.value,
                description,
                deprecated,
                deprecation_reason,
                line: name.line,
            });
        }
        Ok(values)
    }
}

// =============================================================================
// Assembly
// =============================================================================

fn merge_definitions(
    definitions: Vec<TypeDefinition>,
    extensions: Vec<TypeDefinition>,
) -> Result<BTreeMap<String, TypeDefinition>> {
    let mut types: BTreeMap<String, TypeDefinition> = BTreeMap::new();

    for def in definitions {
        if let Some(existing) = types.get(&def.name) {
            return Err(InsightError::Validation(format!(
                "duplicate type name '{}' (lines {} and {})",
                def.name, existing.line, def.line
            )));
        }
        types.insert(def.name.clone(), def);
    }

    for ext in extensions {
        let Some(base) = types.get_mut(&ext.name) else {
            return Err(InsightError::Validation(format!(
                "cannot extend undefined type '{}' (line {})",
                ext.name, ext.line
            )));
        };
        if base.kind != ext.kind {
            return Err(InsightError::Validation(format!(
                "'extend {}' on line {} does not match '{}' declared as {}",
                ext.kind.keyword(),
                ext.line,
                base.name,
                base.kind.keyword()
            )));
        }
        for field in ext.fields {
            if base.field(&field.name).is_some() {
                return Err(InsightError::Validation(format!(
                    "field '{}.{}' is already defined (line {})",
                    base.name, field.name, field.line
                )));
            }
            base.fields.push(field);
        }
        base.enum_values.extend(ext.enum_values);
        for interface in ext.interfaces {
            if !base.interfaces.contains(&interface) {
                base.interfaces.push(interface);
            }
        }
        for member in ext.possible_types {
            if !base.possible_types.contains(&member) {
                base.possible_types.push(member);
            }
        }
    }

    Ok(types)
}

fn build_graph(
    types: BTreeMap<String, TypeDefinition>,
    roots: RootTypes,
    bundle_hash: String,
    config: &LoadConfig,
) -> Result<TypeGraph> {
    let mut graph = DiGraph::with_capacity(types.len(), types.len() * 3);
    let mut node_indices = HashMap::with_capacity(types.len());
    let mut diagnostics = Diagnostics::new();

    for name in types.keys() {
        let idx = graph.add_node(name.clone());
        node_indices.insert(name.clone(), idx);
    }

    let mut unresolved: Vec<(String, String)> = Vec::new();

    for def in types.values() {
        let mut refs: Vec<(&str, EdgeKind)> = Vec::new();
        for field in &def.fields {
            let kind = if def.kind == TypeKind::InputObject {
                EdgeKind::Argument
            } else {
                EdgeKind::Field
            };
            refs.push((field.ty.base_name(), kind));
            for arg in &field.arguments {
                refs.push((arg.ty.base_name(), EdgeKind::Argument));
            }
        }
        for interface in &def.interfaces {
            refs.push((interface, EdgeKind::Implements));
        }
        for member in &def.possible_types {
            refs.push((member, EdgeKind::UnionMember));
        }

        let from_idx = node_indices[&def.name];
        for (target, kind) in refs {
            match node_indices.get(target) {
                Some(&to_idx) => {
                    graph.add_edge(from_idx, to_idx, kind);
                }
                None if is_built_in_scalar(target) => {}
                None => {
                    if !unresolved.iter().any(|(f, t)| f == &def.name && t == target) {
                        unresolved.push((def.name.clone(), target.to_string()));
                    }
                }
            }
        }

        if def.kind.is_composite() && def.kind != TypeKind::Union && def.fields.is_empty() {
            diagnostics.empty_field_set(&def.name);
        }
    }

    if config.strict_references && !unresolved.is_empty() {
        let listed: Vec<String> = unresolved
            .iter()
            .map(|(from, to)| format!("{} -> {}", from, to))
            .collect();
        return Err(InsightError::Validation(format!(
            "unresolved type references: {}",
            listed.join(", ")
        )));
    }
    for (from, to) in &unresolved {
        warn!(type_name = %from, target = %to, "unresolved type reference");
        diagnostics.unresolved_ref(from, to);
    }

    let mut scc_groups: Vec<Vec<String>> = kosaraju_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut names: Vec<String> = scc
                .into_iter()
                .filter_map(|idx| graph.node_weight(idx).cloned())
                .collect();
            names.sort();
            names
        })
        .collect();
    scc_groups.sort();

    debug!(
        types = types.len(),
        edges = graph.edge_count(),
        cycles = scc_groups.len(),
        "built type graph"
    );

    Ok(TypeGraph {
        types,
        roots,
        graph,
        node_indices,
        scc_groups,
        diagnostics,
        bundle_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::DEFAULT_MAX_NESTING;

    fn load(sdl: &str) -> Result<TypeGraph> {
        parse_schema(sdl, &LoadConfig::default())
    }

    #[test]
    fn test_single_line_declaration() {
        let g = load("type Patient { id: ID! name: String appointments: [Appointment!] }").unwrap();
        let patient = g.get("Patient").unwrap();
        assert_eq!(patient.kind, TypeKind::Object);
        assert_eq!(patient.fields.len(), 3);
        assert_eq!(patient.fields[2].ty.to_string(), "[Appointment!]");
        assert_eq!(patient.line, 1);
    }

    #[test]
    fn test_all_declaration_kinds() {
        let g = load(
            r#"
            "A person receiving care"
            type Patient implements Node & Entity @key(fields: "id") {
              id: ID!
              "Legal name"
              name(format: NameFormat = FULL): String
              status: Status
            }
            interface Node { id: ID! }
            interface Entity { id: ID! }
            input PatientFilter { name: String, limit: Int = 10 }
            enum Status { ACTIVE INACTIVE @deprecated(reason: "use ARCHIVED") ARCHIVED }
            enum NameFormat { FULL SHORT }
            union SearchResult = | Patient | Provider
            type Provider { id: ID! }
            scalar DateTime @specifiedBy(url: "https://example.com")
            directive @key(fields: String!) repeatable on OBJECT | INTERFACE
            "#,
        )
        .unwrap();

        let patient = g.get("Patient").unwrap();
        assert_eq!(patient.description.as_deref(), Some("A person receiving care"));
        assert_eq!(patient.interfaces, vec!["Node", "Entity"]);
        let name = patient.field("name").unwrap();
        assert_eq!(name.description.as_deref(), Some("Legal name"));
        assert_eq!(name.arguments[0].default_value.as_deref(), Some("FULL"));

        let status = g.get("Status").unwrap();
        assert_eq!(status.enum_values.len(), 3);
        assert!(status.enum_values[1].deprecated);
        assert_eq!(status.enum_values[1].deprecation_reason.as_deref(), Some("use ARCHIVED"));

        assert_eq!(g.get("SearchResult").unwrap().possible_types, vec!["Patient", "Provider"]);
        assert_eq!(g.get("PatientFilter").unwrap().kind, TypeKind::InputObject);
        assert_eq!(g.get("DateTime").unwrap().kind, TypeKind::Scalar);
    }

    #[test]
    fn test_extend_type_merges_fields() {
        let g = load(
            r#"
            extend type Query { provider(id: ID!): Provider }
            type Query { patient(id: ID!): Patient }
            type Patient { id: ID! }
            type Provider { id: ID! }
            "#,
        )
        .unwrap();
        let query = g.query_type().unwrap();
        assert_eq!(query.fields.len(), 2);
        assert!(query.field("provider").is_some());
    }

    #[test]
    fn test_extend_undefined_type_is_validation_error() {
        let err = load("extend type Ghost { id: ID }").unwrap_err();
        assert!(matches!(err, InsightError::Validation(_)));
    }

    #[test]
    fn test_duplicate_type_is_validation_error() {
        let err = load("type A { id: ID }\ntype A { name: String }").unwrap_err();
        match err {
            InsightError::Validation(msg) => assert!(msg.contains("duplicate type name 'A'")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_declaration_reports_line() {
        let err = load("type A {\n  id: ID!\n  name String\n}").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);
        assert_eq!(err.position(), Some((3, 8)));
    }

    #[test]
    fn test_deeply_nested_list_type_is_parse_error() {
        let depth = 20_000;
        let sdl = format!("type A {{ grid: {}Int{} }}", "[".repeat(depth), "]".repeat(depth));
        let err = load(&sdl).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);
        assert!(err.to_string().contains("nesting"));

        let err = parse_type_ref(&format!("{}ID{}", "[".repeat(depth), "]".repeat(depth))).unwrap_err();
        assert_eq!(err.position(), Some((1, DEFAULT_MAX_NESTING + 1)));
        assert!(parse_type_ref("[[[ID!]!]]").is_ok());
    }

    #[test]
    fn test_deprecated_without_reason_uses_default() {
        let g = load("type A { old: String @deprecated }").unwrap();
        let old = g.field("A", "old").unwrap();
        assert!(old.deprecated);
        assert_eq!(old.deprecation_reason.as_deref(), Some(DEFAULT_DEPRECATION_REASON));
    }

    #[test]
    fn test_schema_block_sets_roots() {
        let g = load(
            r#"
            schema { query: RootQuery mutation: RootMutation }
            type RootQuery { ping: String }
            type RootMutation { pong: String }
            "#,
        )
        .unwrap();
        assert_eq!(g.roots().query, "RootQuery");
        assert_eq!(g.query_type().map(|d| d.name.as_str()), Some("RootQuery"));
        assert!(g.diagnostics().is_empty());
    }

    #[test]
    fn test_unresolved_refs_are_diagnostics_unless_strict() {
        let sdl = "type Query { patient: Patient }";
        let g = load(sdl).unwrap();
        assert_eq!(g.diagnostics().warning_count(), 1);

        let strict = LoadConfig { strict_references: true };
        assert!(matches!(
            parse_schema(sdl, &strict),
            Err(InsightError::Validation(_))
        ));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let g = load("type Query { node: Node } type Node { parent: Node }").unwrap();
        assert_eq!(g.scc_groups(), &[vec!["Node".to_string()]]);
    }

    #[test]
    fn test_type_ref_round_trip() {
        for sdl in ["ID!", "[Appointment!]", "[[Int]!]!", "String"] {
            let ty = parse_type_ref(sdl).unwrap();
            assert_eq!(parse_type_ref(&ty.to_sdl()).unwrap(), ty);
            assert_eq!(ty.to_sdl(), sdl);
        }
        assert!(parse_type_ref("[Int").is_err());
        assert!(parse_type_ref("Int Int").is_err());
    }

    #[test]
    fn test_identical_text_is_idempotent() {
        let sdl = "type Patient { id: ID! appointments: [Appointment] } type Appointment { patient: Patient }";
        assert_eq!(load(sdl).unwrap(), load(sdl).unwrap());
    }
}
