//! Type introspection
//!
//! Resolves one named type and classifies the relationships of its fields.
//! Expansion stops at the type's own fields and its direct referrers, so
//! cyclic schemas are safe to introspect.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::{InsightError, Result};
use crate::graph::{
    ArgumentDefinition, Classifier, FieldDefinition, Relationship, TypeDefinition, TypeKind,
};
use crate::schema::IndexedSchema;
use crate::search::SearchEngine;

/// Field as reported by introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDetail {
    pub name: String,
    /// SDL rendering of the field type, e.g. `[Appointment!]`
    #[serde(rename = "type")]
    pub ty: String,
    pub nullable: bool,
    pub is_list: bool,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ArgumentDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDetail {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValueDetail {
    pub name: String,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
    pub description: Option<String>,
}

/// Field names grouped by relationship
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships {
    pub belongs_to: Vec<String>,
    pub has_one: Vec<String>,
    pub has_many: Vec<String>,
}

/// Introspection result for one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDetail {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    pub fields: Vec<FieldDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<EnumValueDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Relationships>,
    /// Types with a field, argument, interface or union edge to this one
    pub referenced_by: Vec<String>,
    /// Other members of the reference cycle this type belongs to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycle_group: Vec<String>,
}

impl From<&FieldDefinition> for FieldDetail {
    fn from(field: &FieldDefinition) -> Self {
        Self {
            name: field.name.clone(),
            ty: field.ty.to_sdl(),
            nullable: field.ty.is_nullable(),
            is_list: field.ty.is_list(),
            deprecated: field.deprecated,
            deprecation_reason: field.deprecation_reason.clone(),
            description: field.description.clone(),
            arguments: field.arguments.iter().map(ArgumentDetail::from).collect(),
        }
    }
}

impl From<&ArgumentDefinition> for ArgumentDetail {
    fn from(arg: &ArgumentDefinition) -> Self {
        Self {
            name: arg.name.clone(),
            ty: arg.ty.to_sdl(),
            default_value: arg.default_value.clone(),
            description: arg.description.clone(),
        }
    }
}

/// Introspects types of one schema snapshot
pub struct TypeIntrospector {
    schema: Arc<IndexedSchema>,
    search: SearchConfig,
}

impl TypeIntrospector {
    pub fn new(schema: Arc<IndexedSchema>, search: SearchConfig) -> Self {
        Self { schema, search }
    }

    /// Describe `type_name`, resolved exactly then case-insensitively
    pub fn introspect(
        &self,
        type_name: &str,
        include_relationships: bool,
        include_deprecated: bool,
    ) -> Result<TypeDetail> {
        let graph = &self.schema.graph;
        let def = graph.resolve(type_name.trim()).ok_or_else(|| self.not_found(type_name))?;

        let visible: Vec<&FieldDefinition> = def
            .fields
            .iter()
            .filter(|f| include_deprecated || !f.deprecated)
            .collect();

        let relationships = include_relationships.then(|| self.relationships(def, &visible));

        let enum_values = def
            .enum_values
            .iter()
            .filter(|v| include_deprecated || !v.deprecated)
            .map(|v| EnumValueDetail {
                name: v.name.clone(),
                deprecated: v.deprecated,
                deprecation_reason: v.deprecation_reason.clone(),
                description: v.description.clone(),
            })
            .collect();

        let cycle_group = graph
            .scc_groups()
            .iter()
            .find(|group| group.contains(&def.name))
            .map(|group| group.iter().filter(|n| **n != def.name).cloned().collect())
            .unwrap_or_default();

        Ok(TypeDetail {
            name: def.name.clone(),
            kind: def.kind,
            description: def.description.clone(),
            fields: visible.iter().map(|f| FieldDetail::from(*f)).collect(),
            enum_values,
            interfaces: def.interfaces.clone(),
            possible_types: def.possible_types.clone(),
            relationships,
            referenced_by: graph
                .refs_in(&def.name)
                .into_iter()
                .filter(|n| *n != def.name)
                .map(String::from)
                .collect(),
            cycle_group,
        })
    }

    fn relationships(&self, def: &TypeDefinition, fields: &[&FieldDefinition]) -> Relationships {
        let classifier = Classifier::new(&self.schema.graph);
        let mut rels = Relationships::default();

        // Input object fields never resolve to related records
        if def.kind == TypeKind::InputObject {
            return rels;
        }

        for field in fields {
            let bucket = match classifier.classify(&field.ty) {
                Relationship::BelongsTo => &mut rels.belongs_to,
                Relationship::HasOne => &mut rels.has_one,
                Relationship::HasMany => &mut rels.has_many,
                Relationship::Scalar => continue,
            };
            bucket.push(field.name.clone());
        }
        rels
    }

    fn not_found(&self, type_name: &str) -> InsightError {
        let engine = SearchEngine::new(Arc::clone(&self.schema), self.search.clone());
        InsightError::NotFound {
            name: type_name.to_string(),
            suggestions: engine.suggest_types(type_name, self.search.suggestion_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LoadConfig, parse_type_ref};
    use crate::schema::index_schema;

    const SDL: &str = r#"
type Query {
  patient(id: ID!): Patient
}

"A person receiving care"
type Patient {
  id: ID!
  name: String
  ssn: String @deprecated(reason: "Use nationalId")
  primaryProvider: Provider
  appointments: [Appointment!]
}

type Appointment {
  id: ID!
  patient: Patient!
  provider: Provider!
  status: Status
}

type Provider {
  id: ID!
  appointments(first: Int = 10): [Appointment!]!
}

enum Status {
  BOOKED
  WAITLISTED @deprecated
}

input PatientFilter {
  provider: ID
}
"#;

    fn introspector() -> TypeIntrospector {
        let schema = index_schema(SDL, &LoadConfig::default()).unwrap();
        TypeIntrospector::new(Arc::new(schema), SearchConfig::default())
    }

    #[test]
    fn test_relationships_are_classified() {
        let detail = introspector().introspect("Patient", true, true).unwrap();
        let rels = detail.relationships.unwrap();
        assert_eq!(rels.has_many, vec!["appointments"]);
        assert_eq!(rels.has_one, vec!["primaryProvider"]);
        assert!(rels.belongs_to.is_empty());

        let appointment = introspector().introspect("Appointment", true, true).unwrap();
        assert_eq!(
            appointment.relationships.unwrap().belongs_to,
            vec!["patient", "provider"]
        );
    }

    #[test]
    fn test_relationships_omitted_when_not_requested() {
        let detail = introspector().introspect("Patient", false, true).unwrap();
        assert!(detail.relationships.is_none());
    }

    #[test]
    fn test_case_insensitive_resolution() {
        let detail = introspector().introspect("patient", false, true).unwrap();
        assert_eq!(detail.name, "Patient");
        assert_eq!(detail.description.as_deref(), Some("A person receiving care"));
    }

    #[test]
    fn test_deprecated_fields_hidden() {
        let i = introspector();
        let all = i.introspect("Patient", false, true).unwrap();
        let ssn = all.fields.iter().find(|f| f.name == "ssn").unwrap();
        assert_eq!(ssn.deprecation_reason.as_deref(), Some("Use nationalId"));

        let visible = i.introspect("Patient", false, false).unwrap();
        assert!(visible.fields.iter().all(|f| f.name != "ssn"));

        let status = i.introspect("Status", false, false).unwrap();
        assert_eq!(status.enum_values.len(), 1);
    }

    #[test]
    fn test_field_shape() {
        let detail = introspector().introspect("Provider", false, true).unwrap();
        let appointments = &detail.fields[1];
        assert_eq!(appointments.ty, "[Appointment!]!");
        assert!(!appointments.nullable);
        assert!(appointments.is_list);
        assert_eq!(appointments.arguments[0].default_value.as_deref(), Some("10"));
    }

    #[test]
    fn test_field_type_round_trips() {
        let detail = introspector().introspect("Patient", false, true).unwrap();
        let schema = index_schema(SDL, &LoadConfig::default()).unwrap();
        for field in &detail.fields {
            let reparsed = parse_type_ref(&field.ty).unwrap();
            assert_eq!(&reparsed, &schema.graph.field("Patient", &field.name).unwrap().ty);
        }
    }

    #[test]
    fn test_cycles_report_one_hop() {
        let detail = introspector().introspect("Appointment", true, true).unwrap();
        assert_eq!(detail.referenced_by, vec!["Patient", "Provider"]);
        assert!(detail.cycle_group.contains(&"Patient".to_string()));
    }

    #[test]
    fn test_input_object_has_no_relationships() {
        let detail = introspector().introspect("PatientFilter", true, true).unwrap();
        assert_eq!(detail.relationships.unwrap(), Relationships::default());
    }

    #[test]
    fn test_unknown_type_suggests_names() {
        let err = introspector().introspect("Patients", true, true).unwrap_err();
        match err {
            InsightError::NotFound { name, suggestions } => {
                assert_eq!(name, "Patients");
                assert_eq!(suggestions[0], "Patient");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
