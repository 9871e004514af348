//! Record schemas: named, ordered, immutable field lists.
//!
//! A [`Schema`] is constructed once (via [`Schema::record_of`]) and never
//! mutated afterwards; stages pass schemas around as serialized JSON in
//! their property maps.

use serde::{Deserialize, Serialize};

/// Primitive field types supported by the record model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Bytes,
    String,
}

impl FieldType {
    /// Wire-format name, as used in serialized schemas and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Bytes => "bytes",
            Self::String => "string",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named field with a primitive type and a nullability flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
}

impl Field {
    /// A non-nullable field.
    #[must_use]
    pub fn of(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    /// A nullable field.
    #[must_use]
    pub fn nullable_of(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }
}

/// Errors raised while constructing or deserializing a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Two fields share the same name.
    #[error("duplicate field '{name}' in schema '{schema}'")]
    DuplicateField { schema: String, name: String },

    /// A schema must name at least one field.
    #[error("schema '{schema}' has no fields")]
    Empty { schema: String },

    /// The serialized form could not be parsed.
    #[error("invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A named record type composed of ordered fields.
///
/// Field names are unique within a schema and the schema is immutable
/// once constructed; the only constructors are [`Schema::record_of`] and
/// [`Schema::from_json`], both of which enforce the invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema", into = "RawSchema")]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

/// Unvalidated mirror used for serde; `TryFrom` re-checks the invariants
/// so a schema deserialized from a stage property is as trustworthy as a
/// constructed one.
#[derive(Serialize, Deserialize)]
struct RawSchema {
    name: String,
    fields: Vec<Field>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = SchemaError;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        Schema::record_of(raw.name, raw.fields)
    }
}

impl From<Schema> for RawSchema {
    fn from(schema: Schema) -> Self {
        Self {
            name: schema.name,
            fields: schema.fields,
        }
    }
}

impl Schema {
    /// Construct a record schema, validating field-name uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateField`] if two fields share a name,
    /// or [`SchemaError::Empty`] for an empty field list.
    pub fn record_of(
        name: impl Into<String>,
        fields: Vec<Field>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if fields.is_empty() {
            return Err(SchemaError::Empty { schema: name });
        }
        let mut seen = std::collections::HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: name,
                    name: field.name.clone(),
                });
            }
        }
        Ok(Self { name, fields })
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Positional index of a field, if declared.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Serialize to the JSON string form carried in stage properties.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("schema serialization is infallible")
    }

    /// Parse a schema from its JSON string form.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the JSON is malformed or the field list
    /// violates the schema invariants.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(json)?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student_schema() -> Schema {
        Schema::record_of(
            "student",
            vec![
                Field::nullable_of("id", FieldType::Int),
                Field::of("name", FieldType::String),
                Field::of("score", FieldType::Double),
                Field::of("graduated", FieldType::Boolean),
                Field::nullable_of("binary", FieldType::Bytes),
                Field::of("time", FieldType::Long),
            ],
        )
        .unwrap()
    }

    #[test]
    fn fields_keep_declaration_order() {
        let schema = student_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "score", "graduated", "binary", "time"]);
    }

    #[test]
    fn duplicate_field_rejected() {
        let err = Schema::record_of(
            "r",
            vec![
                Field::of("a", FieldType::Int),
                Field::of("a", FieldType::String),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate field 'a'"));
    }

    #[test]
    fn empty_schema_rejected() {
        let err = Schema::record_of("r", vec![]).unwrap_err();
        assert!(err.to_string().contains("no fields"));
    }

    #[test]
    fn field_lookup() {
        let schema = student_schema();
        let field = schema.field("score").unwrap();
        assert_eq!(field.field_type, FieldType::Double);
        assert!(!field.nullable);
        assert!(schema.field("missing").is_none());
        assert_eq!(schema.field_index("name"), Some(1));
    }

    #[test]
    fn json_roundtrip() {
        let schema = student_schema();
        let json = schema.to_json();
        let back = Schema::from_json(&json).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn json_with_duplicate_field_rejected() {
        let json = r#"{"name":"r","fields":[
            {"name":"a","type":"int"},
            {"name":"a","type":"long"}
        ]}"#;
        let err = Schema::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn nullable_defaults_to_false_in_json() {
        let json = r#"{"name":"r","fields":[{"name":"x","type":"string"}]}"#;
        let schema = Schema::from_json(json).unwrap();
        assert!(!schema.field("x").unwrap().nullable);
    }

    #[test]
    fn field_type_wire_names() {
        assert_eq!(FieldType::Int.as_str(), "int");
        assert_eq!(FieldType::Bytes.to_string(), "bytes");
        let json = serde_json::to_string(&FieldType::Double).unwrap();
        assert_eq!(json, "\"double\"");
    }
}
