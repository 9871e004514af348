//! Records: schema-conforming value tuples.
//!
//! A [`Record`] is built against an `Arc<Schema>` via [`Record::builder`];
//! the builder rejects unknown fields, type mismatches, and nulls in
//! non-nullable fields, so a constructed record always conforms to its
//! schema.

use std::sync::Arc;

use crate::error::ConnectorError;
use crate::schema::{FieldType, Schema};

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    String(String),
}

impl Value {
    /// True for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is admissible for a field of `field_type`.
    /// Null is handled separately by the nullability check.
    #[must_use]
    pub fn matches(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Self::Null, _)
                | (Self::Int(_), FieldType::Int)
                | (Self::Long(_), FieldType::Long)
                | (Self::Float(_), FieldType::Float)
                | (Self::Double(_), FieldType::Double)
                | (Self::Boolean(_), FieldType::Boolean)
                | (Self::Bytes(_), FieldType::Bytes)
                | (Self::String(_), FieldType::String)
        )
    }

    /// Render the value for template substitution and error messages.
    /// Bytes render as lossy UTF-8; null renders as the empty string.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Boolean(v) => v.to_string(),
            Self::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            Self::String(v) => v.clone(),
        }
    }

    /// Parse a rendered string back into a value of `field_type`.
    ///
    /// # Errors
    ///
    /// Returns a data-category [`ConnectorError`] if the string does not
    /// parse as the target type.
    pub fn parse_as(text: &str, field_type: FieldType) -> Result<Self, ConnectorError> {
        fn coercion_error(text: &str, field_type: FieldType) -> ConnectorError {
            ConnectorError::data(
                "TYPE_COERCION",
                format!("cannot parse '{text}' as {field_type}"),
            )
        }
        Ok(match field_type {
            FieldType::Int => {
                Self::Int(text.parse().map_err(|_| coercion_error(text, field_type))?)
            }
            FieldType::Long => {
                Self::Long(text.parse().map_err(|_| coercion_error(text, field_type))?)
            }
            FieldType::Float => {
                Self::Float(text.parse().map_err(|_| coercion_error(text, field_type))?)
            }
            FieldType::Double => {
                Self::Double(text.parse().map_err(|_| coercion_error(text, field_type))?)
            }
            FieldType::Boolean => {
                Self::Boolean(text.parse().map_err(|_| coercion_error(text, field_type))?)
            }
            FieldType::Bytes => Self::Bytes(text.as_bytes().to_vec()),
            FieldType::String => Self::String(text.to_string()),
        })
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

/// An instance of a [`Schema`]: one value per field, in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    /// Start building a record for `schema`. All fields default to null
    /// until set; `build` enforces nullability.
    #[must_use]
    pub fn builder(schema: Arc<Schema>) -> RecordBuilder {
        let values = vec![Value::Null; schema.fields().len()];
        RecordBuilder { schema, values }
    }

    /// The record's schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Value of a field, if the field is declared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.field_index(name).map(|i| &self.values[i])
    }

    /// All values in field order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// JSON rendering used for dead-letter persistence and logging.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            let json = match value {
                Value::Null => serde_json::Value::Null,
                Value::Int(v) => serde_json::Value::from(*v),
                Value::Long(v) => serde_json::Value::from(*v),
                Value::Float(v) => serde_json::Value::from(f64::from(*v)),
                Value::Double(v) => serde_json::Value::from(*v),
                Value::Boolean(v) => serde_json::Value::from(*v),
                Value::Bytes(v) => {
                    serde_json::Value::from(String::from_utf8_lossy(v).into_owned())
                }
                Value::String(v) => serde_json::Value::from(v.clone()),
            };
            map.insert(field.name.clone(), json);
        }
        serde_json::Value::Object(map)
    }
}

/// Builder returned by [`Record::builder`].
#[derive(Debug)]
pub struct RecordBuilder {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl RecordBuilder {
    /// Set a field value, validating the field exists and the type matches.
    ///
    /// # Errors
    ///
    /// Returns a data-category [`ConnectorError`] for unknown fields or
    /// type mismatches.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Result<Self, ConnectorError> {
        let value = value.into();
        let index = self.schema.field_index(name).ok_or_else(|| {
            ConnectorError::data(
                "UNKNOWN_FIELD",
                format!("field '{name}' not in schema '{}'", self.schema.name()),
            )
        })?;
        let field = &self.schema.fields()[index];
        if !value.matches(field.field_type) {
            return Err(ConnectorError::data(
                "TYPE_MISMATCH",
                format!(
                    "field '{name}' expects {}, got {value:?}",
                    field.field_type
                ),
            ));
        }
        self.values[index] = value;
        Ok(self)
    }

    /// Finish the record, enforcing nullability.
    ///
    /// # Errors
    ///
    /// Returns a data-category [`ConnectorError`] if a non-nullable field
    /// was left null.
    pub fn build(self) -> Result<Record, ConnectorError> {
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            if value.is_null() && !field.nullable {
                return Err(ConnectorError::data(
                    "NULL_FIELD",
                    format!("non-nullable field '{}' is null", field.name),
                ));
            }
        }
        Ok(Record {
            schema: self.schema,
            values: self.values,
        })
    }
}
