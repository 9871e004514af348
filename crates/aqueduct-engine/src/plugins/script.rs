//! Template-driven field rewriting transform.
//!
//! Each `set.<field>` property is a template rendered against the input
//! record. `${field}` substitutes a field value; `${lookup(dataset, field)}`
//! substitutes the value stored in a key-value dataset under the rendered
//! field value. The rendered string is coerced to the target field's type.

use std::sync::{Arc, LazyLock};

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::{Record, Value};
use regex::Regex;

use crate::connector::{RunContext, StageContext, Transform};

static LOOKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{lookup\(\s*([A-Za-z0-9_.\-]+)\s*,\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)\}")
        .expect("valid lookup regex")
});

static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid field regex"));

pub struct ScriptTransform {
    /// Target field name and template, in property order.
    assignments: Vec<(String, String)>,
}

impl ScriptTransform {
    /// Build from `set.<field>` stage properties.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        let assignments = ctx
            .properties
            .iter()
            .filter_map(|(key, template)| {
                key.strip_prefix("set.")
                    .map(|field| (field.to_string(), template.clone()))
            })
            .collect();
        Ok(Self { assignments })
    }

    fn field_value<'a>(record: &'a Record, name: &str) -> Result<&'a Value, ConnectorError> {
        record.get(name).ok_or_else(|| {
            ConnectorError::data(
                "UNKNOWN_FIELD",
                format!("template references unknown field '{name}'"),
            )
        })
    }

    fn render(
        ctx: &RunContext,
        record: &Record,
        template: &str,
    ) -> Result<String, ConnectorError> {
        let mut result = template.to_string();

        for cap in LOOKUP_RE.captures_iter(template) {
            let dataset = &cap[1];
            let key = Self::field_value(record, &cap[2])?.render();
            let value = ctx.datasets.lookup(dataset, &key)?.ok_or_else(|| {
                ConnectorError::data(
                    "LOOKUP_MISS",
                    format!("no entry for key '{key}' in dataset '{dataset}'"),
                )
            })?;
            result = result.replace(&cap[0], &value);
        }

        // Field references, evaluated on the already lookup-expanded string.
        let expanded = result.clone();
        for cap in FIELD_RE.captures_iter(&expanded) {
            let value = Self::field_value(record, &cap[1])?.render();
            result = result.replace(&cap[0], &value);
        }

        Ok(result)
    }
}

impl Transform for ScriptTransform {
    fn apply(
        &mut self,
        ctx: &RunContext,
        record: &Record,
        out: &mut Vec<Record>,
    ) -> Result<(), ConnectorError> {
        let schema = Arc::clone(record.schema());
        let mut builder = Record::builder(Arc::clone(&schema));

        for field in schema.fields() {
            let assignment = self
                .assignments
                .iter()
                .find(|(name, _)| name == &field.name);
            let value = match assignment {
                Some((_, template)) => {
                    let rendered = Self::render(ctx, record, template)?;
                    Value::parse_as(&rendered, field.field_type)?
                }
                None => record
                    .get(&field.name)
                    .cloned()
                    .unwrap_or(Value::Null),
            };
            if !value.is_null() {
                builder = builder.set(&field.name, value)?;
            }
        }

        for (name, _) in &self.assignments {
            if schema.field(name).is_none() {
                return Err(ConnectorError::data(
                    "UNKNOWN_FIELD",
                    format!("assignment targets unknown field '{name}'"),
                ));
            }
        }

        out.push(builder.build()?);
        Ok(())
    }
}
