//! Field projection transform: drop, keep, and rename fields.

use std::collections::BTreeMap;
use std::sync::Arc;

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::Record;
use aqueduct_types::schema::{Field, Schema};

use crate::connector::{RunContext, StageContext, Transform};

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drops or keeps fields and renames the survivors.
///
/// Properties: `drop` and `keep` are comma-separated field lists and are
/// mutually exclusive; `rename` maps old to new names as `old:new,old2:new2`.
#[derive(Debug)]
pub struct ProjectionTransform {
    drop: Vec<String>,
    keep: Option<Vec<String>>,
    rename: BTreeMap<String, String>,
    // Output schema for the last seen input schema.
    cached: Option<(Arc<Schema>, Arc<Schema>)>,
}

impl ProjectionTransform {
    /// # Errors
    ///
    /// Returns a config error if both `drop` and `keep` are set or the
    /// `rename` property is malformed.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        let drop = ctx.get("drop").map(split_list).unwrap_or_default();
        let keep = ctx.get("keep").map(split_list);
        if keep.is_some() && !drop.is_empty() {
            return Err(ConnectorError::config(
                "CONFLICTING_PROJECTION",
                "'drop' and 'keep' cannot both be set",
            ));
        }

        let mut rename = BTreeMap::new();
        if let Some(raw) = ctx.get("rename") {
            for pair in split_list(raw) {
                let (old, new) = pair.split_once(':').ok_or_else(|| {
                    ConnectorError::config(
                        "BAD_RENAME",
                        format!("rename entry '{pair}' is not of the form old:new"),
                    )
                })?;
                rename.insert(old.trim().to_string(), new.trim().to_string());
            }
        }

        Ok(Self {
            drop,
            keep,
            rename,
            cached: None,
        })
    }

    fn retains(&self, name: &str) -> bool {
        match &self.keep {
            Some(keep) => keep.iter().any(|k| k == name),
            None => !self.drop.iter().any(|d| d == name),
        }
    }

    fn output_schema(&mut self, input: &Arc<Schema>) -> Result<Arc<Schema>, ConnectorError> {
        if let Some((cached_in, cached_out)) = &self.cached {
            if Arc::ptr_eq(cached_in, input) {
                return Ok(Arc::clone(cached_out));
            }
        }

        let fields: Vec<Field> = input
            .fields()
            .iter()
            .filter(|f| self.retains(&f.name))
            .map(|f| {
                let name = self.rename.get(&f.name).cloned().unwrap_or_else(|| f.name.clone());
                Field {
                    name,
                    field_type: f.field_type,
                    nullable: f.nullable,
                }
            })
            .collect();

        let schema = Schema::record_of(input.name(), fields)
            .map_err(|e| ConnectorError::data("BAD_PROJECTION", e.to_string()))?;
        let schema = Arc::new(schema);
        self.cached = Some((Arc::clone(input), Arc::clone(&schema)));
        Ok(schema)
    }
}

impl Transform for ProjectionTransform {
    fn apply(
        &mut self,
        _ctx: &RunContext,
        record: &Record,
        out: &mut Vec<Record>,
    ) -> Result<(), ConnectorError> {
        let schema = self.output_schema(record.schema())?;
        let mut builder = Record::builder(Arc::clone(&schema));
        for (field, value) in record.schema().fields().iter().zip(record.values()) {
            if !self.retains(&field.name) || value.is_null() {
                continue;
            }
            let name = self.rename.get(&field.name).map_or(field.name.as_str(), String::as_str);
            builder = builder.set(name, value.clone())?;
        }
        out.push(builder.build()?);
        Ok(())
    }
}
