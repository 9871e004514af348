//! Embedded relational database source and sink, backed by `SQLite`.

use std::path::PathBuf;
use std::sync::Arc;

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::{Record, Value};
use aqueduct_types::schema::{FieldType, Schema};
use rusqlite::Connection;

use crate::connector::{BatchSource, RunContext, Sink, StageContext};

fn check_identifier(name: &str) -> Result<(), ConnectorError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConnectorError::config(
            "BAD_IDENTIFIER",
            format!("'{name}' is not a valid table or column name"),
        ))
    }
}

fn open(path: &PathBuf) -> Result<Connection, ConnectorError> {
    Connection::open(path).map_err(|e| {
        ConnectorError::config("DB_OPEN", format!("cannot open database {}: {e}", path.display()))
    })
}

fn db_error(e: rusqlite::Error) -> ConnectorError {
    ConnectorError::transient("DB_ERROR", e.to_string())
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Int | FieldType::Long | FieldType::Boolean => "INTEGER",
        FieldType::Float | FieldType::Double => "REAL",
        FieldType::Bytes => "BLOB",
        FieldType::String => "TEXT",
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Int(v) => Sql::Integer(i64::from(*v)),
        Value::Long(v) => Sql::Integer(*v),
        Value::Float(v) => Sql::Real(f64::from(*v)),
        Value::Double(v) => Sql::Real(*v),
        Value::Boolean(v) => Sql::Integer(i64::from(*v)),
        Value::Bytes(v) => Sql::Blob(v.clone()),
        Value::String(v) => Sql::Text(v.clone()),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn read_column(
    row: &rusqlite::Row<'_>,
    index: usize,
    field_type: FieldType,
) -> Result<Value, rusqlite::Error> {
    Ok(match field_type {
        FieldType::Int => row
            .get::<_, Option<i32>>(index)?
            .map_or(Value::Null, Value::Int),
        FieldType::Long => row
            .get::<_, Option<i64>>(index)?
            .map_or(Value::Null, Value::Long),
        FieldType::Float => row
            .get::<_, Option<f64>>(index)?
            .map_or(Value::Null, |v| Value::Float(v as f32)),
        FieldType::Double => row
            .get::<_, Option<f64>>(index)?
            .map_or(Value::Null, Value::Double),
        FieldType::Boolean => row
            .get::<_, Option<i64>>(index)?
            .map_or(Value::Null, |v| Value::Boolean(v != 0)),
        FieldType::Bytes => row
            .get::<_, Option<Vec<u8>>>(index)?
            .map_or(Value::Null, Value::Bytes),
        FieldType::String => row
            .get::<_, Option<String>>(index)?
            .map_or(Value::Null, Value::String),
    })
}

/// Batch source reading a whole table by schema.
pub struct DatabaseSource {
    connection: PathBuf,
    table: String,
    schema: Arc<Schema>,
}

impl DatabaseSource {
    /// # Errors
    ///
    /// Returns a config error if `connection`, `table`, or `schema` is
    /// missing or malformed.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        let table = ctx.require("table")?.to_string();
        check_identifier(&table)?;
        let schema = Schema::from_json(ctx.require("schema")?)
            .map_err(|e| ConnectorError::config("BAD_SCHEMA", e.to_string()))?;
        for field in schema.fields() {
            check_identifier(&field.name)?;
        }
        Ok(Self {
            connection: PathBuf::from(ctx.require("connection")?),
            table,
            schema: Arc::new(schema),
        })
    }
}

impl BatchSource for DatabaseSource {
    fn read(&mut self, _ctx: &RunContext) -> Result<Vec<Record>, ConnectorError> {
        let conn = open(&self.connection)?;
        let columns: Vec<&str> = self
            .schema
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        let sql = format!("SELECT {} FROM {}", columns.join(", "), self.table);
        let mut stmt = conn.prepare(&sql).map_err(db_error)?;

        let mut records = Vec::new();
        let mut rows = stmt.query([]).map_err(db_error)?;
        while let Some(row) = rows.next().map_err(db_error)? {
            let mut builder = Record::builder(Arc::clone(&self.schema));
            for (index, field) in self.schema.fields().iter().enumerate() {
                let value = read_column(row, index, field.field_type).map_err(db_error)?;
                if !value.is_null() {
                    builder = builder.set(&field.name, value)?;
                }
            }
            records.push(builder.build()?);
        }
        Ok(records)
    }
}

/// Sink inserting records into a table, created on first commit if needed.
/// All inserts for a run go through one transaction.
#[derive(Debug)]
pub struct DatabaseSink {
    connection: PathBuf,
    table: String,
    buffered: Vec<Record>,
}

impl DatabaseSink {
    /// # Errors
    ///
    /// Returns a config error if `connection` or `table` is missing.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        let table = ctx.require("table")?.to_string();
        check_identifier(&table)?;
        Ok(Self {
            connection: PathBuf::from(ctx.require("connection")?),
            table,
            buffered: Vec::new(),
        })
    }

    fn create_table(&self, conn: &Connection, schema: &Schema) -> Result<(), ConnectorError> {
        let columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| {
                check_identifier(&f.name)?;
                let type_name = column_type(f.field_type);
                let nullability = if f.nullable { "" } else { " NOT NULL" };
                Ok(format!("{} {type_name}{nullability}", f.name))
            })
            .collect::<Result<_, ConnectorError>>()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            columns.join(", ")
        );
        conn.execute(&sql, []).map_err(db_error)?;
        Ok(())
    }
}

impl Sink for DatabaseSink {
    fn write(&mut self, _ctx: &RunContext, records: &[Record]) -> Result<(), ConnectorError> {
        self.buffered.extend_from_slice(records);
        Ok(())
    }

    fn commit(&mut self, _ctx: &RunContext) -> Result<(), ConnectorError> {
        if self.buffered.is_empty() {
            return Ok(());
        }
        let mut conn = open(&self.connection)?;
        let schema = Arc::clone(self.buffered[0].schema());
        self.create_table(&conn, &schema)?;

        let tx = conn.transaction().map_err(db_error)?;
        {
            let columns: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare(&sql).map_err(db_error)?;
            for record in self.buffered.drain(..) {
                let params: Vec<rusqlite::types::Value> =
                    record.values().iter().map(to_sql_value).collect();
                stmt.execute(rusqlite::params_from_iter(params))
                    .map_err(db_error)?;
            }
        }
        tx.commit().map_err(db_error)?;
        Ok(())
    }
}
