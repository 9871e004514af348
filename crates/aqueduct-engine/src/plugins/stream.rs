//! Event stream sink.

use std::collections::BTreeMap;

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::{Record, Value};

use crate::connector::{RunContext, Sink, StageContext};
use crate::dataset::StreamEvent;

/// Sink appending each record to a stream dataset as an event.
///
/// The body field (default `body`) becomes the event body; every other
/// non-null field becomes a header, rendered as a string.
pub struct StreamSink {
    dataset: String,
    body_field: String,
    buffered: Vec<StreamEvent>,
}

impl StreamSink {
    /// # Errors
    ///
    /// Returns a config error if `dataset` is missing.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            dataset: ctx.require("dataset")?.to_string(),
            body_field: ctx.get("body.field").unwrap_or("body").to_string(),
            buffered: Vec::new(),
        })
    }

    fn to_event(&self, record: &Record) -> Result<StreamEvent, ConnectorError> {
        let body = match record.get(&self.body_field) {
            Some(Value::Bytes(bytes)) => bytes.clone(),
            Some(value) if !value.is_null() => value.render().into_bytes(),
            _ => {
                return Err(ConnectorError::data(
                    "MISSING_BODY",
                    format!("record has no value for body field '{}'", self.body_field),
                ))
            }
        };

        let headers: BTreeMap<String, String> = record
            .schema()
            .fields()
            .iter()
            .zip(record.values())
            .filter(|(field, value)| field.name != self.body_field && !value.is_null())
            .map(|(field, value)| (field.name.clone(), value.render()))
            .collect();

        Ok(StreamEvent {
            headers,
            body,
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
        })
    }
}

impl Sink for StreamSink {
    fn write(&mut self, _ctx: &RunContext, records: &[Record]) -> Result<(), ConnectorError> {
        for record in records {
            let event = self.to_event(record)?;
            self.buffered.push(event);
        }
        Ok(())
    }

    fn commit(&mut self, ctx: &RunContext) -> Result<(), ConnectorError> {
        for event in self.buffered.drain(..) {
            ctx.datasets.append_event(&self.dataset, event)?;
        }
        Ok(())
    }
}
