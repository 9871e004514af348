//! Built-in connector plugins.

pub mod database;
pub mod generator;
pub mod projection;
pub mod script;
pub mod stream;
pub mod table;
pub mod tpfs;

use crate::connector::{ConnectorInstance, PluginRegistry};

/// Register every built-in plugin under its public name.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register("data-generator", |ctx| {
        Ok(ConnectorInstance::RealtimeSource(Box::new(
            generator::DataGeneratorSource::from_stage(ctx)?,
        )))
    });
    registry.register("table", |ctx| {
        Ok(ConnectorInstance::Sink(Box::new(table::TableSink::from_stage(ctx)?)))
    });
    registry.register("table-source", |ctx| {
        Ok(ConnectorInstance::BatchSource(Box::new(
            table::TableSource::from_stage(ctx)?,
        )))
    });
    registry.register("stream", |ctx| {
        Ok(ConnectorInstance::Sink(Box::new(
            stream::StreamSink::from_stage(ctx)?,
        )))
    });
    registry.register("tpfs", |ctx| {
        Ok(ConnectorInstance::Sink(Box::new(tpfs::TpfsSink::from_stage(ctx)?)))
    });
    registry.register("tpfs-source", |ctx| {
        Ok(ConnectorInstance::BatchSource(Box::new(
            tpfs::TpfsSource::from_stage(ctx)?,
        )))
    });
    registry.register("database", |ctx| {
        Ok(ConnectorInstance::Sink(Box::new(
            database::DatabaseSink::from_stage(ctx)?,
        )))
    });
    registry.register("database-source", |ctx| {
        Ok(ConnectorInstance::BatchSource(Box::new(
            database::DatabaseSource::from_stage(ctx)?,
        )))
    });
    registry.register("projection", |ctx| {
        Ok(ConnectorInstance::Transform(Box::new(
            projection::ProjectionTransform::from_stage(ctx)?,
        )))
    });
    registry.register("script", |ctx| {
        Ok(ConnectorInstance::Transform(Box::new(
            script::ScriptTransform::from_stage(ctx)?,
        )))
    });
}
