//! Pipeline configuration: YAML types, parsing, and semantic validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_pipeline, parse_pipeline_str};
pub use types::{
    Connection, PipelineConfig, RecordErrorPolicy, StageConfig, StateConfig, Trigger,
};
pub use validator::validate_pipeline;
