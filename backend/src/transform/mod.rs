//! Cleaning.
//!
//! - `stages`: the five cleaning stages and their parameters
//! - `pipeline`: ordered execution with a cleaning log
//! - `plan`: the pipeline spec document tying every section together

pub mod pipeline;
pub mod plan;
pub mod stages;

pub use pipeline::{run_pipeline, CleaningLogEntry, CleaningOutcome, StageSpec};
pub use plan::{example_spec, PipelineSpec};
pub use stages::{
    coerce_cell, normalize_text, stages_description, CleaningStage, ImputeStrategy, ImputeTarget, StageOutput,
    TextCase,
};
