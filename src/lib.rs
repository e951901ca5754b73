// Core library for the visitagg log aggregation tool

mod config;
mod pipeline;
mod stats;
mod visit;

pub use config::VisitaggConfig;
pub use pipeline::run_pipeline;
pub use stats::PipelineSummary;
pub use visit::Visit;
