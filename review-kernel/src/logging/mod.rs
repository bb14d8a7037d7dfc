pub mod pipeline_logger;

pub use pipeline_logger::PipelineLogger;
