//! Runtime coordinator: threads one `PipelineEvent` through the five stages.

pub mod pipeline;
pub mod types;

pub use pipeline::Pipeline;
pub use types::*;
