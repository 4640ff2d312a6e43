//! Render pipelines

pub mod brick_upload;
pub mod display;
pub mod wavefront;

pub use brick_upload::{BrickUploadPipeline, UploadParams};
pub use display::DisplayPipeline;
pub use wavefront::{ray_queue_capacity, WavefrontTracer};
