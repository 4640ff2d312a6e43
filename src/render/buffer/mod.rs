//! GPU buffer management

pub mod frame_constants;
pub mod ray_buffer;
pub mod world_buffer;

pub use frame_constants::{render_mode, FrameConstants, FrameConstantsBuffer};
pub use ray_buffer::{GpuRay, GpuShadowRay, RayBuffers, WavefrontState, WAVEFRONT_WORKGROUP_SIZE};
pub use world_buffer::{GpuWorldBuffers, WorldUniform};
