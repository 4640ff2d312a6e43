//! Rendering system and GPU interfaces

pub mod context;
pub mod buffer;
pub mod pipeline;
