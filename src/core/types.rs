//! Core type aliases and re-exports

pub use glam::{
    Vec2, Vec3, Vec4,
    IVec3, IVec4, UVec3,
};

/// Standard Result type for the renderer
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Byte offset into the device heap that backs every chunk buffer.
pub type DeviceAddress = u64;
