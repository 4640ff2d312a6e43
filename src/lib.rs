//! Brickmap - streaming brick-map voxel world with a wavefront path tracer

pub mod core;
pub mod terrain;
pub mod voxel;
pub mod render;
