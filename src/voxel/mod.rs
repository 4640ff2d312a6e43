//! Voxel data structures and operations

pub mod brick;
pub mod index;
pub mod chunk;
pub mod world;
pub mod streaming;

pub use brick::{Brick, BRICK_SIZE};
pub use index::{BrickIndex, SlotState};
pub use chunk::Chunk;
pub use world::{BrickSlot, VoxelWorld, WorldDescriptor};
