//! Procedural terrain height fields

pub mod generator;
pub use generator::{FlatTerrain, HeightSource, TerrainGenerator, TerrainParams};
