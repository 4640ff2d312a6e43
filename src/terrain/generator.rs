//! Noise-based height fields for world generation

use noise::{Fbm, MultiFractal, NoiseFn, Simplex};
use serde::{Deserialize, Serialize};

/// Source of terrain height per voxel column.
///
/// Coordinates and heights are in voxel units. Generation samples this
/// from several threads.
pub trait HeightSource: Sync {
    fn height_at(&self, x: f32, y: f32) -> f32;
}

/// Parameters controlling terrain generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: u32,
    /// Horizontal scale in voxels (larger = smoother)
    pub scale: f32,
    /// Maximum terrain height in voxels
    pub height_scale: f32,
    /// FBM octaves (detail levels)
    pub octaves: u32,
    pub frequency: f64,
    pub persistence: f64,
    pub lacunarity: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 0,
            scale: 1024.0,
            height_scale: 128.0,
            octaves: 7,
            frequency: 1.0,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Ridged height field: `(1 - |fbm(x/scale, y/scale)|) * height_scale`
pub struct TerrainGenerator {
    params: TerrainParams,
    noise: Fbm<Simplex>,
}

impl TerrainGenerator {
    /// Create a new terrain generator with the given parameters
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Simplex>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_frequency(params.frequency)
            .set_persistence(params.persistence)
            .set_lacunarity(params.lacunarity);

        Self { params, noise }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }
}

impl HeightSource for TerrainGenerator {
    fn height_at(&self, x: f32, y: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let ny = (y / self.params.scale) as f64;
        let n = self.noise.get([nx, ny]).clamp(-1.0, 1.0);
        ((1.0 - n.abs()) * self.params.height_scale as f64) as f32
    }
}

/// Constant height, used for tests and benchmarks
#[derive(Clone, Copy, Debug)]
pub struct FlatTerrain {
    pub height: f32,
}

impl FlatTerrain {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl HeightSource for FlatTerrain {
    fn height_at(&self, _x: f32, _y: f32) -> f32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_params_default() {
        let params = TerrainParams::default();
        assert_eq!(params.scale, 1024.0);
        assert_eq!(params.height_scale, 128.0);
        assert_eq!(params.octaves, 7);
    }

    #[test]
    fn test_height_in_range() {
        let generator = TerrainGenerator::new(TerrainParams::default());
        for (x, y) in [(0.0, 0.0), (100.0, 37.0), (255.0, 255.0), (4000.0, -12.0)] {
            let h = generator.height_at(x, y);
            assert!((0.0..=128.0).contains(&h), "height {h} at ({x}, {y})");
        }
    }

    #[test]
    fn test_height_is_deterministic() {
        let a = TerrainGenerator::new(TerrainParams::default());
        let b = TerrainGenerator::new(TerrainParams::default());
        assert_eq!(a.height_at(73.0, 19.0), b.height_at(73.0, 19.0));
    }

    #[test]
    fn test_different_seeds() {
        let a = TerrainGenerator::new(TerrainParams { seed: 1, ..Default::default() });
        let b = TerrainGenerator::new(TerrainParams { seed: 2, ..Default::default() });
        assert_ne!(a.height_at(500.0, 300.0), b.height_at(500.0, 300.0));
    }

    #[test]
    fn test_flat_terrain() {
        let flat = FlatTerrain::new(8.0);
        assert_eq!(flat.height_at(0.0, 0.0), 8.0);
        assert_eq!(flat.height_at(1e6, -1e6), 8.0);
    }
}
