//! World grid: chunk layout and parallel generation

use glam::{IVec3, UVec3};
use rayon::prelude::*;

use crate::terrain::HeightSource;
use crate::voxel::brick::BRICK_SIZE;
use crate::voxel::chunk::{local_linear, Chunk};

/// Fixed topology of the world
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldDescriptor {
    /// Chunk grid extent
    pub chunks: UVec3,
    /// Chunk edge length in bricks
    pub chunk_size: u32,
}

/// Brick position split into chunk and slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrickSlot {
    /// Linear chunk index
    pub chunk: usize,
    /// Brick coordinate inside the chunk
    pub local: UVec3,
    /// Linear slot inside the chunk
    pub slot: usize,
}

impl WorldDescriptor {
    pub fn new(chunks: UVec3, chunk_size: u32) -> Self {
        Self { chunks, chunk_size }
    }

    pub fn chunk_count(&self) -> usize {
        (self.chunks.x * self.chunks.y * self.chunks.z) as usize
    }

    /// Index slots per chunk
    pub fn slots_per_chunk(&self) -> usize {
        (self.chunk_size * self.chunk_size * self.chunk_size) as usize
    }

    /// World extent in bricks
    pub fn brick_extent(&self) -> UVec3 {
        self.chunks * self.chunk_size
    }

    /// World extent in voxels
    pub fn voxel_extent(&self) -> UVec3 {
        self.brick_extent() * BRICK_SIZE
    }

    /// Linear chunk index `x + y*cx + z*cx*cy`
    pub fn chunk_linear(&self, coord: UVec3) -> usize {
        debug_assert!(coord.cmplt(self.chunks).all(), "chunk {coord} outside grid {}", self.chunks);
        (coord.x + coord.y * self.chunks.x + coord.z * self.chunks.x * self.chunks.y) as usize
    }

    /// Inverse of [`Self::chunk_linear`]
    pub fn chunk_coord(&self, linear: usize) -> UVec3 {
        let linear = linear as u32;
        let plane = self.chunks.x * self.chunks.y;
        UVec3::new(linear % self.chunks.x, (linear % plane) / self.chunks.x, linear / plane)
    }

    /// Split a world brick position. `None` when outside the world.
    pub fn locate(&self, position: IVec3) -> Option<BrickSlot> {
        if position.cmplt(IVec3::ZERO).any() || position.as_uvec3().cmpge(self.brick_extent()).any() {
            return None;
        }
        let position = position.as_uvec3();
        let n = self.chunk_size;
        let local = position % n;
        Some(BrickSlot {
            chunk: self.chunk_linear(position / n),
            local,
            slot: local_linear(local, n),
        })
    }
}

/// CPU-side voxel world, generated once and immutable afterwards
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelWorld {
    descriptor: WorldDescriptor,
    chunks: Vec<Chunk>,
    filled_voxels: u64,
}

impl VoxelWorld {
    /// Generate every chunk from a height field.
    ///
    /// Work is partitioned by chunk X column on the rayon pool; each column
    /// produces whole chunks that are placed into their own slots after
    /// the join.
    pub fn generate<H: HeightSource + ?Sized>(descriptor: WorldDescriptor, heights: &H) -> Self {
        let start = std::time::Instant::now();
        log::info!(
            "Generating {}x{}x{} world of {} chunks...",
            descriptor.chunks.x, descriptor.chunks.y, descriptor.chunks.z,
            descriptor.chunk_count()
        );

        let columns: Vec<u32> = (0..descriptor.chunks.x).collect();
        let slabs: Vec<Vec<(usize, Chunk)>> = columns
            .par_iter()
            .map(|&x| {
                let mut slab = Vec::with_capacity((descriptor.chunks.y * descriptor.chunks.z) as usize);
                for y in 0..descriptor.chunks.y {
                    for z in 0..descriptor.chunks.z {
                        let coord = UVec3::new(x, y, z);
                        let chunk = Chunk::generate(coord, descriptor.chunk_size, heights);
                        slab.push((descriptor.chunk_linear(coord), chunk));
                    }
                }
                slab
            })
            .collect();

        let mut placed: Vec<Option<Chunk>> = vec![None; descriptor.chunk_count()];
        for (index, chunk) in slabs.into_iter().flatten() {
            debug_assert!(placed[index].is_none(), "chunk slot {index} generated twice");
            placed[index] = Some(chunk);
        }
        let chunks: Vec<Chunk> = placed
            .into_iter()
            .map(|c| c.unwrap_or_else(|| Chunk::empty(descriptor.chunk_size)))
            .collect();

        let filled_voxels = chunks.iter().map(|c| c.filled_voxels).sum();
        let bricks: usize = chunks.iter().map(Chunk::brick_count).sum();
        log::info!(
            "Generated {} bricks, {} filled voxels in {:.2?}",
            bricks, filled_voxels, start.elapsed()
        );

        Self {
            descriptor,
            chunks,
            filled_voxels,
        }
    }

    pub fn descriptor(&self) -> &WorldDescriptor {
        &self.descriptor
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, linear: usize) -> &Chunk {
        &self.chunks[linear]
    }

    pub fn filled_voxels(&self) -> u64 {
        self.filled_voxels
    }

    /// Occupied bricks per chunk, in linear chunk order
    pub fn brick_counts(&self) -> Vec<usize> {
        self.chunks.iter().map(Chunk::brick_count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{FlatTerrain, TerrainGenerator, TerrainParams};

    fn small() -> WorldDescriptor {
        WorldDescriptor::new(UVec3::new(2, 2, 1), 4)
    }

    #[test]
    fn test_chunk_linear_roundtrip() {
        let desc = WorldDescriptor::new(UVec3::new(3, 2, 2), 4);
        for i in 0..desc.chunk_count() {
            assert_eq!(desc.chunk_linear(desc.chunk_coord(i)), i);
        }
        assert_eq!(desc.chunk_linear(UVec3::new(1, 1, 1)), 1 + 3 + 6);
    }

    #[test]
    fn test_locate() {
        let desc = small();
        let slot = desc.locate(IVec3::new(5, 2, 3)).unwrap();
        assert_eq!(slot.chunk, 1);
        assert_eq!(slot.local, UVec3::new(1, 2, 3));
        assert_eq!(slot.slot, 1 + 2 * 4 + 3 * 16);

        assert!(desc.locate(IVec3::new(-1, 0, 0)).is_none());
        assert!(desc.locate(IVec3::new(8, 0, 0)).is_none());
        assert!(desc.locate(IVec3::new(0, 0, 4)).is_none());
    }

    #[test]
    fn test_flat_world() {
        let world = VoxelWorld::generate(small(), &FlatTerrain::new(8.0));
        assert_eq!(world.brick_counts(), vec![16; 4]);
        assert_eq!(world.filled_voxels(), 4 * 16 * 512);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let terrain = TerrainGenerator::new(TerrainParams { height_scale: 32.0, ..Default::default() });
        let desc = WorldDescriptor::new(UVec3::new(3, 2, 1), 4);
        let a = VoxelWorld::generate(desc, &terrain);
        let b = VoxelWorld::generate(desc, &terrain);
        assert_eq!(a, b);
        assert!(a.filled_voxels() > 0);
    }
}
