//! Dense N³ grid of brick indices plus the chunk's resident bricks

use glam::UVec3;

use crate::terrain::HeightSource;
use crate::voxel::brick::{Brick, BRICK_SIZE};
use crate::voxel::index::BrickIndex;

/// Linear slot of a brick inside a chunk of edge `n`
#[inline]
pub fn local_linear(local: UVec3, n: u32) -> usize {
    debug_assert!(local.x < n && local.y < n && local.z < n, "local brick {local} outside chunk of size {n}");
    (local.x + local.y * n + local.z * n * n) as usize
}

/// A chunk of the world: one index per brick slot and the occupied bricks.
///
/// CPU indices are always `LOADED | offset | lod`, where `offset` points
/// into `bricks`; empty slots are 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Edge length in bricks
    pub size: u32,
    pub indices: Vec<u32>,
    pub bricks: Vec<Brick>,
    /// Filled voxels across all bricks
    pub filled_voxels: u64,
}

impl Chunk {
    /// Chunk with every slot empty
    pub fn empty(size: u32) -> Self {
        Self {
            size,
            indices: vec![0; (size * size * size) as usize],
            bricks: Vec::new(),
            filled_voxels: 0,
        }
    }

    /// Rasterize a height field into the chunk at `coord` (chunk grid units).
    ///
    /// The height field is sampled once per voxel column; a voxel is filled
    /// when its world z is below the column height.
    pub fn generate<H: HeightSource + ?Sized>(coord: UVec3, size: u32, heights: &H) -> Self {
        let mut chunk = Self::empty(size);
        let columns = size * BRICK_SIZE;
        let origin = coord * columns;

        let mut column_heights = Vec::with_capacity((columns * columns) as usize);
        for y in 0..columns {
            for x in 0..columns {
                column_heights.push(heights.height_at((origin.x + x) as f32, (origin.y + y) as f32));
            }
        }

        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let mut brick = Brick::EMPTY;
                    for vy in 0..BRICK_SIZE {
                        for vx in 0..BRICK_SIZE {
                            let column = (x * BRICK_SIZE + vx) + (y * BRICK_SIZE + vy) * columns;
                            let height = column_heights[column as usize];
                            for vz in 0..BRICK_SIZE {
                                let world_z = origin.z + z * BRICK_SIZE + vz;
                                if (world_z as f32) < height {
                                    brick.set(vx, vy, vz);
                                }
                            }
                        }
                    }
                    chunk.insert(UVec3::new(x, y, z), brick);
                }
            }
        }
        chunk
    }

    /// Store a brick in a slot. Empty bricks leave the slot empty.
    pub fn insert(&mut self, local: UVec3, brick: Brick) {
        if brick.is_empty() {
            return;
        }
        let offset = self.bricks.len() as u32;
        self.indices[local_linear(local, self.size)] = BrickIndex::loaded(offset, brick.lod_mask()).raw();
        self.filled_voxels += brick.count() as u64;
        self.bricks.push(brick);
    }

    pub fn index(&self, local: UVec3) -> BrickIndex {
        BrickIndex(self.indices[local_linear(local, self.size)])
    }

    /// The CPU brick behind a slot, if the slot is occupied
    pub fn brick(&self, local: UVec3) -> Option<&Brick> {
        let index = self.index(local);
        if index.is_loaded() {
            self.bricks.get(index.offset() as usize)
        } else {
            None
        }
    }

    pub fn brick_count(&self) -> usize {
        self.bricks.len()
    }

    /// Indices as the GPU sees them before any brick is uploaded
    pub fn unloaded_indices(&self) -> Vec<u32> {
        self.indices.iter().map(|&i| BrickIndex(i).to_unloaded().raw()).collect()
    }
}
