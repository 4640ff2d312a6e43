//! 8x8x8 occupancy brick
//!
//! One bit per voxel, 16 words, 64 bytes. Voxel `(x, y, z)` is linear bit
//! `x + y*8 + z*64`, stored in word `bit / 32` at position `bit % 32`.
//! The layout is shared verbatim with the shaders.

use bytemuck::{Pod, Zeroable};

/// Voxels per brick edge
pub const BRICK_SIZE: u32 = 8;
/// u32 words per brick
pub const BRICK_WORDS: usize = (BRICK_SIZE * BRICK_SIZE * BRICK_SIZE / 32) as usize;
/// Bytes per brick on the GPU
pub const BRICK_BYTES: u64 = (BRICK_WORDS * 4) as u64;

/// Linear bit index of a voxel inside a brick
#[inline]
fn voxel_bit(x: u32, y: u32, z: u32) -> u32 {
    debug_assert!(x < BRICK_SIZE && y < BRICK_SIZE && z < BRICK_SIZE, "voxel ({x}, {y}, {z}) outside brick");
    x + y * BRICK_SIZE + z * BRICK_SIZE * BRICK_SIZE
}

/// Octant (0..8) of a voxel for the 2x2x2 LOD mask
#[inline]
pub fn lod_octant(x: u32, y: u32, z: u32) -> u32 {
    (x >> 2) | ((y >> 2) << 1) | ((z >> 2) << 2)
}

/// Bit-packed 8³ voxel occupancy
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Brick {
    pub words: [u32; BRICK_WORDS],
}

impl Brick {
    /// Brick with no voxels set
    pub const EMPTY: Brick = Brick { words: [0; BRICK_WORDS] };

    /// Brick with every voxel set
    pub const FULL: Brick = Brick { words: [u32::MAX; BRICK_WORDS] };

    pub fn get(&self, x: u32, y: u32, z: u32) -> bool {
        let bit = voxel_bit(x, y, z);
        self.words[(bit / 32) as usize] & (1 << (bit % 32)) != 0
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32) {
        let bit = voxel_bit(x, y, z);
        self.words[(bit / 32) as usize] |= 1 << (bit % 32);
    }

    pub fn clear(&mut self, x: u32, y: u32, z: u32) {
        let bit = voxel_bit(x, y, z);
        self.words[(bit / 32) as usize] &= !(1 << (bit % 32));
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of filled voxels
    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// 2x2x2 occupancy mask: bit `octant` is set when any voxel in that
    /// 4³ octant is filled.
    pub fn lod_mask(&self) -> u8 {
        let mut mask = 0u8;
        for z in 0..BRICK_SIZE {
            for y in 0..BRICK_SIZE {
                for x in 0..BRICK_SIZE {
                    if self.get(x, y, z) {
                        mask |= 1 << lod_octant(x, y, z);
                    }
                }
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brick_size() {
        assert_eq!(std::mem::size_of::<Brick>(), 64);
        assert_eq!(BRICK_BYTES, 64);
    }

    #[test]
    fn test_bit_layout() {
        let mut brick = Brick::EMPTY;
        brick.set(1, 0, 0);
        assert_eq!(brick.words[0], 0b10);

        // bit 8 + 64 = 72 -> word 2, bit 8
        brick.set(0, 1, 1);
        assert_eq!(brick.words[2], 1 << 8);

        brick.set(7, 7, 7);
        assert_eq!(brick.words[15], 1 << 31);
        assert_eq!(brick.count(), 3);
    }

    #[test]
    fn test_set_get_clear() {
        let mut brick = Brick::EMPTY;
        assert!(brick.is_empty());
        brick.set(3, 5, 6);
        assert!(brick.get(3, 5, 6));
        assert!(!brick.get(6, 5, 3));
        brick.clear(3, 5, 6);
        assert!(brick.is_empty());
    }

    #[test]
    fn test_lod_mask() {
        assert_eq!(Brick::EMPTY.lod_mask(), 0);
        assert_eq!(Brick::FULL.lod_mask(), 0xFF);

        let mut brick = Brick::EMPTY;
        brick.set(0, 0, 0);
        assert_eq!(brick.lod_mask(), 0b0000_0001);
        brick.set(4, 0, 0);
        assert_eq!(brick.lod_mask(), 0b0000_0011);
        brick.set(0, 4, 0);
        brick.set(7, 7, 7);
        assert_eq!(brick.lod_mask(), 0b1000_0111);
    }

    #[test]
    fn test_lod_octant() {
        assert_eq!(lod_octant(0, 0, 0), 0);
        assert_eq!(lod_octant(4, 0, 0), 1);
        assert_eq!(lod_octant(0, 4, 0), 2);
        assert_eq!(lod_octant(0, 0, 4), 4);
        assert_eq!(lod_octant(7, 7, 7), 7);
    }
}
