//! 32-bit brick index encoding
//!
//! | bits  | meaning                                   |
//! |-------|-------------------------------------------|
//! | 31    | loaded on the GPU                         |
//! | 30    | known-occupied, not uploaded              |
//! | 29    | requested, pending upload                 |
//! | 20-27 | 2x2x2 LOD occupancy mask                  |
//! | 0-11  | offset into the chunk's brick array       |
//!
//! At most one of the three state bits is set. No state bits and no LOD
//! means the slot is empty.

/// Brick is resident; the offset field is valid
pub const LOADED_BIT: u32 = 0x8000_0000;
/// Brick exists but is not on the GPU
pub const UNLOADED_BIT: u32 = 0x4000_0000;
/// Brick was queued for upload by a ray
pub const REQUESTED_BIT: u32 = 0x2000_0000;
pub const STATE_MASK: u32 = LOADED_BIT | UNLOADED_BIT | REQUESTED_BIT;

pub const LOD_SHIFT: u32 = 20;
pub const LOD_MASK: u32 = 0xFF << LOD_SHIFT;

pub const OFFSET_MASK: u32 = 0xFFF;
/// Largest brick offset representable in an index
pub const MAX_BRICK_OFFSET: u32 = OFFSET_MASK;

/// Residency state of one index slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Loaded,
    Unloaded,
    Requested,
}

/// Decoded view of an index word
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct BrickIndex(pub u32);

impl BrickIndex {
    pub const EMPTY: BrickIndex = BrickIndex(0);

    /// Resident brick at `offset`
    pub fn loaded(offset: u32, lod: u8) -> Self {
        debug_assert!(offset <= MAX_BRICK_OFFSET, "brick offset {offset} exceeds index range");
        Self(LOADED_BIT | (offset & OFFSET_MASK) | ((lod as u32) << LOD_SHIFT))
    }

    /// Occupied but not uploaded
    pub fn unloaded(lod: u8) -> Self {
        Self(UNLOADED_BIT | ((lod as u32) << LOD_SHIFT))
    }

    /// Queued for upload
    pub fn requested(lod: u8) -> Self {
        Self(REQUESTED_BIT | ((lod as u32) << LOD_SHIFT))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_loaded(self) -> bool {
        self.0 & LOADED_BIT != 0
    }

    pub fn is_unloaded(self) -> bool {
        self.0 & UNLOADED_BIT != 0
    }

    pub fn is_requested(self) -> bool {
        self.0 & REQUESTED_BIT != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 & (STATE_MASK | LOD_MASK) == 0
    }

    pub fn offset(self) -> u32 {
        self.0 & OFFSET_MASK
    }

    pub fn lod(self) -> u8 {
        ((self.0 & LOD_MASK) >> LOD_SHIFT) as u8
    }

    /// Decode the state bits. `None` when more than one is set.
    pub fn state(self) -> Option<SlotState> {
        match self.0 & STATE_MASK {
            0 if self.lod() == 0 => Some(SlotState::Empty),
            LOADED_BIT => Some(SlotState::Loaded),
            UNLOADED_BIT => Some(SlotState::Unloaded),
            REQUESTED_BIT => Some(SlotState::Requested),
            _ => None,
        }
    }

    /// The GPU-side form of a CPU index: occupied slots become unloaded
    /// with their LOD preserved, empty slots stay empty.
    pub fn to_unloaded(self) -> Self {
        if self.is_empty() {
            Self::EMPTY
        } else {
            Self::unloaded(self.lod())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_encoding() {
        let index = BrickIndex::loaded(0x123, 0xA5);
        assert_eq!(index.raw(), 0x8A50_0123);
        assert!(index.is_loaded());
        assert!(!index.is_requested());
        assert_eq!(index.offset(), 0x123);
        assert_eq!(index.lod(), 0xA5);
        assert_eq!(index.state(), Some(SlotState::Loaded));
    }

    #[test]
    fn test_unloaded_preserves_lod() {
        let cpu = BrickIndex::loaded(7, 0xFF);
        let gpu = cpu.to_unloaded();
        assert_eq!(gpu.raw(), UNLOADED_BIT | 0x0FF0_0000);
        assert_eq!(gpu.lod(), 0xFF);
        assert_eq!(gpu.offset(), 0);
        assert_eq!(gpu.state(), Some(SlotState::Unloaded));
        assert_eq!(BrickIndex::EMPTY.to_unloaded(), BrickIndex::EMPTY);
    }

    #[test]
    fn test_requested() {
        let index = BrickIndex::requested(0x0F);
        assert_eq!(index.state(), Some(SlotState::Requested));
        assert_eq!(index.lod(), 0x0F);
    }

    #[test]
    fn test_invalid_state() {
        assert_eq!(BrickIndex(LOADED_BIT | REQUESTED_BIT).state(), None);
        assert_eq!(BrickIndex(0).state(), Some(SlotState::Empty));
    }
}
