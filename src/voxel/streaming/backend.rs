//! Device-side operations the streaming protocol needs
//!
//! The world tick drives a [`StreamingBackend`]; the wgpu implementation
//! lives in `render::buffer::world_buffer`, the in-memory one in
//! [`super::host`].

use bytemuck::{Pod, Zeroable};
use glam::IVec3;

use crate::core::types::Result;
use crate::voxel::brick::Brick;
use crate::voxel::streaming::heap::Allocation;
use crate::voxel::streaming::load_queue::LoadRequests;
use crate::voxel::streaming::timeline::{SyncPoints, Timeline};
use crate::voxel::world::WorldDescriptor;

/// One resolved request (16 bytes), consumed by the scatter pass
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ScatterEntry {
    /// World brick position (12 bytes, offset 0)
    pub position: [i32; 3],
    /// Index word written into the slot; the brick is copied only when
    /// it carries the loaded bit (4 bytes, offset 12)
    pub index: u32,
}

impl ScatterEntry {
    pub fn new(position: IVec3, index: u32) -> Self {
        Self {
            position: position.to_array(),
            index,
        }
    }

    pub fn position(&self) -> IVec3 {
        IVec3::from_array(self.position)
    }
}

/// Word-granular copy inside the heap (16 bytes), used when a chunk's
/// brick buffer is replaced by a larger one
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CopyRegion {
    pub src_word: u32,
    pub dst_word: u32,
    pub words: u32,
    pub _pad: u32,
}

/// Staged transfer for one tick: entries and their bricks, index-aligned
#[derive(Clone, Debug, Default)]
pub struct LoadBatch {
    pub entries: Vec<ScatterEntry>,
    pub bricks: Vec<Brick>,
}

impl LoadBatch {
    pub fn push(&mut self, entry: ScatterEntry, brick: Brick) {
        self.entries.push(entry);
        self.bricks.push(brick);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Work for the integrate submission
#[derive(Clone, Copy, Debug)]
pub struct IntegrateWork<'a> {
    /// Growth copies, executed before the scatter
    pub copies: &'a [CopyRegion],
    /// Brick-pointer table to re-upload wholesale, when any chunk grew
    pub brick_pointers: Option<&'a [u64]>,
    /// Staged entries to scatter
    pub scatter_count: u32,
}

/// Device operations used by the residency manager and the world tick
pub trait StreamingBackend {
    /// World layout the index buffers and scatter pass were built for
    fn world_descriptor(&self) -> &WorldDescriptor;

    /// Allocate a heap block, growing the heap when it is full
    fn allocate(&mut self, size: u64) -> Result<Allocation>;

    /// Return a block whose last reader has completed
    fn release(&mut self, allocation: Allocation);

    /// Immediate write into the heap (initial uploads only)
    fn write_heap(&mut self, allocation: &Allocation, words: &[u32]) -> Result<()>;

    /// Upload both pointer tables wholesale
    fn write_pointer_tables(&mut self, index_pointers: &[u64], brick_pointers: &[u64]) -> Result<()>;

    /// Block the CPU until `timeline` reaches `value`
    fn wait(&mut self, timeline: &Timeline, value: u64) -> Result<()>;

    /// Read the queue contents written by the last traced frame
    fn read_load_queue(&mut self) -> Result<LoadRequests>;

    /// Stage a tick's bricks and entries; signal `load` = `value` on submission
    fn submit_load(&mut self, batch: &LoadBatch, load: &Timeline, value: u64) -> Result<()>;

    /// Wait (device-side) for `load_value`, apply growth copies and pointer
    /// table, scatter staged entries, reset the queue counter, then signal
    /// `processed` = `processed_value`
    fn submit_integrate(
        &mut self,
        work: &IntegrateWork<'_>,
        sync: &SyncPoints,
        load_value: u64,
        processed_value: u64,
    ) -> Result<()>;
}
