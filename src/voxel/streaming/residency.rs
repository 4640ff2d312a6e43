//! GPU mirrors of the chunk index and brick buffers
//!
//! Each chunk owns one fixed-size index buffer (one word per brick slot)
//! and one growable brick buffer. Both live in the device heap; their
//! addresses are published in the index-pointer and brick-pointer tables,
//! indexed by linear chunk index.
//!
//! Brick offsets are handed out in increasing order and never reused, so
//! an index word that was valid once stays valid across growth.

use crate::core::types::{DeviceAddress, Result};
use crate::voxel::brick::{BRICK_BYTES, BRICK_WORDS};
use crate::voxel::index::MAX_BRICK_OFFSET;
use crate::voxel::streaming::backend::{CopyRegion, StreamingBackend};
use crate::voxel::streaming::deletion_queue::DeletionQueue;
use crate::voxel::streaming::heap::Allocation;
use crate::voxel::world::VoxelWorld;

/// Brick capacity a chunk's buffer starts with unless configured otherwise
pub const DEFAULT_STARTING_CAPACITY: u32 = 16;

/// Residency state of one chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkResidency {
    pub index_buffer: Allocation,
    pub brick_buffer: Allocation,
    /// Bricks the brick buffer can hold
    pub capacity: u32,
    /// Next offset to assign; also the number of offsets handed out
    pub next_offset: u32,
}

impl ChunkResidency {
    /// Highest assigned offset, if any
    pub fn highest_offset(&self) -> Option<u32> {
        self.next_offset.checked_sub(1)
    }
}

/// Single writer of the chunk buffers and pointer tables
#[derive(Debug)]
pub struct ResidencyManager {
    chunks: Vec<ChunkResidency>,
    index_pointers: Vec<DeviceAddress>,
    brick_pointers: Vec<DeviceAddress>,
    retired: DeletionQueue<Allocation>,
    grow_events: u64,
}

impl ResidencyManager {
    /// Allocate every chunk's buffers, upload the indices with occupied
    /// slots marked unloaded, and publish both pointer tables. No brick
    /// is resident afterwards.
    pub fn upload_initial<B: StreamingBackend>(
        world: &VoxelWorld,
        starting_capacity: u32,
        backend: &mut B,
    ) -> Result<Self> {
        let starting_capacity = starting_capacity.max(1);
        let mut chunks = Vec::with_capacity(world.chunks().len());
        let mut index_pointers = Vec::with_capacity(world.chunks().len());
        let mut brick_pointers = Vec::with_capacity(world.chunks().len());

        for chunk in world.chunks() {
            let indices = chunk.unloaded_indices();
            let index_buffer = backend.allocate(indices.len() as u64 * 4)?;
            backend.write_heap(&index_buffer, &indices)?;

            let brick_buffer = backend.allocate(starting_capacity as u64 * BRICK_BYTES)?;

            index_pointers.push(index_buffer.address);
            brick_pointers.push(brick_buffer.address);
            chunks.push(ChunkResidency {
                index_buffer,
                brick_buffer,
                capacity: starting_capacity,
                next_offset: 0,
            });
        }

        backend.write_pointer_tables(&index_pointers, &brick_pointers)?;
        log::info!(
            "Uploaded {} chunk index buffers, {} bricks of starting capacity each",
            chunks.len(),
            starting_capacity
        );

        Ok(Self {
            chunks,
            index_pointers,
            brick_pointers,
            retired: DeletionQueue::new(),
            grow_events: 0,
        })
    }

    /// Next brick offset for `chunk`. `None` once the 12-bit offset range
    /// is exhausted.
    pub fn assign_offset(&mut self, chunk: usize) -> Option<u32> {
        let state = &mut self.chunks[chunk];
        if state.next_offset > MAX_BRICK_OFFSET {
            return None;
        }
        let offset = state.next_offset;
        state.next_offset += 1;
        Some(offset)
    }

    /// Replace the chunk's brick buffer when its highest assigned offset
    /// no longer fits. The old buffer is retired until `retire_epoch`
    /// completes on the `processed` timeline.
    ///
    /// Returns the copy that carries the old contents over.
    pub fn grow_if_needed<B: StreamingBackend>(
        &mut self,
        chunk: usize,
        backend: &mut B,
        retire_epoch: u64,
    ) -> Result<Option<CopyRegion>> {
        let state = self.chunks[chunk];
        let Some(highest) = state.highest_offset() else {
            return Ok(None);
        };
        if highest < state.capacity {
            return Ok(None);
        }

        let new_capacity = (highest + 1).next_power_of_two();
        let new_buffer = backend.allocate(new_capacity as u64 * BRICK_BYTES)?;
        let copy = CopyRegion {
            src_word: state.brick_buffer.word_offset() as u32,
            dst_word: new_buffer.word_offset() as u32,
            words: state.capacity * BRICK_WORDS as u32,
            _pad: 0,
        };

        log::debug!(
            "Chunk {} brick buffer {} -> {} bricks (heap {:#x} -> {:#x})",
            chunk, state.capacity, new_capacity, state.brick_buffer.address, new_buffer.address
        );

        self.retired.retire(state.brick_buffer, retire_epoch);
        self.brick_pointers[chunk] = new_buffer.address;
        self.chunks[chunk] = ChunkResidency {
            brick_buffer: new_buffer,
            capacity: new_capacity,
            ..state
        };
        self.grow_events += 1;
        Ok(Some(copy))
    }

    /// Release retired buffers whose epoch has completed
    pub fn reclaim<B: StreamingBackend>(&mut self, completed: u64, backend: &mut B) -> usize {
        let ready = self.retired.collect(completed);
        let count = ready.len();
        for allocation in ready {
            backend.release(allocation);
        }
        count
    }

    /// Release everything at teardown, after the device is idle
    pub fn destroy<B: StreamingBackend>(mut self, backend: &mut B) {
        for allocation in self.retired.flush() {
            backend.release(allocation);
        }
        for chunk in self.chunks.drain(..) {
            backend.release(chunk.brick_buffer);
            backend.release(chunk.index_buffer);
        }
    }

    pub fn chunk(&self, chunk: usize) -> &ChunkResidency {
        &self.chunks[chunk]
    }

    pub fn chunks(&self) -> &[ChunkResidency] {
        &self.chunks
    }

    pub fn index_pointers(&self) -> &[DeviceAddress] {
        &self.index_pointers
    }

    pub fn brick_pointers(&self) -> &[DeviceAddress] {
        &self.brick_pointers
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub fn grow_events(&self) -> u64 {
        self.grow_events
    }

    /// Total bricks resident on the GPU
    pub fn resident_bricks(&self) -> u64 {
        self.chunks.iter().map(|c| c.next_offset as u64).sum()
    }
}
