//! In-memory streaming backend
//!
//! Executes the same protocol as the GPU path against a `Vec<u32>` heap:
//! submissions complete immediately, timelines are signalled inline. It
//! also mirrors the shader-side request path (guarded queue append plus
//! the requested mark) and a brick-granular ray probe, so the full
//! request/resolve/integrate loop runs without a device.

use glam::{IVec3, Vec3};

use crate::core::error::Error;
use crate::core::types::{DeviceAddress, Result};
use crate::voxel::brick::{Brick, BRICK_SIZE, BRICK_WORDS};
use crate::voxel::index::BrickIndex;
use crate::voxel::streaming::backend::{IntegrateWork, LoadBatch, StreamingBackend};
use crate::voxel::streaming::heap::{Allocation, HeapAllocator};
use crate::voxel::streaming::load_queue::{HostLoadQueue, LoadRequests};
use crate::voxel::streaming::timeline::{SyncPoints, Timeline};
use crate::voxel::world::WorldDescriptor;

/// Heap size before the first growth
const INITIAL_HEAP_BYTES: u64 = 64 * 1024;

/// Result of probing the world with one ray
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RayProbe {
    /// Left the world without touching an occupied brick
    Miss,
    /// Stopped at the first occupied brick
    Hit {
        brick: IVec3,
        /// Index word as it was before the probe
        index: BrickIndex,
        /// This probe appended a load request
        requested: bool,
    },
}

/// CPU implementation of [`StreamingBackend`]
pub struct HostBackend {
    descriptor: WorldDescriptor,
    allocator: HeapAllocator,
    heap: Vec<u32>,
    index_pointers: Vec<DeviceAddress>,
    brick_pointers: Vec<DeviceAddress>,
    queue: HostLoadQueue,
    staged: Option<LoadBatch>,
    heap_grows: u32,
}

impl HostBackend {
    pub fn new(descriptor: WorldDescriptor, load_queue_capacity: u32) -> Self {
        Self {
            descriptor,
            allocator: HeapAllocator::new(INITIAL_HEAP_BYTES),
            heap: vec![0; (INITIAL_HEAP_BYTES / 4) as usize],
            index_pointers: Vec::new(),
            brick_pointers: Vec::new(),
            queue: HostLoadQueue::new(load_queue_capacity),
            staged: None,
            heap_grows: 0,
        }
    }

    pub fn descriptor(&self) -> &WorldDescriptor {
        &self.descriptor
    }

    /// Copy `count` words starting at a heap address
    pub fn read_words(&self, address: DeviceAddress, count: usize) -> Vec<u32> {
        let start = (address / 4) as usize;
        self.heap[start..start + count].to_vec()
    }

    pub fn index_pointers(&self) -> &[DeviceAddress] {
        &self.index_pointers
    }

    pub fn brick_pointers(&self) -> &[DeviceAddress] {
        &self.brick_pointers
    }

    pub fn heap_capacity(&self) -> u64 {
        self.allocator.capacity()
    }

    /// Times the heap was reallocated
    pub fn heap_grows(&self) -> u32 {
        self.heap_grows
    }

    pub fn load_queue(&self) -> &HostLoadQueue {
        &self.queue
    }

    /// Heap word holding the index of a world brick position
    fn index_word(&self, position: IVec3) -> Option<usize> {
        let slot = self.descriptor.locate(position)?;
        let base = (*self.index_pointers.get(slot.chunk)? / 4) as usize;
        Some(base + slot.slot)
    }

    /// Index word as the tracer would read it
    pub fn index_at(&self, position: IVec3) -> Option<BrickIndex> {
        self.index_word(position).map(|word| BrickIndex(self.heap[word]))
    }

    /// Resident brick contents at a world brick position
    pub fn brick_at(&self, position: IVec3) -> Option<Brick> {
        let index = self.index_at(position)?;
        if !index.is_loaded() {
            return None;
        }
        let chunk = self.descriptor.locate(position)?.chunk;
        let base = (self.brick_pointers[chunk] / 4) as usize + index.offset() as usize * BRICK_WORDS;
        let mut brick = Brick::EMPTY;
        brick.words.copy_from_slice(&self.heap[base..base + BRICK_WORDS]);
        Some(brick)
    }

    /// Raw queue append without touching the index, as a ray that lost a
    /// race on the index word would do
    pub fn push_request(&mut self, position: IVec3) -> bool {
        self.queue.try_push(position)
    }

    /// Shader request path: only an unloaded slot is appended, and when it
    /// fit, marked requested with its LOD preserved
    pub fn request_brick(&mut self, position: IVec3) -> bool {
        let Some(word) = self.index_word(position) else {
            return false;
        };
        let index = BrickIndex(self.heap[word]);
        if !index.is_unloaded() || !self.queue.try_push(position) {
            return false;
        }
        self.heap[word] = BrickIndex::requested(index.lod()).raw();
        true
    }

    /// Walk the brick grid along a ray and stop at the first occupied
    /// brick, requesting it when it is unloaded
    pub fn cast_ray(&mut self, origin: Vec3, direction: Vec3) -> RayProbe {
        let brick_extent = self.descriptor.brick_extent().as_ivec3();
        let world_max = self.descriptor.voxel_extent().as_vec3();
        let edge = BRICK_SIZE as f32;

        let inv = direction.recip();
        let t0 = (Vec3::ZERO - origin) * inv;
        let t1 = (world_max - origin) * inv;
        let t_enter = t0.min(t1).max_element().max(0.0);
        let t_exit = t0.max(t1).min_element();
        if !(t_enter <= t_exit) {
            return RayProbe::Miss;
        }

        let entry = origin + direction * (t_enter + 1e-4);
        let mut brick = (entry / edge).floor().as_ivec3().clamp(IVec3::ZERO, brick_extent - IVec3::ONE);
        let step = IVec3::new(
            if direction.x < 0.0 { -1 } else { 1 },
            if direction.y < 0.0 { -1 } else { 1 },
            if direction.z < 0.0 { -1 } else { 1 },
        );
        let t_delta = (inv * edge).abs();
        let boundary = (brick + step.max(IVec3::ZERO)).as_vec3() * edge;
        let mut t_max = Vec3::select(direction.cmpeq(Vec3::ZERO), Vec3::INFINITY, (boundary - origin) * inv);

        let max_steps = (brick_extent.x + brick_extent.y + brick_extent.z + 3) as usize;
        for _ in 0..max_steps {
            if brick.cmplt(IVec3::ZERO).any() || brick.cmpge(brick_extent).any() {
                break;
            }
            if let Some(index) = self.index_at(brick) {
                if index.is_unloaded() {
                    let requested = self.request_brick(brick);
                    return RayProbe::Hit { brick, index, requested };
                }
                if index.is_loaded() || index.is_requested() {
                    return RayProbe::Hit { brick, index, requested: false };
                }
            }

            if t_max.x <= t_max.y && t_max.x <= t_max.z {
                brick.x += step.x;
                t_max.x += t_delta.x;
            } else if t_max.y <= t_max.z {
                brick.y += step.y;
                t_max.y += t_delta.y;
            } else {
                brick.z += step.z;
                t_max.z += t_delta.z;
            }
        }
        RayProbe::Miss
    }

    fn scatter(&mut self, position: IVec3, index: u32, brick: &Brick) -> Result<()> {
        let slot = self.descriptor.locate(position).ok_or_else(|| {
            Error::Streaming(format!("scatter position {position} outside the world"))
        })?;
        let index_word = (self.index_pointers[slot.chunk] / 4) as usize + slot.slot;
        self.heap[index_word] = index;

        let index = BrickIndex(index);
        if index.is_loaded() {
            let base = (self.brick_pointers[slot.chunk] / 4) as usize + index.offset() as usize * BRICK_WORDS;
            self.heap[base..base + BRICK_WORDS].copy_from_slice(&brick.words);
        }
        Ok(())
    }
}

impl StreamingBackend for HostBackend {
    fn world_descriptor(&self) -> &WorldDescriptor {
        &self.descriptor
    }

    fn allocate(&mut self, size: u64) -> Result<Allocation> {
        loop {
            if let Some(allocation) = self.allocator.allocate(size) {
                return Ok(allocation);
            }
            let capacity = self.allocator.grown_capacity(size);
            log::debug!("Host heap {} -> {} bytes", self.allocator.capacity(), capacity);
            self.allocator.grow_to(capacity);
            self.heap.resize((capacity / 4) as usize, 0);
            self.heap_grows += 1;
        }
    }

    fn release(&mut self, allocation: Allocation) {
        self.allocator.free(allocation);
    }

    fn write_heap(&mut self, allocation: &Allocation, words: &[u32]) -> Result<()> {
        if words.len() as u64 * 4 > allocation.size {
            return Err(Error::Streaming(format!(
                "{} words do not fit a {} byte block",
                words.len(),
                allocation.size
            )));
        }
        let start = allocation.word_offset();
        self.heap[start..start + words.len()].copy_from_slice(words);
        Ok(())
    }

    fn write_pointer_tables(&mut self, index_pointers: &[u64], brick_pointers: &[u64]) -> Result<()> {
        self.index_pointers = index_pointers.to_vec();
        self.brick_pointers = brick_pointers.to_vec();
        Ok(())
    }

    fn wait(&mut self, timeline: &Timeline, value: u64) -> Result<()> {
        timeline.wait(value)
    }

    fn read_load_queue(&mut self) -> Result<LoadRequests> {
        Ok(self.queue.snapshot())
    }

    fn submit_load(&mut self, batch: &LoadBatch, load: &Timeline, value: u64) -> Result<()> {
        self.staged = Some(batch.clone());
        load.complete(value);
        Ok(())
    }

    fn submit_integrate(
        &mut self,
        work: &IntegrateWork<'_>,
        sync: &SyncPoints,
        load_value: u64,
        processed_value: u64,
    ) -> Result<()> {
        sync.load.gpu_wait(load_value)?;

        for copy in work.copies {
            let src = copy.src_word as usize;
            let words = copy.words as usize;
            self.heap.copy_within(src..src + words, copy.dst_word as usize);
        }
        if let Some(pointers) = work.brick_pointers {
            self.brick_pointers = pointers.to_vec();
        }

        let staged = self.staged.take().unwrap_or_default();
        if staged.len() < work.scatter_count as usize {
            return Err(Error::Streaming(format!(
                "integrate expects {} staged entries, {} were uploaded",
                work.scatter_count,
                staged.len()
            )));
        }
        for (entry, brick) in staged.entries.iter().zip(&staged.bricks).take(work.scatter_count as usize) {
            self.scatter(entry.position(), entry.index, brick)?;
        }

        self.queue.reset();
        sync.processed.complete(processed_value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::streaming::backend::{CopyRegion, ScatterEntry};
    use glam::UVec3;

    fn backend() -> HostBackend {
        let mut backend = HostBackend::new(WorldDescriptor::new(UVec3::new(1, 1, 1), 2), 4);
        let indices = backend.allocate(8 * 4).unwrap();
        let bricks = backend.allocate(2 * 64).unwrap();
        let lod_only = BrickIndex::unloaded(0xFF).raw();
        backend.write_heap(&indices, &[lod_only, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        backend.write_pointer_tables(&[indices.address], &[bricks.address]).unwrap();
        backend
    }

    #[test]
    fn test_allocate_grows_heap() {
        let mut backend = HostBackend::new(WorldDescriptor::new(UVec3::ONE, 2), 4);
        let big = backend.allocate(INITIAL_HEAP_BYTES + 1).unwrap();
        assert_eq!(big.address, 0);
        assert!(backend.heap_capacity() > INITIAL_HEAP_BYTES);
        assert_eq!(backend.heap_grows(), 1);
        assert_eq!(backend.heap.len() as u64 * 4, backend.heap_capacity());
    }

    #[test]
    fn test_write_heap_bounds() {
        let mut backend = backend();
        let small = backend.allocate(4).unwrap();
        assert!(backend.write_heap(&small, &[0; 128]).is_err());
    }

    #[test]
    fn test_request_marks_slot() {
        let mut backend = backend();
        assert!(backend.request_brick(IVec3::ZERO));
        let index = backend.index_at(IVec3::ZERO).unwrap();
        assert!(index.is_requested());
        assert_eq!(index.lod(), 0xFF);
        assert_eq!(backend.load_queue().count(), 1);
        assert!(!backend.request_brick(IVec3::new(5, 0, 0)));
    }

    #[test]
    fn test_request_ignores_empty_and_pending_slots() {
        let mut backend = backend();
        let empty = IVec3::new(1, 0, 0);
        assert!(!backend.request_brick(empty));
        assert_eq!(backend.index_at(empty), Some(BrickIndex::EMPTY));

        assert!(backend.request_brick(IVec3::ZERO));
        assert!(!backend.request_brick(IVec3::ZERO));
        assert_eq!(backend.load_queue().count(), 1);
    }

    #[test]
    fn test_ray_probe_requests_unloaded_brick() {
        let mut backend = backend();
        let probe = backend.cast_ray(Vec3::new(4.0, 4.0, 40.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(
            probe,
            RayProbe::Hit {
                brick: IVec3::ZERO,
                index: BrickIndex::unloaded(0xFF),
                requested: true,
            }
        );

        // Second probe sees the pending request and does not append again
        let probe = backend.cast_ray(Vec3::new(4.0, 4.0, 40.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(matches!(probe, RayProbe::Hit { requested: false, .. }));
        assert_eq!(backend.load_queue().count(), 1);
    }

    #[test]
    fn test_ray_probe_miss() {
        let mut backend = backend();
        assert_eq!(backend.cast_ray(Vec3::new(12.0, 4.0, 4.0), Vec3::new(0.0, 0.0, 1.0)), RayProbe::Miss);
        assert_eq!(backend.cast_ray(Vec3::new(12.0, 12.0, 4.0), Vec3::new(0.0, -1.0, 0.0)), RayProbe::Miss);
    }

    #[test]
    fn test_integrate_scatters_and_resets_queue() {
        let mut backend = backend();
        let sync = SyncPoints::new();
        backend.request_brick(IVec3::ZERO);

        let mut batch = LoadBatch::default();
        batch.push(ScatterEntry::new(IVec3::ZERO, BrickIndex::loaded(1, 0xFF).raw()), Brick::FULL);
        backend.submit_load(&batch, &sync.load, 1).unwrap();
        let work = IntegrateWork { copies: &[], brick_pointers: None, scatter_count: 1 };
        backend.submit_integrate(&work, &sync, 1, 1).unwrap();

        assert_eq!(backend.brick_at(IVec3::ZERO), Some(Brick::FULL));
        assert_eq!(backend.index_at(IVec3::ZERO).unwrap().offset(), 1);
        assert_eq!(backend.load_queue().count(), 0);
        assert_eq!(sync.processed.completed(), 1);
    }

    #[test]
    fn test_integrate_requires_submitted_load() {
        let mut backend = backend();
        let sync = SyncPoints::new();
        let work = IntegrateWork { copies: &[], brick_pointers: None, scatter_count: 0 };
        assert!(matches!(backend.submit_integrate(&work, &sync, 1, 1), Err(Error::Sync(_))));
    }

    #[test]
    fn test_copy_region() {
        let mut backend = backend();
        let a = backend.allocate(64).unwrap();
        let b = backend.allocate(128).unwrap();
        backend.write_heap(&a, &Brick::FULL.words).unwrap();

        let sync = SyncPoints::new();
        backend.submit_load(&LoadBatch::default(), &sync.load, 1).unwrap();
        let copies = [CopyRegion {
            src_word: a.word_offset() as u32,
            dst_word: b.word_offset() as u32,
            words: 16,
            _pad: 0,
        }];
        let work = IntegrateWork { copies: &copies, brick_pointers: None, scatter_count: 0 };
        backend.submit_integrate(&work, &sync, 1, 1).unwrap();
        assert_eq!(backend.read_words(b.address, 16), Brick::FULL.words.to_vec());
    }
}
