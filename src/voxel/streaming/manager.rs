//! Streaming Manager - per-tick load queue hand-off
//!
//! One tick:
//! 1. wait until the tracer signalled `halt` for this tick
//! 2. drain the load queue (count clamped to capacity)
//! 3. resolve every request to a fresh brick offset in its chunk
//! 4. stage bricks + entries, signal `load`
//! 5. grow brick buffers that overflowed, scatter the entries, reset the
//!    queue, signal `processed`
//!
//! The tracer's next submission waits on `processed`. Ticks with no
//! requests signal both timelines from the host.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::voxel::index::BrickIndex;
use crate::voxel::streaming::backend::{IntegrateWork, LoadBatch, ScatterEntry, StreamingBackend};
use crate::voxel::streaming::load_queue::LoadRequests;
use crate::voxel::streaming::residency::ResidencyManager;
use crate::voxel::streaming::timeline::SyncPoints;
use crate::voxel::world::VoxelWorld;

/// Streaming capacities
#[derive(Clone, Copy, Debug)]
pub struct StreamingConfig {
    pub starting_brick_capacity: u32,
    pub load_queue_capacity: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            starting_brick_capacity: super::DEFAULT_STARTING_CAPACITY,
            load_queue_capacity: super::DEFAULT_LOAD_QUEUE_CAPACITY,
        }
    }
}

/// What one tick did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Entries recorded in the queue
    pub requested: u32,
    /// Bricks resolved and uploaded
    pub loaded: u32,
    /// Append attempts beyond the queue capacity
    pub dropped: u32,
    /// Requests that could not be resolved (outside the world, empty,
    /// or in a chunk with no brick offsets left)
    pub skipped: u32,
    /// Chunks whose brick buffer grew
    pub grown: u32,
}

/// Running totals
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StreamingStats {
    pub ticks: u64,
    pub bricks_loaded: u64,
    pub dropped_requests: u64,
    pub skipped_requests: u64,
    pub grow_events: u64,
    pub last_tick: TickReport,
}

/// Resolved requests between the load and integrate phases
#[derive(Debug, Default)]
pub struct PendingLoad {
    batch: LoadBatch,
    touched_chunks: BTreeSet<usize>,
    report: TickReport,
}

/// Owns the CPU world, its GPU residency and the device backend
pub struct StreamingManager<B: StreamingBackend> {
    world: VoxelWorld,
    residency: ResidencyManager,
    backend: B,
    sync: SyncPoints,
    world_frame: u64,
    stats: StreamingStats,
    /// Chunks already reported as out of brick offsets
    exhausted_chunks: BTreeSet<usize>,
}

impl<B: StreamingBackend> StreamingManager<B> {
    /// Upload the world's initial residency state
    pub fn new(world: VoxelWorld, mut backend: B, config: StreamingConfig, sync: SyncPoints) -> Result<Self> {
        if backend.world_descriptor() != world.descriptor() {
            return Err(Error::Voxel(format!(
                "backend built for {:?}, world is {:?}",
                backend.world_descriptor(),
                world.descriptor()
            )));
        }
        let residency = ResidencyManager::upload_initial(&world, config.starting_brick_capacity, &mut backend)?;
        Ok(Self {
            world,
            residency,
            backend,
            sync,
            world_frame: 0,
            stats: StreamingStats::default(),
            exhausted_chunks: BTreeSet::new(),
        })
    }

    /// Run one full tick
    pub fn tick(&mut self) -> Result<TickReport> {
        let pending = self.load_requested_bricks()?;
        let report = self.process_load_queue(pending)?;

        self.world_frame += 1;
        self.stats.ticks += 1;
        self.stats.bricks_loaded += report.loaded as u64;
        self.stats.dropped_requests += report.dropped as u64;
        self.stats.skipped_requests += report.skipped as u64;
        self.stats.grow_events += report.grown as u64;
        self.stats.last_tick = report;
        Ok(report)
    }

    /// Halt-wait, drain, resolve, and submit the transfer batch
    pub fn load_requested_bricks(&mut self) -> Result<PendingLoad> {
        let halt = self.halt_target();
        self.backend.wait(&self.sync.halt, halt)?;

        let requests = self.backend.read_load_queue()?;
        if requests.dropped > 0 {
            log::trace!("tick {}: {} load requests dropped (queue full)", self.world_frame, requests.dropped);
        }

        let pending = self.resolve(&requests);
        let load_value = self.world_frame + 1;
        if pending.report.requested == 0 {
            self.sync.load.signal_host(load_value);
        } else {
            self.backend.submit_load(&pending.batch, &self.sync.load, load_value)?;
        }
        Ok(pending)
    }

    /// Map each requested position to a new brick offset in its chunk
    fn resolve(&mut self, requests: &LoadRequests) -> PendingLoad {
        let descriptor = *self.world.descriptor();
        let mut pending = PendingLoad::default();
        pending.report.requested = requests.len() as u32;
        pending.report.dropped = requests.dropped;

        for &position in &requests.positions {
            let Some(slot) = descriptor.locate(position) else {
                log::warn!("Ignoring load request outside the world: {}", position);
                pending.report.skipped += 1;
                continue;
            };
            let chunk = self.world.chunk(slot.chunk);
            let cpu_index = chunk.index(slot.local);
            let Some(brick) = chunk.brick(slot.local) else {
                log::warn!("Ignoring load request for empty brick {}", position);
                pending.report.skipped += 1;
                continue;
            };

            match self.residency.assign_offset(slot.chunk) {
                Some(offset) => {
                    let index = BrickIndex::loaded(offset, cpu_index.lod());
                    pending.batch.push(ScatterEntry::new(position, index.raw()), *brick);
                    pending.touched_chunks.insert(slot.chunk);
                    pending.report.loaded += 1;
                }
                None => {
                    // No entry: the slot keeps the requested mark the ray
                    // left, renders through its LOD mask and is not asked
                    // for again. A slot loaded earlier is never overwritten.
                    if self.exhausted_chunks.insert(slot.chunk) {
                        log::warn!("Chunk {} has no brick offsets left", slot.chunk);
                    }
                    pending.report.skipped += 1;
                }
            }
        }
        pending
    }

    /// Reclaim, grow, scatter, and signal `processed`
    pub fn process_load_queue(&mut self, mut pending: PendingLoad) -> Result<TickReport> {
        let processed_value = self.world_frame + 1;
        self.residency.reclaim(self.sync.processed.completed(), &mut self.backend);

        if pending.report.requested == 0 {
            self.sync.processed.signal_host(processed_value);
            return Ok(pending.report);
        }

        let mut copies = Vec::new();
        for &chunk in &pending.touched_chunks {
            if let Some(copy) = self.residency.grow_if_needed(chunk, &mut self.backend, processed_value)? {
                copies.push(copy);
            }
        }
        pending.report.grown = copies.len() as u32;

        let work = IntegrateWork {
            copies: &copies,
            brick_pointers: (!copies.is_empty()).then(|| self.residency.brick_pointers()),
            scatter_count: pending.batch.len() as u32,
        };
        self.backend.submit_integrate(&work, &self.sync, self.world_frame + 1, processed_value)?;

        log::trace!(
            "tick {}: {} requested, {} loaded, {} grown",
            self.world_frame, pending.report.requested, pending.report.loaded, pending.report.grown
        );
        Ok(pending.report)
    }

    /// `halt` value the tracer signals after the frame this tick consumes
    pub fn halt_target(&self) -> u64 {
        self.world_frame + 1
    }

    /// `processed` value signalled by the most recent tick
    pub fn processed_value(&self) -> u64 {
        self.world_frame
    }

    pub fn world_frame(&self) -> u64 {
        self.world_frame
    }

    pub fn world(&self) -> &VoxelWorld {
        &self.world
    }

    pub fn residency(&self) -> &ResidencyManager {
        &self.residency
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sync(&self) -> &SyncPoints {
        &self.sync
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }

    /// Tear down once the device is idle
    pub fn destroy(self) -> B {
        let Self { residency, mut backend, .. } = self;
        residency.destroy(&mut backend);
        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::FlatTerrain;
    use crate::voxel::brick::Brick;
    use crate::voxel::streaming::host::HostBackend;
    use crate::voxel::world::WorldDescriptor;
    use glam::{IVec3, UVec3};

    fn manager(queue: u32) -> StreamingManager<HostBackend> {
        let desc = WorldDescriptor::new(UVec3::new(2, 2, 1), 4);
        let world = VoxelWorld::generate(desc, &FlatTerrain::new(8.0));
        let config = StreamingConfig { starting_brick_capacity: 16, load_queue_capacity: queue };
        StreamingManager::new(world, HostBackend::new(desc, queue), config, SyncPoints::new()).unwrap()
    }

    fn traced(manager: &StreamingManager<HostBackend>) {
        manager.sync().halt.signal_host(manager.halt_target());
    }

    #[test]
    fn test_backend_for_other_world_rejected() {
        let desc = WorldDescriptor::new(UVec3::new(2, 2, 1), 4);
        let world = VoxelWorld::generate(desc, &FlatTerrain::new(8.0));
        let backend = HostBackend::new(WorldDescriptor::new(UVec3::new(1, 2, 1), 4), 4);
        let result = StreamingManager::new(world, backend, StreamingConfig::default(), SyncPoints::new());
        assert!(matches!(result, Err(Error::Voxel(_))));
    }

    #[test]
    fn test_tick_without_trace_is_sync_error() {
        let mut manager = manager(4);
        assert!(manager.tick().is_err());
    }

    #[test]
    fn test_empty_tick_signals_host() {
        let mut manager = manager(4);
        traced(&manager);
        let report = manager.tick().unwrap();
        assert_eq!(report, TickReport::default());
        assert_eq!(manager.sync().load.completed(), 1);
        assert_eq!(manager.sync().processed.completed(), 1);
        assert_eq!(manager.processed_value(), 1);
    }

    #[test]
    fn test_request_resolves_next_tick() {
        let mut manager = manager(4);
        let position = IVec3::new(5, 2, 0);
        assert!(manager.backend_mut().request_brick(position));
        traced(&manager);

        let report = manager.tick().unwrap();
        assert_eq!(report.loaded, 1);
        let index = manager.backend().index_at(position).unwrap();
        assert!(index.is_loaded());
        assert_eq!(index.offset(), 0);
        assert_eq!(index.lod(), 0xFF);
        assert_eq!(manager.backend().brick_at(position), Some(Brick::FULL));
    }

    #[test]
    fn test_out_of_world_request_skipped() {
        let mut manager = manager(4);
        manager.backend_mut().push_request(IVec3::new(100, 0, 0));
        traced(&manager);
        let report = manager.tick().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.loaded, 0);
        assert_eq!(manager.backend().load_queue().count(), 0);
    }
}
