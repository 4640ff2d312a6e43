//! Whole-protocol runs against the host backend: rays, ticks, growth

use glam::{IVec3, UVec3, Vec3};

use crate::terrain::{FlatTerrain, HeightSource, TerrainGenerator, TerrainParams};
use crate::voxel::brick::Brick;
use crate::voxel::index::{BrickIndex, MAX_BRICK_OFFSET, STATE_MASK};
use crate::voxel::streaming::{
    HostBackend, RayProbe, StreamingConfig, StreamingManager, SyncPoints,
};
use crate::voxel::world::{VoxelWorld, WorldDescriptor};

/// Column heights in 1..8 that vary per brick column, so every bottom
/// brick has different contents
struct Steps;

impl HeightSource for Steps {
    fn height_at(&self, x: f32, y: f32) -> f32 {
        let column = (x as i32 / 8) + 3 * (y as i32 / 8);
        1.0 + (column % 7) as f32
    }
}

fn streamer<H: HeightSource>(
    desc: WorldDescriptor,
    heights: &H,
    starting_brick_capacity: u32,
    load_queue_capacity: u32,
) -> StreamingManager<HostBackend> {
    let world = VoxelWorld::generate(desc, heights);
    let config = StreamingConfig {
        starting_brick_capacity,
        load_queue_capacity,
    };
    StreamingManager::new(world, HostBackend::new(desc, load_queue_capacity), config, SyncPoints::new()).unwrap()
}

/// Stand-in for a traced frame: signal the halt value the next tick waits on
fn finish_frame(streamer: &StreamingManager<HostBackend>) {
    streamer.sync().halt.signal_host(streamer.halt_target());
}

fn all_positions(desc: &WorldDescriptor) -> Vec<IVec3> {
    let extent = desc.brick_extent().as_ivec3();
    let mut positions = Vec::new();
    for z in 0..extent.z {
        for y in 0..extent.y {
            for x in 0..extent.x {
                positions.push(IVec3::new(x, y, z));
            }
        }
    }
    positions
}

fn expected_brick(streamer: &StreamingManager<HostBackend>, position: IVec3) -> Brick {
    let slot = streamer.world().descriptor().locate(position).unwrap();
    *streamer.world().chunk(slot.chunk).brick(slot.local).unwrap()
}

#[test]
fn test_flat_scenario_generation() {
    let desc = WorldDescriptor::new(UVec3::new(2, 2, 1), 4);
    let streamer = streamer(desc, &FlatTerrain::new(8.0), 16, 4);

    for chunk in streamer.world().chunks() {
        assert_eq!(chunk.brick_count(), 16);
    }
    for position in all_positions(&desc) {
        let index = streamer.backend().index_at(position).unwrap();
        if position.z == 0 {
            assert!(index.is_unloaded(), "bottom slot {position} should be unloaded");
            assert_eq!(index.lod(), 0xFF);
        } else {
            assert!(index.is_empty(), "upper slot {position} should be empty");
        }
    }
}

#[test]
fn test_duplicate_requests_resolve_independently() {
    let desc = WorldDescriptor::new(UVec3::new(2, 2, 1), 4);
    let mut streamer = streamer(desc, &FlatTerrain::new(8.0), 16, 4);
    let position = IVec3::new(1, 1, 0);

    let recorded = (0..5).filter(|_| streamer.backend_mut().push_request(position)).count();
    assert_eq!(recorded, 4);

    finish_frame(&streamer);
    let report = streamer.tick().unwrap();
    assert_eq!(report.requested, 4);
    assert_eq!(report.loaded, 4);
    assert_eq!(report.dropped, 1);
    assert_eq!(streamer.stats().dropped_requests, 1);

    let chunk = streamer.world().descriptor().locate(position).unwrap().chunk;
    assert_eq!(streamer.residency().chunk(chunk).next_offset, 4);

    // The last scatter wins the index slot
    let index = streamer.backend().index_at(position).unwrap();
    assert!(index.is_loaded());
    assert_eq!(index.offset(), 3);
    assert_eq!(streamer.backend().brick_at(position), Some(Brick::FULL));
}

#[test]
fn test_index_tri_state_holds_across_ticks() {
    let desc = WorldDescriptor::new(UVec3::new(2, 2, 1), 4);
    let mut streamer = streamer(desc, &Steps, 2, 8);
    let world_size = desc.voxel_extent().as_vec3();

    for tick in 0..12 {
        for i in 0..16 {
            let origin = Vec3::new(
                (i as f32 * 13.7 + tick as f32 * 5.3) % world_size.x,
                (i as f32 * 7.1 + tick as f32 * 11.9) % world_size.y,
                world_size.z + 4.0,
            );
            streamer.backend_mut().cast_ray(origin, Vec3::new(0.3, -0.2, -1.0).normalize());
        }
        finish_frame(&streamer);
        streamer.tick().unwrap();

        for position in all_positions(&desc) {
            let raw = streamer.backend().index_at(position).unwrap().raw();
            assert!((raw & STATE_MASK).count_ones() <= 1, "slot {position} has state bits {raw:#x}");
        }
    }
    assert!(streamer.stats().bricks_loaded > 0);
}

#[test]
fn test_offsets_monotonic_across_growth() {
    let desc = WorldDescriptor::new(UVec3::ONE, 4);
    let mut streamer = streamer(desc, &Steps, 1, 16);

    let mut offsets = Vec::new();
    let bottom: Vec<IVec3> = all_positions(&desc).into_iter().filter(|p| p.z == 0).collect();
    for batch in bottom.chunks(3) {
        for &position in batch {
            assert!(streamer.backend_mut().request_brick(position));
        }
        finish_frame(&streamer);
        streamer.tick().unwrap();
        for &position in batch {
            offsets.push(streamer.backend().index_at(position).unwrap().offset());
        }
    }

    assert!(offsets.windows(2).all(|w| w[0] < w[1]), "offsets {offsets:?}");
    assert_eq!(offsets, (0..16).collect::<Vec<_>>());
    // 1 -> 4 -> 8 -> 16
    assert_eq!(streamer.residency().chunk(0).capacity, 16);
    assert_eq!(streamer.stats().grow_events, 3);
}

#[test]
fn test_growth_preserves_resident_bricks() {
    let desc = WorldDescriptor::new(UVec3::ONE, 4);
    let mut streamer = streamer(desc, &Steps, 1, 16);
    let bottom: Vec<IVec3> = all_positions(&desc).into_iter().filter(|p| p.z == 0).collect();

    let mut resident = Vec::new();
    for batch in bottom.chunks(5) {
        let before = streamer.residency().chunk(0).brick_buffer;
        for &position in batch {
            streamer.backend_mut().request_brick(position);
        }
        finish_frame(&streamer);
        let report = streamer.tick().unwrap();
        if report.grown > 0 {
            assert_ne!(streamer.residency().chunk(0).brick_buffer, before);
        }

        resident.extend_from_slice(batch);
        for &position in &resident {
            assert_eq!(
                streamer.backend().brick_at(position),
                Some(expected_brick(&streamer, position)),
                "brick {position} changed after growth"
            );
        }
    }

    // 1 -> 8 -> 16
    assert_eq!(streamer.stats().grow_events, 2);

    // The new pointer table entry is what the backend reads through
    assert_eq!(
        streamer.backend().brick_pointers()[0],
        streamer.residency().chunk(0).brick_buffer.address
    );
}

#[test]
fn test_ray_request_resolves_next_tick() {
    let desc = WorldDescriptor::new(UVec3::new(2, 2, 1), 4);
    let mut streamer = streamer(desc, &Steps, 4, 16);
    let origin = Vec3::new(12.0, 20.0, 40.0);
    let down = Vec3::new(0.0, 0.0, -1.0);

    let probe = streamer.backend_mut().cast_ray(origin, down);
    let RayProbe::Hit { brick, index, requested } = probe else {
        panic!("ray should hit the ground, got {probe:?}");
    };
    assert_eq!(brick, IVec3::new(1, 2, 0));
    assert!(index.is_unloaded());
    assert!(requested);
    assert!(streamer.backend().index_at(brick).unwrap().is_requested());

    // A second ray in the same frame sees the requested mark
    let again = streamer.backend_mut().cast_ray(origin, down);
    assert!(matches!(again, RayProbe::Hit { requested: false, .. }));

    finish_frame(&streamer);
    let report = streamer.tick().unwrap();
    assert_eq!(report.loaded, 1);

    let index = streamer.backend().index_at(brick).unwrap();
    assert!(index.is_loaded());
    assert_eq!(streamer.backend().brick_at(brick), Some(expected_brick(&streamer, brick)));

    let probe = streamer.backend_mut().cast_ray(origin, down);
    assert!(matches!(probe, RayProbe::Hit { index, requested: false, .. } if index.is_loaded()));
}

#[test]
fn test_dropped_requests_retry_later() {
    let desc = WorldDescriptor::new(UVec3::new(2, 2, 1), 4);
    let mut streamer = streamer(desc, &FlatTerrain::new(8.0), 16, 2);
    let wanted: Vec<IVec3> = (0..5).map(|x| IVec3::new(x, 0, 0)).collect();

    let accepted: Vec<bool> = wanted.iter().map(|&p| streamer.backend_mut().request_brick(p)).collect();
    assert_eq!(accepted, [true, true, false, false, false]);

    finish_frame(&streamer);
    let report = streamer.tick().unwrap();
    assert_eq!(report.loaded, 2);
    assert_eq!(report.dropped, 3);
    for &position in &wanted[2..] {
        let index = streamer.backend().index_at(position).unwrap();
        assert_eq!(index, BrickIndex::unloaded(0xFF));
    }

    // Re-requested on later frames until everything is resident
    for _ in 0..2 {
        for &position in &wanted {
            if streamer.backend().index_at(position).unwrap().is_unloaded() {
                streamer.backend_mut().request_brick(position);
            }
        }
        finish_frame(&streamer);
        streamer.tick().unwrap();
    }
    for &position in &wanted {
        assert!(streamer.backend().index_at(position).unwrap().is_loaded());
    }
    assert_eq!(streamer.stats().bricks_loaded, 5);
}

#[test]
fn test_generation_is_deterministic() {
    let desc = WorldDescriptor::new(UVec3::new(2, 1, 1), 4);
    let params = TerrainParams {
        seed: 7,
        scale: 64.0,
        height_scale: 32.0,
        ..Default::default()
    };
    let a = VoxelWorld::generate(desc, &TerrainGenerator::new(params.clone()));
    let b = VoxelWorld::generate(desc, &TerrainGenerator::new(params));
    assert_eq!(a, b);
    assert!(a.filled_voxels() > 0);
}

#[test]
fn test_timelines_advance_once_per_tick() {
    let desc = WorldDescriptor::new(UVec3::ONE, 2);
    let mut streamer = streamer(desc, &FlatTerrain::new(4.0), 4, 4);

    for tick in 1..=3u64 {
        if tick == 2 {
            streamer.backend_mut().request_brick(IVec3::new(1, 1, 0));
        }
        finish_frame(&streamer);
        streamer.tick().unwrap();
        assert_eq!(streamer.sync().load.completed(), tick);
        assert_eq!(streamer.sync().processed.completed(), tick);
        assert_eq!(streamer.processed_value(), tick);
    }
}

#[test]
fn test_offset_exhaustion_keeps_resolved_bricks() {
    let desc = WorldDescriptor::new(UVec3::ONE, 16);
    let mut streamer = streamer(desc, &FlatTerrain::new(8.0), 16, 4096);
    let filler = IVec3::new(0, 0, 0);
    let last = IVec3::new(3, 0, 0);
    let starved = IVec3::new(4, 0, 0);

    // Use every offset but the last one
    for _ in 0..MAX_BRICK_OFFSET {
        assert!(streamer.backend_mut().push_request(filler));
    }
    finish_frame(&streamer);
    let report = streamer.tick().unwrap();
    assert_eq!(report.loaded, MAX_BRICK_OFFSET);
    assert_eq!(streamer.residency().chunk(0).next_offset, MAX_BRICK_OFFSET);

    // The last offset goes to the first request; its duplicate and the
    // next brick find the chunk exhausted
    assert!(streamer.backend_mut().request_brick(last));
    assert!(streamer.backend_mut().push_request(last));
    assert!(streamer.backend_mut().request_brick(starved));
    finish_frame(&streamer);
    let report = streamer.tick().unwrap();
    assert_eq!(report.requested, 3);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped, 2);

    let index = streamer.backend().index_at(last).unwrap();
    assert_eq!(index, BrickIndex::loaded(MAX_BRICK_OFFSET, 0xFF));
    assert_eq!(streamer.backend().brick_at(last), Some(expected_brick(&streamer, last)));
    assert_eq!(streamer.backend().index_at(starved), Some(BrickIndex::requested(0xFF)));

    // Rays no longer ask for the starved brick, a stray request changes nothing
    let origin = Vec3::new(36.0, 4.0, desc.voxel_extent().z as f32 + 4.0);
    let probe = streamer.backend_mut().cast_ray(origin, Vec3::new(0.0, 0.0, -1.0));
    assert!(matches!(probe, RayProbe::Hit { brick, requested: false, .. } if brick == starved));
    assert!(streamer.backend_mut().push_request(last));
    finish_frame(&streamer);
    let report = streamer.tick().unwrap();
    assert_eq!((report.loaded, report.skipped), (0, 1));
    assert_eq!(streamer.backend().index_at(last), Some(BrickIndex::loaded(MAX_BRICK_OFFSET, 0xFF)));
    assert_eq!(streamer.backend().index_at(starved), Some(BrickIndex::requested(0xFF)));
    assert_eq!(streamer.stats().skipped_requests, 3);
}
