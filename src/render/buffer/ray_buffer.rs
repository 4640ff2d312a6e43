//! Wavefront ray state: ping-ponged ray queues, shadow rays, counters and
//! the accumulation (blit) buffer

use bytemuck::{Pod, Zeroable};

/// Threads per workgroup in every wavefront pass
pub const WAVEFRONT_WORKGROUP_SIZE: u32 = 128;

/// Path segment (must match `Ray` in wavefront.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuRay {
    /// (16 bytes, offset 0)
    pub origin: [f32; 4],
    /// (16 bytes, offset 16)
    pub direction: [f32; 4],
    /// Path throughput (16 bytes, offset 32)
    pub throughput: [f32; 4],
    /// Surface normal at the hit (16 bytes, offset 48)
    pub normal: [f32; 4],
    /// Hit distance, negative on miss (4 bytes, offset 64)
    pub distance: f32,
    /// Hit kind: 0 miss, 1 voxel, 2 LOD cell (4 bytes, offset 68)
    pub identifier: i32,
    /// Bounces taken so far (4 bytes, offset 72)
    pub bounces: i32,
    /// Pixel this path contributes to (4 bytes, offset 76)
    pub pixel_index: u32,
}

/// Sun visibility query (must match `ShadowRay` in wavefront.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuShadowRay {
    /// (16 bytes, offset 0)
    pub origin: [f32; 4],
    /// (16 bytes, offset 16)
    pub direction: [f32; 4],
    /// Contribution if unoccluded (16 bytes, offset 32)
    pub color: [f32; 4],
    /// (4 bytes, offset 48)
    pub pixel_index: u32,
    pub _pad: [u32; 3],
}

/// Wavefront counters (must match `WavefrontState` in wavefront.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WavefrontState {
    /// Next pixel to receive a fresh camera ray
    pub start_position: u32,
    /// Rays in the front buffer this frame
    pub primary_ray_count: u32,
    /// Shadow rays emitted by shade
    pub shadow_ray_count: u32,
    /// Fresh camera rays generated this frame
    pub ray_number_primary: u32,
    /// Rays traversed by extend
    pub ray_number_extend: u32,
    /// Extension rays written to the back buffer (next frame's survivors)
    pub ray_number_shade: u32,
    /// Shadow rays resolved by connect
    pub ray_number_connect: u32,
    /// Ray queue capacity
    pub ray_queue_buffer_size: u32,
}

impl WavefrontState {
    /// Counters for an empty queue of `capacity` slots
    pub fn reset(capacity: u32) -> Self {
        Self {
            ray_queue_buffer_size: capacity,
            ..Default::default()
        }
    }
}

/// Workgroups needed to cover `count` invocations
pub fn workgroup_count(count: u32) -> u32 {
    count.div_ceil(WAVEFRONT_WORKGROUP_SIZE)
}

/// GPU buffers for the wavefront passes (bind group 1)
pub struct RayBuffers {
    rays: [wgpu::Buffer; 2],
    shadow_rays: wgpu::Buffer,
    state: wgpu::Buffer,
    blit: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    /// Bind group `i` uses `rays[i]` as front and `rays[1 - i]` as back
    bind_groups: [wgpu::BindGroup; 2],
    capacity: u32,
    pixel_count: u32,
}

pub(crate) fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl RayBuffers {
    /// Allocate queues for `capacity` rays and a `width * height` blit buffer
    pub fn new(device: &wgpu::Device, capacity: u32, width: u32, height: u32) -> Self {
        let ray_bytes = capacity as u64 * std::mem::size_of::<GpuRay>() as u64;
        let make_rays = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: ray_bytes,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })
        };
        let rays = [make_rays("rays_0"), make_rays("rays_1")];

        let shadow_rays = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow_rays"),
            size: capacity as u64 * std::mem::size_of::<GpuShadowRay>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let state = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wavefront_state"),
            size: std::mem::size_of::<WavefrontState>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let pixel_count = width * height;
        let blit = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blit"),
            size: pixel_count as u64 * 16,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let compute = wgpu::ShaderStages::COMPUTE;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("wavefront_bind_group_layout"),
            entries: &[
                storage_entry(0, compute, false),
                storage_entry(1, compute, false),
                storage_entry(2, compute, false),
                storage_entry(3, compute, false),
                storage_entry(4, compute, false),
            ],
        });

        let make_group = |front: &wgpu::Buffer, back: &wgpu::Buffer, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: front.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: back.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: shadow_rays.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: state.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: blit.as_entire_binding() },
                ],
            })
        };
        let bind_groups = [
            make_group(&rays[0], &rays[1], "wavefront_bind_group_0"),
            make_group(&rays[1], &rays[0], "wavefront_bind_group_1"),
        ];

        log::info!(
            "Wavefront buffers: {} rays ({} KB per queue), {}x{} accumulation",
            capacity, ray_bytes / 1024, width, height
        );

        Self {
            rays,
            shadow_rays,
            state,
            blit,
            bind_group_layout,
            bind_groups,
            capacity,
            pixel_count,
        }
    }

    /// Drop accumulated samples and in-flight paths
    pub fn reset(&self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder) {
        queue.write_buffer(&self.state, 0, bytemuck::bytes_of(&WavefrontState::reset(self.capacity)));
        encoder.clear_buffer(&self.blit, 0, None);
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Bind group for the given front-buffer index
    pub fn bind_group(&self, primary_rays_index: usize) -> &wgpu::BindGroup {
        &self.bind_groups[primary_rays_index & 1]
    }

    /// Accumulation buffer: rgb sum, w sample count per pixel
    pub fn blit(&self) -> &wgpu::Buffer {
        &self.blit
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn pixel_count(&self) -> u32 {
        self.pixel_count
    }

    /// Total bytes held by the ray queues
    pub fn ray_bytes(&self) -> u64 {
        self.rays.iter().map(|b| b.size()).sum::<u64>() + self.shadow_rays.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(std::mem::size_of::<GpuRay>(), 80);
        assert_eq!(std::mem::size_of::<GpuShadowRay>(), 64);
        assert_eq!(std::mem::size_of::<WavefrontState>(), 32);
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(128), 1);
        assert_eq!(workgroup_count(129), 2);
        assert_eq!(workgroup_count(1280 * 720), 7200);
    }

    #[test]
    fn test_state_reset() {
        let state = WavefrontState::reset(4096);
        assert_eq!(state.ray_queue_buffer_size, 4096);
        assert_eq!(state.ray_number_shade, 0);
        assert_eq!(state.start_position, 0);
    }
}
