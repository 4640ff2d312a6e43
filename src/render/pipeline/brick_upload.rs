//! Brick upload compute pipeline
//!
//! Two entry points over the world heap: `copy_regions` carries a chunk's
//! bricks into its replacement buffer, `scatter_bricks` writes one tick's
//! resolved index words and brick contents into place.

use bytemuck::{Pod, Zeroable};

use crate::core::types::Result;
use crate::render::buffer::ray_buffer::storage_entry;
use crate::render::context::with_validation;
use crate::voxel::streaming::CopyRegion;

/// Threads per workgroup in both upload passes
pub const UPLOAD_WORKGROUP_SIZE: u32 = 64;

/// Upload counts (must match `UploadParams` in brick_upload.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UploadParams {
    pub scatter_count: u32,
    pub copy_count: u32,
    pub _pad: [u32; 2],
}

/// Copy and scatter pipelines sharing one layout
pub struct BrickUploadPipeline {
    copy_pipeline: wgpu::ComputePipeline,
    scatter_pipeline: wgpu::ComputePipeline,
    upload_bind_group_layout: wgpu::BindGroupLayout,
}

impl BrickUploadPipeline {
    pub fn new(device: &wgpu::Device, world_layout: &wgpu::BindGroupLayout) -> Result<Self> {
        with_validation(device, "brick upload pipeline", || Self::create(device, world_layout))
    }

    fn create(device: &wgpu::Device, world_layout: &wgpu::BindGroupLayout) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("brick_upload_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/brick_upload.wgsl").into()),
        });

        let compute = wgpu::ShaderStages::COMPUTE;
        let upload_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brick_upload_bind_group_layout"),
            entries: &[
                storage_entry(0, compute, true),
                storage_entry(1, compute, true),
                storage_entry(2, compute, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: compute,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("brick_upload_pipeline_layout"),
            bind_group_layouts: &[world_layout, &upload_bind_group_layout],
            immediate_size: 0,
        });

        let make_pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Self {
            copy_pipeline: make_pipeline("copy_regions"),
            scatter_pipeline: make_pipeline("scatter_bricks"),
            upload_bind_group_layout,
        }
    }

    /// Layout of group 1 (entries, bricks, copies, params)
    pub fn upload_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.upload_bind_group_layout
    }

    /// Record the copy pass (if any regions) followed by the scatter pass
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        world_bind_group: &wgpu::BindGroup,
        upload_bind_group: &wgpu::BindGroup,
        copies: &[CopyRegion],
        scatter_count: u32,
    ) {
        if !copies.is_empty() {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("brick_copy_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.copy_pipeline);
            pass.set_bind_group(0, world_bind_group, &[]);
            pass.set_bind_group(1, upload_bind_group, &[]);
            pass.dispatch_workgroups(copies.len() as u32, 1, 1);
        }

        if scatter_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("brick_scatter_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.scatter_pipeline);
            pass.set_bind_group(0, world_bind_group, &[]);
            pass.set_bind_group(1, upload_bind_group, &[]);
            pass.dispatch_workgroups(scatter_count.div_ceil(UPLOAD_WORKGROUP_SIZE), 1, 1);
        }
    }
}
