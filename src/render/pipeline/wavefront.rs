//! Wavefront path tracer
//!
//! Five compute passes per frame over ping-ponged ray queues:
//! primary rays, global state, extend, shade, connect. The accumulated
//! image is then composited by [`DisplayPipeline`]. Frames are ordered
//! against the world tick through the `processed` and `halt` timelines.

use crate::core::camera::Camera;
use crate::core::types::Result;
use crate::render::buffer::frame_constants::{FrameConstants, FrameConstantsBuffer};
use crate::render::buffer::ray_buffer::{workgroup_count, RayBuffers};
use crate::render::buffer::world_buffer::GpuWorldBuffers;
use crate::render::context::{with_validation, GpuContext};
use crate::render::pipeline::display::DisplayPipeline;
use crate::voxel::streaming::StreamingManager;

/// Ray queue slots for a configured value (0 = one per pixel), never more
/// than one per pixel
pub fn ray_queue_capacity(configured: u32, width: u32, height: u32) -> u32 {
    let pixels = width * height;
    if configured == 0 { pixels } else { configured.min(pixels) }
}

/// The five wavefront stages plus compositing
pub struct WavefrontTracer {
    primary_rays: wgpu::ComputePipeline,
    update_global_state: wgpu::ComputePipeline,
    extend: wgpu::ComputePipeline,
    shade: wgpu::ComputePipeline,
    connect: wgpu::ComputePipeline,
    rays: RayBuffers,
    constants: FrameConstantsBuffer,
    display: DisplayPipeline,
    display_bind_group: wgpu::BindGroup,
    /// Which ray buffer is the front this frame
    primary_rays_index: usize,
    frame: u32,
    last_constants: Option<FrameConstants>,
    needs_reset: bool,
    width: u32,
    height: u32,
}

impl WavefrontTracer {
    pub fn new(ctx: &GpuContext, world: &GpuWorldBuffers, configured_capacity: u32) -> Result<Self> {
        let device = &ctx.device;
        let (width, height) = ctx.size();
        let capacity = ray_queue_capacity(configured_capacity, width, height);

        let rays = RayBuffers::new(device, capacity, width, height);
        let constants = FrameConstantsBuffer::new(device);

        // WGSL errors, a missing entry point or a layout mismatch fail startup here
        let (primary_rays, update_global_state, extend, shade, connect) =
            with_validation(device, "wavefront pipelines", || {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("wavefront_shader"),
                    source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/wavefront.wgsl").into()),
                });

                let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("wavefront_pipeline_layout"),
                    bind_group_layouts: &[
                        world.world_bind_group_layout(),
                        rays.bind_group_layout(),
                        constants.bind_group_layout(),
                    ],
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

                (
                    make_pipeline("primary_rays"),
                    make_pipeline("update_global_state"),
                    make_pipeline("extend"),
                    make_pipeline("shade"),
                    make_pipeline("connect"),
                )
            })?;

        let display = DisplayPipeline::new(device, ctx.format(), constants.bind_group_layout())?;
        let display_bind_group = display.create_bind_group(device, rays.blit());

        Ok(Self {
            primary_rays,
            update_global_state,
            extend,
            shade,
            connect,
            rays,
            constants,
            display,
            display_bind_group,
            primary_rays_index: 0,
            frame: 0,
            last_constants: None,
            needs_reset: true,
            width,
            height,
        })
    }

    /// Pack this frame's constants; a changed view restarts accumulation
    pub fn update(&mut self, queue: &wgpu::Queue, camera: &Camera, render_mode: u32, sun_position: [f32; 2]) {
        let constants = FrameConstants::new(camera, self.frame, self.width, self.height, render_mode, sun_position);
        if self.last_constants.is_none_or(|last| last.view_changed(&constants)) {
            self.needs_reset = true;
        }
        self.constants.update(queue, &constants);
        self.last_constants = Some(constants);
    }

    /// Drop accumulated samples before the next frame
    pub fn invalidate(&mut self) {
        self.needs_reset = true;
    }

    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        world_bind_group: &wgpu::BindGroup,
        workgroups: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, world_bind_group, &[]);
        pass.set_bind_group(1, self.rays.bind_group(self.primary_rays_index), &[]);
        pass.set_bind_group(2, self.constants.bind_group(), &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }

    /// Trace one frame into the accumulation buffer and composite it into
    /// `target`. The submission is ordered after the world's last
    /// `processed` signal and signals `halt` for the next tick.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        world: &StreamingManager<GpuWorldBuffers>,
        target: &wgpu::TextureView,
    ) -> Result<()> {
        let sync = world.sync();
        sync.processed.gpu_wait(world.processed_value())?;
        let backend = world.backend();
        let world_bind_group = backend.world_bind_group();

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("wavefront_encoder"),
        });
        if self.needs_reset {
            self.rays.reset(&ctx.queue, &mut encoder);
            self.needs_reset = false;
        }

        let groups = workgroup_count(self.rays.capacity());
        self.dispatch(&mut encoder, "primary_rays_pass", &self.primary_rays, world_bind_group, groups);
        self.dispatch(&mut encoder, "global_state_pass", &self.update_global_state, world_bind_group, 1);
        self.dispatch(&mut encoder, "extend_pass", &self.extend, world_bind_group, groups);
        self.dispatch(&mut encoder, "shade_pass", &self.shade, world_bind_group, groups);
        self.dispatch(&mut encoder, "connect_pass", &self.connect, world_bind_group, groups);

        backend.record_load_queue_readback(&mut encoder);
        self.display.render(&mut encoder, target, &self.display_bind_group, self.constants.bind_group());

        ctx.queue.submit(std::iter::once(encoder.finish()));
        let halt_value = world.halt_target();
        sync.halt.mark_submitted(halt_value);
        let halt = sync.halt.clone();
        ctx.queue.on_submitted_work_done(move || halt.complete(halt_value));

        self.primary_rays_index ^= 1;
        self.frame = self.frame.wrapping_add(1);
        Ok(())
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Front ray buffer index for the next frame
    pub fn primary_rays_index(&self) -> usize {
        self.primary_rays_index
    }

    /// Bytes held by the ray queues
    pub fn ray_bytes(&self) -> u64 {
        self.rays.ray_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_queue_capacity() {
        assert_eq!(ray_queue_capacity(0, 64, 32), 2048);
        assert_eq!(ray_queue_capacity(1000, 64, 32), 1000);
        assert_eq!(ray_queue_capacity(1 << 20, 64, 32), 2048);
    }
}
