//! Per-frame constant block shared by every tracer pass and the display

use bytemuck::{Pod, Zeroable};
use crate::core::camera::Camera;

/// Render modes understood by the shade and display passes
pub mod render_mode {
    pub const PATH_TRACED: u32 = 0;
    pub const NORMALS: u32 = 1;
    pub const RESIDENCY: u32 = 2;
}

/// Frame constants for GPU (must match `FrameConstants` in the shaders)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    /// Frame counter, seeds the per-pixel RNG (4 bytes, offset 0)
    pub frame: u32,
    /// Render target width (4 bytes, offset 4)
    pub render_width: u32,
    /// Render target height (4 bytes, offset 8)
    pub render_height: u32,
    pub _pad0: u32,
    /// Unit view direction (16 bytes, offset 16)
    pub camera_direction: [f32; 4],
    /// Image-plane up, scaled by tan(fov/2) (16 bytes, offset 32)
    pub camera_up: [f32; 4],
    /// Image-plane right, scaled by tan(fov/2) * aspect (16 bytes, offset 48)
    pub camera_right: [f32; 4],
    /// Camera position (16 bytes, offset 64)
    pub camera_position: [f32; 4],
    /// Focus plane distance (4 bytes, offset 80)
    pub focal_distance: f32,
    /// Aperture radius (4 bytes, offset 84)
    pub lens_radius: f32,
    /// Non-zero enables depth of field (4 bytes, offset 88)
    pub enable_depth_of_field: u32,
    /// See [`render_mode`] (4 bytes, offset 92)
    pub render_mode: u32,
    /// Sun angles (8 bytes, offset 96)
    pub sun_position: [f32; 2],
    /// Final padding to 112 bytes (8 bytes, offset 104)
    pub _pad1: [f32; 2],
}

impl FrameConstants {
    /// Pack the camera and frame parameters
    pub fn new(camera: &Camera, frame: u32, width: u32, height: u32, render_mode: u32, sun_position: [f32; 2]) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let (right, up) = camera.basis(aspect);
        Self {
            frame,
            render_width: width,
            render_height: height,
            _pad0: 0,
            camera_direction: camera.direction.extend(0.0).to_array(),
            camera_up: up.extend(0.0).to_array(),
            camera_right: right.extend(0.0).to_array(),
            camera_position: camera.position.extend(1.0).to_array(),
            focal_distance: camera.focal_distance,
            lens_radius: camera.lens_radius,
            enable_depth_of_field: camera.enable_depth_of_field as u32,
            render_mode,
            sun_position,
            _pad1: [0.0; 2],
        }
    }

    /// True when the accumulated image no longer matches these constants
    pub fn view_changed(&self, other: &FrameConstants) -> bool {
        self.camera_direction != other.camera_direction
            || self.camera_position != other.camera_position
            || self.camera_up != other.camera_up
            || self.camera_right != other.camera_right
            || self.focal_distance != other.focal_distance
            || self.lens_radius != other.lens_radius
            || self.enable_depth_of_field != other.enable_depth_of_field
            || self.render_mode != other.render_mode
            || self.sun_position != other.sun_position
    }
}

/// Uniform buffer holding [`FrameConstants`]
pub struct FrameConstantsBuffer {
    buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl FrameConstantsBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_constants"),
            size: std::mem::size_of::<FrameConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_constants_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_constants_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            buffer,
            bind_group_layout,
            bind_group,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, constants: &FrameConstants) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(constants));
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}
