//! GPU context management using wgpu

use std::sync::Arc;
use winit::window::Window;
use crate::core::error::Error;

/// Storage buffers bound by the widest pass (world group + ray group)
const STORAGE_BUFFERS_PER_STAGE: u32 = 10;

/// GPU rendering context
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create new GPU context from window
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self, Error> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();
        if adapter_limits.max_storage_buffers_per_shader_stage < STORAGE_BUFFERS_PER_STAGE {
            return Err(Error::Gpu(format!(
                "adapter supports {} storage buffers per stage, need {}",
                adapter_limits.max_storage_buffers_per_shader_stage, STORAGE_BUFFERS_PER_STAGE
            )));
        }

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("brickmap_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits {
                max_storage_buffers_per_shader_stage: STORAGE_BUFFERS_PER_STAGE,
                max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                max_buffer_size: adapter_limits.max_buffer_size,
                ..Default::default()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: Default::default(),
        };

        let (device, queue) = adapter
            .request_device(&device_desc)
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        log::info!("GPU: {} ({:?}), max_storage_binding={}MB",
            adapter.get_info().name,
            adapter.get_info().backend,
            adapter_limits.max_storage_buffer_binding_size / 1024 / 1024);

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities.formats.first().copied()
            .ok_or_else(|| Error::Gpu("surface reports no formats".into()))?;
        let alpha_mode = capabilities.alpha_modes.first().copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            config,
        })
    }

    /// Get current surface texture for rendering
    pub fn get_current_texture(&self) -> Result<wgpu::SurfaceTexture, Error> {
        self.surface
            .get_current_texture()
            .map_err(|e| Error::Gpu(e.to_string()))
    }

    /// Get surface size
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Get surface format
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Block until all submitted work has finished
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait { submission_index: None, timeout: None });
    }
}

/// Run `create` inside a validation error scope. A WGSL error or a
/// pipeline/layout mismatch comes back as [`Error::Shader`] instead of
/// reaching the uncaptured-error handler.
pub fn with_validation<T>(device: &wgpu::Device, label: &str, create: impl FnOnce() -> T) -> Result<T, Error> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(scope.pop()) {
        Some(err) => Err(Error::Shader(format!("{}: {}", label, err))),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> Option<wgpu::Device> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok()?;
        let (device, _queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("test_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: Default::default(),
            trace: Default::default(),
        }))
        .ok()?;
        Some(device)
    }

    fn compute_pipeline(device: &wgpu::Device, source: &str, entry_point: &str) -> wgpu::ComputePipeline {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("test_shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("test_pipeline"),
            layout: None,
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        })
    }

    const NOOP: &str = "@compute @workgroup_size(1) fn main() {}";

    #[test]
    fn test_pipeline_errors_become_shader_errors() {
        let Some(device) = test_device() else {
            eprintln!("no GPU adapter, skipping");
            return;
        };

        assert!(with_validation(&device, "noop", || compute_pipeline(&device, NOOP, "main")).is_ok());

        let missing_entry = with_validation(&device, "wavefront", || compute_pipeline(&device, NOOP, "extend"));
        assert!(matches!(missing_entry, Err(Error::Shader(msg)) if msg.starts_with("wavefront:")));

        let bad_wgsl = with_validation(&device, "broken", || compute_pipeline(&device, "fn (", "main"));
        assert!(matches!(bad_wgsl, Err(Error::Shader(_))));
    }
}
