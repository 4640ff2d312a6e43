//! Device-resident world: heap arena, pointer tables and the load queue
//!
//! Every chunk index buffer and brick buffer is a block of one storage
//! buffer (the heap); pointer tables hold each block's byte offset. The
//! heap is reallocated and copied when the allocator runs out, which
//! bumps [`GpuWorldBuffers::heap_generation`] and rebuilds the world bind
//! group.

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::buffer::ray_buffer::storage_entry;
use crate::render::pipeline::brick_upload::{BrickUploadPipeline, UploadParams};
use crate::voxel::brick::BRICK_BYTES;
use crate::voxel::streaming::load_queue::{load_queue_bytes, LoadQueueHeader};
use crate::voxel::streaming::{
    Allocation, CopyRegion, HeapAllocator, IntegrateWork, LoadBatch, LoadRequests, ScatterEntry,
    StreamingBackend, SyncPoints, Timeline,
};
use crate::voxel::world::WorldDescriptor;

/// Heap size before the first growth
const INITIAL_HEAP_BYTES: u64 = 1 << 20;

/// World layout uniform (must match `WorldConfig` in the shaders)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WorldUniform {
    /// Chunk grid extent (12 bytes, offset 0)
    pub chunks: [u32; 3],
    /// Chunk edge in bricks (4 bytes, offset 12)
    pub chunk_size: u32,
    pub load_queue_capacity: u32,
    pub chunk_count: u32,
    pub _pad: [u32; 2],
}

impl WorldUniform {
    pub fn new(descriptor: &WorldDescriptor, load_queue_capacity: u32) -> Self {
        Self {
            chunks: descriptor.chunks.to_array(),
            chunk_size: descriptor.chunk_size,
            load_queue_capacity,
            chunk_count: descriptor.chunk_count() as u32,
            _pad: [0; 2],
        }
    }
}

/// wgpu implementation of [`StreamingBackend`]
pub struct GpuWorldBuffers {
    device: wgpu::Device,
    queue: wgpu::Queue,
    descriptor: WorldDescriptor,
    load_queue_capacity: u32,

    allocator: HeapAllocator,
    heap: wgpu::Buffer,
    heap_generation: u64,
    index_pointers: wgpu::Buffer,
    brick_pointers: wgpu::Buffer,
    world_uniform: wgpu::Buffer,
    load_queue: wgpu::Buffer,
    load_queue_readback: wgpu::Buffer,

    staged_entries: wgpu::Buffer,
    staged_bricks: wgpu::Buffer,
    copy_commands: wgpu::Buffer,
    upload_params: wgpu::Buffer,
    staged_count: u32,

    world_bind_group_layout: wgpu::BindGroupLayout,
    world_bind_group: wgpu::BindGroup,
    upload_bind_group: wgpu::BindGroup,
    upload_pipeline: BrickUploadPipeline,
}

fn create_heap(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("world_heap"),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

impl GpuWorldBuffers {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        descriptor: WorldDescriptor,
        load_queue_capacity: u32,
    ) -> Result<Self> {
        if load_queue_capacity == 0 {
            return Err(Error::Gpu("load queue capacity must be positive".into()));
        }
        let chunk_count = descriptor.chunk_count() as u64;

        let heap = create_heap(device, INITIAL_HEAP_BYTES);
        let pointer_table = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: chunk_count * 8,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let index_pointers = pointer_table("index_pointers");
        let brick_pointers = pointer_table("brick_pointers");

        let world_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("world_uniform"),
            size: std::mem::size_of::<WorldUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(
            &world_uniform,
            0,
            bytemuck::bytes_of(&WorldUniform::new(&descriptor, load_queue_capacity)),
        );

        let queue_bytes = load_queue_bytes(load_queue_capacity);
        let load_queue = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("load_queue"),
            size: queue_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let load_queue_readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("load_queue_readback"),
            size: queue_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let staging = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let capacity = load_queue_capacity as u64;
        let staged_entries = staging(
            "staged_entries",
            capacity * std::mem::size_of::<ScatterEntry>() as u64,
            wgpu::BufferUsages::STORAGE,
        );
        let staged_bricks = staging("staged_bricks", capacity * BRICK_BYTES as u64, wgpu::BufferUsages::STORAGE);
        let copy_commands = staging(
            "copy_commands",
            chunk_count * std::mem::size_of::<CopyRegion>() as u64,
            wgpu::BufferUsages::STORAGE,
        );
        let upload_params = staging(
            "upload_params",
            std::mem::size_of::<UploadParams>() as u64,
            wgpu::BufferUsages::UNIFORM,
        );

        let compute = wgpu::ShaderStages::COMPUTE;
        let world_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("world_bind_group_layout"),
            entries: &[
                storage_entry(0, compute, false),
                storage_entry(1, compute, true),
                storage_entry(2, compute, true),
                storage_entry(3, compute, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
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

        let upload_pipeline = BrickUploadPipeline::new(device, &world_bind_group_layout)?;
        let upload_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brick_upload_bind_group"),
            layout: upload_pipeline.upload_bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: staged_entries.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: staged_bricks.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: copy_commands.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: upload_params.as_entire_binding() },
            ],
        });

        let world_bind_group = Self::create_world_bind_group(
            device,
            &world_bind_group_layout,
            &heap,
            &index_pointers,
            &brick_pointers,
            &load_queue,
            &world_uniform,
        );

        log::info!(
            "World buffers: {} chunks, heap {} KB, load queue {} entries",
            chunk_count,
            INITIAL_HEAP_BYTES / 1024,
            load_queue_capacity
        );

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            descriptor,
            load_queue_capacity,
            allocator: HeapAllocator::new(INITIAL_HEAP_BYTES),
            heap,
            heap_generation: 0,
            index_pointers,
            brick_pointers,
            world_uniform,
            load_queue,
            load_queue_readback,
            staged_entries,
            staged_bricks,
            copy_commands,
            upload_params,
            staged_count: 0,
            world_bind_group_layout,
            world_bind_group,
            upload_bind_group,
            upload_pipeline,
        })
    }

    fn create_world_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        heap: &wgpu::Buffer,
        index_pointers: &wgpu::Buffer,
        brick_pointers: &wgpu::Buffer,
        load_queue: &wgpu::Buffer,
        world_uniform: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("world_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: heap.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: index_pointers.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: brick_pointers.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: load_queue.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: world_uniform.as_entire_binding() },
            ],
        })
    }

    /// Reallocate the heap at `capacity` bytes and copy the old contents over
    fn grow_heap(&mut self, capacity: u64) -> Result<()> {
        let limit = self.device.limits().max_storage_buffer_binding_size as u64;
        if capacity > limit {
            return Err(Error::Gpu(format!(
                "world heap needs {} MB, device binding limit is {} MB",
                capacity >> 20,
                limit >> 20
            )));
        }

        let old_capacity = self.allocator.capacity();
        let heap = create_heap(&self.device, capacity);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("heap_grow_encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.heap, 0, &heap, 0, old_capacity);
        self.queue.submit(std::iter::once(encoder.finish()));

        // The old buffer stays alive until the copy (and any frame still
        // reading it) retires.
        self.heap = heap;
        self.allocator.grow_to(capacity);
        self.heap_generation += 1;
        self.world_bind_group = Self::create_world_bind_group(
            &self.device,
            &self.world_bind_group_layout,
            &self.heap,
            &self.index_pointers,
            &self.brick_pointers,
            &self.load_queue,
            &self.world_uniform,
        );

        log::debug!(
            "World heap {} -> {} KB (generation {})",
            old_capacity / 1024,
            capacity / 1024,
            self.heap_generation
        );
        Ok(())
    }

    /// Copy the load queue into the readback buffer; recorded at the end
    /// of every traced frame
    pub fn record_load_queue_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(
            &self.load_queue,
            0,
            &self.load_queue_readback,
            0,
            load_queue_bytes(self.load_queue_capacity),
        );
    }

    pub fn world_bind_group(&self) -> &wgpu::BindGroup {
        &self.world_bind_group
    }

    pub fn world_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.world_bind_group_layout
    }

    /// Incremented every time the heap buffer is replaced
    pub fn heap_generation(&self) -> u64 {
        self.heap_generation
    }

    pub fn heap_capacity(&self) -> u64 {
        self.allocator.capacity()
    }

    pub fn descriptor(&self) -> &WorldDescriptor {
        &self.descriptor
    }

    fn poll(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait { submission_index: None, timeout: None });
    }

    /// Submit `encoder` and complete `timeline` at `value` once it retires
    fn submit_signalled(&self, encoder: wgpu::CommandEncoder, timeline: &Timeline, value: u64) {
        self.queue.submit(std::iter::once(encoder.finish()));
        timeline.mark_submitted(value);
        let timeline = timeline.clone();
        self.queue.on_submitted_work_done(move || timeline.complete(value));
    }
}

impl StreamingBackend for GpuWorldBuffers {
    fn world_descriptor(&self) -> &WorldDescriptor {
        &self.descriptor
    }

    fn allocate(&mut self, size: u64) -> Result<Allocation> {
        loop {
            if let Some(allocation) = self.allocator.allocate(size) {
                return Ok(allocation);
            }
            let capacity = self.allocator.grown_capacity(size);
            self.grow_heap(capacity)?;
        }
    }

    fn release(&mut self, allocation: Allocation) {
        self.allocator.free(allocation);
    }

    fn write_heap(&mut self, allocation: &Allocation, words: &[u32]) -> Result<()> {
        if words.len() as u64 * 4 > allocation.size {
            return Err(Error::Gpu(format!(
                "{} words do not fit a {} byte block",
                words.len(),
                allocation.size
            )));
        }
        self.queue.write_buffer(&self.heap, allocation.address, bytemuck::cast_slice(words));
        Ok(())
    }

    fn write_pointer_tables(&mut self, index_pointers: &[u64], brick_pointers: &[u64]) -> Result<()> {
        let chunk_count = self.descriptor.chunk_count();
        if index_pointers.len() != chunk_count || brick_pointers.len() != chunk_count {
            return Err(Error::Gpu(format!(
                "pointer tables hold {}/{} entries, world has {} chunks",
                index_pointers.len(),
                brick_pointers.len(),
                chunk_count
            )));
        }
        self.queue.write_buffer(&self.index_pointers, 0, bytemuck::cast_slice(index_pointers));
        self.queue.write_buffer(&self.brick_pointers, 0, bytemuck::cast_slice(brick_pointers));
        Ok(())
    }

    fn wait(&mut self, timeline: &Timeline, value: u64) -> Result<()> {
        timeline.wait_with(value, || self.poll())
    }

    fn read_load_queue(&mut self) -> Result<LoadRequests> {
        let slice = self.load_queue_readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.poll();

        rx.recv()
            .map_err(|e| Error::Gpu(format!("load queue readback dropped: {}", e)))?
            .map_err(|e| Error::Gpu(format!("load queue readback failed: {}", e)))?;

        let requests = {
            let data = slice.get_mapped_range();
            LoadRequests::parse(&data, self.load_queue_capacity)
        };
        self.load_queue_readback.unmap();
        requests
    }

    fn submit_load(&mut self, batch: &LoadBatch, load: &Timeline, value: u64) -> Result<()> {
        if batch.len() > self.load_queue_capacity as usize {
            return Err(Error::Streaming(format!(
                "{} staged bricks exceed the {} entry staging area",
                batch.len(),
                self.load_queue_capacity
            )));
        }
        if !batch.is_empty() {
            self.queue.write_buffer(&self.staged_entries, 0, bytemuck::cast_slice(&batch.entries));
            self.queue.write_buffer(&self.staged_bricks, 0, bytemuck::cast_slice(&batch.bricks));
        }
        self.staged_count = batch.len() as u32;

        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("brick_load_encoder"),
        });
        self.submit_signalled(encoder, load, value);
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
        if work.scatter_count > self.staged_count {
            return Err(Error::Streaming(format!(
                "integrate expects {} staged entries, {} were uploaded",
                work.scatter_count, self.staged_count
            )));
        }
        if work.copies.len() > self.descriptor.chunk_count() {
            return Err(Error::Streaming(format!(
                "{} growth copies exceed one per chunk",
                work.copies.len()
            )));
        }

        if let Some(pointers) = work.brick_pointers {
            self.queue.write_buffer(&self.brick_pointers, 0, bytemuck::cast_slice(pointers));
        }
        if !work.copies.is_empty() {
            self.queue.write_buffer(&self.copy_commands, 0, bytemuck::cast_slice(work.copies));
        }
        let params = UploadParams {
            scatter_count: work.scatter_count,
            copy_count: work.copies.len() as u32,
            _pad: [0; 2],
        };
        self.queue.write_buffer(&self.upload_params, 0, bytemuck::bytes_of(&params));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("brick_integrate_encoder"),
        });
        self.upload_pipeline.dispatch(
            &mut encoder,
            &self.world_bind_group,
            &self.upload_bind_group,
            work.copies,
            work.scatter_count,
        );
        encoder.clear_buffer(&self.load_queue, 0, Some(std::mem::size_of::<LoadQueueHeader>() as u64));
        self.submit_signalled(encoder, &sync.processed, processed_value);
        self.staged_count = 0;
        Ok(())
    }
}
