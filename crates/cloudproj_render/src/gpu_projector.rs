//! Compute pipelines for the standard projection path on the GPU
//!
//! Each frame runs four passes (see `shaders/project.wgsl`): reset, depth,
//! index and color. Every chunk gets its own point buffer and uniform
//! block; the pixel buffers are shared. Results are copied to a staging
//! buffer and read back into a [`Frame`].

use std::sync::mpsc;

use cloudproj_compute::{ChunkOrder, Frame, PointCloudEngine};
use cloudproj_math::Mat4;
use wgpu::util::DeviceExt;

use crate::types::{workgroup_grid, GpuPoint, ProjectParams};
use crate::{GpuContext, GpuError};

/// One uploaded chunk
struct GpuChunk {
    points_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    point_count: u32,
    base: u32,
}

/// Per-pixel buffers for one output size
struct FrameTarget {
    width: u32,
    height: u32,
    depth_buffer: wgpu::Buffer,
    winner_buffer: wgpu::Buffer,
    color_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
}

impl FrameTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = width as u64 * height as u64 * 4;
        let storage = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        Self {
            width,
            height,
            depth_buffer: storage("Projection Depth Buffer"),
            winner_buffer: storage("Projection Winner Buffer"),
            color_buffer: storage("Projection Color Buffer"),
            staging_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Projection Staging Buffer"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        }
    }

    fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    fn byte_size(&self) -> u64 {
        self.pixel_count() as u64 * 4
    }
}

/// wgpu implementation of the standard projection path
pub struct GpuProjector {
    reset_pipeline: wgpu::ComputePipeline,
    depth_pipeline: wgpu::ComputePipeline,
    index_pipeline: wgpu::ComputePipeline,
    color_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    /// Empty point buffer bound by the reset pass
    placeholder_points: wgpu::Buffer,
    chunks: Vec<GpuChunk>,
    target: Option<FrameTarget>,
    width: u32,
    height: u32,
    background: [u8; 3],
    chunk_order: ChunkOrder,
}

impl GpuProjector {
    /// Create the pipelines
    pub fn new(device: &wgpu::Device) -> Self {
        let storage_entry = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Projection Bind Group Layout"),
            entries: &[
                // Points of one chunk
                storage_entry(0, true),
                // Per-pixel depth bits
                storage_entry(1, false),
                // Per-pixel winning slot
                storage_entry(2, false),
                // Per-pixel RGBA8 output
                storage_entry(3, false),
                // Projection parameters uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Projection Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Projection Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/project.wgsl").into()),
        });

        let pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        let placeholder_points = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Placeholder Point Buffer"),
            contents: bytemuck::bytes_of(&GpuPoint::default()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        Self {
            reset_pipeline: pipeline("reset_pass"),
            depth_pipeline: pipeline("depth_pass"),
            index_pipeline: pipeline("index_pass"),
            color_pipeline: pipeline("color_pass"),
            bind_group_layout,
            placeholder_points,
            chunks: Vec::new(),
            target: None,
            width: 0,
            height: 0,
            background: [0; 3],
            chunk_order: ChunkOrder::Ascending,
        }
    }

    /// Upload the engine's chunks.
    ///
    /// Gating (class range and masks) and colors are resolved here, so the
    /// upload must be repeated after the engine's masks or configuration
    /// change.
    pub fn upload(&mut self, device: &wgpu::Device, engine: &PointCloudEngine) {
        let params = engine.projection_params(&cloudproj_math::mat4::IDENTITY);
        let colors = engine.color_context();

        self.chunks.clear();
        let mut base = 0u32;
        for binding in engine.bindings() {
            let points: Vec<GpuPoint> = binding
                .chunk
                .records
                .iter()
                .enumerate()
                .filter(|(i, _)| binding.passes(*i, &params))
                .map(|(_, record)| GpuPoint::new(record.position, colors.color(params.color_source, record)))
                .collect();
            if points.is_empty() {
                continue;
            }

            let point_count = points.len() as u32;
            let points_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Chunk Point Buffer"),
                contents: bytemuck::cast_slice(&points),
                usage: wgpu::BufferUsages::STORAGE,
            });
            let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Chunk Params Buffer"),
                size: std::mem::size_of::<ProjectParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.chunks.push(GpuChunk {
                points_buffer,
                params_buffer,
                point_count,
                base,
            });
            base += point_count;
        }

        let config = engine.config();
        self.width = config.width;
        self.height = config.height;
        self.background = engine.compositor().background;
        self.chunk_order = config.chunk_order;
        log::info!("Uploaded {} points in {} GPU chunks", base, self.chunks.len());
    }

    /// Number of points on the GPU after gating
    pub fn point_count(&self) -> u32 {
        self.chunks.iter().map(|c| c.point_count).sum()
    }

    fn bind_group(&self, device: &wgpu::Device, target: &FrameTarget, points: &wgpu::Buffer, params: &wgpu::Buffer) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Projection Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: points.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: target.depth_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: target.winner_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: target.color_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }

    /// Project every uploaded chunk with `view_proj` and read the frame back
    pub fn render(&mut self, context: &GpuContext, view_proj: &Mat4) -> Result<Frame, GpuError> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::Readback("nothing uploaded".into()));
        }
        if self.chunks.is_empty() {
            return Ok(Frame::filled(self.width, self.height, self.background));
        }

        let device = &context.device;
        let queue = &context.queue;

        let stale = self
            .target
            .as_ref()
            .map_or(true, |t| t.width != self.width || t.height != self.height);
        if stale {
            self.target = Some(FrameTarget::new(device, self.width, self.height));
        }
        let Some(target) = self.target.as_ref() else {
            return Err(GpuError::Readback("no frame target".into()));
        };

        let frame_params = ProjectParams::new(*view_proj, self.width, self.height, self.background);
        for chunk in &self.chunks {
            let params = frame_params.for_chunk(chunk.base, chunk.point_count);
            queue.write_buffer(&chunk.params_buffer, 0, bytemuck::bytes_of(&params));
        }

        let mut order: Vec<&GpuChunk> = self.chunks.iter().collect();
        if self.chunk_order == ChunkOrder::Descending {
            order.reverse();
        }
        let bind_groups: Vec<(wgpu::BindGroup, u32)> = order
            .iter()
            .map(|c| (self.bind_group(device, target, &c.points_buffer, &c.params_buffer), c.point_count))
            .collect();
        // Only width, height and background are read by the reset pass
        let reset_group = self.bind_group(device, target, &self.placeholder_points, &order[0].params_buffer);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Projection Encoder"),
        });

        run_pass(&mut encoder, "Reset Pass", &self.reset_pipeline, [(&reset_group, target.pixel_count())]);
        let per_chunk = || bind_groups.iter().map(|(group, count)| (group, *count));
        run_pass(&mut encoder, "Depth Pass", &self.depth_pipeline, per_chunk());
        run_pass(&mut encoder, "Index Pass", &self.index_pipeline, per_chunk());
        run_pass(&mut encoder, "Color Pass", &self.color_pipeline, per_chunk());

        encoder.copy_buffer_to_buffer(&target.color_buffer, 0, &target.staging_buffer, 0, target.byte_size());
        queue.submit(std::iter::once(encoder.finish()));

        let pixels = read_buffer(device, &target.staging_buffer)?;
        Frame::from_rgba(self.width, self.height, pixels).map_err(|e| GpuError::Readback(e.to_string()))
    }
}

/// Encode one compute pass dispatching `pipeline` once per bind group
fn run_pass<'a, I>(encoder: &mut wgpu::CommandEncoder, label: &str, pipeline: &wgpu::ComputePipeline, dispatches: I)
where
    I: IntoIterator<Item = (&'a wgpu::BindGroup, u32)>,
{
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    for (group, threads) in dispatches {
        let (x, y) = workgroup_grid(threads);
        if x == 0 {
            continue;
        }
        pass.set_bind_group(0, group, &[]);
        pass.dispatch_workgroups(x, y, 1);
    }
}

/// Result of a `map_async` callback once the device has been polled.
///
/// The poll waits for every submission, so an empty channel means the
/// callback never ran.
fn receive_mapping(
    receiver: &mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
) -> Result<(), GpuError> {
    match receiver.try_recv() {
        Ok(result) => result.map_err(|e| GpuError::Readback(e.to_string())),
        Err(mpsc::TryRecvError::Empty) => {
            Err(GpuError::Readback("buffer mapping did not complete".into()))
        }
        Err(mpsc::TryRecvError::Disconnected) => {
            Err(GpuError::Readback("map callback dropped".into()))
        }
    }
}

/// Map a staging buffer and copy its contents out
fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>, GpuError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        if sender.send(result).is_err() {
            log::warn!("Readback receiver dropped before the buffer was mapped");
        }
    });
    if !device.poll(wgpu::Maintain::Wait).is_queue_empty() {
        log::debug!("Submissions still pending after the readback poll");
    }

    receive_mapping(&receiver)?;

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_mapping_success() {
        let (sender, receiver) = mpsc::channel();
        sender.send(Ok(())).unwrap();
        assert!(receive_mapping(&receiver).is_ok());
    }

    #[test]
    fn test_receive_mapping_never_called() {
        let (_sender, receiver) = mpsc::channel();
        let err = receive_mapping(&receiver).unwrap_err();
        assert_eq!(err.to_string(), "GPU readback failed: buffer mapping did not complete");
    }

    #[test]
    fn test_receive_mapping_callback_dropped() {
        let (sender, receiver) = mpsc::channel::<Result<(), wgpu::BufferAsyncError>>();
        drop(sender);
        let err = receive_mapping(&receiver).unwrap_err();
        assert!(matches!(err, GpuError::Readback(_)));
        assert_eq!(err.to_string(), "GPU readback failed: map callback dropped");
    }
}
