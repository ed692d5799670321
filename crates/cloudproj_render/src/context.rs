//! Headless wgpu device

use cloudproj_core::POINT_RECORD_SIZE;

use crate::GpuError;

/// Device and queue used by the compute kernels
///
/// No surface is created: frames are read back into CPU memory.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl GpuContext {
    /// Create a context, blocking on the async adapter and device requests
    pub fn headless() -> Result<Self, GpuError> {
        pollster::block_on(Self::request())
    }

    /// Create a context on any available backend
    pub async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        log::info!("Using GPU adapter: {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Projection Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
            limits,
        })
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Point records that fit in the largest storage binding
    pub fn chunk_capacity(&self) -> usize {
        capacity_for_binding(self.limits.max_storage_buffer_binding_size)
    }
}

/// Point records that fit in a storage binding of `bytes` bytes
pub fn capacity_for_binding(bytes: u32) -> usize {
    bytes as usize / POINT_RECORD_SIZE
}
