use log::info;

use crate::error::{SessionError, SessionResult};

/// Headless wgpu device and queue.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl GpuContext {
    pub async fn new() -> SessionResult<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| {
                SessionError::AdapterUnavailable(format!("Failed to find an appropriate adapter: {e}"))
            })?;

        let adapter_info = adapter.get_info();
        info!(
            "GPU adapter: {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("raytrace-capture device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| SessionError::AdapterUnavailable(format!("Failed to create device: {e}")))?;

        Ok(Self {
            device,
            queue,
            adapter_name: adapter_info.name,
        })
    }
}
