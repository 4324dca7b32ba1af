use std::sync::mpsc;

use log::{debug, info};

use crate::camera::CameraUniform;
use crate::error::{SessionError, SessionResult};
use crate::renderer::backend::{BindingSlot, RaytraceBackend, CAMERA_BINDING};
use crate::renderer::{GpuContext, PixelBuffer};

const TRANSFORM_WGSL: &str = include_str!("shaders/transform.wgsl");
const RAYTRACE_WGSL: &str = include_str!("shaders/raytrace.wgsl");

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Offscreen color target plus the staging buffer it is read back through.
struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    staging: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Output Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // copy rows must be 256-byte aligned
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = (4 * width).div_ceil(align) * align;

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            staging,
            width,
            height,
            padded_bytes_per_row,
        }
    }
}

/// wgpu implementation of the two-pass backend
pub struct GpuBackend {
    context: GpuContext,
    transform_pipeline: wgpu::ComputePipeline,
    raytrace_pipeline: wgpu::RenderPipeline,
    transform_bind_group: wgpu::BindGroup,
    raytrace_bind_group: wgpu::BindGroup,
    transformed: wgpu::Buffer,
    meshes: wgpu::Buffer,
    transforms: wgpu::Buffer,
    lights: wgpu::Buffer,
    camera: wgpu::Buffer,
    target: RenderTarget,
    encoder: Option<wgpu::CommandEncoder>,
    last_submission: Option<wgpu::SubmissionIndex>,
}

fn layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    ty: wgpu::BufferBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_slot_buffer(
    device: &wgpu::Device,
    label: &str,
    size: usize,
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage: usage | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Turn a popped error scope into the given session error.
fn scope_error(
    popped: Option<wgpu::Error>,
    wrap: fn(String) -> SessionError,
) -> SessionResult<()> {
    match popped {
        Some(err) => Err(wrap(err.to_string())),
        None => Ok(()),
    }
}

impl GpuBackend {
    /// Create a new GPU backend rendering at `width` x `height`
    pub async fn new(width: u32, height: u32) -> SessionResult<Self> {
        let context = GpuContext::new().await?;
        let device = &context.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let transform_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("transform_shader"),
            source: wgpu::ShaderSource::Wgsl(TRANSFORM_WGSL.into()),
        });
        let raytrace_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("raytrace_shader"),
            source: wgpu::ShaderSource::Wgsl(RAYTRACE_WGSL.into()),
        });

        let storage = wgpu::BufferUsages::STORAGE;
        let uniform = wgpu::BufferUsages::UNIFORM;
        let transformed = create_slot_buffer(
            device,
            BindingSlot::Transformed.label(),
            BindingSlot::Transformed.size(),
            storage,
        );
        let meshes = create_slot_buffer(
            device,
            BindingSlot::Meshes.label(),
            BindingSlot::Meshes.size(),
            storage,
        );
        let transforms = create_slot_buffer(
            device,
            BindingSlot::Transforms.label(),
            BindingSlot::Transforms.size(),
            uniform,
        );
        let lights = create_slot_buffer(
            device,
            BindingSlot::Lights.label(),
            BindingSlot::Lights.size(),
            uniform,
        );
        let camera = create_slot_buffer(
            device,
            "camera",
            std::mem::size_of::<CameraUniform>(),
            uniform,
        );

        // @group(0): bindings 0 (rw), 1, 2 for the transform pass
        let compute = wgpu::ShaderStages::COMPUTE;
        let transform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("transform_bind_group_layout"),
            entries: &[
                layout_entry(
                    BindingSlot::Transformed.index(),
                    compute,
                    wgpu::BufferBindingType::Storage { read_only: false },
                ),
                layout_entry(
                    BindingSlot::Meshes.index(),
                    compute,
                    wgpu::BufferBindingType::Storage { read_only: true },
                ),
                layout_entry(
                    BindingSlot::Transforms.index(),
                    compute,
                    wgpu::BufferBindingType::Uniform,
                ),
            ],
        });

        // @group(0): bindings 0, 3, 4 for the raytrace pass
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let raytrace_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raytrace_bind_group_layout"),
            entries: &[
                layout_entry(
                    BindingSlot::Transformed.index(),
                    fragment,
                    wgpu::BufferBindingType::Storage { read_only: true },
                ),
                layout_entry(
                    BindingSlot::Lights.index(),
                    fragment,
                    wgpu::BufferBindingType::Uniform,
                ),
                layout_entry(CAMERA_BINDING, fragment, wgpu::BufferBindingType::Uniform),
            ],
        });

        let transform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("transform_bind_group"),
            layout: &transform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Transformed.index(),
                    resource: transformed.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Meshes.index(),
                    resource: meshes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Transforms.index(),
                    resource: transforms.as_entire_binding(),
                },
            ],
        });

        let raytrace_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("raytrace_bind_group"),
            layout: &raytrace_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Transformed.index(),
                    resource: transformed.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BindingSlot::Lights.index(),
                    resource: lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: CAMERA_BINDING,
                    resource: camera.as_entire_binding(),
                },
            ],
        });

        let transform_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("transform_pipeline_layout"),
                bind_group_layouts: &[&transform_layout],
                push_constant_ranges: &[],
            });

        let transform_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("transform_pipeline"),
            layout: Some(&transform_pipeline_layout),
            module: &transform_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let raytrace_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("raytrace_pipeline_layout"),
                bind_group_layouts: &[&raytrace_layout],
                push_constant_ranges: &[],
            });

        let raytrace_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("raytrace_pipeline"),
            layout: Some(&raytrace_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &raytrace_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &raytrace_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        scope_error(device.pop_error_scope().await, SessionError::BackendSetup)?;

        let target = RenderTarget::new(device, width, height);
        info!("✨ GPU backend ready at {}x{}", width, height);

        Ok(Self {
            context,
            transform_pipeline,
            raytrace_pipeline,
            transform_bind_group,
            raytrace_bind_group,
            transformed,
            meshes,
            transforms,
            lights,
            camera,
            target,
            encoder: None,
            last_submission: None,
        })
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        }
    }

    /// Name of the adapter in use
    pub fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }
}

impl RaytraceBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn write_buffer(&mut self, slot: BindingSlot, bytes: &[u8]) -> SessionResult<()> {
        let buffer = match slot {
            BindingSlot::Transformed => &self.transformed,
            BindingSlot::Meshes => &self.meshes,
            BindingSlot::Transforms => &self.transforms,
            BindingSlot::Lights => &self.lights,
        };
        self.context.queue.write_buffer(buffer, 0, bytes);
        Ok(())
    }

    fn set_camera(&mut self, camera: &CameraUniform) -> SessionResult<()> {
        self.context
            .queue
            .write_buffer(&self.camera, 0, bytemuck::bytes_of(camera));
        Ok(())
    }

    fn dispatch_transform(&mut self, workgroups: u32) -> SessionResult<()> {
        // Recorded into the frame encoder; submitted together with the draw pass
        let mut encoder = self.take_encoder();
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Transform Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.transform_pipeline);
            pass.set_bind_group(0, &self.transform_bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.encoder = Some(encoder);
        Ok(())
    }

    fn draw(&mut self) -> SessionResult<()> {
        // recording errors from the transform pass surface at finish(), inside this scope
        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.take_encoder();

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Raytrace Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.raytrace_pipeline);
            render_pass.set_bind_group(0, &self.raytrace_bind_group, &[]);
            render_pass.draw(0..4, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.target.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.target.padded_bytes_per_row),
                    rows_per_image: Some(self.target.height),
                },
            },
            wgpu::Extent3d {
                width: self.target.width,
                height: self.target.height,
                depth_or_array_layers: 1,
            },
        );

        let index = self.context.queue.submit(std::iter::once(encoder.finish()));
        scope_error(
            pollster::block_on(self.context.device.pop_error_scope()),
            SessionError::Backend,
        )?;
        self.last_submission = Some(index);
        Ok(())
    }

    fn read_pixels(&mut self, target: &mut PixelBuffer) -> SessionResult<()> {
        if target.dimensions() != (self.target.width, self.target.height) {
            return Err(SessionError::Backend(format!(
                "readback target is {:?}, framebuffer is {}x{}",
                target.dimensions(),
                self.target.width,
                self.target.height
            )));
        }
        let index = self
            .last_submission
            .take()
            .ok_or_else(|| SessionError::Backend("readback before draw".into()))?;

        let buffer_slice = self.target.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.context
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| SessionError::Backend(format!("device poll failed: {e}")))?;

        rx.recv()
            .map_err(|_| SessionError::Backend("readback callback dropped".into()))?
            .map_err(|e| SessionError::Backend(format!("buffer map failed: {e}")))?;

        {
            let data = buffer_slice.get_mapped_range();
            target.copy_from_rgba_rows(&data, self.target.padded_bytes_per_row as usize);
        }
        self.target.staging.unmap();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> SessionResult<()> {
        debug!("resizing GPU target to {}x{}", width, height);
        self.target = RenderTarget::new(&self.context.device, width, height);
        self.last_submission = None;
        Ok(())
    }

    fn release(&mut self) {
        self.encoder = None;
        self.last_submission = None;
        self.transformed.destroy();
        self.meshes.destroy();
        self.transforms.destroy();
        self.lights.destroy();
        self.camera.destroy();
        self.target.texture.destroy();
        self.target.staging.destroy();
        debug!("GPU backend released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_error(text: &str) -> wgpu::Error {
        wgpu::Error::Validation {
            source: Box::new(std::io::Error::other(text.to_string())),
            description: text.to_string(),
        }
    }

    #[test]
    fn test_setup_scope_error_is_fatal_setup() {
        let err = scope_error(Some(validation_error("bad wgsl")), SessionError::BackendSetup)
            .unwrap_err();
        assert!(matches!(&err, SessionError::BackendSetup(text) if text.contains("bad wgsl")));
        assert!(!err.is_adapter_unavailable());
    }

    #[test]
    fn test_frame_scope_error_is_backend_failure() {
        let err = scope_error(Some(validation_error("lost binding")), SessionError::Backend)
            .unwrap_err();
        assert!(matches!(&err, SessionError::Backend(text) if text.contains("lost binding")));
        scope_error(None, SessionError::Backend).unwrap();
    }
}
