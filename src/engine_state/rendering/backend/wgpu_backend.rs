//! A [`GpuBackend`] on a real wgpu device.
//!
//! Renders into an offscreen color target with a depth buffer, so no window or
//! surface is needed. All shared buffers are bound once through a single bind
//! group that is rebuilt only when one of the bound buffers is replaced.

use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc;

use image::imageops::{self, FilterType};
use log::{debug, info, warn};
use wgpu::{BindGroup, BindGroupLayout, Device, Features, Queue, RenderPipeline};

use crate::engine_state::error::GpuError;

use super::{
    walk_commands, BufferDescriptor, BufferHandle, DrawStats, GpuBackend, IndirectDraw,
    ShaderHandle, TextureHandle, DRAW_COMMAND_SIZE,
};

/// Edge length of every block texture layer.
const TEXTURE_DIMENSION: u32 = 16;
/// Layers in the block texture array.
const TEXTURE_LAYERS: u32 = 64;
/// Offscreen color format.
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
/// The texture format used for depth buffers.
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct DeviceBuffer {
    label: String,
    buffer: wgpu::Buffer,
    /// Host copy of indirect buffers, used to report what a draw covered.
    shadow: Option<Vec<u8>>,
}

/// Device, queue and render targets of the offscreen renderer.
pub struct WgpuBackend {
    device: Device,
    queue: Queue,
    multi_draw: bool,
    buffers: HashMap<u64, DeviceBuffer>,
    next_buffer: u64,
    pipelines: Vec<RenderPipeline>,
    bind_group_layout: BindGroupLayout,
    bind_group: Option<([u64; 3], BindGroup)>,
    texture_array: wgpu::Texture,
    texture_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    next_layer: u32,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl WgpuBackend {
    /// Opens the default adapter and creates render targets of the given size.
    ///
    /// # Errors
    /// [`GpuError::DeviceUnavailable`] when no adapter or device can be created.
    pub fn new(width: u32, height: u32) -> Result<Self, GpuError> {
        pollster::block_on(Self::create(width, height))
    }

    async fn create(width: u32, height: u32) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::empty(),
            backend_options: wgpu::BackendOptions::from_env_or_default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuError::DeviceUnavailable(e.to_string()))?;

        let wanted = Features::MULTI_DRAW_INDIRECT | Features::INDIRECT_FIRST_INSTANCE;
        let required_features = adapter.features() & wanted;
        let multi_draw = required_features.contains(Features::MULTI_DRAW_INDIRECT);
        if !required_features.contains(Features::INDIRECT_FIRST_INSTANCE) {
            warn!("adapter lacks INDIRECT_FIRST_INSTANCE; face group lookups may be wrong");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features,
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| GpuError::DeviceUnavailable(e.to_string()))?;

        info!(
            "using adapter '{}' (multi-draw-indirect: {})",
            adapter.get_info().name,
            multi_draw
        );

        let texture_array = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("block_textures"),
            size: wgpu::Extent3d {
                width: TEXTURE_DIMENSION,
                height: TEXTURE_DIMENSION,
                depth_or_array_layers: TEXTURE_LAYERS,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texture_view = texture_array.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = Self::create_bind_group_layout(&device);
        let color_view = Self::create_target(&device, width, height, COLOR_FORMAT, "color_target");
        let depth_view = Self::create_target(&device, width, height, DEPTH_FORMAT, "depth_target");

        Ok(Self {
            device,
            queue,
            multi_draw,
            buffers: HashMap::new(),
            next_buffer: 0,
            pipelines: Vec::new(),
            bind_group_layout,
            bind_group: None,
            texture_array,
            texture_view,
            sampler,
            next_layer: 0,
            color_view,
            depth_view,
        })
    }

    fn create_target(
        device: &Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn create_bind_group_layout(device: &Device) -> BindGroupLayout {
        let storage = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1),
                storage(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&DeviceBuffer, GpuError> {
        self.buffers
            .get(&handle.0)
            .ok_or_else(|| GpuError::UnknownBuffer(format!("#{}", handle.0)))
    }

    fn check_range(buffer: &DeviceBuffer, offset: u64, len: u64) -> Result<(), GpuError> {
        let size = buffer.buffer.size();
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(GpuError::WriteOutOfBounds {
                label: buffer.label.clone(),
                offset,
                len,
                size,
            });
        }
        Ok(())
    }

    /// Makes sure the cached bind group refers to the draw's buffers.
    fn prepare_bind_group(&mut self, draw: &IndirectDraw) -> Result<(), GpuError> {
        let key = [draw.camera.0, draw.faces.0, draw.groups.0];
        if matches!(&self.bind_group, Some((cached, _)) if *cached == key) {
            return Ok(());
        }

        let camera = &self.buffer(draw.camera)?.buffer;
        let faces = &self.buffer(draw.faces)?.buffer;
        let groups = &self.buffer(draw.groups)?.buffer;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: faces.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: groups.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        debug!("rebuilt quad bind group for buffers {:?}", key);
        self.bind_group = Some((key, bind_group));
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(descriptor.label),
            size: descriptor.size,
            usage: descriptor.usage,
            mapped_at_creation: false,
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            buffer.destroy();
            return Err(GpuError::OutOfMemory {
                label: descriptor.label.to_string(),
                requested: descriptor.size,
            });
        }

        let shadow = descriptor
            .usage
            .contains(wgpu::BufferUsages::INDIRECT)
            .then(|| vec![0; descriptor.size as usize]);
        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            handle.0,
            DeviceBuffer {
                label: descriptor.label.to_string(),
                buffer,
                shadow,
            },
        );
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let target = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| GpuError::UnknownBuffer(format!("#{}", buffer.0)))?;
        Self::check_range(target, offset, data.len() as u64)?;
        self.queue.write_buffer(&target.buffer, offset, data);
        if let Some(shadow) = target.shadow.as_mut() {
            let start = offset as usize;
            shadow[start..start + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), GpuError> {
        let from = self.buffer(source)?;
        Self::check_range(from, source_offset, size)?;
        let to = self.buffer(destination)?;
        Self::check_range(to, destination_offset, size)?;

        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(
            &from.buffer,
            source_offset,
            &to.buffer,
            destination_offset,
            size,
        );
        self.queue.submit([encoder.finish()]);

        let copied = from.shadow.as_ref().map(|shadow| {
            let start = source_offset as usize;
            shadow[start..start + size as usize].to_vec()
        });
        if let (Some(bytes), Some(target)) = (
            copied,
            self.buffers
                .get_mut(&destination.0)
                .and_then(|b| b.shadow.as_mut()),
        ) {
            let start = destination_offset as usize;
            target[start..start + bytes.len()].copy_from_slice(&bytes);
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(removed) = self.buffers.remove(&buffer.0) {
            removed.buffer.destroy();
        }
    }

    fn read_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GpuError> {
        let source = self.buffer(buffer)?;
        Self::check_range(source, offset, size)?;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read_back"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(&source.buffer, offset, &staging, 0, size);
        self.queue.submit([encoder.finish()]);

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| GpuError::BufferMap(e.to_string()))?;
        receiver
            .recv()
            .map_err(|e| GpuError::BufferMap(e.to_string()))?
            .map_err(|e| GpuError::BufferMap(e.to_string()))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }

    fn compile_shader(&mut self, label: &str, source: &str) -> Result<ShaderHandle, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&self.bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    // Winding differs between positive and negative faces; culling is per group.
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::ShaderCompilation {
                label: label.to_string(),
                reason: error.to_string(),
            });
        }
        self.pipelines.push(pipeline);
        Ok(ShaderHandle(self.pipelines.len() as u32 - 1))
    }

    fn load_texture(&mut self, path: &Path) -> Result<TextureHandle, GpuError> {
        if self.next_layer >= TEXTURE_LAYERS {
            return Err(GpuError::TextureLoad {
                path: path.to_path_buf(),
                reason: format!("texture array is full ({} layers)", TEXTURE_LAYERS),
            });
        }

        let image = image::open(path)
            .map_err(|e| GpuError::TextureLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let image = if image.dimensions() == (TEXTURE_DIMENSION, TEXTURE_DIMENSION) {
            image
        } else {
            imageops::resize(&image, TEXTURE_DIMENSION, TEXTURE_DIMENSION, FilterType::Nearest)
        };

        let layer = self.next_layer;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture_array,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * TEXTURE_DIMENSION),
                rows_per_image: Some(TEXTURE_DIMENSION),
            },
            wgpu::Extent3d {
                width: TEXTURE_DIMENSION,
                height: TEXTURE_DIMENSION,
                depth_or_array_layers: 1,
            },
        );
        self.next_layer += 1;
        Ok(TextureHandle(layer))
    }

    fn draw_indirect(&mut self, draw: &IndirectDraw) -> Result<DrawStats, GpuError> {
        let face_bytes = self.buffer(draw.faces)?.buffer.size();
        let indirect = self.buffer(draw.indirect)?;
        Self::check_range(indirect, 0, draw.draw_count as u64 * DRAW_COMMAND_SIZE)?;
        let stats = match &indirect.shadow {
            Some(shadow) => walk_commands(shadow, draw.draw_count, face_bytes)?,
            None => {
                return Err(GpuError::InvalidDraw(format!(
                    "buffer '{}' was not created with INDIRECT usage",
                    indirect.label
                )))
            }
        };

        self.prepare_bind_group(draw)?;
        let pipeline = self
            .pipelines
            .get(draw.pipeline.0 as usize)
            .ok_or(GpuError::UnknownPipeline(draw.pipeline.0))?;
        let indirect = &self.buffer(draw.indirect)?.buffer;
        let Some((_, bind_group)) = &self.bind_group else {
            return Ok(stats);
        };

        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, bind_group, &[]);
            if self.multi_draw {
                rpass.multi_draw_indirect(indirect, 0, draw.draw_count);
            } else {
                for i in 0..draw.draw_count as u64 {
                    rpass.draw_indirect(indirect, i * DRAW_COMMAND_SIZE);
                }
            }
        }
        self.queue.submit([encoder.finish()]);
        Ok(stats)
    }
}
