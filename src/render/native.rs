use std::borrow::Cow;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec4;
use log::{debug, info, trace, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::common::{
    triangulate_fan, BufferId, DrawMode, MeshBuffers, MeshData, ProgramId, ShaderId, ShaderStage,
    TextureId, TextureImage, UniformLocation, UniformValue, Vertex, VertexArrayId,
};
use super::reflect::{self, CompiledStage, LinkedProgram};
use super::{GpuError, GraphicsDevice};

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

/// [`GraphicsDevice`] backed by wgpu.
///
/// Commands issued during a frame are recorded with a snapshot of the bound
/// program's uniform block and replayed in a single render pass by
/// [`present`](GraphicsDevice::present).
pub struct WgpuDevice {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    default_texture: TextureSlot,
    uniform_alignment: usize,
    next_id: u32,
    shaders: HashMap<ShaderId, ShaderEntry>,
    programs: HashMap<ProgramId, ProgramEntry>,
    meshes: HashMap<VertexArrayId, GpuMesh>,
    units: HashMap<u32, TextureSlot>,
    bound_program: Option<ProgramId>,
    bound_texture: Option<u32>,
    viewport: (u32, u32),
    frame: FrameRecording,
    uniform_buffer: GrowableBuffer,
    transient_vertices: GrowableBuffer,
    transient_indices: GrowableBuffer,
}

impl WgpuDevice {
    /// Initializes the device for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("scene-device"),
                ..Default::default()
            })
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform-block-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-unit-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program-layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("texture-unit-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let default_texture = TextureSlot::upload(
            &device,
            &queue,
            &texture_layout,
            &sampler,
            &TextureImage::white(),
            "default-texture",
        );
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            default_texture,
            uniform_alignment,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            units: HashMap::new(),
            bound_program: None,
            bound_texture: None,
            viewport: (size.width, size.height),
            frame: FrameRecording::default(),
            uniform_buffer: GrowableBuffer::new(
                "frame-uniforms",
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            ),
            transient_vertices: GrowableBuffer::new(
                "transient-vertices",
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            ),
            transient_indices: GrowableBuffer::new(
                "transient-indices",
                wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            ),
        })
    }

    /// Returns the identifier of the window owned by the device.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain. Projections owned by the scene are unaffected.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_pipeline(
        &self,
        vertex: &ShaderEntry,
        fragment: &ShaderEntry,
        linked: &LinkedProgram,
        topology: wgpu::PrimitiveTopology,
    ) -> wgpu::RenderPipeline {
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("program-pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(&linked.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: Vertex::STRIDE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthBuffer::FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: Some(&linked.fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
    }

    fn record_draw(&mut self, mode: DrawMode, source: DrawSource, index_count: u32) {
        let Some(program_id) = self.bound_program else {
            trace!("draw dropped: no program bound");
            return;
        };
        let Some(program) = self.programs.get(&program_id) else {
            return;
        };
        let uniform_offset = self.frame.push_uniforms(&program.block, self.uniform_alignment);
        self.frame.draws.push(DrawRecord {
            program: program_id,
            mode,
            source,
            index_count,
            uniform_offset,
            texture_unit: self.bound_texture,
        });
    }
}

impl GraphicsDevice for WgpuDevice {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError> {
        let compiled = reflect::compile_stage(stage, source)?;
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{stage}-shader")),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(compiled.source.clone())),
            });
        let id = ShaderId(self.allocate());
        debug!("compiled {stage} shader {id} (entry `{}`)", compiled.entry_point);
        self.shaders.insert(id, ShaderEntry { compiled, module });
        Ok(id)
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        attributes: &[(u32, &str)],
    ) -> Result<ProgramId, GpuError> {
        let vs = self.shaders.get(&vertex).ok_or(GpuError::UnknownHandle {
            kind: "shader",
            id: vertex.0,
        })?;
        let fs = self.shaders.get(&fragment).ok_or(GpuError::UnknownHandle {
            kind: "shader",
            id: fragment.0,
        })?;
        let linked = reflect::link_stages(&vs.compiled, &fs.compiled, attributes)?;
        let lines = self.create_pipeline(vs, fs, &linked, wgpu::PrimitiveTopology::LineList);
        let triangles =
            self.create_pipeline(vs, fs, &linked, wgpu::PrimitiveTopology::TriangleList);
        // Bind groups need a non-empty window into the uniform buffer.
        let block_size = (linked.uniforms.size as usize).max(16).next_multiple_of(16);
        let id = ProgramId(self.allocate());
        self.programs.insert(
            id,
            ProgramEntry {
                linked,
                block: vec![0; block_size],
                lines,
                triangles,
            },
        );
        Ok(id)
    }

    fn active_uniforms(&self, program: ProgramId) -> HashMap<String, UniformLocation> {
        self.programs
            .get(&program)
            .map(|p| p.linked.uniforms.locations())
            .unwrap_or_default()
    }

    fn active_attributes(&self, program: ProgramId) -> HashMap<String, u32> {
        self.programs
            .get(&program)
            .map(|p| p.linked.attributes.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.programs.remove(&program);
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshBuffers {
        let indices = match data.mode {
            DrawMode::TriangleFan => triangulate_fan(&data.indices),
            DrawMode::Lines | DrawMode::Triangles => data.indices.clone(),
        };
        let buffers = MeshBuffers {
            vertex_array: VertexArrayId(self.allocate()),
            vertex_buffer: BufferId(self.allocate()),
            index_buffer: BufferId(self.allocate()),
        };
        let label = buffers.vertex_array.to_string();
        let vertex = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-vertices")),
                contents: bytemuck::cast_slice(&data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        self.meshes.insert(
            buffers.vertex_array,
            GpuMesh {
                vertex,
                index,
                index_count: indices.len() as u32,
            },
        );
        buffers
    }

    fn delete_mesh(&mut self, buffers: MeshBuffers) {
        if let Some(mesh) = self.meshes.remove(&buffers.vertex_array) {
            mesh.vertex.destroy();
            mesh.index.destroy();
        }
    }

    fn create_texture(&mut self, unit: u32, image: &TextureImage) -> Result<TextureId, GpuError> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.width == 0 || image.height == 0 || image.pixels.len() != expected {
            return Err(GpuError::Texture(format!(
                "{}x{} image with {} bytes",
                image.width,
                image.height,
                image.pixels.len()
            )));
        }
        let slot = TextureSlot::upload(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            image,
            &format!("texture-unit-{unit}"),
        );
        self.units.insert(unit, slot);
        Ok(TextureId(self.allocate()))
    }

    fn bind_texture(&mut self, unit: u32) {
        self.bound_texture = Some(unit);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn clear(&mut self, color: Vec4, _depth: f32) {
        // Depth always clears to the far plane.
        self.frame.clear = Some(wgpu::Color {
            r: color.x as f64,
            g: color.y as f64,
            b: color.z as f64,
            a: color.w as f64,
        });
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.bound_program = program.filter(|id| self.programs.contains_key(id));
    }

    fn set_uniform(&mut self, location: Option<UniformLocation>, value: UniformValue) {
        let (Some(location), Some(program)) = (location, self.bound_program) else {
            return;
        };
        let Some(entry) = self.programs.get_mut(&program) else {
            return;
        };
        let Some(member) = entry.linked.uniforms.member_at(location) else {
            return;
        };
        let bytes = value.to_bytes();
        let len = bytes.len().min(member.size as usize);
        let start = member.offset as usize;
        entry.block[start..start + len].copy_from_slice(&bytes[..len]);
    }

    fn draw_indexed(&mut self, vertex_array: VertexArrayId, mode: DrawMode, count: u32) {
        self.record_draw(
            mode,
            DrawSource::Mesh(vertex_array),
            mode.expanded_index_count(count),
        );
    }

    fn draw_transient(&mut self, mode: DrawMode, vertices: &[Vertex], indices: &[u32]) {
        if vertices.is_empty() || indices.is_empty() {
            return;
        }
        let indices = match mode {
            DrawMode::TriangleFan => triangulate_fan(indices),
            DrawMode::Lines | DrawMode::Triangles => indices.to_vec(),
        };
        let base_vertex = self.frame.vertices.len() as i32;
        let first_index = self.frame.indices.len() as u32;
        let count = indices.len() as u32;
        self.frame.vertices.extend_from_slice(vertices);
        self.frame.indices.extend_from_slice(&indices);
        self.record_draw(
            mode,
            DrawSource::Transient {
                base_vertex,
                first_index,
            },
            count,
        );
    }

    fn present(&mut self) -> Result<(), GpuError> {
        let frame = std::mem::take(&mut self.frame);
        self.bound_texture = None;

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
                return Ok(());
            }
            Err(err) => return Err(GpuError::Surface(err.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.uniform_buffer
            .upload(&self.device, &self.queue, &frame.uniforms);
        self.transient_vertices.upload(
            &self.device,
            &self.queue,
            bytemuck::cast_slice(&frame.vertices),
        );
        self.transient_indices.upload(
            &self.device,
            &self.queue,
            bytemuck::cast_slice(&frame.indices),
        );

        let mut uniform_groups: HashMap<ProgramId, wgpu::BindGroup> = HashMap::new();
        if let Some(buffer) = self.uniform_buffer.buffer.as_ref() {
            for draw in &frame.draws {
                if uniform_groups.contains_key(&draw.program) {
                    continue;
                }
                let Some(program) = self.programs.get(&draw.program) else {
                    continue;
                };
                let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("uniform-block"),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: 0,
                            size: NonZeroU64::new(program.block.len() as u64),
                        }),
                    }],
                });
                uniform_groups.insert(draw.program, group);
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("frame-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(frame.clear.unwrap_or(wgpu::Color::BLACK)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let width = self.viewport.0.min(self.config.width).max(1);
        let height = self.viewport.1.min(self.config.height).max(1);
        pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

        for draw in &frame.draws {
            let (Some(program), Some(group)) = (
                self.programs.get(&draw.program),
                uniform_groups.get(&draw.program),
            ) else {
                continue;
            };
            let pipeline = match draw.mode {
                DrawMode::Lines => &program.lines,
                DrawMode::Triangles | DrawMode::TriangleFan => &program.triangles,
            };
            let texture = draw
                .texture_unit
                .and_then(|unit| self.units.get(&unit))
                .unwrap_or(&self.default_texture);

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, group, &[draw.uniform_offset]);
            pass.set_bind_group(1, &texture.bind_group, &[]);

            match draw.source {
                DrawSource::Mesh(vertex_array) => {
                    let Some(mesh) = self.meshes.get(&vertex_array) else {
                        warn!("draw of released vertex array {vertex_array}");
                        continue;
                    };
                    pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                    pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..draw.index_count.min(mesh.index_count), 0, 0..1);
                }
                DrawSource::Transient {
                    base_vertex,
                    first_index,
                } => {
                    let (Some(vertices), Some(indices)) = (
                        self.transient_vertices.buffer.as_ref(),
                        self.transient_indices.buffer.as_ref(),
                    ) else {
                        continue;
                    };
                    pass.set_vertex_buffer(0, vertices.slice(..));
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(
                        first_index..first_index + draw.index_count,
                        base_vertex,
                        0..1,
                    );
                }
            }
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

struct ShaderEntry {
    compiled: CompiledStage,
    module: wgpu::ShaderModule,
}

struct ProgramEntry {
    linked: LinkedProgram,
    block: Vec<u8>,
    lines: wgpu::RenderPipeline,
    triangles: wgpu::RenderPipeline,
}

struct GpuMesh {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

struct TextureSlot {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl TextureSlot {
    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        image: &TextureImage,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self {
            _texture: texture,
            bind_group,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DrawSource {
    Mesh(VertexArrayId),
    Transient { base_vertex: i32, first_index: u32 },
}

#[derive(Debug)]
struct DrawRecord {
    program: ProgramId,
    mode: DrawMode,
    source: DrawSource,
    index_count: u32,
    uniform_offset: u32,
    texture_unit: Option<u32>,
}

#[derive(Debug, Default)]
struct FrameRecording {
    clear: Option<wgpu::Color>,
    uniforms: Vec<u8>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    draws: Vec<DrawRecord>,
}

impl FrameRecording {
    /// Appends a uniform block snapshot and returns its dynamic offset.
    fn push_uniforms(&mut self, block: &[u8], alignment: usize) -> u32 {
        let offset = self.uniforms.len().next_multiple_of(alignment.max(1));
        self.uniforms.resize(offset, 0);
        self.uniforms.extend_from_slice(block);
        offset as u32
    }
}

struct GrowableBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
}

impl GrowableBuffer {
    fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        Self {
            label,
            usage,
            buffer: None,
            capacity: 0,
        }
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let needed = (bytes.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if self.buffer.is_none() || self.capacity < needed {
            let capacity = needed.next_power_of_two().max(256);
            debug!("growing {} to {capacity} bytes", self.label);
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: capacity,
                usage: self.usage,
                mapped_at_creation: false,
            }));
            self.capacity = capacity;
        }
        if let Some(buffer) = self.buffer.as_ref() {
            if bytes.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
                queue.write_buffer(buffer, 0, bytes);
            } else {
                let mut padded = bytes.to_vec();
                padded.resize(needed as usize, 0);
                queue.write_buffer(buffer, 0, &padded);
            }
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
