use web_sys::HtmlCanvasElement;
use wgpu::util::DeviceExt;

use super::{BackendKind, GpuSlot, RenderBackend};
use crate::engine::{NumericEngine, ObjectHandle, BACKGROUND};
use crate::error::{Result, ViewerError};
use crate::packer::{GeometryBuffers, UniformBlock, Vertex, UNIFORM_BLOCK_SIZE};
use crate::textures::{TextureImage, TextureSet, TextureSlot};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
const SAMPLER_BINDING: u32 = 5;

pub struct HardwareBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    render_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    textures: [GpuSlot<wgpu::Texture>; 4],
    depth_texture: GpuSlot<wgpu::Texture>,
    depth_view: wgpu::TextureView,
    vertex_buffer: GpuSlot<wgpu::Buffer>,
    index_buffer: GpuSlot<wgpu::Buffer>,
    index_format: wgpu::IndexFormat,
    num_indices: u32,
}

impl HardwareBackend {
    /// Adapter and device first, so a failed attempt leaves the canvas free for
    /// a 2D context; the surface is only created once a device exists.
    pub async fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        if !wgpu::util::is_browser_webgpu_supported().await {
            return Err(ViewerError::hardware("WebGPU is not supported by this browser"));
        }

        let width = canvas.width().max(1);
        let height = canvas.height().max(1);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ViewerError::hardware(format!("no adapter: {e}")))?;

        let adapter_info = adapter.get_info();
        log::info!("adapter: {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Viewer Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| ViewerError::hardware(format!("device request rejected: {e}")))?;
        log::info!("device created");

        let surface = instance
            .create_surface(wgpu::SurfaceTarget::Canvas(canvas))
            .map_err(|e| ViewerError::hardware(format!("failed to create surface: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .first()
            .copied()
            .ok_or_else(|| ViewerError::hardware("surface reports no formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group_layout = create_bind_group_layout(&device);
        let render_pipeline = create_render_pipeline(&device, &bind_group_layout, config.format);
        if let Some(error) = device.pop_error_scope().await {
            return Err(ViewerError::hardware(format!("pipeline creation failed: {error}")));
        }

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: UniformBlock::identity().as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        debug_assert_eq!(uniform_buffer.size() as usize, UNIFORM_BLOCK_SIZE);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Texture Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut textures: [GpuSlot<wgpu::Texture>; 4] = Default::default();
        let defaults = TextureSet::new();
        for slot in TextureSlot::ALL {
            textures[slot.index()].replace(upload_texture(&device, &queue, slot, &defaults.resolve(slot)));
        }
        let bind_group = create_bind_group(
            &device,
            &bind_group_layout,
            &uniform_buffer,
            &textures,
            &sampler,
        )?;

        let mut depth_texture = GpuSlot::new();
        let depth = create_depth_texture(&device, width, height);
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        depth_texture.replace(depth);

        log::info!("hardware backend ready ({:?}, {}x{})", surface_format, width, height);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            render_pipeline,
            bind_group_layout,
            bind_group,
            uniform_buffer,
            sampler,
            textures,
            depth_texture,
            depth_view,
            vertex_buffer: GpuSlot::new(),
            index_buffer: GpuSlot::new(),
            index_format: wgpu::IndexFormat::Uint16,
            num_indices: 0,
        })
    }
}

impl RenderBackend for HardwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    /// The GPU samples its own copies of the maps; the engine keeps none.
    fn configure_engine(
        &self,
        engine: &mut dyn NumericEngine,
        _object: ObjectHandle,
        _textures: &TextureSet,
    ) {
        engine.set_raster_output(false);
    }

    fn update_vertex_data(&mut self, geometry: &GeometryBuffers) -> Result<()> {
        self.vertex_buffer.clear();
        self.index_buffer.clear();
        self.num_indices = 0;
        if !geometry.is_drawable() {
            log::warn!("geometry is empty or indexes past its vertices; nothing uploaded");
            return Ok(());
        }

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: geometry.indices.as_bytes(),
            usage: wgpu::BufferUsages::INDEX,
        });

        let vertex_generation = self.vertex_buffer.replace(vertex_buffer);
        self.index_buffer.replace(index_buffer);
        self.index_format = geometry.indices.format();
        self.num_indices = geometry.indices.len() as u32;

        log::info!(
            "uploaded {} vertices and {} indices as {:?} (generation {})",
            geometry.vertices.len(),
            self.num_indices,
            self.index_format,
            vertex_generation
        );
        Ok(())
    }

    fn update_uniforms(&mut self, uniforms: &UniformBlock) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, uniforms.as_bytes());
    }

    fn update_textures(&mut self, textures: &TextureSet) -> Result<()> {
        for slot in TextureSlot::ALL {
            let texture = upload_texture(&self.device, &self.queue, slot, &textures.resolve(slot));
            self.textures[slot.index()].replace(texture);
        }
        self.bind_group = create_bind_group(
            &self.device,
            &self.bind_group_layout,
            &self.uniform_buffer,
            &self.textures,
            &self.sampler,
        )?;

        let present: Vec<&str> = textures.present().map(TextureSlot::label).collect();
        log::info!("bind group rebuilt with maps: {:?}", present);
        Ok(())
    }

    fn render(&mut self, _engine: &dyn NumericEngine) -> Result<()> {
        let (Some(vertex_buffer), Some(index_buffer)) =
            (self.vertex_buffer.get(), self.index_buffer.get())
        else {
            return Ok(());
        };
        if self.num_indices == 0 {
            return Ok(());
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(e) => return Err(ViewerError::Surface(e.to_string())),
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color()),
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
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), self.index_format);
            render_pass.draw_indexed(0..self.num_indices, 0, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.depth_texture.clear();
        let depth = create_depth_texture(&self.device, width, height);
        self.depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        self.depth_texture.replace(depth);
        log::info!("resized to {}x{}", width, height);
    }
}

fn clear_color() -> wgpu::Color {
    let channel = |c: u8| c as f64 / 255.0;
    wgpu::Color {
        r: channel(BACKGROUND[0]),
        g: channel(BACKGROUND[1]),
        b: channel(BACKGROUND[2]),
        a: 1.0,
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE as u64),
        },
        count: None,
    }];
    entries.extend(TextureSlot::ALL.map(|slot| texture_entry(slot.binding())));
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: SAMPLER_BINDING,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("viewer_bind_group_layout"),
        entries: &entries,
    })
}

fn create_render_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Viewer Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shader.wgsl").into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Render Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Render Pipeline"),
        layout: Some(&layout),
        cache: None,
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::desc()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    slot: TextureSlot,
    image: &TextureImage,
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(slot.label()),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
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
        &image.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * image.width),
            rows_per_image: Some(image.height),
        },
        size,
    );
    texture
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    textures: &[GpuSlot<wgpu::Texture>; 4],
    sampler: &wgpu::Sampler,
) -> Result<wgpu::BindGroup> {
    let views = textures
        .iter()
        .map(|slot| {
            slot.get()
                .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ViewerError::hardware("texture slot is empty"))?;

    let mut entries = vec![wgpu::BindGroupEntry {
        binding: 0,
        resource: uniform_buffer.as_entire_binding(),
    }];
    for slot in TextureSlot::ALL {
        entries.push(wgpu::BindGroupEntry {
            binding: slot.binding(),
            resource: wgpu::BindingResource::TextureView(&views[slot.index()]),
        });
    }
    entries.push(wgpu::BindGroupEntry {
        binding: SAMPLER_BINDING,
        resource: wgpu::BindingResource::Sampler(sampler),
    });

    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("viewer_bind_group"),
        layout,
        entries: &entries,
    }))
}
