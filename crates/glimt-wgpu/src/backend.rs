use std::collections::HashMap;

use anyhow::{Result, bail, ensure};
use bytemuck::{Pod, Zeroable};
use log::debug;
use wgpu::util::DeviceExt;

use glimt_core::backend::RenderBackend;
use glimt_core::batch::{FilterOp, QuadOp};
use glimt_core::filter::{GrayscaleFilter, InverseFilter};
use glimt_core::quads::{BYTES_PER_VERTEX, QuadBuffer};
use glimt_core::shader::ProgramId;
use glimt_core::texture::{NodeId, RenderTexture, TextureHandle};

use crate::init::Wgpu;

/// Working format for the screen and all textures. Premultiplied-alpha
/// content in a plain unorm format; color management is the embedder's
/// concern at presentation time.
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ViewportUniform {
    size: [f32; 2],
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct FilterUniform {
    mode: u32,
    _pad: [u32; 3],
    params: [f32; 4],
}

/// A drawable color target plus the per-target resources the quad pipeline
/// needs: its viewport uniform and a bind group to sample it as a source.
struct TargetResources {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    viewport_bg: wgpu::BindGroup,
    sample_bg: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct SourceResources {
    _texture: wgpu::Texture,
    sample_bg: wgpu::BindGroup,
}

struct FrameState {
    encoder: wgpu::CommandEncoder,
    /// Bound target; `None` is the screen.
    target: Option<u64>,
    /// Clear requested but not yet attached to a render pass.
    pending_clear: Option<wgpu::Color>,
}

/// wgpu implementation of [`RenderBackend`].
///
/// Renders headless into an offscreen screen texture. One command encoder
/// spans the frame; every batch becomes one render pass whose load op
/// carries any pending clear. Custom shader programs are not implemented
/// and fall back to the default quad pipeline (logged once).
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    sampler: wgpu::Sampler,

    quad_pipeline: wgpu::RenderPipeline,
    filter_pipeline: wgpu::RenderPipeline,
    viewport_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,
    filter_bgl: wgpu::BindGroupLayout,

    screen: TargetResources,
    targets: HashMap<u64, TargetResources>,
    sources: HashMap<TextureHandle, SourceResources>,
    /// 1x1 white source bound for solid (textureless) quads.
    white: SourceResources,

    vbo: wgpu::Buffer,
    vbo_capacity: usize,
    ibo: wgpu::Buffer,
    ibo_quads: usize,

    frame: Option<FrameState>,
    warned_custom_program: bool,
    warned_custom_filter: bool,
}

impl WgpuBackend {
    /// Creates a backend with a screen surface of the given device-pixel
    /// size.
    pub fn new(gpu: Wgpu, width: u32, height: u32) -> Result<Self> {
        ensure!(width > 0 && height > 0, "screen has zero size");
        let (device, queue) = gpu.into_device_queue();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glimt sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let viewport_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glimt viewport bgl"),
            entries: &[uniform_entry::<ViewportUniform>(0, wgpu::ShaderStages::VERTEX)],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glimt texture bgl"),
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

        let filter_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glimt filter bgl"),
            entries: &[uniform_entry::<FilterUniform>(0, wgpu::ShaderStages::FRAGMENT)],
        });

        let quad_pipeline =
            build_quad_pipeline(&device, &viewport_bgl, &texture_bgl);
        let filter_pipeline =
            build_filter_pipeline(&device, &filter_bgl, &texture_bgl);

        let screen = create_target(
            &device,
            &viewport_bgl,
            &texture_bgl,
            &sampler,
            "glimt screen",
            width,
            height,
            // Readback support for the embedder.
            wgpu::TextureUsages::COPY_SRC,
        );

        let white = {
            let texture = device.create_texture_with_data(
                &queue,
                &wgpu::TextureDescriptor {
                    label: Some("glimt white texture"),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: FORMAT,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                },
                wgpu::util::TextureDataOrder::LayerMajor,
                &[0xff, 0xff, 0xff, 0xff],
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let sample_bg = sample_bind_group(&device, &texture_bgl, &sampler, &view);
            SourceResources {
                _texture: texture,
                sample_bg,
            }
        };

        let vbo_capacity = 64 * 1024;
        let vbo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glimt quad vbo"),
            size: vbo_capacity as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let ibo_quads = 256;
        let ibo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("glimt quad ibo"),
            contents: bytemuck::cast_slice(&quad_indices(ibo_quads)),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            device,
            queue,
            sampler,
            quad_pipeline,
            filter_pipeline,
            viewport_bgl,
            texture_bgl,
            filter_bgl,
            screen,
            targets: HashMap::new(),
            sources: HashMap::new(),
            white,
            vbo,
            vbo_capacity,
            ibo,
            ibo_quads,
            frame: None,
            warned_custom_program: false,
            warned_custom_filter: false,
        })
    }

    /// Uploads RGBA8 pixel data as a source texture under `handle`.
    pub fn register_source(
        &mut self,
        handle: TextureHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<()> {
        ensure!(
            pixels.len() == (width as usize) * (height as usize) * 4,
            "source pixel data does not match {width}x{height}"
        );
        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some("glimt source texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sample_bg = sample_bind_group(&self.device, &self.texture_bgl, &self.sampler, &view);
        self.sources.insert(
            handle,
            SourceResources {
                _texture: texture,
                sample_bg,
            },
        );
        Ok(())
    }

    /// Drops a previously registered source texture.
    pub fn free_source(&mut self, handle: TextureHandle) {
        self.sources.remove(&handle);
    }

    /// Reads the screen texture back as tightly packed RGBA8 rows.
    ///
    /// Blocks on the GPU; intended for tests and screenshots, not the frame
    /// loop.
    pub fn read_screen(&self) -> Result<Vec<u8>> {
        let (width, height) = (self.screen.width, self.screen.height);
        let row_bytes = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bpr = row_bytes.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glimt screen readback"),
            size: u64::from(padded_bpr) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glimt readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.screen.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            drop(sender.send(res));
        });
        loop {
            drop(self.device.poll(wgpu::PollType::wait_indefinitely()));
            if let Ok(res) = receiver.try_recv() {
                res?;
                break;
            }
        }

        let mapped = slice.get_mapped_range();
        let mut data = vec![0u8; (row_bytes as usize) * (height as usize)];
        for row in 0..height as usize {
            let src = row * padded_bpr as usize;
            let dst = row * row_bytes as usize;
            data[dst..dst + row_bytes as usize]
                .copy_from_slice(&mapped[src..src + row_bytes as usize]);
        }
        drop(mapped);
        readback.unmap();
        Ok(data)
    }

    fn resolve_target<'a>(
        screen: &'a TargetResources,
        targets: &'a HashMap<u64, TargetResources>,
        key: Option<u64>,
    ) -> Result<&'a TargetResources> {
        match key {
            None => Ok(screen),
            Some(id) => targets
                .get(&id)
                .ok_or_else(|| anyhow::anyhow!("render texture {id} does not exist")),
        }
    }

    /// Attaches a pending clear to an empty render pass so it survives even
    /// when no draw follows on the same target.
    fn flush_pending_clear(&mut self) -> Result<()> {
        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };
        let Some(color) = frame.pending_clear.take() else {
            return Ok(());
        };
        let target = Self::resolve_target(&self.screen, &self.targets, frame.target)?;
        record_clear_pass(&mut frame.encoder, &target.view, color);
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_render_texture(&mut self, id: u64, width: u32, height: u32) -> Result<()> {
        ensure!(
            !self.targets.contains_key(&id),
            "render texture {id} already exists"
        );
        let target = create_target(
            &self.device,
            &self.viewport_bgl,
            &self.texture_bgl,
            &self.sampler,
            "glimt render texture",
            width,
            height,
            wgpu::TextureUsages::empty(),
        );
        self.targets.insert(id, target);
        Ok(())
    }

    fn free_render_texture(&mut self, id: u64) {
        self.targets.remove(&id);
    }

    fn begin_frame(&mut self, quads: &QuadBuffer) -> Result<()> {
        ensure!(self.frame.is_none(), "frame already in progress");

        let data = quads.bytes();
        if data.len() > self.vbo_capacity {
            self.vbo_capacity = data.len().next_power_of_two();
            self.vbo = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("glimt quad vbo"),
                size: self.vbo_capacity as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        self.queue.write_buffer(&self.vbo, 0, data);

        if quads.quad_count() > self.ibo_quads {
            self.ibo_quads = quads.quad_count().next_power_of_two();
            self.ibo = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("glimt quad ibo"),
                    contents: bytemuck::cast_slice(&quad_indices(self.ibo_quads)),
                    usage: wgpu::BufferUsages::INDEX,
                });
        }

        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glimt frame encoder"),
            });
        self.frame = Some(FrameState {
            encoder,
            target: None,
            pending_clear: None,
        });
        Ok(())
    }

    fn bind_render_target(&mut self, target: Option<&RenderTexture>) {
        let key = target.map(|t| t.id());
        let changed = self
            .frame
            .as_ref()
            .is_some_and(|frame| frame.target != key);
        if changed {
            // A clear on the outgoing target must not leak onto the new one.
            if let Err(err) = self.flush_pending_clear() {
                debug!("dropping pending clear: {err}");
            }
            if let Some(frame) = self.frame.as_mut() {
                frame.target = key;
            }
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        if let Some(frame) = self.frame.as_mut() {
            frame.pending_clear = Some(wgpu::Color {
                r: f64::from(color[0]),
                g: f64::from(color[1]),
                b: f64::from(color[2]),
                a: f64::from(color[3]),
            });
        }
    }

    fn bind_program(&mut self, program: ProgramId, _owner: Option<NodeId>) {
        if program != ProgramId::DEFAULT && !self.warned_custom_program {
            debug!("custom shader program {program:?} not implemented; using default pipeline");
            self.warned_custom_program = true;
        }
    }

    fn draw_quads(&mut self, op: &QuadOp, quads: &QuadBuffer) -> Result<()> {
        let Some(frame) = self.frame.as_mut() else {
            bail!("draw_quads outside begin_frame/end_frame");
        };
        let target = Self::resolve_target(&self.screen, &self.targets, frame.target)?;
        let load = match frame.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        if op.quad_count == 0 {
            // Still realize a pending clear for empty-but-kept batches.
            if let wgpu::LoadOp::Clear(color) = load {
                record_clear_pass(&mut frame.encoder, &target.view, color);
            }
            return Ok(());
        }

        let mut rpass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glimt quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

        rpass.set_pipeline(&self.quad_pipeline);
        rpass.set_bind_group(0, &target.viewport_bg, &[]);
        rpass.set_vertex_buffer(0, self.vbo.slice(..));
        rpass.set_index_buffer(self.ibo.slice(..), wgpu::IndexFormat::Uint32);

        // One draw call per consecutive same-texture run within the batch.
        let end = op.first_quad + op.quad_count;
        let mut run_start = op.first_quad;
        while run_start < end {
            let texture = quads.texture_for(run_start);
            let mut run_end = run_start + 1;
            while run_end < end && quads.texture_for(run_end) == texture {
                run_end += 1;
            }

            let sample_bg = match texture {
                None => &self.white.sample_bg,
                Some(TextureHandle::RenderTexture(id)) => self
                    .targets
                    .get(&id)
                    .map(|t| &t.sample_bg)
                    .unwrap_or(&self.white.sample_bg),
                Some(handle) => self
                    .sources
                    .get(&handle)
                    .map(|s| &s.sample_bg)
                    .unwrap_or(&self.white.sample_bg),
            };
            rpass.set_bind_group(1, sample_bg, &[]);
            rpass.draw_indexed((run_start as u32 * 6)..(run_end as u32 * 6), 0, 0..1);

            run_start = run_end;
        }
        Ok(())
    }

    fn run_filter(&mut self, op: &FilterOp, _quads: &QuadBuffer) -> Result<()> {
        let mode = match op.filter.program() {
            GrayscaleFilter::PROGRAM => 1,
            InverseFilter::PROGRAM => 2,
            ProgramId::DEFAULT => 0,
            other => {
                if !self.warned_custom_filter {
                    debug!("custom filter program {other:?} not implemented; copying source");
                    self.warned_custom_filter = true;
                }
                0
            }
        };

        // A dedicated uniform buffer per pass: queue writes land before the
        // whole command buffer, so a shared buffer would alias across
        // passes within the frame.
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("glimt filter params"),
                contents: bytemuck::bytes_of(&FilterUniform {
                    mode,
                    _pad: [0; 3],
                    params: op.filter.params(),
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let params_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glimt filter params bg"),
            layout: &self.filter_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });

        let Some(frame) = self.frame.as_mut() else {
            bail!("run_filter outside begin_frame/end_frame");
        };
        let source = self
            .targets
            .get(&op.source.id())
            .ok_or_else(|| anyhow::anyhow!("filter source {} does not exist", op.source.id()))?;
        let target = Self::resolve_target(&self.screen, &self.targets, frame.target)?;
        let load = match frame.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        let mut rpass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glimt filter pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        rpass.set_pipeline(&self.filter_pipeline);
        rpass.set_bind_group(0, &params_bg, &[]);
        rpass.set_bind_group(1, &source.sample_bg, &[]);
        // Fullscreen triangle.
        rpass.draw(0..3, 0..1);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.flush_pending_clear()?;
        let Some(frame) = self.frame.take() else {
            bail!("end_frame without begin_frame");
        };
        self.queue.submit([frame.encoder.finish()]);
        Ok(())
    }
}

fn uniform_entry<T>(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: Some(
                std::num::NonZeroU64::new(std::mem::size_of::<T>() as u64)
                    .unwrap_or(std::num::NonZeroU64::MIN),
            ),
        },
        count: None,
    }
}

fn sample_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("glimt sample bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[allow(clippy::too_many_arguments)]
fn create_target(
    device: &wgpu::Device,
    viewport_bgl: &wgpu::BindGroupLayout,
    texture_bgl: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    width: u32,
    height: u32,
    extra_usage: wgpu::TextureUsages,
) -> TargetResources {
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
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | extra_usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Per-target viewport uniform, fixed for the target's lifetime.
    let viewport_ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("glimt viewport ubo"),
        contents: bytemuck::bytes_of(&ViewportUniform {
            size: [width as f32, height as f32],
            _pad: [0.0; 2],
        }),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let viewport_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("glimt viewport bind group"),
        layout: viewport_bgl,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: viewport_ubo.as_entire_binding(),
        }],
    });
    let sample_bg = sample_bind_group(device, texture_bgl, sampler, &view);

    TargetResources {
        texture,
        view,
        viewport_bg,
        sample_bg,
        width,
        height,
    }
}

fn build_quad_pipeline(
    device: &wgpu::Device,
    viewport_bgl: &wgpu::BindGroupLayout,
    texture_bgl: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("glimt quad shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/quad.wgsl").into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("glimt quad pipeline layout"),
        bind_group_layouts: &[viewport_bgl, texture_bgl],
        immediate_size: 0,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("glimt quad pipeline"),
        layout: Some(&layout),

        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: BYTES_PER_VERTEX as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &QUAD_VERTEX_ATTRS,
            }],
        },

        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: FORMAT,
                blend: Some(premul_alpha_blend()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn build_filter_pipeline(
    device: &wgpu::Device,
    filter_bgl: &wgpu::BindGroupLayout,
    texture_bgl: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("glimt filter shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/filter.wgsl").into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("glimt filter pipeline layout"),
        bind_group_layouts: &[filter_bgl, texture_bgl],
        immediate_size: 0,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("glimt filter pipeline"),
        layout: Some(&layout),

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
                format: FORMAT,
                // The pass rewrites the whole target.
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

const QUAD_VERTEX_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2, // position (device px)
    1 => Unorm16x2, // texcoord
    2 => Unorm8x4   // premultiplied color
];

fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

fn record_clear_pass(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    color: wgpu::Color,
) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("glimt clear pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

/// Index data for `quads` quads: quad `q`'s vertices start at `(q + 1) * 4`
/// (the head slot occupies the first four), two triangles each.
fn quad_indices(quads: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(quads * 6);
    for q in 0..quads {
        let base = ((q + 1) * 4) as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    indices
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::init::WgpuInit;
    use glimt_core::batch::RenderState;
    use glimt_core::config::ContextOptions;
    use glimt_core::exec::Executor;
    use glimt_core::quads::QuadRequest;

    #[test]
    fn index_layout_skips_head_slot() {
        let indices = quad_indices(2);
        assert_eq!(&indices[0..6], &[4, 5, 6, 4, 6, 7]);
        assert_eq!(&indices[6..12], &[8, 9, 10, 8, 10, 11]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn renders_a_solid_quad_to_the_screen() {
        let gpu = Wgpu::new_blocking(WgpuInit::default()).unwrap();
        let mut backend = WgpuBackend::new(gpu, 8, 8).unwrap();

        let options = ContextOptions::default();
        let mut state = RenderState::new(&options);
        state.reset();
        let shader = Rc::clone(state.default_shader());
        state.set_shader(&shader, NodeId(1));
        state.add_quad(&QuadRequest {
            owner: NodeId(1),
            texture: None,
            in_atlas: false,
            coords: [[0.0, 0.0], [8.0, 0.0], [8.0, 4.0], [0.0, 4.0]],
            uvs: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            colors: [0xff00_00ff; 4],
        });
        state.finish();

        Executor::new(Some([0.0, 0.0, 0.0, 1.0]))
            .execute(&state, &mut backend)
            .unwrap();

        let pixels = backend.read_screen().unwrap();
        // Top half red, bottom half the clear color.
        assert_eq!(&pixels[(1 * 8 + 4) * 4..(1 * 8 + 4) * 4 + 4], &[255, 0, 0, 255]);
        assert_eq!(&pixels[(6 * 8 + 4) * 4..(6 * 8 + 4) * 4 + 4], &[0, 0, 0, 255]);
    }
}
