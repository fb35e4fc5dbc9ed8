//! Software rasterizer backend.
//!
//! CPU fallback for platforms without a usable GPU context and for
//! headless/deterministic runs. Quads are split into two triangles and
//! filled with barycentric interpolation, nearest-neighbor sampling and
//! premultiplied src-over blending. Correctness over speed.

use std::collections::HashMap;

use anyhow::{Result, bail, ensure};
use log::debug;

use crate::backend::RenderBackend;
use crate::batch::{FilterOp, QuadOp};
use crate::quads::{QuadBuffer, QuadVertex, unpack_uv};
use crate::shader::ProgramId;
use crate::texture::{NodeId, RenderTexture, TextureHandle};

/// Premultiplied RGBA8 pixel surface, red in the low byte.
#[derive(Debug, Clone)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl Pixmap {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize)],
        }
    }

    fn fill(&mut self, pixel: u32) {
        self.pixels.fill(pixel);
    }

    fn sample_nearest(&self, u: f32, v: f32) -> u32 {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        let x = ((u * self.width as f32) as i64).clamp(0, i64::from(self.width) - 1);
        let y = ((v * self.height as f32) as i64).clamp(0, i64::from(self.height) - 1);
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Target {
    Screen,
    Texture(u64),
}

/// CPU implementation of [`RenderBackend`].
pub struct SoftwareBackend {
    screen: Pixmap,
    targets: HashMap<u64, Pixmap>,
    sources: HashMap<TextureHandle, Pixmap>,
    current: Target,
    warned_program: bool,
}

impl SoftwareBackend {
    /// Creates a backend with a screen surface of the given device-pixel
    /// size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: Pixmap::new(width.max(1), height.max(1)),
            targets: HashMap::new(),
            sources: HashMap::new(),
            current: Target::Screen,
            warned_program: false,
        }
    }

    /// Registers a source texture's pixel data under `handle`.
    pub fn register_source(
        &mut self,
        handle: TextureHandle,
        width: u32,
        height: u32,
        pixels: Vec<u32>,
    ) {
        debug_assert_eq!(pixels.len(), (width as usize) * (height as usize));
        self.sources.insert(
            handle,
            Pixmap {
                width,
                height,
                pixels,
            },
        );
    }

    /// The screen surface as drawn by the last executed frame.
    pub fn screen(&self) -> &Pixmap {
        &self.screen
    }

    /// Pixel data of a live render texture, if it exists.
    pub fn render_texture(&self, id: u64) -> Option<&Pixmap> {
        self.targets.get(&id)
    }

    fn resolve_source(&self, handle: TextureHandle) -> Option<&Pixmap> {
        match handle {
            TextureHandle::Source(_) => self.sources.get(&handle),
            TextureHandle::RenderTexture(id) => self.targets.get(&id),
        }
    }

    fn draw_quad(&mut self, vertices: &[QuadVertex; 4], texture: Option<TextureHandle>) {
        // The map may hold the current target as well, so sample through a
        // snapshot. Aliasing source and target is ruled out by the pool's
        // single-checkout discipline anyway.
        let source = texture.and_then(|handle| self.resolve_source(handle)).cloned();

        let target = match self.current {
            Target::Screen => &mut self.screen,
            Target::Texture(id) => match self.targets.get_mut(&id) {
                Some(pixmap) => pixmap,
                None => return,
            },
        };

        fill_triangle(target, [&vertices[0], &vertices[1], &vertices[2]], source.as_ref());
        fill_triangle(target, [&vertices[0], &vertices[2], &vertices[3]], source.as_ref());
    }
}

impl RenderBackend for SoftwareBackend {
    fn create_render_texture(&mut self, id: u64, width: u32, height: u32) -> Result<()> {
        ensure!(
            !self.targets.contains_key(&id),
            "render texture {id} already exists"
        );
        self.targets.insert(id, Pixmap::new(width, height));
        Ok(())
    }

    fn free_render_texture(&mut self, id: u64) {
        self.targets.remove(&id);
    }

    fn begin_frame(&mut self, _quads: &QuadBuffer) -> Result<()> {
        self.current = Target::Screen;
        Ok(())
    }

    fn bind_render_target(&mut self, target: Option<&RenderTexture>) {
        self.current = match target {
            Some(texture) => Target::Texture(texture.id()),
            None => Target::Screen,
        };
    }

    fn clear(&mut self, color: [f32; 4]) {
        let pixel = pack_color(color);
        match self.current {
            Target::Screen => self.screen.fill(pixel),
            Target::Texture(id) => {
                if let Some(pixmap) = self.targets.get_mut(&id) {
                    pixmap.fill(pixel);
                }
            }
        }
    }

    fn bind_program(&mut self, program: ProgramId, _owner: Option<NodeId>) {
        if program != ProgramId::DEFAULT && !self.warned_program {
            debug!("software backend has no program {program:?}; using the default path");
            self.warned_program = true;
        }
    }

    fn draw_quads(&mut self, op: &QuadOp, quads: &QuadBuffer) -> Result<()> {
        for index in op.first_quad..op.first_quad + op.quad_count {
            let vertices = quads.quad_vertices(index);
            self.draw_quad(&vertices, quads.texture_for(index));
        }
        Ok(())
    }

    fn run_filter(&mut self, op: &FilterOp, _quads: &QuadBuffer) -> Result<()> {
        if op.filter.program() != ProgramId::DEFAULT && !self.warned_program {
            debug!(
                "software backend has no filter program {:?}; copying source",
                op.filter.program()
            );
            self.warned_program = true;
        }

        let Some(source) = self.targets.get(&op.source.id()).cloned() else {
            bail!("filter source texture {} does not exist", op.source.id());
        };

        let target = match self.current {
            Target::Screen => &mut self.screen,
            Target::Texture(id) => match self.targets.get_mut(&id) {
                Some(pixmap) => pixmap,
                None => bail!("filter target texture {id} does not exist"),
            },
        };

        // Scaled nearest blit from source to the full target.
        for y in 0..target.height {
            let v = (y as f32 + 0.5) / target.height as f32;
            for x in 0..target.width {
                let u = (x as f32 + 0.5) / target.width as f32;
                let index = y as usize * target.width as usize + x as usize;
                target.pixels[index] = source.sample_nearest(u, v);
            }
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}

fn pack_color(color: [f32; 4]) -> u32 {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
    channel(color[0])
        | (channel(color[1]) << 8)
        | (channel(color[2]) << 16)
        | (channel(color[3]) << 24)
}

// Premultiplied src-over.
fn blend_over(dst: u32, src: u32) -> u32 {
    let src_a = (src >> 24) & 0xff;
    if src_a == 0xff {
        return src;
    }
    if src_a == 0 && src == 0 {
        return dst;
    }
    let inv = 255 - src_a;
    let mut out = 0u32;
    for shift in [0, 8, 16, 24] {
        let d = (dst >> shift) & 0xff;
        let s = (src >> shift) & 0xff;
        let channel = (s + (d * inv + 127) / 255).min(255);
        out |= channel << shift;
    }
    out
}

// Channelwise modulate (texture sample x vertex color), both premultiplied.
fn modulate(texel: u32, tint: u32) -> u32 {
    let mut out = 0u32;
    for shift in [0, 8, 16, 24] {
        let a = (texel >> shift) & 0xff;
        let b = (tint >> shift) & 0xff;
        out |= ((a * b + 127) / 255) << shift;
    }
    out
}

fn lerp_color(c: [u32; 3], w: [f32; 3]) -> u32 {
    let mut out = 0u32;
    for shift in [0, 8, 16, 24] {
        let value = (0..3)
            .map(|i| ((c[i] >> shift) & 0xff) as f32 * w[i])
            .sum::<f32>()
            .round()
            .clamp(0.0, 255.0) as u32;
        out |= value << shift;
    }
    out
}

fn fill_triangle(target: &mut Pixmap, v: [&QuadVertex; 3], source: Option<&Pixmap>) {
    let (ax, ay) = (v[0].pos[0], v[0].pos[1]);
    let (bx, by) = (v[1].pos[0], v[1].pos[1]);
    let (cx, cy) = (v[2].pos[0], v[2].pos[1]);

    let area = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
    if area.abs() < f32::EPSILON {
        return;
    }

    let min_x = ax.min(bx).min(cx).floor().max(0.0) as u32;
    let min_y = ay.min(by).min(cy).floor().max(0.0) as u32;
    let max_x = (ax.max(bx).max(cx).ceil() as i64).clamp(0, i64::from(target.width)) as u32;
    let max_y = (ay.max(by).max(cy).ceil() as i64).clamp(0, i64::from(target.height)) as u32;

    let uvs: Vec<(f32, f32)> = v.iter().map(|vertex| unpack_uv(vertex.uv)).collect();

    for y in min_y..max_y {
        for x in min_x..max_x {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;

            let w0 = ((bx - px) * (cy - py) - (by - py) * (cx - px)) / area;
            let w1 = ((cx - px) * (ay - py) - (cy - py) * (ax - px)) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let tint = lerp_color([v[0].color, v[1].color, v[2].color], [w0, w1, w2]);
            let src = match source {
                Some(pixmap) => {
                    let u = w0 * uvs[0].0 + w1 * uvs[1].0 + w2 * uvs[2].0;
                    let vv = w0 * uvs[0].1 + w1 * uvs[1].1 + w2 * uvs[2].1;
                    modulate(pixmap.sample_nearest(u, vv), tint)
                }
                None => tint,
            };

            let index = y as usize * target.width as usize + x as usize;
            target.pixels[index] = blend_over(target.pixels[index], src);
        }
    }
}
