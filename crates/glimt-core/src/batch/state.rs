use std::rc::Rc;

use crate::batch::{FilterOp, QuadOp};
use crate::config::ContextOptions;
use crate::filter::Filter;
use crate::quads::{QuadBuffer, QuadRequest, QuadVertex, pack_uv};
use crate::shader::{DefaultShader, Shader, shader_eq};
use crate::texture::{NodeId, RenderTexture, TextureHandle};

/// Per-frame batch builder.
///
/// Consumes an ordered stream of quad requests plus enter/exit-texturized-
/// subtree signals and produces the frame's batch and filter-pass sequence.
/// Order is a correctness-critical input from the caller; this type never
/// reorders anything. A new batch is opened only when GPU state actually
/// has to change: shader instance, shader owner, or active render target.
pub struct RenderState {
    quads: QuadBuffer,
    default_shader: Rc<dyn Shader>,

    /// Effective shader (after default substitution).
    shader: Option<Rc<dyn Shader>>,
    /// Shader as originally requested, remembered so repeated requests for
    /// a substituted shader are still recognized as unchanged.
    requested_shader: Option<Rc<dyn Shader>>,
    shader_owner: Option<NodeId>,

    render_texture: Option<Rc<RenderTexture>>,
    clear_render_texture: bool,
    target_stack: Vec<Option<Rc<RenderTexture>>>,

    /// Next quad must be checked for a forced batch boundary.
    check: bool,
    override_texture: Option<TextureHandle>,

    quad_ops: Vec<QuadOp>,
    filter_ops: Vec<FilterOp>,
    open: Option<QuadOp>,

    atlas_texture: Option<TextureHandle>,
    debug_atlas: bool,
    debug_atlas_size: f32,
    debug_atlas_done: bool,
}

impl RenderState {
    pub fn new(options: &ContextOptions) -> Self {
        Self {
            quads: QuadBuffer::new(options.quad_buffer_bytes),
            default_shader: Rc::new(DefaultShader),
            shader: None,
            requested_shader: None,
            shader_owner: None,
            render_texture: None,
            clear_render_texture: false,
            target_stack: Vec::new(),
            check: false,
            override_texture: None,
            quad_ops: Vec::new(),
            filter_ops: Vec::new(),
            open: None,
            atlas_texture: options.atlas_texture,
            debug_atlas: options.debug_texture_atlas,
            debug_atlas_size: options.logical_w.min(options.logical_h),
            debug_atlas_done: false,
        }
    }

    /// The shared default shader instance.
    pub fn default_shader(&self) -> &Rc<dyn Shader> {
        &self.default_shader
    }

    /// Discards all per-frame state. Batches and filter passes are never
    /// retained across frames.
    pub fn reset(&mut self) {
        self.shader = None;
        self.requested_shader = None;
        self.shader_owner = None;
        self.render_texture = None;
        self.clear_render_texture = false;
        self.target_stack.clear();
        self.check = false;
        self.override_texture = None;
        self.quad_ops.clear();
        self.filter_ops.clear();
        self.open = None;
        self.debug_atlas_done = false;
        self.quads.reset();
    }

    /// Selects the shader for subsequent quads.
    ///
    /// A shader that reports `use_default()` is substituted by the shared
    /// default instance to avoid a needless program switch; the original
    /// request is remembered so a repeat call with the same shader and
    /// owner stays a no-op.
    pub fn set_shader(&mut self, shader: &Rc<dyn Shader>, owner: NodeId) {
        if self.shader_owner == Some(owner)
            && self
                .requested_shader
                .as_ref()
                .is_some_and(|requested| shader_eq(requested, shader))
        {
            // Same owner and same requested shader: nothing can differ.
            return;
        }

        self.requested_shader = Some(Rc::clone(shader));
        let effective = if shader.use_default() {
            Rc::clone(&self.default_shader)
        } else {
            Rc::clone(shader)
        };

        let changed = self.shader_owner != Some(owner)
            || !self
                .shader
                .as_ref()
                .is_some_and(|current| shader_eq(current, &effective));
        if changed {
            self.shader = Some(effective);
            self.shader_owner = Some(owner);
            self.check = true;
        }
    }

    /// Enters a texturized subtree: pushes the previous target and makes
    /// `target` active. `clear` forces an immediate flush-and-reopen so the
    /// clear instruction gets its own (possibly empty) batch instead of
    /// being attached to the wrong target's batch.
    pub fn set_render_target(&mut self, target: Option<Rc<RenderTexture>>, clear: bool) {
        self.target_stack.push(self.render_texture.clone());
        self.apply_render_target(target, clear);
    }

    /// Leaves a texturized subtree, returning to the previous target.
    pub fn restore_render_target(&mut self) {
        debug_assert!(
            !self.target_stack.is_empty(),
            "restore_render_target without matching set_render_target"
        );
        let previous = self.target_stack.pop().unwrap_or(None);
        self.apply_render_target(previous, false);
    }

    fn apply_render_target(&mut self, target: Option<Rc<RenderTexture>>, clear: bool) {
        let same = match (&self.render_texture, &target) {
            (None, None) => true,
            (Some(a), Some(b)) => a.id() == b.id(),
            _ => false,
        };
        if !same || clear {
            self.render_texture = target;
            self.clear_render_texture = clear;

            if clear {
                self.flush(true);
            } else {
                self.check = true;
            }
        }
    }

    /// Forces subsequent quads onto `texture` regardless of their own
    /// resolution (debug visualization path). `None` restores normal
    /// resolution.
    pub fn set_override_texture(&mut self, texture: Option<TextureHandle>) {
        self.override_texture = texture;
    }

    /// Appends one quad, opening or splitting batches as required, and
    /// returns the byte offset of its vertex block.
    pub fn add_quad(&mut self, request: &QuadRequest) -> usize {
        if self.open.is_none() {
            self.open_batch();
        } else if self.check && self.has_changes() {
            self.flush(true);
            self.check = false;
        }

        // Texture resolution: explicit override wins, then the shared
        // atlas for packed nodes, then the node's own texture.
        let texture = self.override_texture.or(if request.in_atlas {
            self.atlas_texture
        } else {
            request.texture
        });

        let offset = self.quads.append(texture, request.owner);
        let vertices = [0, 1, 2, 3].map(|corner| QuadVertex {
            pos: request.coords[corner],
            uv: pack_uv(request.uvs[corner][0], request.uvs[corner][1]),
            color: request.colors[corner],
        });
        self.quads.write_quad(offset, &vertices);

        if let Some(open) = self.open.as_mut() {
            open.quad_count += 1;
        }

        offset
    }

    /// Queues a post-processing pass at the current point in the batch
    /// sequence. Closes the open batch without opening a replacement; the
    /// recorded checkpoint tells the executor how many batches must run
    /// before the pass fires.
    pub fn add_filter(
        &mut self,
        filter: &Rc<dyn Filter>,
        owner: NodeId,
        source: Rc<RenderTexture>,
        target: Option<Rc<RenderTexture>>,
    ) {
        self.flush(false);

        self.filter_ops.push(FilterOp {
            filter: Rc::clone(filter),
            owner,
            source,
            render_texture: target,
            checkpoint: self.quad_ops.len(),
        });
    }

    /// Finalizes the frame: flushes the open batch, optionally appends the
    /// atlas debug overlay, then runs the extra-attribute sizing pass.
    ///
    /// Calling `finish` again without intervening mutation produces no
    /// additional batches and leaves all byte offsets unchanged.
    pub fn finish(&mut self) {
        if self.debug_atlas && !self.debug_atlas_done {
            if let Some(atlas) = self.atlas_texture {
                self.render_debug_atlas(atlas);
            }
            self.debug_atlas_done = true;
        }

        if self.open.is_some() {
            self.flush(false);
        }

        self.size_extra_attribs();
    }

    /// Finalized batches, in execution order.
    pub fn quad_ops(&self) -> &[QuadOp] {
        &self.quad_ops
    }

    /// Queued filter passes, in execution order.
    pub fn filter_ops(&self) -> &[FilterOp] {
        &self.filter_ops
    }

    pub fn quads(&self) -> &QuadBuffer {
        &self.quads
    }

    fn has_changes(&self) -> bool {
        let Some(open) = self.open.as_ref() else {
            return false;
        };

        if !self
            .shader
            .as_ref()
            .is_some_and(|shader| shader_eq(shader, &open.shader))
        {
            return true;
        }
        if self.shader_owner != open.shader_owner {
            return true;
        }

        let same_target = match (&self.render_texture, &open.render_texture) {
            (None, None) => true,
            (Some(a), Some(b)) => a.id() == b.id(),
            _ => false,
        };
        !same_target
    }

    /// Closes the open batch, keeping it only when it would have a visible
    /// effect, and optionally opens a successor with the current state.
    fn flush(&mut self, reopen: bool) {
        if let Some(op) = self.open.take() {
            if op.clear_render_texture || op.quad_count > 0 || op.shader.supports_empty_batch() {
                self.quad_ops.push(op);
            }
        }

        if reopen {
            self.open_batch();
        }

        // Unless requested again, the target must not be cleared twice.
        self.clear_render_texture = false;
    }

    fn open_batch(&mut self) {
        let shader = self
            .shader
            .clone()
            .unwrap_or_else(|| Rc::clone(&self.default_shader));

        self.open = Some(QuadOp {
            shader,
            shader_owner: self.shader_owner,
            render_texture: self.render_texture.clone(),
            clear_render_texture: self.clear_render_texture,
            first_quad: self.quads.quad_count(),
            quad_count: 0,
            extra_attribs_offset: 0,
        });
        self.check = false;
    }

    // Draws the whole atlas texture as one screen quad (debug overlay).
    fn render_debug_atlas(&mut self, atlas: TextureHandle) {
        let default_shader = Rc::clone(&self.default_shader);
        self.set_shader(&default_shader, NodeId::ROOT);
        self.set_render_target(None, false);
        self.set_override_texture(Some(atlas));

        let size = self.debug_atlas_size;
        self.add_quad(&QuadRequest {
            owner: NodeId::ROOT,
            texture: None,
            in_atlas: false,
            coords: [[0.0, 0.0], [size, 0.0], [size, size], [0.0, size]],
            uvs: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            colors: [0xffff_ffff; 4],
        });

        self.set_override_texture(None);
        self.restore_render_target();
    }

    // Second pass: extra attribute runs are packed after the base region,
    // so each batch's offset depends on the sizes of every batch before
    // it. Only possible once the full sequence is known.
    fn size_extra_attribs(&mut self) {
        let mut offset = self.quads.quad_count() * crate::quads::BYTES_PER_QUAD
            + crate::quads::BYTES_PER_QUAD;

        for op in &mut self.quad_ops {
            op.extra_attribs_offset = offset;
            let extra = op.shader.extra_attrib_bytes_per_vertex() * 4 * op.quad_count;
            offset += extra;
        }
        self.quads.set_data_len(offset);

        for op in &self.quad_ops {
            if op.shader.extra_attrib_bytes_per_vertex() > 0 && op.quad_count > 0 {
                op.shader.write_extra_attribs(op, &mut self.quads);
            }
        }
    }
}
