//! Seam between the rendering core and the scene-graph collaborator.
//!
//! The core orchestrates frames but owns no nodes: the scene graph lives
//! behind [`SceneDriver`], which the context calls to run update passes and
//! to emit the frame's ordered quad stream. During the render pass the
//! driver borrows the core's machinery through [`PaintCtx`].

use std::rc::Rc;

use anyhow::Result;

use crate::backend::RenderBackend;
use crate::batch::RenderState;
use crate::pool::RenderTexturePool;
use crate::texture::{NodeId, RenderTexture};

/// Borrowed rendering machinery handed to the driver for one render pass.
///
/// Quads, shader selections and target pushes go through `state`; render
/// textures are checked out of and returned to the pool through the two
/// allocation methods, stamped with the current frame automatically.
pub struct PaintCtx<'a> {
    pub state: &'a mut RenderState,
    pool: &'a mut RenderTexturePool,
    backend: &'a mut dyn RenderBackend,
    frame: u64,
    precision: f32,
}

impl<'a> PaintCtx<'a> {
    pub(crate) fn new(
        state: &'a mut RenderState,
        pool: &'a mut RenderTexturePool,
        backend: &'a mut dyn RenderBackend,
        frame: u64,
        precision: f32,
    ) -> Self {
        Self {
            state,
            pool,
            backend,
            frame,
            precision,
        }
    }

    /// Frame counter value for this pass.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Device pixels per logical pixel.
    pub fn precision(&self) -> f32 {
        self.precision
    }

    /// Checks a render texture for the given logical size out of the pool.
    pub fn allocate_render_texture(
        &mut self,
        logical_w: f32,
        logical_h: f32,
    ) -> Result<Rc<RenderTexture>> {
        self.pool
            .allocate(self.backend, self.frame, self.precision, logical_w, logical_h)
    }

    /// Returns a checked-out render texture to the pool.
    pub fn release_render_texture(&mut self, texture: Rc<RenderTexture>) {
        self.pool.release(texture, self.frame);
    }

    pub fn pool(&self) -> &RenderTexturePool {
        &self.pool
    }
}

/// Scene-graph collaborator contract.
///
/// The context guarantees call order per frame: `update` (at most twice),
/// then any queued `sort_children` calls, then `clear_render_updates` and
/// `render`. `render` must emit quads front-to-back in paint order — the
/// core treats that order as authoritative.
pub trait SceneDriver {
    /// Runs one scene-graph update pass (layout, transforms, visibility).
    fn update(&mut self, dt: f64);

    /// True when `update` left work that needs another update pass.
    fn has_updates(&self) -> bool;

    /// True when anything changed that affects rendered output. Must be
    /// O(1): it gates whole-frame skipping.
    fn has_render_updates(&self) -> bool;

    /// Acknowledges the pending render updates before the render pass.
    fn clear_render_updates(&mut self);

    /// Marks output stale so the next frame is rendered unconditionally.
    fn force_render_update(&mut self);

    /// Emits the frame's quad stream through `ctx`.
    fn render(&mut self, ctx: &mut PaintCtx<'_>) -> Result<()>;

    /// Re-sorts the children of `node` by z-index. Invoked for ids queued
    /// via [`RenderContext::force_z_sort`] before the render pass.
    ///
    /// [`RenderContext::force_z_sort`]: crate::context::RenderContext::force_z_sort
    fn sort_children(&mut self, _node: NodeId) {}
}
