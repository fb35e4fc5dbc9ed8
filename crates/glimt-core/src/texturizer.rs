//! Per-node render-to-texture state.
//!
//! A texturized node redirects its subtree into a pooled offscreen target
//! and composites the result (possibly filtered) as a regular textured
//! quad. This type holds the node-side bookkeeping: the enabled/lazy flags,
//! the filter list, and the lazily checked-out pool textures.

use std::rc::Rc;

use anyhow::Result;

use crate::filter::Filter;
use crate::pool::RenderTexturePool;
use crate::scene::PaintCtx;
use crate::texture::RenderTexture;

/// Largest logical edge a texturized subtree is rendered at. Larger
/// subtrees are clamped; their content is scaled into the target.
pub const MAX_TEXTURE_DIM: f32 = 2048.0;

/// Render-to-texture controller for a single node.
#[derive(Default)]
pub struct Texturizer {
    enabled: bool,
    /// With `lazy`, the subtree is only re-rendered into the texture when
    /// it actually changed; otherwise every frame.
    pub lazy: bool,
    filters: Vec<Rc<dyn Filter>>,
    render_texture: Option<Rc<RenderTexture>>,
    filter_texture: Option<Rc<RenderTexture>>,
    /// Set once the filter chain has been applied for the current content;
    /// cleared whenever content or filters change.
    pub filter_result_cached: bool,
}

impl Texturizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Replaces the filter list.
    pub fn set_filters(&mut self, filters: Vec<Rc<dyn Filter>>) {
        self.filters = filters;
        self.filter_result_cached = false;
    }

    pub fn filters(&self) -> &[Rc<dyn Filter>] {
        &self.filters
    }

    /// True when render-to-texture is in effect at all, for any reason.
    pub fn render_to_texture_enabled(&self) -> bool {
        self.enabled || !self.filters.is_empty()
    }

    /// True when the subtree must actually be (re)rendered into a texture
    /// this frame: explicitly enabled and not lazily cached, or at least
    /// one filter has a visible effect.
    pub fn must_render_to_texture(&self, subtree_changed: bool) -> bool {
        if self.enabled && (!self.lazy || subtree_changed) {
            return true;
        }
        self.has_active_filters()
    }

    /// Filters with a visible effect, identity filters skipped.
    pub fn active_filters(&self) -> impl Iterator<Item = &Rc<dyn Filter>> {
        self.filters.iter().filter(|filter| !filter.use_default())
    }

    pub fn has_active_filters(&self) -> bool {
        self.active_filters().next().is_some()
    }

    /// The subtree's offscreen target, checked out on first use.
    pub fn acquire_render_texture(
        &mut self,
        ctx: &mut PaintCtx<'_>,
        logical_w: f32,
        logical_h: f32,
    ) -> Result<Rc<RenderTexture>> {
        if let Some(texture) = &self.render_texture {
            return Ok(Rc::clone(texture));
        }
        let texture = ctx.allocate_render_texture(
            logical_w.min(MAX_TEXTURE_DIM),
            logical_h.min(MAX_TEXTURE_DIM),
        )?;
        self.render_texture = Some(Rc::clone(&texture));
        Ok(texture)
    }

    /// The filter chain's output target, checked out on first use.
    pub fn acquire_filter_texture(
        &mut self,
        ctx: &mut PaintCtx<'_>,
        logical_w: f32,
        logical_h: f32,
    ) -> Result<Rc<RenderTexture>> {
        if let Some(texture) = &self.filter_texture {
            return Ok(Rc::clone(texture));
        }
        let texture = ctx.allocate_render_texture(
            logical_w.min(MAX_TEXTURE_DIM),
            logical_h.min(MAX_TEXTURE_DIM),
        )?;
        self.filter_texture = Some(Rc::clone(&texture));
        Ok(texture)
    }

    pub fn has_render_texture(&self) -> bool {
        self.render_texture.is_some()
    }

    /// Texture the parent composites: the filter output when any filter is
    /// active, the raw subtree texture otherwise.
    pub fn result_texture(&self) -> Option<&Rc<RenderTexture>> {
        if self.has_active_filters() {
            self.filter_texture.as_ref()
        } else {
            self.render_texture.as_ref()
        }
    }

    pub fn release_render_texture(&mut self, pool: &mut RenderTexturePool, frame: u64) {
        if let Some(texture) = self.render_texture.take() {
            pool.release(texture, frame);
        }
    }

    pub fn release_filter_texture(&mut self, pool: &mut RenderTexturePool, frame: u64) {
        if let Some(texture) = self.filter_texture.take() {
            pool.release(texture, frame);
        }
        self.filter_result_cached = false;
    }

    /// Returns both textures to the pool. Called when the node leaves the
    /// visible tree or render-to-texture is switched off.
    pub fn deactivate(&mut self, pool: &mut RenderTexturePool, frame: u64) {
        self.release_render_texture(pool, frame);
        self.release_filter_texture(pool, frame);
    }
}
