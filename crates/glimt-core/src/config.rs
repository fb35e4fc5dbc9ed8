//! Rendering context configuration.

use crate::texture::TextureHandle;

/// Options fixed for the lifetime of a [`RenderContext`].
///
/// [`RenderContext`]: crate::context::RenderContext
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Logical width of the screen surface.
    pub logical_w: f32,
    /// Logical height of the screen surface.
    pub logical_h: f32,
    /// Device pixels per logical pixel. Applies to the screen and to every
    /// pooled render texture.
    pub precision: f32,
    /// Source-texture memory budget in pixels, reported to the texture
    /// loading collaborator.
    pub texture_memory: u64,
    /// Render-texture pool budget in pixels.
    pub render_texture_memory: u64,
    /// Fixed capacity of the per-frame quad buffer in bytes.
    pub quad_buffer_bytes: usize,
    /// Frame delta override in seconds; `0.0` uses measured wall time.
    pub fixed_dt: f64,
    /// Handle of the shared texture atlas, if one is in use.
    pub atlas_texture: Option<TextureHandle>,
    /// Draw the atlas as a fullscreen overlay at the end of every frame.
    pub debug_texture_atlas: bool,
    /// Screen clear color at frame start; `None` keeps the previous frame.
    pub clear_color: Option<[f32; 4]>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            logical_w: 1280.0,
            logical_h: 720.0,
            precision: 1.0,
            texture_memory: 18_000_000,
            render_texture_memory: 12_000_000,
            quad_buffer_bytes: 8_000_000,
            fixed_dt: 0.0,
            atlas_texture: None,
            debug_texture_atlas: false,
            clear_color: Some([0.0, 0.0, 0.0, 0.0]),
        }
    }
}

impl ContextOptions {
    /// Screen size in device pixels.
    pub fn device_size(&self) -> (u32, u32) {
        let px = |logical: f32| ((logical * self.precision).round() as u32).max(1);
        (px(self.logical_w), px(self.logical_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_size_scales_with_precision() {
        let options = ContextOptions {
            logical_w: 1280.0,
            logical_h: 720.0,
            precision: 1.5,
            ..ContextOptions::default()
        };
        assert_eq!(options.device_size(), (1920, 1080));
    }
}
